//! Centralized default constants for vitrine.
//!
//! Configuration falls back to these values when the corresponding
//! environment variable is unset.

// =============================================================================
// DATABASE
// =============================================================================

/// Default database URL.
pub const DATABASE_URL: &str = "postgres://localhost/vitrine";

/// Default maximum number of pooled database connections.
pub const DATABASE_MAX_CONNECTIONS: u32 = 10;

// =============================================================================
// STORAGE
// =============================================================================

/// Default disk name → root directory mapping.
pub const STORAGE_DISKS: &str = "local=/var/lib/vitrine/private,public=/var/lib/vitrine/public";

/// Disk holding pooled (available) media.
pub const POOL_DISK: &str = "public";

/// Directory prefix of pooled media on [`POOL_DISK`].
pub const POOL_DIRECTORY: &str = "images";

/// Disk holding attached media of relocating families.
pub const ATTACHED_DISK: &str = "public";

/// Directory prefix of attached media on [`ATTACHED_DISK`].
pub const ATTACHED_DIRECTORY: &str = "pictures";

// =============================================================================
// PAGINATION
// =============================================================================

/// Default page size for pool listings.
pub const PAGE_LIMIT: i64 = 50;

/// Default page offset.
pub const PAGE_OFFSET: i64 = 0;
