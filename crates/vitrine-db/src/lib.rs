//! # vitrine-db
//!
//! Persistence layer for vitrine.
//!
//! This crate provides:
//! - Connection pool management
//! - [`PgMediaStore`]: attached and pooled media rows in PostgreSQL, with
//!   owner-scoped advisory locks and row locks
//! - [`MemoryMediaStore`]: the same contract without a database
//! - [`FilesystemGateway`]: byte storage on named disks
//!
//! ## Example
//!
//! ```rust,ignore
//! use vitrine_db::Database;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = Database::connect("postgres://localhost/vitrine").await?;
//!     let scope = OwnerScope::new(MediaFamily::ItemImage, item_id);
//!     let images = db.media.list_by_owner(scope).await?;
//!     Ok(())
//! }
//! ```
pub mod file_storage;
pub mod media;
pub mod memory;
pub mod pool;

// Test fixtures for integration tests
// Note: Always compiled so integration tests (in tests/) can use DEFAULT_TEST_DATABASE_URL
pub mod test_fixtures;

// Re-export core types
pub use vitrine_core::*;

pub use file_storage::FilesystemGateway;
pub use media::{PgMediaStore, PgMediaTransaction};
pub use memory::{MemoryMediaStore, MemoryTransaction};
pub use pool::{create_pool, create_pool_with_config, log_pool_metrics, PoolConfig};

/// Schema migrations, embedded for fixtures that manage their own schema.
pub const MEDIA_SCHEMA_SQL: &str = concat!(
    include_str!("../../../migrations/20261019000001_media_tables.sql"),
    "\n",
    include_str!("../../../migrations/20261019000002_media_identity.sql"),
);

/// Combined database context.
#[derive(Clone)]
pub struct Database {
    /// The underlying connection pool.
    pub pool: sqlx::Pool<sqlx::Postgres>,
    /// Attached and pooled media rows.
    pub media: PgMediaStore,
}

impl Database {
    /// Create a new Database instance from a connection pool.
    pub fn new(pool: sqlx::Pool<sqlx::Postgres>) -> Self {
        Self {
            media: PgMediaStore::new(pool.clone()),
            pool,
        }
    }

    /// Connect with default pool settings.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = create_pool(database_url).await?;
        Ok(Self::new(pool))
    }

    /// Connect using the runtime configuration.
    pub async fn from_config(config: &VitrineConfig) -> Result<Self> {
        let pool =
            create_pool_with_config(&config.database_url, PoolConfig::from_config(config)).await?;
        Ok(Self::new(pool))
    }

    /// Run pending migrations.
    #[cfg(feature = "migrations")]
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(|e| Error::Internal(format!("Migration failed: {}", e)))?;
        Ok(())
    }
}
