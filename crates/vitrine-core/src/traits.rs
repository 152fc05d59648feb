//! Core traits for vitrine abstractions.
//!
//! These traits define the interfaces that concrete implementations
//! must satisfy, enabling pluggable backends and testability.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;
use crate::models::*;

// =============================================================================
// MEDIA STORE TRAITS
// =============================================================================

/// Persistence of attached (ordered, per owner) and pooled media rows.
///
/// Reads on the store itself take no locks. Anything that mutates
/// `display_order` goes through a [`MediaTransaction`].
#[async_trait]
pub trait MediaStore: Send + Sync {
    /// Open a transaction. Dropping it without [`MediaTransaction::commit`]
    /// rolls back.
    async fn begin(&self) -> Result<Box<dyn MediaTransaction + '_>>;

    /// Attached rows of an owner, ordered by `display_order`.
    async fn list_by_owner(&self, scope: OwnerScope) -> Result<Vec<AttachedMedia>>;

    /// `max(display_order) + 1`, or 1 for an owner with no rows. Unlocked.
    async fn next_order(&self, scope: OwnerScope) -> Result<i32>;

    /// Attached row by id within a family.
    async fn find_attached(&self, family: MediaFamily, id: Uuid) -> Result<Option<AttachedMedia>>;

    /// Pool row by id.
    async fn find_pooled(&self, id: Uuid) -> Result<Option<PoolMedia>>;

    /// Pool rows, newest first.
    async fn list_pool(&self, limit: i64, offset: i64) -> Result<Vec<PoolMedia>>;
}

/// A unit of work over a [`MediaStore`].
///
/// `lock_*` methods return the row and keep it locked until commit or drop.
/// Implementations must serialize concurrent holders of the same
/// [`lock_owner`](Self::lock_owner) key.
#[async_trait]
pub trait MediaTransaction: Send {
    /// Exclusive owner-scoped lock held for the rest of the transaction.
    async fn lock_owner(&mut self, scope: OwnerScope) -> Result<()>;

    async fn lock_attached(&mut self, family: MediaFamily, id: Uuid)
        -> Result<Option<AttachedMedia>>;

    /// The sibling currently at `order` within the owner's list.
    async fn lock_attached_at(
        &mut self,
        scope: OwnerScope,
        order: i32,
    ) -> Result<Option<AttachedMedia>>;

    /// All rows of the owner, ordered by `display_order`.
    async fn lock_siblings(&mut self, scope: OwnerScope) -> Result<Vec<AttachedMedia>>;

    /// Highest `display_order` of the owner, 0 when empty.
    async fn max_order(&mut self, scope: OwnerScope) -> Result<i32>;

    async fn next_order(&mut self, scope: OwnerScope) -> Result<i32> {
        Ok(self.max_order(scope).await? + 1)
    }

    async fn set_display_order(&mut self, family: MediaFamily, id: Uuid, order: i32)
        -> Result<()>;

    /// Add `delta` to every sibling whose order lies in `from..=to`.
    async fn shift_range(&mut self, scope: OwnerScope, from: i32, to: i32, delta: i32)
        -> Result<u64>;

    async fn update_alt_text(
        &mut self,
        family: MediaFamily,
        id: Uuid,
        alt_text: Option<&str>,
    ) -> Result<bool>;

    async fn insert_attached(&mut self, media: &AttachedMedia) -> Result<()>;

    /// Returns false when the row was already gone.
    async fn delete_attached(&mut self, family: MediaFamily, id: Uuid) -> Result<bool>;

    async fn lock_pooled(&mut self, id: Uuid) -> Result<Option<PoolMedia>>;

    async fn insert_pooled(&mut self, media: &PoolMedia) -> Result<()>;

    async fn delete_pooled(&mut self, id: Uuid) -> Result<bool>;

    /// Whether an attached row of any of `families`, or a pooled row when
    /// `pooled` is set, still refers to `path`.
    async fn path_referenced(
        &mut self,
        families: &[MediaFamily],
        pooled: bool,
        path: &str,
    ) -> Result<bool>;

    async fn commit(self: Box<Self>) -> Result<()>;
}

// =============================================================================
// STORAGE GATEWAY
// =============================================================================

/// Byte-level access to named disks.
///
/// Disk names and directory prefixes come from configuration.
#[async_trait]
pub trait StorageGateway: Send + Sync {
    async fn read(&self, disk: &str, path: &str) -> Result<Vec<u8>>;

    /// Write (or overwrite) the object at `path`.
    async fn write(&self, disk: &str, path: &str, data: &[u8]) -> Result<()>;

    /// Delete the object; deleting a missing object is not an error.
    async fn delete(&self, disk: &str, path: &str) -> Result<()>;

    async fn exists(&self, disk: &str, path: &str) -> Result<bool>;
}
