//! In-memory media store.
//!
//! Non-persistent [`MediaStore`] with the same transactional contract as
//! [`PgMediaStore`](crate::PgMediaStore): a transaction works on a staged
//! copy, commit publishes it, drop discards it. Commit re-checks the
//! per-owner uniqueness of `display_order` and the single representation of
//! each id the way the deferred database constraints do.
//!
//! A transaction holds the store-wide mutex from `begin` until commit or
//! drop, so all transactions are serialized (a superset of the owner-scoped
//! ordering the contract requires). Do not call the store's unlocked reads
//! from a task that holds an open transaction.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use vitrine_core::{
    AttachedMedia, Error, MediaFamily, MediaStore, MediaTransaction, OwnerScope, PoolMedia,
    Result,
};

#[derive(Debug, Clone, Default)]
struct MemoryState {
    attached: HashMap<(MediaFamily, Uuid), AttachedMedia>,
    pooled: HashMap<Uuid, PoolMedia>,
}

impl MemoryState {
    fn siblings(&self, scope: OwnerScope) -> Vec<AttachedMedia> {
        let mut rows: Vec<AttachedMedia> = self
            .attached
            .values()
            .filter(|m| m.family == scope.family && m.owner_id == scope.owner_id)
            .cloned()
            .collect();
        rows.sort_by_key(|m| (m.display_order, m.id));
        rows
    }

    fn max_order(&self, scope: OwnerScope) -> i32 {
        self.attached
            .values()
            .filter(|m| m.family == scope.family && m.owner_id == scope.owner_id)
            .map(|m| m.display_order)
            .max()
            .unwrap_or(0)
    }

    /// Uniqueness of `(family, owner, display_order)`, positivity, and one
    /// representation per id across the pool and every family.
    fn check_constraints(&self) -> Result<()> {
        let mut seen = HashSet::new();
        let mut ids = HashSet::new();
        for media in self.attached.values() {
            if self.pooled.contains_key(&media.id) || !ids.insert(media.id) {
                return Err(Error::Conflict(format!(
                    "media {} has more than one representation",
                    media.id
                )));
            }
            if media.display_order < 1 {
                return Err(Error::Conflict(format!(
                    "display_order {} of {} is below 1",
                    media.display_order, media.id
                )));
            }
            if !seen.insert((media.family, media.owner_id, media.display_order)) {
                return Err(Error::Conflict(format!(
                    "display order collision at commit: {} position {}",
                    media.scope(),
                    media.display_order
                )));
            }
        }
        Ok(())
    }
}

/// Non-persistent [`MediaStore`].
#[derive(Clone, Default)]
pub struct MemoryMediaStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryMediaStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a pooled row outside of any caller transaction.
    pub async fn insert_pooled(&self, media: &PoolMedia) -> Result<()> {
        let mut tx = self.begin().await?;
        tx.insert_pooled(media).await?;
        tx.commit().await
    }

    /// Number of attached rows across every family.
    pub async fn attached_count(&self) -> usize {
        self.state.lock().await.attached.len()
    }

    /// Number of pooled rows.
    pub async fn pooled_count(&self) -> usize {
        self.state.lock().await.pooled.len()
    }
}

#[async_trait]
impl MediaStore for MemoryMediaStore {
    async fn begin(&self) -> Result<Box<dyn MediaTransaction + '_>> {
        let guard = self.state.clone().lock_owned().await;
        let staged = guard.clone();
        Ok(Box::new(MemoryTransaction { guard, staged }))
    }

    async fn list_by_owner(&self, scope: OwnerScope) -> Result<Vec<AttachedMedia>> {
        Ok(self.state.lock().await.siblings(scope))
    }

    async fn next_order(&self, scope: OwnerScope) -> Result<i32> {
        Ok(self.state.lock().await.max_order(scope) + 1)
    }

    async fn find_attached(&self, family: MediaFamily, id: Uuid) -> Result<Option<AttachedMedia>> {
        Ok(self.state.lock().await.attached.get(&(family, id)).cloned())
    }

    async fn find_pooled(&self, id: Uuid) -> Result<Option<PoolMedia>> {
        Ok(self.state.lock().await.pooled.get(&id).cloned())
    }

    async fn list_pool(&self, limit: i64, offset: i64) -> Result<Vec<PoolMedia>> {
        let state = self.state.lock().await;
        let mut rows: Vec<PoolMedia> = state.pooled.values().cloned().collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(rows
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }
}

/// Staged copy of the store plus the guard that serializes transactions.
pub struct MemoryTransaction {
    guard: OwnedMutexGuard<MemoryState>,
    staged: MemoryState,
}

#[async_trait]
impl MediaTransaction for MemoryTransaction {
    async fn lock_owner(&mut self, _scope: OwnerScope) -> Result<()> {
        // The store-wide guard already excludes every other transaction.
        Ok(())
    }

    async fn lock_attached(
        &mut self,
        family: MediaFamily,
        id: Uuid,
    ) -> Result<Option<AttachedMedia>> {
        Ok(self.staged.attached.get(&(family, id)).cloned())
    }

    async fn lock_attached_at(
        &mut self,
        scope: OwnerScope,
        order: i32,
    ) -> Result<Option<AttachedMedia>> {
        Ok(self
            .staged
            .siblings(scope)
            .into_iter()
            .find(|m| m.display_order == order))
    }

    async fn lock_siblings(&mut self, scope: OwnerScope) -> Result<Vec<AttachedMedia>> {
        Ok(self.staged.siblings(scope))
    }

    async fn max_order(&mut self, scope: OwnerScope) -> Result<i32> {
        Ok(self.staged.max_order(scope))
    }

    async fn set_display_order(
        &mut self,
        family: MediaFamily,
        id: Uuid,
        order: i32,
    ) -> Result<()> {
        if let Some(media) = self.staged.attached.get_mut(&(family, id)) {
            media.display_order = order;
            media.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn shift_range(
        &mut self,
        scope: OwnerScope,
        from: i32,
        to: i32,
        delta: i32,
    ) -> Result<u64> {
        let now = Utc::now();
        let mut shifted = 0;
        for media in self.staged.attached.values_mut() {
            if media.family == scope.family
                && media.owner_id == scope.owner_id
                && (from..=to).contains(&media.display_order)
            {
                media.display_order += delta;
                media.updated_at = now;
                shifted += 1;
            }
        }
        Ok(shifted)
    }

    async fn update_alt_text(
        &mut self,
        family: MediaFamily,
        id: Uuid,
        alt_text: Option<&str>,
    ) -> Result<bool> {
        match self.staged.attached.get_mut(&(family, id)) {
            Some(media) => {
                media.alt_text = alt_text.map(str::to_string);
                media.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn insert_attached(&mut self, media: &AttachedMedia) -> Result<()> {
        let key = (media.family, media.id);
        if self.staged.attached.contains_key(&key) {
            return Err(Error::Conflict(format!(
                "attached media id already exists: {}",
                media.id
            )));
        }
        self.staged.attached.insert(key, media.clone());
        Ok(())
    }

    async fn delete_attached(&mut self, family: MediaFamily, id: Uuid) -> Result<bool> {
        Ok(self.staged.attached.remove(&(family, id)).is_some())
    }

    async fn lock_pooled(&mut self, id: Uuid) -> Result<Option<PoolMedia>> {
        Ok(self.staged.pooled.get(&id).cloned())
    }

    async fn insert_pooled(&mut self, media: &PoolMedia) -> Result<()> {
        if self.staged.pooled.contains_key(&media.id) {
            return Err(Error::Conflict(format!(
                "pool media id already exists: {}",
                media.id
            )));
        }
        self.staged.pooled.insert(media.id, media.clone());
        Ok(())
    }

    async fn delete_pooled(&mut self, id: Uuid) -> Result<bool> {
        Ok(self.staged.pooled.remove(&id).is_some())
    }

    async fn path_referenced(
        &mut self,
        families: &[MediaFamily],
        pooled: bool,
        path: &str,
    ) -> Result<bool> {
        let attached = self
            .staged
            .attached
            .values()
            .any(|m| families.contains(&m.family) && m.file.path == path);
        Ok(attached || (pooled && self.staged.pooled.values().any(|m| m.file.path == path)))
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let MemoryTransaction { mut guard, staged } = *self;
        staged.check_constraints()?;
        *guard = staged;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vitrine_core::MediaFile;

    fn attached(scope: OwnerScope, order: i32) -> AttachedMedia {
        let now = Utc::now();
        AttachedMedia {
            id: Uuid::new_v4(),
            family: scope.family,
            owner_id: scope.owner_id,
            file: MediaFile {
                path: format!("{}.jpg", order),
                original_name: String::new(),
                mime_type: "image/jpeg".into(),
                size: 1,
            },
            alt_text: None,
            display_order: order,
            created_at: now,
            updated_at: now,
        }
    }

    fn scope() -> OwnerScope {
        OwnerScope::new(MediaFamily::ItemImage, Uuid::new_v4())
    }

    #[tokio::test]
    async fn test_uncommitted_transaction_rolls_back() {
        let store = MemoryMediaStore::new();
        let scope = scope();
        {
            let mut tx = store.begin().await.unwrap();
            tx.insert_attached(&attached(scope, 1)).await.unwrap();
        }
        assert!(store.list_by_owner(scope).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_commit_publishes_and_orders() {
        let store = MemoryMediaStore::new();
        let scope = scope();
        let mut tx = store.begin().await.unwrap();
        tx.insert_attached(&attached(scope, 2)).await.unwrap();
        tx.insert_attached(&attached(scope, 1)).await.unwrap();
        tx.commit().await.unwrap();

        let orders: Vec<i32> = store
            .list_by_owner(scope)
            .await
            .unwrap()
            .iter()
            .map(|m| m.display_order)
            .collect();
        assert_eq!(orders, vec![1, 2]);
        assert_eq!(store.next_order(scope).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_commit_rejects_order_collision() {
        let store = MemoryMediaStore::new();
        let scope = scope();
        let mut tx = store.begin().await.unwrap();
        tx.insert_attached(&attached(scope, 1)).await.unwrap();
        tx.insert_attached(&attached(scope, 1)).await.unwrap();
        let err = tx.commit().await.unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
        assert_eq!(store.attached_count().await, 0);
    }

    #[tokio::test]
    async fn test_commit_rejects_two_representations() {
        let store = MemoryMediaStore::new();
        let media = attached(scope(), 1);
        let mut tx = store.begin().await.unwrap();
        tx.insert_attached(&media).await.unwrap();
        tx.insert_pooled(&PoolMedia {
            id: media.id,
            file: media.file.clone(),
            comment: None,
            created_at: media.created_at,
            updated_at: media.updated_at,
        })
        .await
        .unwrap();
        assert!(matches!(tx.commit().await, Err(Error::Conflict(_))));
    }

    #[tokio::test]
    async fn test_swap_passes_deferred_check() {
        let store = MemoryMediaStore::new();
        let scope = scope();
        let (a, b) = (attached(scope, 1), attached(scope, 2));
        let mut tx = store.begin().await.unwrap();
        tx.insert_attached(&a).await.unwrap();
        tx.insert_attached(&b).await.unwrap();
        tx.commit().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        tx.set_display_order(scope.family, a.id, 2).await.unwrap();
        tx.set_display_order(scope.family, b.id, 1).await.unwrap();
        tx.commit().await.unwrap();

        let rows = store.list_by_owner(scope).await.unwrap();
        assert_eq!(rows[0].id, b.id);
        assert_eq!(rows[1].id, a.id);
    }

    #[tokio::test]
    async fn test_same_id_in_two_families_is_rejected() {
        let store = MemoryMediaStore::new();
        let owner = Uuid::new_v4();
        let logo = attached(OwnerScope::new(MediaFamily::PartnerLogo, owner), 1);
        let mut image = attached(OwnerScope::new(MediaFamily::PartnerImage, owner), 1);
        image.id = logo.id;

        let mut tx = store.begin().await.unwrap();
        tx.insert_attached(&logo).await.unwrap();
        tx.insert_attached(&image).await.unwrap();
        assert!(matches!(tx.commit().await, Err(Error::Conflict(_))));
        assert_eq!(store.attached_count().await, 0);

        // Moving the id between families in one transaction is fine.
        let mut tx = store.begin().await.unwrap();
        tx.insert_attached(&logo).await.unwrap();
        tx.commit().await.unwrap();
        let mut tx = store.begin().await.unwrap();
        tx.delete_attached(MediaFamily::PartnerLogo, logo.id).await.unwrap();
        tx.insert_attached(&image).await.unwrap();
        tx.commit().await.unwrap();
        assert!(store
            .find_attached(MediaFamily::PartnerImage, logo.id)
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_path_referenced_scoped_to_families_and_pool() {
        let store = MemoryMediaStore::new();
        let media = attached(OwnerScope::new(MediaFamily::PartnerLogo, Uuid::new_v4()), 1);
        let mut tx = store.begin().await.unwrap();
        tx.insert_attached(&media).await.unwrap();
        tx.insert_pooled(&PoolMedia {
            id: Uuid::new_v4(),
            file: MediaFile {
                path: "pooled.jpg".into(),
                original_name: String::new(),
                mime_type: "image/jpeg".into(),
                size: 1,
            },
            comment: None,
            created_at: media.created_at,
            updated_at: media.updated_at,
        })
        .await
        .unwrap();

        let path = media.file.path.as_str();
        assert!(tx
            .path_referenced(&[MediaFamily::PartnerLogo], false, path)
            .await
            .unwrap());
        assert!(!tx
            .path_referenced(&[MediaFamily::ItemImage], true, path)
            .await
            .unwrap());
        assert!(tx.path_referenced(&[], true, "pooled.jpg").await.unwrap());
        assert!(!tx.path_referenced(&[], false, "pooled.jpg").await.unwrap());
    }

    #[tokio::test]
    async fn test_list_pool_newest_first_with_paging() {
        let store = MemoryMediaStore::new();
        let base = Utc::now();
        for i in 0..3 {
            let at = base + chrono::Duration::seconds(i);
            store
                .insert_pooled(&PoolMedia {
                    id: Uuid::new_v4(),
                    file: MediaFile {
                        path: format!("p{}.jpg", i),
                        original_name: String::new(),
                        mime_type: "image/png".into(),
                        size: 3,
                    },
                    comment: None,
                    created_at: at,
                    updated_at: at,
                })
                .await
                .unwrap();
        }
        let page = store.list_pool(2, 0).await.unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].file.path, "p2.jpg");
        let rest = store.list_pool(2, 2).await.unwrap();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].file.path, "p0.jpg");
    }
}
