//! Moving media between the pool and an owner's list.
//!
//! Both directions keep the media id: the row changes representation, not
//! identity. For families that keep attached files in their own storage
//! root the bytes follow the row, staged around the commit (see
//! [`relocation`](crate::relocation)).

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tracing::{debug, info};
use uuid::Uuid;

use vitrine_core::{
    AttachedMedia, Error, MediaFamily, MediaStore, MediaTransaction, OwnerScope, PoolMedia,
    Result, StorageConfig,
};

use crate::relocation::{FileRelocator, PendingMove};
use crate::reorder::tighten_locked;

#[derive(Clone)]
pub struct AttachmentService {
    store: Arc<dyn MediaStore>,
    relocator: FileRelocator,
    storage: StorageConfig,
}

impl AttachmentService {
    pub fn new(store: Arc<dyn MediaStore>, relocator: FileRelocator, storage: StorageConfig) -> Self {
        Self {
            store,
            relocator,
            storage,
        }
    }

    /// Attach pool item `pool_id` at the end of `scope`'s list.
    ///
    /// `alt_text` falls back to the pool item's comment. The pool row is
    /// gone once this returns.
    pub async fn attach_from_pool(
        &self,
        scope: OwnerScope,
        pool_id: Uuid,
        alt_text: Option<String>,
    ) -> Result<AttachedMedia> {
        let start = Instant::now();
        let mut tx = self.store.begin().await?;
        tx.lock_owner(scope).await?;

        let pooled = tx
            .lock_pooled(pool_id)
            .await?
            .ok_or(Error::PoolMediaNotFound(pool_id))?;
        let display_order = tx.next_order(scope).await?;
        debug!(media_id = %pool_id, owner_id = %scope.owner_id, display_order, "attach: next order");

        let attached = AttachedMedia {
            id: pooled.id,
            family: scope.family,
            owner_id: scope.owner_id,
            file: pooled.file.clone(),
            alt_text: alt_text.or(pooled.comment),
            display_order,
            created_at: pooled.created_at,
            updated_at: Utc::now(),
        };
        tx.insert_attached(&attached).await?;
        tx.delete_pooled(pool_id).await?;

        let pending = self
            .relocator
            .stage(
                attached.id,
                self.storage.pool_location(),
                self.storage.attached_location(scope.family),
                &attached.file.path,
            )
            .await?;
        self.commit_with(tx, pending).await?;

        info!(
            subsystem = "media",
            component = "attachment",
            op = "attach_from_pool",
            media_id = %attached.id,
            family = %scope.family,
            owner_id = %scope.owner_id,
            display_order,
            duration_ms = start.elapsed().as_millis() as u64,
            "Pool media attached"
        );
        Ok(attached)
    }

    /// Return attached row `id` to the pool and close the gap it leaves.
    ///
    /// The pool item's comment is the former alt text.
    pub async fn detach_to_pool(&self, family: MediaFamily, id: Uuid) -> Result<PoolMedia> {
        let start = Instant::now();
        let scope = self
            .store
            .find_attached(family, id)
            .await?
            .ok_or(Error::MediaNotFound(id))?
            .scope();

        let mut tx = self.store.begin().await?;
        tx.lock_owner(scope).await?;
        let attached = tx
            .lock_attached(family, id)
            .await?
            .ok_or(Error::MediaNotFound(id))?;

        let pooled = PoolMedia {
            id: attached.id,
            file: attached.file.clone(),
            comment: attached.alt_text.clone(),
            created_at: attached.created_at,
            updated_at: Utc::now(),
        };
        tx.delete_attached(family, id).await?;
        tx.insert_pooled(&pooled).await?;
        let tightened = tighten_locked(tx.as_mut(), scope).await?;

        let pending = self
            .relocator
            .stage(
                pooled.id,
                self.storage.attached_location(family),
                self.storage.pool_location(),
                &pooled.file.path,
            )
            .await?;
        self.commit_with(tx, pending).await?;

        info!(
            subsystem = "media",
            component = "attachment",
            op = "detach_to_pool",
            media_id = %id,
            family = %family,
            owner_id = %scope.owner_id,
            rows_updated = tightened,
            duration_ms = start.elapsed().as_millis() as u64,
            "Media returned to pool"
        );
        Ok(pooled)
    }

    async fn commit_with(
        &self,
        tx: Box<dyn MediaTransaction + '_>,
        pending: Option<PendingMove>,
    ) -> Result<()> {
        if let Err(e) = tx.commit().await {
            if let Some(pending) = pending {
                self.relocator.abort(pending).await;
            }
            return Err(e);
        }
        if let Some(pending) = pending {
            self.relocator.finish(pending).await;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use tempfile::TempDir;
    use vitrine_core::{MediaFile, StorageGateway, StorageLocation};
    use vitrine_db::{FilesystemGateway, MemoryMediaStore};

    struct Fixture {
        _dir: TempDir,
        store: MemoryMediaStore,
        gateway: FilesystemGateway,
        service: AttachmentService,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let mut disks = BTreeMap::new();
        disks.insert("public".to_string(), dir.path().join("public"));
        let storage = StorageConfig {
            disks: disks.clone(),
            pool: StorageLocation::new("public", "images"),
            attached: StorageLocation::new("public", "pictures"),
        };
        let store = MemoryMediaStore::new();
        let gateway = FilesystemGateway::new(disks);
        let service = AttachmentService::new(
            Arc::new(store.clone()),
            FileRelocator::new(Arc::new(gateway.clone())),
            storage,
        );
        Fixture {
            _dir: dir,
            store,
            gateway,
            service,
        }
    }

    async fn pool_item(f: &Fixture, path: &str, comment: Option<&str>) -> PoolMedia {
        let now = Utc::now();
        let media = PoolMedia {
            id: Uuid::now_v7(),
            file: MediaFile {
                path: path.to_string(),
                original_name: "holiday.jpg".to_string(),
                mime_type: "image/jpeg".to_string(),
                size: 5,
            },
            comment: comment.map(str::to_string),
            created_at: now,
            updated_at: now,
        };
        f.store.insert_pooled(&media).await.unwrap();
        f.gateway
            .write("public", &format!("images/{}", path), b"bytes")
            .await
            .unwrap();
        media
    }

    #[tokio::test]
    async fn test_attach_preserves_identity_and_falls_back_to_comment() {
        let f = fixture();
        let item = pool_item(&f, "img.jpg", Some("a view")).await;
        let scope = OwnerScope::new(MediaFamily::ItemImage, Uuid::new_v4());

        let attached = f
            .service
            .attach_from_pool(scope, item.id, None)
            .await
            .unwrap();
        assert_eq!(attached.id, item.id);
        assert_eq!(attached.display_order, 1);
        assert_eq!(attached.alt_text.as_deref(), Some("a view"));
        assert!(f.store.find_pooled(item.id).await.unwrap().is_none());
        // Item images share the pool root: no relocation.
        assert!(f.gateway.exists("public", "images/img.jpg").await.unwrap());
    }

    #[tokio::test]
    async fn test_attach_explicit_alt_text_wins() {
        let f = fixture();
        let item = pool_item(&f, "img.jpg", Some("comment")).await;
        let scope = OwnerScope::new(MediaFamily::PartnerLogo, Uuid::new_v4());
        let attached = f
            .service
            .attach_from_pool(scope, item.id, Some("logo".to_string()))
            .await
            .unwrap();
        assert_eq!(attached.alt_text.as_deref(), Some("logo"));
    }

    #[tokio::test]
    async fn test_attach_missing_pool_item() {
        let f = fixture();
        let scope = OwnerScope::new(MediaFamily::ItemImage, Uuid::new_v4());
        let err = f
            .service
            .attach_from_pool(scope, Uuid::new_v4(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::PoolMediaNotFound(_)));
        assert_eq!(f.store.attached_count().await, 0);
    }

    #[tokio::test]
    async fn test_relocating_family_moves_bytes_both_ways() {
        let f = fixture();
        let item = pool_item(&f, "flag.png", None).await;
        let scope = OwnerScope::new(MediaFamily::PartnerTranslationImage, Uuid::new_v4());

        f.service
            .attach_from_pool(scope, item.id, None)
            .await
            .unwrap();
        assert!(!f.gateway.exists("public", "images/flag.png").await.unwrap());
        assert!(f.gateway.exists("public", "pictures/flag.png").await.unwrap());

        f.service
            .detach_to_pool(scope.family, item.id)
            .await
            .unwrap();
        assert!(f.gateway.exists("public", "images/flag.png").await.unwrap());
        assert!(!f.gateway.exists("public", "pictures/flag.png").await.unwrap());
    }

    #[tokio::test]
    async fn test_relocation_failure_rolls_back() {
        let f = fixture();
        let now = Utc::now();
        let media = PoolMedia {
            id: Uuid::now_v7(),
            file: MediaFile {
                path: "ghost.png".to_string(),
                original_name: String::new(),
                mime_type: "image/png".to_string(),
                size: 0,
            },
            comment: None,
            created_at: now,
            updated_at: now,
        };
        f.store.insert_pooled(&media).await.unwrap();
        let scope = OwnerScope::new(MediaFamily::PartnerTranslationImage, Uuid::new_v4());

        let err = f
            .service
            .attach_from_pool(scope, media.id, None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Storage(_)));
        assert!(f.store.find_pooled(media.id).await.unwrap().is_some());
        assert_eq!(f.store.attached_count().await, 0);
    }

    #[tokio::test]
    async fn test_detach_retightens_former_owner() {
        let f = fixture();
        let scope = OwnerScope::new(MediaFamily::CollectionImage, Uuid::new_v4());
        let mut ids = Vec::new();
        for name in ["a.jpg", "b.jpg", "c.jpg"] {
            let item = pool_item(&f, name, None).await;
            f.service
                .attach_from_pool(scope, item.id, Some(name.to_string()))
                .await
                .unwrap();
            ids.push(item.id);
        }

        let pooled = f
            .service
            .detach_to_pool(scope.family, ids[0])
            .await
            .unwrap();
        assert_eq!(pooled.id, ids[0]);
        assert_eq!(pooled.comment.as_deref(), Some("a.jpg"));

        let orders: Vec<(Uuid, i32)> = f
            .store
            .list_by_owner(scope)
            .await
            .unwrap()
            .into_iter()
            .map(|m| (m.id, m.display_order))
            .collect();
        assert_eq!(orders, vec![(ids[1], 1), (ids[2], 2)]);
    }

    #[tokio::test]
    async fn test_detach_missing_is_not_found() {
        let f = fixture();
        let err = f
            .service
            .detach_to_pool(MediaFamily::ItemImage, Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::MediaNotFound(_)));
    }
}
