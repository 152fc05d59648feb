//! Per-family entry points.
//!
//! [`MediaCollection`] is the single generic component behind all five
//! attached media families: the family only decides which table rows live
//! in and which storage root serves their bytes. [`MediaLibrary`] wires one
//! collection per family plus the pool over shared backends.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use vitrine_core::{
    new_v7, AttachedMedia, Error, MediaContent, MediaFamily, MediaRecord, MediaStore, NewMedia,
    OwnerScope, PoolMedia, Result, StorageConfig, StorageGateway,
};

use crate::attachment::AttachmentService;
use crate::pool::MediaPool;
use crate::relocation::{FileRelocator, ReconcileOutcome};
use crate::reorder::{tighten_locked, ReorderService};

/// Ordered media of one family, keyed by owner.
#[derive(Clone)]
pub struct MediaCollection {
    family: MediaFamily,
    store: Arc<dyn MediaStore>,
    files: Arc<dyn StorageGateway>,
    storage: StorageConfig,
    reorder: ReorderService,
    attachment: AttachmentService,
    relocator: FileRelocator,
}

impl MediaCollection {
    pub fn new(
        family: MediaFamily,
        store: Arc<dyn MediaStore>,
        files: Arc<dyn StorageGateway>,
        storage: StorageConfig,
    ) -> Self {
        let relocator = FileRelocator::new(files.clone());
        Self {
            family,
            reorder: ReorderService::new(store.clone()),
            attachment: AttachmentService::new(store.clone(), relocator.clone(), storage.clone()),
            relocator,
            store,
            files,
            storage,
        }
    }

    pub fn family(&self) -> MediaFamily {
        self.family
    }

    fn scope(&self, owner_id: Uuid) -> OwnerScope {
        OwnerScope::new(self.family, owner_id)
    }

    /// An owner's media in display order.
    pub async fn list(&self, owner_id: Uuid) -> Result<Vec<AttachedMedia>> {
        self.store.list_by_owner(self.scope(owner_id)).await
    }

    pub async fn get(&self, id: Uuid) -> Result<AttachedMedia> {
        self.store
            .find_attached(self.family, id)
            .await?
            .ok_or(Error::MediaNotFound(id))
    }

    /// Whichever representation currently holds `id`.
    ///
    /// Both lookups run in one transaction with row locks, so a concurrent
    /// attach or detach of the same id cannot slip between them.
    pub async fn locate(&self, id: Uuid) -> Result<MediaRecord> {
        let mut tx = self.store.begin().await?;
        if let Some(attached) = tx.lock_attached(self.family, id).await? {
            return Ok(attached.into());
        }
        if let Some(pooled) = tx.lock_pooled(id).await? {
            return Ok(pooled.into());
        }
        Err(Error::MediaNotFound(id))
    }

    /// Create an attached row at the end of the owner's list for a file
    /// already written to this family's storage root.
    pub async fn store(&self, owner_id: Uuid, attrs: NewMedia) -> Result<AttachedMedia> {
        attrs.validate()?;
        let scope = self.scope(owner_id);
        let (file, alt_text) = attrs.into_file();

        let mut tx = self.store.begin().await?;
        tx.lock_owner(scope).await?;
        let display_order = tx.next_order(scope).await?;
        let now = Utc::now();
        let media = AttachedMedia {
            id: new_v7(),
            family: self.family,
            owner_id,
            file,
            alt_text,
            display_order,
            created_at: now,
            updated_at: now,
        };
        tx.insert_attached(&media).await?;
        tx.commit().await?;

        info!(
            subsystem = "media",
            component = "collection",
            op = "store",
            media_id = %media.id,
            family = %self.family,
            owner_id = %owner_id,
            display_order,
            "Media stored"
        );
        Ok(media)
    }

    pub async fn attach_from_pool(
        &self,
        owner_id: Uuid,
        pool_id: Uuid,
        alt_text: Option<String>,
    ) -> Result<AttachedMedia> {
        self.attachment
            .attach_from_pool(self.scope(owner_id), pool_id, alt_text)
            .await
    }

    pub async fn detach_to_pool(&self, id: Uuid) -> Result<PoolMedia> {
        self.attachment.detach_to_pool(self.family, id).await
    }

    pub async fn move_up(&self, id: Uuid) -> Result<bool> {
        self.reorder.move_up(self.family, id).await
    }

    pub async fn move_down(&self, id: Uuid) -> Result<bool> {
        self.reorder.move_down(self.family, id).await
    }

    pub async fn move_to_position(&self, id: Uuid, position: i32) -> Result<bool> {
        self.reorder
            .move_to_position(self.family, id, position)
            .await
    }

    /// Tighten the list `id` belongs to.
    pub async fn tighten_ordering(&self, id: Uuid) -> Result<u64> {
        self.reorder.tighten_from(self.family, id).await
    }

    /// Tighten an owner's list directly.
    pub async fn retighten(&self, owner_id: Uuid) -> Result<u64> {
        self.reorder.tighten(self.scope(owner_id)).await
    }

    pub async fn update_alt_text(&self, id: Uuid, alt_text: Option<String>) -> Result<AttachedMedia> {
        let mut tx = self.store.begin().await?;
        let mut media = tx
            .lock_attached(self.family, id)
            .await?
            .ok_or(Error::MediaNotFound(id))?;
        tx.update_alt_text(self.family, id, alt_text.as_deref())
            .await?;
        tx.commit().await?;

        media.alt_text = alt_text;
        media.updated_at = Utc::now();
        debug!(media_id = %id, family = %self.family, "Alt text updated");
        Ok(media)
    }

    /// Delete an attached row and close the gap it leaves.
    ///
    /// `false` when the row is already gone. The stored file is removed
    /// after commit unless another attached or pooled row served from the
    /// same location still refers to it. Failing to remove it is logged,
    /// not returned.
    pub async fn destroy(&self, id: Uuid) -> Result<bool> {
        let start = Instant::now();
        let Some(found) = self.store.find_attached(self.family, id).await? else {
            debug!(op = "destroy", media_id = %id, family = %self.family, "Already gone");
            return Ok(false);
        };
        let scope = found.scope();
        let location = self.storage.attached_location(self.family);

        let mut tx = self.store.begin().await?;
        tx.lock_owner(scope).await?;
        let Some(media) = tx.lock_attached(self.family, id).await? else {
            return Ok(false);
        };
        tx.delete_attached(self.family, id).await?;
        let tightened = tighten_locked(tx.as_mut(), scope).await?;
        let shared = tx
            .path_referenced(
                &self.storage.families_at(location),
                self.storage.pool_location() == location,
                &media.file.path,
            )
            .await?;
        tx.commit().await?;

        let path = location.object_path(&media.file.path);
        if shared {
            debug!(media_id = %id, disk = %location.disk, path = %path, "File still referenced, kept");
        } else if let Err(e) = self.files.delete(&location.disk, &path).await {
            warn!(
                media_id = %id,
                disk = %location.disk,
                path = %path,
                error = %e,
                "Media file not removed"
            );
        }

        info!(
            subsystem = "media",
            component = "collection",
            op = "destroy",
            media_id = %id,
            family = %self.family,
            owner_id = %scope.owner_id,
            rows_updated = tightened,
            duration_ms = start.elapsed().as_millis() as u64,
            "Media deleted"
        );
        Ok(true)
    }

    /// Bytes with a download filename.
    pub async fn download(&self, id: Uuid) -> Result<MediaContent> {
        let media = self.get(id).await?;
        let filename = media.file.download_name();
        let mut content = self.read(media).await?;
        content.filename = Some(filename);
        Ok(content)
    }

    /// Bytes for inline display.
    pub async fn view(&self, id: Uuid) -> Result<MediaContent> {
        let media = self.get(id).await?;
        self.read(media).await
    }

    async fn read(&self, media: AttachedMedia) -> Result<MediaContent> {
        let location = self.storage.attached_location(self.family);
        let data = self
            .files
            .read(&location.disk, &location.object_path(&media.file.path))
            .await?;
        Ok(MediaContent {
            data,
            filename: None,
            mime_type: media.file.mime_type,
        })
    }

    /// Put the bytes of `id` in the root its current representation reads
    /// from, clearing any copy left in the other root.
    pub async fn reconcile_file(&self, id: Uuid) -> Result<ReconcileOutcome> {
        let record = self.locate(id).await?;
        let attached = self.storage.attached_location(self.family);
        let pool = self.storage.pool_location();
        let (expected, stale) = if record.is_pooled() {
            (pool, attached)
        } else {
            (attached, pool)
        };
        self.relocator
            .reconcile(id, expected, stale, &record.file.path)
            .await
    }
}

/// One [`MediaCollection`] per family plus the pool.
#[derive(Clone)]
pub struct MediaLibrary {
    collections: Vec<MediaCollection>,
    pool: MediaPool,
}

impl MediaLibrary {
    pub fn new(
        store: Arc<dyn MediaStore>,
        files: Arc<dyn StorageGateway>,
        storage: StorageConfig,
    ) -> Self {
        let collections = MediaFamily::ALL
            .iter()
            .map(|family| {
                MediaCollection::new(*family, store.clone(), files.clone(), storage.clone())
            })
            .collect();
        Self {
            collections,
            pool: MediaPool::new(store, files, storage),
        }
    }

    pub fn collection(&self, family: MediaFamily) -> &MediaCollection {
        let index = MediaFamily::ALL
            .iter()
            .position(|f| *f == family)
            .unwrap_or_default();
        &self.collections[index]
    }

    pub fn pool(&self) -> &MediaPool {
        &self.pool
    }
}
