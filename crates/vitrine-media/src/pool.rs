//! The unattached media pool.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use vitrine_core::{
    new_v7, Error, MediaContent, MediaStore, NewMedia, PoolMedia, Result, StorageConfig,
    StorageGateway,
};

#[derive(Clone)]
pub struct MediaPool {
    store: Arc<dyn MediaStore>,
    files: Arc<dyn StorageGateway>,
    storage: StorageConfig,
}

impl MediaPool {
    pub fn new(
        store: Arc<dyn MediaStore>,
        files: Arc<dyn StorageGateway>,
        storage: StorageConfig,
    ) -> Self {
        Self {
            store,
            files,
            storage,
        }
    }

    /// Register a file already written under the pool root.
    pub async fn upload(&self, attrs: NewMedia) -> Result<PoolMedia> {
        attrs.validate()?;
        let (file, comment) = attrs.into_file();
        let now = Utc::now();
        let media = PoolMedia {
            id: new_v7(),
            file,
            comment,
            created_at: now,
            updated_at: now,
        };

        let mut tx = self.store.begin().await?;
        tx.insert_pooled(&media).await?;
        tx.commit().await?;

        info!(
            subsystem = "media",
            component = "pool",
            op = "upload",
            media_id = %media.id,
            path = %media.file.path,
            "Pool media created"
        );
        Ok(media)
    }

    /// Pool items, newest first. Negative paging values count as 0.
    pub async fn list(&self, limit: i64, offset: i64) -> Result<Vec<PoolMedia>> {
        self.store.list_pool(limit.max(0), offset.max(0)).await
    }

    pub async fn get(&self, id: Uuid) -> Result<PoolMedia> {
        self.store
            .find_pooled(id)
            .await?
            .ok_or(Error::PoolMediaNotFound(id))
    }

    /// Delete a pool item and its file. `false` if it was already gone.
    ///
    /// The file stays while an attached row served from the pool root still
    /// refers to it.
    pub async fn destroy(&self, id: Uuid) -> Result<bool> {
        let location = self.storage.pool_location();
        let mut tx = self.store.begin().await?;
        let Some(media) = tx.lock_pooled(id).await? else {
            return Ok(false);
        };
        tx.delete_pooled(id).await?;
        let shared = tx
            .path_referenced(&self.storage.families_at(location), true, &media.file.path)
            .await?;
        tx.commit().await?;

        let path = location.object_path(&media.file.path);
        if shared {
            debug!(media_id = %id, disk = %location.disk, path = %path, "Pool file still referenced, kept");
        } else if let Err(e) = self.files.delete(&location.disk, &path).await {
            warn!(media_id = %id, disk = %location.disk, path = %path, error = %e, "Pool file not removed");
        }

        info!(
            subsystem = "media",
            component = "pool",
            op = "destroy",
            media_id = %id,
            "Pool media deleted"
        );
        Ok(true)
    }

    /// Bytes of a pool item, offered as an attachment.
    pub async fn download(&self, id: Uuid) -> Result<MediaContent> {
        let media = self.get(id).await?;
        let location = self.storage.pool_location();
        let data = self
            .files
            .read(&location.disk, &location.object_path(&media.file.path))
            .await?;
        Ok(MediaContent {
            data,
            filename: Some(media.file.download_name()),
            mime_type: media.file.mime_type,
        })
    }
}
