//! Filesystem storage gateway.
//!
//! Each named disk maps to a root directory. Object paths are relative to
//! that root and are rejected if they try to climb out of it.
//!
//! ## Example
//!
//! ```rust,ignore
//! use vitrine_db::FilesystemGateway;
//!
//! let gateway = FilesystemGateway::from_config(&config.storage);
//! gateway.write("public", "pictures/img.jpg", &bytes).await?;
//! let bytes = gateway.read("public", "pictures/img.jpg").await?;
//! ```

use std::collections::BTreeMap;
use std::path::PathBuf;

use async_trait::async_trait;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use vitrine_core::{models::validate_media_path, Error, Result, StorageConfig, StorageGateway};

/// [`StorageGateway`] over local directories.
#[derive(Debug, Clone)]
pub struct FilesystemGateway {
    disks: BTreeMap<String, PathBuf>,
}

impl FilesystemGateway {
    pub fn new(disks: BTreeMap<String, PathBuf>) -> Self {
        Self { disks }
    }

    pub fn from_config(config: &StorageConfig) -> Self {
        Self::new(config.disks.clone())
    }

    /// Add or replace a disk.
    pub fn with_disk(mut self, name: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        self.disks.insert(name.into(), root.into());
        self
    }

    fn full_path(&self, disk: &str, path: &str) -> Result<PathBuf> {
        let root = self
            .disks
            .get(disk)
            .ok_or_else(|| Error::Storage(format!("unknown disk '{}'", disk)))?;
        validate_media_path(path)?;
        Ok(root.join(path))
    }

    /// Round-trip a probe file on every disk.
    ///
    /// Run at startup to surface permission or mount problems before the
    /// first relocation needs the disk.
    pub async fn validate(&self) -> Result<()> {
        for disk in self.disks.keys() {
            let probe = ".health-check/probe.bin";
            let data = b"storage-health-check";
            self.write(disk, probe, data).await?;
            if self.read(disk, probe).await? != data {
                return Err(Error::Storage(format!("disk '{}': read-back mismatch", disk)));
            }
            self.delete(disk, probe).await?;
            if let Ok(dir) = self.full_path(disk, ".health-check") {
                let _ = fs::remove_dir(dir).await;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl StorageGateway for FilesystemGateway {
    async fn read(&self, disk: &str, path: &str) -> Result<Vec<u8>> {
        let full_path = self.full_path(disk, path)?;
        match fs::read(&full_path).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(Error::NotFound(format!("{}:{}", disk, path)))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn write(&self, disk: &str, path: &str, data: &[u8]) -> Result<()> {
        let full_path = self.full_path(disk, path)?;
        debug!(disk = %disk, path = %path, size = data.len(), "storage: write");

        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| {
                warn!(parent = %parent.display(), error = %e, "storage: create_dir_all failed");
                e
            })?;
        }

        // Temp file + rename so readers never see a partial object and a
        // rerun simply overwrites.
        let file_name = full_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| Error::InvalidInput(format!("path has no file name: {}", path)))?;
        let temp_path = full_path.with_file_name(format!(".{}.tmp", file_name));
        let mut file = fs::File::create(&temp_path).await?;
        file.write_all(data).await?;
        file.sync_all().await?;
        drop(file);

        fs::rename(&temp_path, &full_path).await.map_err(|e| {
            warn!(from = %temp_path.display(), to = %full_path.display(), error = %e, "storage: rename failed");
            e
        })?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&full_path, std::fs::Permissions::from_mode(0o644)).await?;
        }

        Ok(())
    }

    async fn delete(&self, disk: &str, path: &str) -> Result<()> {
        let full_path = self.full_path(disk, path)?;
        match fs::remove_file(&full_path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn exists(&self, disk: &str, path: &str) -> Result<bool> {
        let full_path = self.full_path(disk, path)?;
        Ok(fs::try_exists(full_path).await?)
    }
}
