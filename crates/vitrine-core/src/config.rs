//! Environment-driven configuration.
//!
//! | Variable | Default |
//! |----------|---------|
//! | `DATABASE_URL` | [`defaults::DATABASE_URL`] |
//! | `DATABASE_MAX_CONNECTIONS` | [`defaults::DATABASE_MAX_CONNECTIONS`] |
//! | `STORAGE_DISKS` | [`defaults::STORAGE_DISKS`] (`name=/root,name=/root`) |
//! | `LOCAL_STORAGE_IMAGE_DISK` | [`defaults::POOL_DISK`] |
//! | `LOCAL_STORAGE_IMAGE_DIRECTORY` | [`defaults::POOL_DIRECTORY`] |
//! | `LOCAL_STORAGE_PICTURES_DISK` | [`defaults::ATTACHED_DISK`] |
//! | `LOCAL_STORAGE_PICTURES_DIRECTORY` | [`defaults::ATTACHED_DIRECTORY`] |

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::defaults;
use crate::error::{Error, Result};
use crate::models::MediaFamily;

/// A disk plus a directory prefix on it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageLocation {
    pub disk: String,
    pub directory: String,
}

impl StorageLocation {
    pub fn new(disk: impl Into<String>, directory: impl Into<String>) -> Self {
        Self {
            disk: disk.into(),
            directory: directory.into().trim_matches('/').to_string(),
        }
    }

    /// Object path of `filename` under this location's directory.
    pub fn object_path(&self, filename: &str) -> String {
        let filename = filename.trim_start_matches('/');
        if self.directory.is_empty() {
            filename.to_string()
        } else {
            format!("{}/{}", self.directory, filename)
        }
    }
}

/// Where pooled and attached bytes live.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Disk name → root directory.
    pub disks: BTreeMap<String, PathBuf>,
    pub pool: StorageLocation,
    pub attached: StorageLocation,
}

impl StorageConfig {
    /// Location serving the attached rows of `family`.
    pub fn attached_location(&self, family: MediaFamily) -> &StorageLocation {
        if family.relocates_files() {
            &self.attached
        } else {
            &self.pool
        }
    }

    /// Location serving pooled rows.
    pub fn pool_location(&self) -> &StorageLocation {
        &self.pool
    }

    /// Families whose attached rows are served from `location`.
    pub fn families_at(&self, location: &StorageLocation) -> Vec<MediaFamily> {
        MediaFamily::ALL
            .into_iter()
            .filter(|family| self.attached_location(*family) == location)
            .collect()
    }
}

/// Full runtime configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VitrineConfig {
    pub database_url: String,
    pub max_connections: u32,
    pub storage: StorageConfig,
}

impl VitrineConfig {
    /// Read configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let max_connections = match lookup("DATABASE_MAX_CONNECTIONS") {
            Some(raw) => raw.trim().parse::<u32>().map_err(|_| {
                Error::Config(format!("DATABASE_MAX_CONNECTIONS is not a number: {}", raw))
            })?,
            None => defaults::DATABASE_MAX_CONNECTIONS,
        };

        let disks = parse_disks(&get("STORAGE_DISKS", defaults::STORAGE_DISKS))?;
        let pool = StorageLocation::new(
            get("LOCAL_STORAGE_IMAGE_DISK", defaults::POOL_DISK),
            get("LOCAL_STORAGE_IMAGE_DIRECTORY", defaults::POOL_DIRECTORY),
        );
        let attached = StorageLocation::new(
            get("LOCAL_STORAGE_PICTURES_DISK", defaults::ATTACHED_DISK),
            get("LOCAL_STORAGE_PICTURES_DIRECTORY", defaults::ATTACHED_DIRECTORY),
        );

        for location in [&pool, &attached] {
            if !disks.contains_key(&location.disk) {
                return Err(Error::Config(format!(
                    "disk '{}' has no root in STORAGE_DISKS",
                    location.disk
                )));
            }
        }

        debug!(
            disks = disks.len(),
            pool_disk = %pool.disk,
            pool_directory = %pool.directory,
            attached_disk = %attached.disk,
            attached_directory = %attached.directory,
            "Storage configuration resolved"
        );

        Ok(Self {
            database_url: get("DATABASE_URL", defaults::DATABASE_URL),
            max_connections,
            storage: StorageConfig {
                disks,
                pool,
                attached,
            },
        })
    }
}

/// Parse `name=/root,name=/root` into a disk map.
pub fn parse_disks(raw: &str) -> Result<BTreeMap<String, PathBuf>> {
    let mut disks = BTreeMap::new();
    for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let (name, root) = entry
            .split_once('=')
            .ok_or_else(|| Error::Config(format!("disk entry '{}' is not name=root", entry)))?;
        let (name, root) = (name.trim(), root.trim());
        if name.is_empty() || root.is_empty() {
            return Err(Error::Config(format!(
                "disk entry '{}' has an empty name or root",
                entry
            )));
        }
        disks.insert(name.to_string(), PathBuf::from(root));
    }
    if disks.is_empty() {
        return Err(Error::Config("no storage disks configured".to_string()));
    }
    Ok(disks)
}
