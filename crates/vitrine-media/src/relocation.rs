//! Moving file bytes between storage roots.
//!
//! A relocation is staged around the database transaction that changes the
//! row's representation:
//!
//! 1. [`FileRelocator::stage`] copies the bytes to the destination before
//!    commit. Overwriting is safe, so a retry just rewrites the copy.
//! 2. The caller commits.
//! 3. [`FileRelocator::finish`] removes the source. Failure here leaves a
//!    duplicate behind and is logged at WARN, never returned.
//!
//! If the caller aborts between 1 and 2, [`FileRelocator::abort`] drops the
//! staged copy. [`FileRelocator::reconcile`] repairs whatever a crash left
//! behind.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use vitrine_core::{Error, Result, StorageGateway, StorageLocation};

/// A copy written to the destination whose source still has to go.
#[derive(Debug, Clone)]
pub struct PendingMove {
    pub media_id: Uuid,
    pub source: StorageLocation,
    pub destination: StorageLocation,
    pub filename: String,
    /// `false` when the source was already gone at staging time (an earlier
    /// run got past its commit). The staged copy is then the only copy.
    source_present: bool,
    /// The destination held the file before staging wrote it.
    destination_preexisting: bool,
}

/// Result of [`FileRelocator::reconcile`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconcileOutcome {
    /// Bytes are where they belong and nothing is left elsewhere.
    InPlace,
    /// Bytes were only in the stale root; copied over and the stale copy removed.
    Copied,
    /// Bytes were in both roots; the stale copy was removed.
    StaleRemoved,
    /// Bytes are in neither root.
    Missing,
}

#[derive(Clone)]
pub struct FileRelocator {
    storage: Arc<dyn StorageGateway>,
}

impl FileRelocator {
    pub fn new(storage: Arc<dyn StorageGateway>) -> Self {
        Self { storage }
    }

    /// Copy `filename` from `source` to `destination`.
    ///
    /// Returns `None` when both locations are the same. A missing source is
    /// accepted only if the destination already holds the file.
    pub async fn stage(
        &self,
        media_id: Uuid,
        source: &StorageLocation,
        destination: &StorageLocation,
        filename: &str,
    ) -> Result<Option<PendingMove>> {
        if source == destination {
            return Ok(None);
        }
        let from = source.object_path(filename);
        let to = destination.object_path(filename);
        let destination_preexisting = self.storage.exists(&destination.disk, &to).await?;

        let source_present = match self.storage.read(&source.disk, &from).await {
            Ok(data) => {
                self.storage.write(&destination.disk, &to, &data).await?;
                debug!(
                    media_id = %media_id,
                    disk = %destination.disk,
                    path = %to,
                    size = data.len(),
                    "relocation: destination written"
                );
                true
            }
            Err(e) if e.is_not_found() => {
                if !destination_preexisting {
                    return Err(Error::Storage(format!(
                        "media {}: file '{}' is in neither {}:{} nor {}:{}",
                        media_id, filename, source.disk, from, destination.disk, to
                    )));
                }
                warn!(
                    media_id = %media_id,
                    disk = %destination.disk,
                    path = %to,
                    "relocation: source already gone, destination holds the file"
                );
                false
            }
            Err(e) => return Err(e),
        };

        Ok(Some(PendingMove {
            media_id,
            source: source.clone(),
            destination: destination.clone(),
            filename: filename.to_string(),
            source_present,
            destination_preexisting,
        }))
    }

    /// Remove the source after the database commit.
    pub async fn finish(&self, pending: PendingMove) {
        if !pending.source_present {
            return;
        }
        let path = pending.source.object_path(&pending.filename);
        match self.storage.delete(&pending.source.disk, &path).await {
            Ok(()) => debug!(
                media_id = %pending.media_id,
                disk = %pending.source.disk,
                path = %path,
                "relocation: source removed"
            ),
            Err(e) => warn!(
                media_id = %pending.media_id,
                disk = %pending.source.disk,
                path = %path,
                error = %e,
                "relocation: source left behind, run reconcile"
            ),
        }
    }

    /// Drop the staged copy after a failed commit. The source is untouched,
    /// and so is a destination file that was there before staging.
    pub async fn abort(&self, pending: PendingMove) {
        // Also covers a missing source: staging then required the destination.
        if pending.destination_preexisting {
            debug!(
                media_id = %pending.media_id,
                disk = %pending.destination.disk,
                "relocation: destination predates staging, kept"
            );
            return;
        }
        let path = pending.destination.object_path(&pending.filename);
        if let Err(e) = self.storage.delete(&pending.destination.disk, &path).await {
            warn!(
                media_id = %pending.media_id,
                disk = %pending.destination.disk,
                path = %path,
                error = %e,
                "relocation: staged copy left behind"
            );
        }
    }

    /// Make `expected` the only root holding `filename`.
    ///
    /// Safe to run any number of times.
    pub async fn reconcile(
        &self,
        media_id: Uuid,
        expected: &StorageLocation,
        stale: &StorageLocation,
        filename: &str,
    ) -> Result<ReconcileOutcome> {
        let expected_path = expected.object_path(filename);
        let in_expected = self.storage.exists(&expected.disk, &expected_path).await?;
        if expected == stale {
            return Ok(if in_expected {
                ReconcileOutcome::InPlace
            } else {
                ReconcileOutcome::Missing
            });
        }

        let stale_path = stale.object_path(filename);
        let in_stale = self.storage.exists(&stale.disk, &stale_path).await?;

        let outcome = match (in_expected, in_stale) {
            (true, false) => return Ok(ReconcileOutcome::InPlace),
            (false, false) => {
                warn!(
                    media_id = %media_id,
                    disk = %expected.disk,
                    path = %expected_path,
                    "reconcile: file missing from both roots"
                );
                return Ok(ReconcileOutcome::Missing);
            }
            (false, true) => {
                let data = self.storage.read(&stale.disk, &stale_path).await?;
                self.storage
                    .write(&expected.disk, &expected_path, &data)
                    .await?;
                ReconcileOutcome::Copied
            }
            (true, true) => ReconcileOutcome::StaleRemoved,
        };

        self.storage.delete(&stale.disk, &stale_path).await?;
        info!(
            subsystem = "media",
            component = "relocation",
            op = "reconcile",
            media_id = %media_id,
            disk = %expected.disk,
            path = %expected_path,
            outcome = ?outcome,
            "File reconciled"
        );
        Ok(outcome)
    }
}
