//! # vitrine-media
//!
//! Ordered media services for vitrine.
//!
//! This crate provides:
//! - [`ReorderService`]: move up, move down, move to a position, tighten
//! - [`AttachmentService`]: identity-preserving transfer between the pool
//!   and an owner's list, with file relocation for families that need it
//! - [`FileRelocator`]: staged copy-commit-delete moves and repair
//! - [`MediaPool`]: unattached uploads
//! - [`MediaCollection`] / [`MediaLibrary`]: per-family entry points
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use vitrine_db::{Database, FilesystemGateway, MediaFamily, VitrineConfig};
//! use vitrine_media::MediaLibrary;
//!
//! let config = VitrineConfig::from_env()?;
//! let db = Database::from_config(&config).await?;
//! let library = MediaLibrary::new(
//!     Arc::new(db.media.clone()),
//!     Arc::new(FilesystemGateway::from_config(&config.storage)),
//!     config.storage.clone(),
//! );
//! let images = library.collection(MediaFamily::ItemImage);
//! images.move_up(media_id).await?;
//! ```

pub mod attachment;
pub mod facade;
pub mod pool;
pub mod relocation;
pub mod reorder;

pub use attachment::AttachmentService;
pub use facade::{MediaCollection, MediaLibrary};
pub use pool::MediaPool;
pub use relocation::{FileRelocator, PendingMove, ReconcileOutcome};
pub use reorder::{tighten_locked, Direction, ReorderService};
