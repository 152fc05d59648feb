//! # vitrine-core
//!
//! Core types, traits, and abstractions for vitrine, the ordered media
//! attachment manager.
//!
//! This crate provides the data model (pooled and attached media under one
//! identity), the store and storage gateway traits other crates implement,
//! and configuration.
//!
//! ## Log Level Contract
//!
//! Every crate logs through `tracing` with the structured fields
//! `subsystem`, `component`, `op`, `media_id`, `family`, `owner_id`.
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Degraded service, requires operator attention |
//! | WARN  | Recoverable issue: relocation leftovers, reconcile repairs |
//! | INFO  | Lifecycle events, completed mutations |
//! | DEBUG | Decision points, boundary no-ops, config choices |
//! | TRACE | Per-row iteration (tightening writes) |

pub mod config;
pub mod defaults;
pub mod error;
pub mod models;
pub mod traits;
pub mod uuid_utils;

// Re-export commonly used types at crate root
pub use config::{StorageConfig, StorageLocation, VitrineConfig};
pub use error::{Error, Result};
pub use models::*;
pub use traits::*;
pub use uuid_utils::new_v7;
