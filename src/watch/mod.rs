// src/watch/mod.rs

//! Job document watching.
//!
//! This module is responsible for:
//! - Wiring up a cross-platform filesystem watcher (`notify`) on the
//!   directories holding the loaded job documents.
//! - Content hashing, so a save that leaves a document unchanged does not
//!   cause a reload.
//! - Mapping a changed document to the job lists it defines and requesting
//!   a reload of each.
//!
//! It does **not** reconcile anything itself; it only turns document
//! changes into [`EngineEvent::ReloadRequested`](crate::engine::EngineEvent).

pub mod event_handler;
pub mod hash;
pub mod watcher;

pub use event_handler::{document_dirs, jobs_for_document, loaded_documents};
pub use hash::{compute_document_hash, DocumentHashes};
pub use watcher::{spawn_watcher, WatcherHandle};
