// src/config/mod.rs

//! Job descriptions.
//!
//! Responsibilities:
//! - Define the TOML-backed document model (`model.rs`).
//! - Load documents, following includes, into candidate trees (`loader.rs`).
//! - Validate the invariants the reconciler relies on (`validate.rs`).

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{JobLoader, LoadedJob, TomlJobLoader, DEFAULT_JOB_ID};
pub use model::{EngineSettings, JobDocument};
pub use validate::validate_tree;
