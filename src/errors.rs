// src/errors.rs

//! Crate-wide error aliases and helpers.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum JobTreeError {
    /// The loader could not produce a valid candidate tree.
    #[error("Document error: {0}")]
    Document(String),

    /// An active path has no counterpart in the candidate tree.
    #[error("Consistency error: active node '{path}' has no candidate counterpart")]
    Consistency { path: String },

    #[error("Expression error: {0}")]
    Expression(String),

    #[error("Plugin error: {0}")]
    Plugin(String),

    #[error("Node not found: {0}")]
    NodeNotFound(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl JobTreeError {
    pub fn document(msg: impl Into<String>) -> Self {
        JobTreeError::Document(msg.into())
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, JobTreeError>;
