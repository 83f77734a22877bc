//! Durable client storage for the Quill session layer.
//!
//! This crate provides:
//! - [`DurableStorage`], the key/value seam the session layer persists through
//! - [`FileStorage`], a JSON file backend for real clients
//! - [`MemoryStorage`], a process-local backend for tests and ephemeral sessions
//! - [`ClientStore`], typed accessors for every persisted session artefact

mod client_store;
mod file;
mod keys;
mod memory;
mod traits;

pub use client_store::{ClientStore, PersistedAuthRecord, SessionLifetimes};
pub use file::FileStorage;
pub use keys::StorageKeys;
pub use memory::MemoryStorage;
pub use traits::DurableStorage;

use thiserror::Error;

/// Error type for storage operations.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Backend-specific failure
    #[error("Storage backend error: {0}")]
    Backend(String),

    /// Encoding/decoding error
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
