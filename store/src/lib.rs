//! Named secret storage for provisioned TLS material.
//!
//! Every CA, certificate and key is kept as its own entry so each one can be
//! present, absent or replaced independently. Backends only need to answer
//! three questions: does an entry exist, what does it contain, and replace it
//! atomically.

use std::{fmt::Debug, path::PathBuf};

use thiserror::Error;

pub mod directory;
pub mod memory;
pub mod podman;

pub use directory::DirectoryStore;
pub use memory::MemoryStore;
pub use podman::PodmanSecretStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Secret {0} not found")]
    NotFound(String),

    #[error("Invalid secret name {0:?}")]
    InvalidName(String),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to run {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{command} exited with {status}: {stderr}")]
    Command {
        command: String,
        status: String,
        stderr: String,
    },
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

pub trait CertificateStore: Debug + Send + Sync {
    /// Whether an entry with this name exists.
    fn exists(&self, name: &str) -> Result<bool, StoreError>;

    /// Read the full content of an entry. Missing entries are
    /// [`StoreError::NotFound`].
    fn read(&self, name: &str) -> Result<Vec<u8>, StoreError>;

    /// Create the entry, or replace it if it already exists. Readers never
    /// observe a half-written value.
    fn put(&self, name: &str, data: &[u8]) -> Result<(), StoreError>;
}

/// Entry names are used as file names and command arguments, keep them to a
/// conservative character set.
pub(crate) fn check_name(name: &str) -> Result<(), StoreError> {
    let valid = !name.is_empty()
        && !name.starts_with('.')
        && !name.starts_with('-')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));

    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidName(name.to_string()))
    }
}
