//! Error types for `remtree-core`.
//!
//! Remote failures are carried by [`RemoteError`], which is `Clone` so a
//! single failed fetch can be handed to every caller awaiting it. Everything
//! else returns [`CoreResult<T>`].

use std::path::PathBuf;

pub use crate::remote::RemoteError;

/// Unified error type for core operations that are not pure remote calls.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// The target path does not exist.
    #[error("path not found: {0}")]
    NotFound(PathBuf),

    /// The process lacks permission to access the path.
    #[error("permission denied: {0}")]
    PermissionDenied(PathBuf),

    /// Failed to parse a TOML file.
    #[error("config parse error: {0}")]
    ConfigParse(String),

    /// A remote (SSH/SFTP) operation failed.
    #[error(transparent)]
    Remote(#[from] RemoteError),

    /// An I/O error that doesn't fit a more specific variant.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Convenience alias used throughout `remtree-core`.
pub type CoreResult<T> = Result<T, CoreError>;
