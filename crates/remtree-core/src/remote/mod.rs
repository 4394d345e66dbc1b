//! Remote filesystem access.
//!
//! [`RemoteAccess`] is the seam between the tree engine and whatever
//! transport reaches the remote host. [`sftp::SftpRemote`] is the shipped
//! implementation; tests use the in-memory `testing::MockRemote`.

pub mod sftp;

#[cfg(test)]
pub mod testing;

use async_trait::async_trait;

use crate::fs::entry::FileEntry;

/// Errors reported by a [`RemoteAccess`] implementation.
///
/// Cloneable so the directory cache can fan one failure out to every
/// deduplicated awaiter unchanged.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RemoteError {
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    #[error("authentication failed: {0}")]
    AuthFailed(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("command failed ({status}): {message}")]
    CommandFailed { status: u32, message: String },

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("unknown connection: {0}")]
    UnknownConnection(String),

    #[error("operation aborted: {0}")]
    Aborted(String),

    #[error("session disconnected")]
    Disconnected,
}

impl RemoteError {
    /// Returns `true` for access-denied failures.
    pub fn is_permission_denied(&self) -> bool {
        matches!(self, Self::PermissionDenied(_))
    }
}

/// Which kinds of entries a [`RemoteAccess::search`] should return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EntryKind {
    Files,
    Directories,
    #[default]
    Any,
}

/// Options for a recursive remote search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchOptions {
    /// Match file contents instead of names.
    pub content_search: bool,
    pub case_sensitive: bool,
    pub max_results: usize,
    pub entry_kind: EntryKind,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            content_search: false,
            case_sensitive: false,
            max_results: 500,
            entry_kind: EntryKind::Any,
        }
    }
}

/// A single hit from a remote search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchMatch {
    pub path: String,
    pub is_dir: bool,
}

/// Async capability for one remote connection.
#[async_trait]
pub trait RemoteAccess: Send + Sync {
    /// Lists the entries of `path`, excluding `.` and `..`.
    async fn list_directory(&self, path: &str) -> Result<Vec<FileEntry>, RemoteError>;

    async fn read_file(&self, path: &str) -> Result<Vec<u8>, RemoteError>;

    async fn write_file(&self, path: &str, data: &[u8]) -> Result<(), RemoteError>;

    /// Runs `command` on the remote host and returns its standard output.
    async fn exec(&self, command: &str) -> Result<String, RemoteError>;

    /// Recursively searches below `base` for entries matching `pattern`.
    async fn search(
        &self,
        base: &str,
        pattern: &str,
        options: &SearchOptions,
    ) -> Result<Vec<SearchMatch>, RemoteError>;
}
