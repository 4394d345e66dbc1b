//! Remote file entry representation.

use std::time::SystemTime;

use unicode_normalization::UnicodeNormalization;

use crate::connection::ConnectionId;
use crate::fs::path;

/// A single file or directory on a remote connection.
///
/// `FileEntry` is an immutable snapshot value created by a
/// [`RemoteAccess`](crate::remote::RemoteAccess) listing. The optional
/// metadata is attached with the consuming `with_*` methods. Directory sizes
/// are reported as `0`.
///
/// # Examples
///
/// ```
/// use remtree_core::{ConnectionId, FileEntry};
///
/// let entry = FileEntry::new(ConnectionId::from("prod"), "/var/log/app.log", false)
///     .with_size(2048);
/// assert_eq!(entry.name(), "app.log");
/// assert_eq!(entry.size(), 2048);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    connection: ConnectionId,
    path: String,
    name: String,
    size: u64,
    modified: Option<SystemTime>,
    accessed: Option<SystemTime>,
    owner: Option<String>,
    group: Option<String>,
    permissions: Option<u32>,
    is_dir: bool,
    is_hidden: bool,
    is_symlink: bool,
}

impl FileEntry {
    /// Creates an entry for `path` on `connection`.
    ///
    /// The name is the NFC-normalised last path component; hidden entries
    /// are detected by a leading `.`.
    pub fn new(connection: ConnectionId, path: impl Into<String>, is_dir: bool) -> Self {
        let path = path::normalize(&path.into());
        let name: String = path::file_name(&path).nfc().collect();
        let is_hidden = name.starts_with('.');
        Self {
            connection,
            path,
            name,
            size: 0,
            modified: None,
            accessed: None,
            owner: None,
            group: None,
            permissions: None,
            is_dir,
            is_hidden,
            is_symlink: false,
        }
    }

    /// Sets the size. Ignored for directories.
    pub fn with_size(self, size: u64) -> Self {
        Self {
            size: if self.is_dir { 0 } else { size },
            ..self
        }
    }

    pub fn with_modified(self, modified: Option<SystemTime>) -> Self {
        Self { modified, ..self }
    }

    pub fn with_accessed(self, accessed: Option<SystemTime>) -> Self {
        Self { accessed, ..self }
    }

    pub fn with_ownership(self, owner: Option<String>, group: Option<String>) -> Self {
        Self {
            owner,
            group,
            ..self
        }
    }

    pub fn with_permissions(self, permissions: Option<u32>) -> Self {
        Self {
            permissions,
            ..self
        }
    }

    pub fn with_symlink(self, is_symlink: bool) -> Self {
        Self { is_symlink, ..self }
    }

    /// The connection this entry was listed from.
    pub fn connection(&self) -> &ConnectionId {
        &self.connection
    }

    /// Absolute remote path.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// File size in bytes. Always `0` for directories.
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn modified(&self) -> Option<SystemTime> {
        self.modified
    }

    pub fn accessed(&self) -> Option<SystemTime> {
        self.accessed
    }

    pub fn owner(&self) -> Option<&str> {
        self.owner.as_deref()
    }

    pub fn group(&self) -> Option<&str> {
        self.group.as_deref()
    }

    /// Unix permission bits, when the server reported them.
    pub fn permissions(&self) -> Option<u32> {
        self.permissions
    }

    pub fn is_dir(&self) -> bool {
        self.is_dir
    }

    /// Returns `true` if the name starts with `.`.
    pub fn is_hidden(&self) -> bool {
        self.is_hidden
    }

    pub fn is_symlink(&self) -> bool {
        self.is_symlink
    }
}

/// Sorts entries by case-insensitive name, optionally grouping directories
/// first. Returns a new `Vec`; the input is never mutated.
pub fn sort_entries(entries: &[FileEntry], dirs_first: bool) -> Vec<FileEntry> {
    let mut sorted = entries.to_vec();
    sorted.sort_by(|a, b| {
        if dirs_first {
            let dir_cmp = b.is_dir().cmp(&a.is_dir());
            if dir_cmp != std::cmp::Ordering::Equal {
                return dir_cmp;
            }
        }
        a.name().to_lowercase().cmp(&b.name().to_lowercase())
    });
    sorted
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conn() -> ConnectionId {
        ConnectionId::from("test")
    }

    #[test]
    fn entry_name_from_path() {
        let entry = FileEntry::new(conn(), "/srv/data/report.csv", false);
        assert_eq!(entry.name(), "report.csv");
        assert_eq!(entry.path(), "/srv/data/report.csv");
        assert_eq!(entry.connection().as_str(), "test");
        assert!(!entry.is_hidden());
    }

    #[test]
    fn entry_path_is_normalized() {
        let entry = FileEntry::new(conn(), "/srv//data/", true);
        assert_eq!(entry.path(), "/srv/data");
        assert_eq!(entry.name(), "data");
    }

    #[test]
    fn hidden_entry_detected() {
        let entry = FileEntry::new(conn(), "/home/kim/.env", false);
        assert!(entry.is_hidden());
    }

    #[test]
    fn directory_size_is_always_zero() {
        let entry = FileEntry::new(conn(), "/remote/docs", true).with_size(9999);
        assert_eq!(entry.size(), 0, "directory size should always be 0");
    }

    #[test]
    fn optional_metadata_attached() {
        let entry = FileEntry::new(conn(), "/etc/passwd", false)
            .with_size(1024)
            .with_ownership(Some("root".into()), Some("wheel".into()))
            .with_permissions(Some(0o644))
            .with_symlink(true);
        assert_eq!(entry.size(), 1024);
        assert_eq!(entry.owner(), Some("root"));
        assert_eq!(entry.group(), Some("wheel"));
        assert_eq!(entry.permissions(), Some(0o644));
        assert!(entry.is_symlink());
        assert!(entry.modified().is_none());
        assert!(entry.accessed().is_none());
    }

    #[test]
    fn unicode_name_is_composed() {
        let decomposed = "/data/\u{1100}\u{1161}.txt";
        let entry = FileEntry::new(conn(), decomposed, false);
        assert_eq!(entry.name(), "\u{AC00}.txt");
    }

    #[test]
    fn sort_dirs_first_case_insensitive() {
        let entries = vec![
            FileEntry::new(conn(), "/x/banana.txt", false),
            FileEntry::new(conn(), "/x/Zeta", true),
            FileEntry::new(conn(), "/x/Apple.txt", false),
            FileEntry::new(conn(), "/x/alpha", true),
        ];

        let sorted = sort_entries(&entries, true);
        let names: Vec<&str> = sorted.iter().map(|e| e.name()).collect();
        assert_eq!(names, vec!["alpha", "Zeta", "Apple.txt", "banana.txt"]);

        let sorted = sort_entries(&entries, false);
        let names: Vec<&str> = sorted.iter().map(|e| e.name()).collect();
        assert_eq!(names, vec!["alpha", "Apple.txt", "banana.txt", "Zeta"]);
    }
}
