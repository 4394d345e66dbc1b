//! Per-connection navigation state.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use crate::connection::ConnectionId;
use crate::fs::path;
use crate::sync::lock;

/// Literal stand-in for an unresolved home directory.
pub const HOME_MARKER: &str = "~";

/// The directory a connection's tree is rooted at.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum CurrentPath {
    /// The login directory, resolved lazily.
    #[default]
    Home,
    Absolute(String),
}

/// A tree node that can be expanded: a connection's root node or one of
/// its directories.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ExpandKey {
    Connection(ConnectionId),
    Directory(ConnectionId, String),
}

impl ExpandKey {
    pub fn directory(connection: &ConnectionId, dir: &str) -> Self {
        Self::Directory(connection.clone(), path::normalize(dir))
    }

    pub fn connection(&self) -> &ConnectionId {
        match self {
            Self::Connection(c) | Self::Directory(c, _) => c,
        }
    }
}

#[derive(Debug, Default)]
struct Inner {
    current: HashMap<ConnectionId, CurrentPath>,
    homes: HashMap<ConnectionId, String>,
    expanded: HashSet<ExpandKey>,
    auto_expand: HashSet<ExpandKey>,
}

/// Current paths plus durable and one-shot expand state.
///
/// Durable expand state is set only by explicit user actions. The one-shot
/// auto-expand set is filled by a reveal and consumed by the next
/// materialization pass; it never touches the durable set.
#[derive(Debug, Default)]
pub struct NavigationState {
    inner: Mutex<Inner>,
}

impl NavigationState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self, connection: &ConnectionId) -> CurrentPath {
        lock(&self.inner)
            .current
            .get(connection)
            .cloned()
            .unwrap_or_default()
    }

    pub fn set_current(&self, connection: &ConnectionId, current: CurrentPath) {
        let current = match current {
            CurrentPath::Absolute(p) => CurrentPath::Absolute(path::normalize(&p)),
            CurrentPath::Home => CurrentPath::Home,
        };
        lock(&self.inner).current.insert(connection.clone(), current);
    }

    /// Remembers the probed home directory of `connection`.
    pub fn set_home(&self, connection: &ConnectionId, home: &str) {
        lock(&self.inner)
            .homes
            .insert(connection.clone(), path::normalize(home));
    }

    pub fn home(&self, connection: &ConnectionId) -> Option<String> {
        lock(&self.inner).homes.get(connection).cloned()
    }

    /// The current directory as a path, if it is known without probing.
    pub fn current_dir(&self, connection: &ConnectionId) -> Option<String> {
        let inner = lock(&self.inner);
        match inner.current.get(connection) {
            Some(CurrentPath::Absolute(p)) => Some(p.clone()),
            Some(CurrentPath::Home) | None => inner.homes.get(connection).cloned(),
        }
    }

    pub fn expand(&self, key: ExpandKey) {
        lock(&self.inner).expanded.insert(key);
    }

    /// Removes exactly `key`. Descendants keep their state, so collapsing a
    /// connection and opening it again restores the previous depth.
    pub fn collapse(&self, key: &ExpandKey) {
        lock(&self.inner).expanded.remove(key);
    }

    pub fn is_expanded(&self, key: &ExpandKey) -> bool {
        lock(&self.inner).expanded.contains(key)
    }

    /// Durably expanded directories of `connection`.
    pub fn expanded_dirs(&self, connection: &ConnectionId) -> Vec<String> {
        let mut dirs: Vec<String> = lock(&self.inner)
            .expanded
            .iter()
            .filter_map(|k| match k {
                ExpandKey::Directory(c, p) if c == connection => Some(p.clone()),
                _ => None,
            })
            .collect();
        dirs.sort();
        dirs
    }

    /// Adds keys to the one-shot auto-expand set.
    pub fn add_auto_expand(&self, keys: impl IntoIterator<Item = ExpandKey>) {
        lock(&self.inner).auto_expand.extend(keys);
    }

    /// Takes the one-shot auto-expand set, leaving it empty.
    pub fn take_auto_expand(&self) -> HashSet<ExpandKey> {
        std::mem::take(&mut lock(&self.inner).auto_expand)
    }

    pub fn has_pending_auto_expand(&self) -> bool {
        !lock(&self.inner).auto_expand.is_empty()
    }

    /// Drops all state held for `connection`.
    pub fn forget(&self, connection: &ConnectionId) {
        let mut inner = lock(&self.inner);
        inner.current.remove(connection);
        inner.homes.remove(connection);
        inner.expanded.retain(|k| k.connection() != connection);
        inner.auto_expand.retain(|k| k.connection() != connection);
    }
}
