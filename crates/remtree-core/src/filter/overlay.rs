//! Filter overlay: visibility, highlight and dim state per node.
//!
//! The overlay combines the single global quick filter with any number of
//! per-folder filters. A node is highlighted if *any* applicable per-folder
//! filter marks it.

use crate::cache::DirectoryCache;
use crate::connection::{ConnectionDirectory, ConnectionId};
use crate::filter::folder::{FilterMode, FolderFilter};
use crate::filter::pattern::NamePattern;
use crate::fs::entry::FileEntry;
use crate::fs::path;
use crate::remote::SearchOptions;

/// Display state the overlay computes for one entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NodeDecoration {
    pub visible: bool,
    pub highlighted: bool,
    pub dimmed: bool,
    /// Matches at or below this node, summed over applicable filters.
    pub match_count: usize,
    /// This node is the base of an active per-folder filter.
    pub filter_base: bool,
    /// A directory with no matching descendants.
    pub empty_after_filter: bool,
}

#[derive(Debug, Clone)]
struct QuickFilter {
    raw: String,
    pattern: NamePattern,
}

/// The quick filter plus every per-folder filter.
#[derive(Debug, Default)]
pub struct FilterOverlay {
    quick: Option<QuickFilter>,
    folders: Vec<FolderFilter>,
}

impl FilterOverlay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the global quick filter. An empty pattern clears it.
    pub fn set_quick_filter(&mut self, pattern: &str) {
        self.quick = (!pattern.trim().is_empty()).then(|| QuickFilter {
            raw: pattern.to_string(),
            pattern: NamePattern::new(pattern),
        });
    }

    pub fn clear_quick_filter(&mut self) {
        self.quick = None;
    }

    pub fn quick_filter(&self) -> Option<&str> {
        self.quick.as_ref().map(|q| q.raw.as_str())
    }

    /// Directories always pass so they stay navigable.
    pub fn quick_passes(&self, name: &str, is_dir: bool) -> bool {
        is_dir || self.quick.as_ref().map_or(true, |q| q.pattern.matches(name))
    }

    /// Adds `filter`, replacing any filter with the same (connection, base).
    pub fn insert_folder_filter(&mut self, filter: FolderFilter) {
        self.folders
            .retain(|f| !(f.connection() == filter.connection() && f.base() == filter.base()));
        self.folders.push(filter);
    }

    pub fn remove_folder_filter(&mut self, connection: &ConnectionId, base: &str) -> bool {
        let base = path::normalize(base);
        let before = self.folders.len();
        self.folders
            .retain(|f| !(f.connection() == connection && f.base() == base));
        self.folders.len() != before
    }

    /// Flips a filter's enabled flag, returning the new state.
    pub fn toggle_folder_filter(&mut self, connection: &ConnectionId, base: &str) -> Option<bool> {
        let base = path::normalize(base);
        let filter = self
            .folders
            .iter_mut()
            .find(|f| f.connection() == connection && f.base() == base)?;
        let enabled = !filter.is_enabled();
        filter.set_enabled(enabled);
        Some(enabled)
    }

    pub fn clear_folder_filters(&mut self) {
        self.folders.clear();
    }

    /// Drops every per-folder filter of `connection`.
    pub fn clear_connection(&mut self, connection: &ConnectionId) {
        self.folders.retain(|f| f.connection() != connection);
    }

    pub fn folder_filters(&self) -> &[FolderFilter] {
        &self.folders
    }

    pub fn folder_filter(&self, connection: &ConnectionId, base: &str) -> Option<&FolderFilter> {
        let base = path::normalize(base);
        self.folders
            .iter()
            .find(|f| f.connection() == connection && f.base() == base)
    }

    pub fn has_active_filters(&self) -> bool {
        self.quick.is_some() || self.folders.iter().any(FolderFilter::is_enabled)
    }

    fn applicable<'a>(
        &'a self,
        connection: &'a ConnectionId,
        target: &'a str,
    ) -> impl Iterator<Item = &'a FolderFilter> + 'a {
        self.folders
            .iter()
            .filter(move |f| f.applies_to(connection, target))
    }

    /// Computes the display state of `entry`.
    pub fn decorate(&self, entry: &FileEntry) -> NodeDecoration {
        let connection = entry.connection();
        let target = entry.path();
        let applicable: Vec<&FolderFilter> = self.applicable(connection, target).collect();

        let highlighted = applicable.iter().any(|f| f.is_highlighted(target));
        let hidden_by_folder = !highlighted
            && !entry.is_dir()
            && applicable.iter().any(|f| f.mode() == FilterMode::Files);
        let dimmed = !highlighted && applicable.iter().any(|f| f.mode() != FilterMode::Files);

        NodeDecoration {
            visible: !hidden_by_folder && self.quick_passes(entry.name(), entry.is_dir()),
            highlighted,
            dimmed,
            match_count: applicable.iter().map(|f| f.match_count(target)).sum(),
            filter_base: applicable.iter().any(|f| f.base() == target),
            empty_after_filter: entry.is_dir() && self.is_empty_after_filter(connection, target),
        }
    }

    /// Returns `true` if some active filter on `connection` is rooted
    /// strictly above `target` and records nothing at or below it.
    ///
    /// The base path itself is never empty.
    pub fn is_empty_after_filter(&self, connection: &ConnectionId, target: &str) -> bool {
        let target = path::normalize(target);
        self.folders.iter().any(|f| {
            f.is_enabled()
                && f.connection() == connection
                && path::is_strictly_within(&target, f.base())
                && !f.is_highlighted(&target)
        })
    }

    /// Returns `true` if the current filters would hide `target`.
    pub fn would_hide(&self, connection: &ConnectionId, target: &str, is_dir: bool) -> bool {
        let target = path::normalize(target);
        if !self.quick_passes(path::file_name(&target), is_dir) {
            return true;
        }
        let applicable: Vec<&FolderFilter> = self.applicable(connection, &target).collect();
        !is_dir
            && !applicable.iter().any(|f| f.is_highlighted(&target))
            && applicable.iter().any(|f| f.mode() == FilterMode::Files)
    }
}

/// Builds a per-folder filter from a remote recursive search, topped up by
/// name-matching every cached listing under `base`.
///
/// The local pass catches entries the remote search reports under a
/// different path (symlinks, bind mounts). A failed remote search leaves
/// only the local matches.
pub async fn build_folder_filter(
    connections: &ConnectionDirectory,
    cache: &DirectoryCache,
    connection: &ConnectionId,
    base: &str,
    pattern: &str,
    mode: FilterMode,
    result_cap: usize,
) -> FolderFilter {
    let mut filter = FolderFilter::new(connection.clone(), base, pattern, mode);

    let options = SearchOptions {
        max_results: result_cap,
        entry_kind: mode.entry_kind(),
        ..SearchOptions::default()
    };
    let remote_hits = match connections.remote(connection) {
        Ok(remote) => remote.search(filter.base(), pattern, &options).await,
        Err(e) => Err(e),
    };
    match remote_hits {
        Ok(hits) => {
            for hit in hits.iter().filter(|h| mode.accepts(h.is_dir)) {
                filter.add_match(&hit.path);
            }
        }
        Err(e) => {
            tracing::warn!(%connection, base, error = %e, "remote filter search failed, using cached listings only");
        }
    }

    for snapshot in cache.snapshots_within(connection, filter.base()) {
        for entry in snapshot.entries() {
            if mode.accepts(entry.is_dir()) && filter.matches_name(entry.name()) {
                filter.add_match(entry.path());
            }
        }
    }
    tracing::debug!(%connection, base, pattern, matches = filter.match_total(), "folder filter built");
    filter
}
