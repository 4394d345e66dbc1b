//! Per-folder filename filters.

use std::collections::{BTreeSet, HashMap, HashSet};

use crate::connection::ConnectionId;
use crate::filter::pattern::NamePattern;
use crate::fs::path;
use crate::remote::EntryKind;

/// What a non-matching entry looks like under a per-folder filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FilterMode {
    /// Match files; non-matching files are hidden.
    #[default]
    Files,
    /// Match folders; non-matches are dimmed, never hidden.
    Folders,
    /// Match both; non-matches are dimmed, never hidden.
    Both,
}

impl FilterMode {
    /// The entry kind to ask a remote search for.
    pub fn entry_kind(self) -> EntryKind {
        match self {
            Self::Files => EntryKind::Files,
            Self::Folders => EntryKind::Directories,
            Self::Both => EntryKind::Any,
        }
    }

    pub fn accepts(self, is_dir: bool) -> bool {
        match self {
            Self::Files => !is_dir,
            Self::Folders => is_dir,
            Self::Both => true,
        }
    }
}

/// A name filter scoped to one (connection, base path).
///
/// The highlight set always holds the base path and, for every match, the
/// match itself plus each directory between it and the base. Each of those
/// directories also counts the matches below it.
#[derive(Debug, Clone)]
pub struct FolderFilter {
    connection: ConnectionId,
    base: String,
    pattern: String,
    matcher: NamePattern,
    mode: FilterMode,
    enabled: bool,
    matches: BTreeSet<String>,
    highlighted: HashSet<String>,
    match_counts: HashMap<String, usize>,
}

impl FolderFilter {
    pub fn new(connection: ConnectionId, base: &str, pattern: &str, mode: FilterMode) -> Self {
        let base = path::normalize(base);
        Self {
            connection,
            highlighted: HashSet::from([base.clone()]),
            base,
            pattern: pattern.to_string(),
            matcher: NamePattern::new(pattern),
            mode,
            enabled: true,
            matches: BTreeSet::new(),
            match_counts: HashMap::new(),
        }
    }

    pub fn connection(&self) -> &ConnectionId {
        &self.connection
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn mode(&self) -> FilterMode {
        self.mode
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Returns `true` if `name` satisfies the filter pattern.
    pub fn matches_name(&self, name: &str) -> bool {
        self.matcher.matches(name)
    }

    /// Records a match. Paths outside the base are ignored.
    pub fn add_match(&mut self, hit: &str) {
        let hit = path::normalize(hit);
        if !path::is_strictly_within(&hit, &self.base) || !self.matches.insert(hit.clone()) {
            return;
        }
        self.highlighted.insert(hit.clone());
        let mut ancestor = path::parent(&hit);
        while let Some(dir) = ancestor {
            if !path::is_within(&dir, &self.base) {
                break;
            }
            self.highlighted.insert(dir.clone());
            *self.match_counts.entry(dir.clone()).or_default() += 1;
            ancestor = path::parent(&dir);
        }
    }

    /// Enabled, same connection, and `target` at or below the base.
    pub fn applies_to(&self, connection: &ConnectionId, target: &str) -> bool {
        self.enabled && &self.connection == connection && path::is_within(target, &self.base)
    }

    pub fn is_highlighted(&self, target: &str) -> bool {
        self.highlighted.contains(&path::normalize(target))
    }

    /// Matches recorded at or below `dir`.
    pub fn match_count(&self, dir: &str) -> usize {
        self.match_counts
            .get(&path::normalize(dir))
            .copied()
            .unwrap_or(0)
    }

    /// Every match, sorted.
    pub fn matches(&self) -> impl Iterator<Item = &str> {
        self.matches.iter().map(String::as_str)
    }

    pub fn match_total(&self) -> usize {
        self.matches.len()
    }
}
