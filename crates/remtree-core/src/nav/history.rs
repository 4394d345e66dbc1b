//! Per-connection visit history.
//!
//! Every navigation records a visit. The ranking (most visits first, most
//! recent breaking ties) feeds the preload heuristic. History can be
//! persisted as TOML between sessions.

use std::path::Path;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::connection::ConnectionId;
use crate::error::{CoreError, CoreResult};
use crate::fs::path;
use crate::sync::lock;

/// One remembered location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Visit {
    pub connection: String,
    pub path: String,
    pub is_dir: bool,
    pub count: u32,
    /// Monotonic sequence number of the latest visit.
    pub last_seen: u64,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct HistoryFile {
    #[serde(default)]
    visits: Vec<Visit>,
}

/// Visit counts shared between navigation (writer) and preload (reader).
#[derive(Debug, Default)]
pub struct VisitHistory {
    visits: Mutex<Vec<Visit>>,
}

impl VisitHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one visit to `target`.
    pub fn record(&self, connection: &ConnectionId, target: &str, is_dir: bool) {
        let target = path::normalize(target);
        let mut visits = lock(&self.visits);
        let seq = visits.iter().map(|v| v.last_seen).max().unwrap_or(0) + 1;
        match visits
            .iter_mut()
            .find(|v| v.connection == connection.as_str() && v.path == target && v.is_dir == is_dir)
        {
            Some(visit) => {
                visit.count += 1;
                visit.last_seen = seq;
            }
            None => visits.push(Visit {
                connection: connection.to_string(),
                path: target,
                is_dir,
                count: 1,
                last_seen: seq,
            }),
        }
    }

    /// Most visited folders of `connection`, best first.
    pub fn frequent_folders(&self, connection: &ConnectionId, limit: usize) -> Vec<String> {
        self.ranked(connection, true, limit)
    }

    /// Most visited files of `connection`, best first.
    pub fn frequent_files(&self, connection: &ConnectionId, limit: usize) -> Vec<String> {
        self.ranked(connection, false, limit)
    }

    /// Forgets everything recorded for `connection`.
    pub fn clear(&self, connection: &ConnectionId) {
        lock(&self.visits).retain(|v| v.connection != connection.as_str());
    }

    pub fn len(&self) -> usize {
        lock(&self.visits).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn ranked(&self, connection: &ConnectionId, dirs: bool, limit: usize) -> Vec<String> {
        let mut matching: Vec<Visit> = lock(&self.visits)
            .iter()
            .filter(|v| v.connection == connection.as_str() && v.is_dir == dirs)
            .cloned()
            .collect();
        matching.sort_by(|a, b| {
            b.count
                .cmp(&a.count)
                .then_with(|| b.last_seen.cmp(&a.last_seen))
        });
        matching.into_iter().take(limit).map(|v| v.path).collect()
    }

    /// Loads history from a TOML file.
    pub fn load_from_file(file: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(file)?;
        let parsed: HistoryFile =
            toml::from_str(&content).map_err(|e| CoreError::ConfigParse(e.to_string()))?;
        Ok(Self {
            visits: Mutex::new(parsed.visits),
        })
    }

    /// Persists history to a TOML file, creating parent directories.
    pub fn save_to_file(&self, file: &Path) -> CoreResult<()> {
        if let Some(parent) = file.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let snapshot = HistoryFile {
            visits: lock(&self.visits).clone(),
        };
        let content =
            toml::to_string_pretty(&snapshot).map_err(|e| CoreError::ConfigParse(e.to_string()))?;
        std::fs::write(file, content)?;
        Ok(())
    }
}
