//! Planning and ancestor loading for path reveal.
//!
//! A reveal picks one of two strategies. When the target lies under the
//! connection's current path (or the current path is the root), the
//! directories between them are loaded and expanded in place. Otherwise
//! the connection is re-anchored at `/` and both the old current path and
//! the target's parent are expanded from there.

use std::collections::BTreeSet;

use crate::cache::DirectoryCache;
use crate::connection::ConnectionId;
use crate::fs::path;
use crate::nav::state::HOME_MARKER;
use crate::remote::{RemoteAccess, RemoteError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevealStrategy {
    /// The target's parent was cached and lists it; nothing changed.
    AlreadyVisible,
    ExpandDown,
    ReanchorAtRoot,
}

/// What a reveal did.
#[derive(Debug, Clone, PartialEq)]
pub struct RevealReport {
    pub strategy: RevealStrategy,
    /// Current path the decision was made against.
    pub resolved_current: String,
    /// Directories fetched (cached ones are skipped).
    pub loaded: Vec<String>,
    /// First ancestor that failed to load, if any.
    pub stopped_at: Option<(String, RemoteError)>,
    pub filters_cleared: bool,
}

/// Probes the login directory. `None` if the probe fails or looks wrong.
pub async fn probe_home(remote: &dyn RemoteAccess) -> Option<String> {
    match remote.exec("pwd").await {
        Ok(out) => {
            let home = out.trim();
            home.starts_with('/').then(|| path::normalize(home))
        }
        Err(e) => {
            tracing::debug!(error = %e, "home probe failed");
            None
        }
    }
}

/// Picks between expanding in place and re-anchoring.
///
/// An unresolved home compares as the literal `~`, which no absolute path
/// lies under, so it always re-anchors.
pub fn choose_strategy(resolved_current: &str, target: &str) -> RevealStrategy {
    if resolved_current == path::ROOT || path::is_strictly_within(target, resolved_current) {
        RevealStrategy::ExpandDown
    } else {
        RevealStrategy::ReanchorAtRoot
    }
}

/// Directories to load for an in-place reveal: the current path down to
/// the target's parent.
pub fn expand_down_chain(resolved_current: &str, target: &str) -> Vec<String> {
    let parent = path::parent(target).unwrap_or_else(|| path::ROOT.to_string());
    path::chain_between(resolved_current, &parent)
}

/// Root-to-leaf chains to load when re-anchoring: one for the old current
/// path (skipped when it is not absolute) and one for the target's parent.
pub fn reanchor_chains(resolved_current: &str, target: &str) -> Vec<Vec<String>> {
    let mut chains = Vec::with_capacity(2);
    if resolved_current != HOME_MARKER && resolved_current.starts_with('/') {
        chains.push(path::ancestors_from_root(resolved_current));
    }
    let parent = path::parent(target).unwrap_or_else(|| path::ROOT.to_string());
    chains.push(path::ancestors_from_root(&parent));
    chains
}

/// The one-shot auto-expand set of a re-anchor: both chains without the
/// root, plus every directory the user already expanded.
pub fn reanchor_auto_expand(
    resolved_current: &str,
    target: &str,
    durable: &[String],
) -> BTreeSet<String> {
    reanchor_chains(resolved_current, target)
        .into_iter()
        .flatten()
        .chain(durable.iter().cloned())
        .filter(|p| p != path::ROOT)
        .collect()
}

/// Outcome of loading one ancestor chain.
#[derive(Debug, Default)]
pub struct ChainLoad {
    pub loaded: Vec<String>,
    pub stopped_at: Option<(String, RemoteError)>,
}

/// Loads `chain` in order, skipping cached directories and stopping at the
/// first failure. A failure is not an error for the caller: whatever was
/// loaded before it stays loaded.
pub async fn load_chain(
    cache: &DirectoryCache,
    connection: &ConnectionId,
    chain: &[String],
) -> ChainLoad {
    let mut outcome = ChainLoad::default();
    for dir in chain {
        if cache.contains(connection, dir) {
            continue;
        }
        match cache.request(connection, dir, true).await {
            Ok(_) => outcome.loaded.push(dir.clone()),
            Err(e) => {
                if e.is_permission_denied() {
                    tracing::debug!(%connection, path = %dir, "permission denied, stop descending");
                } else {
                    tracing::warn!(%connection, path = %dir, error = %e, "ancestor load failed");
                }
                outcome.stopped_at = Some((dir.clone(), e));
                break;
            }
        }
    }
    outcome
}
