//! Explicit remote search backing the quick filter.
//!
//! The quick filter itself only looks at cached listings. A caller can
//! extend it with [`quick_search`], which runs one recursive remote search
//! per target, connections in parallel, bounded by a result cap and
//! abortable through a [`CancellationToken`].

use std::collections::{BTreeMap, BTreeSet};

use futures::future::join_all;
use tokio_util::sync::CancellationToken;

use crate::connection::{ConnectionDirectory, ConnectionId};
use crate::fs::path;
use crate::remote::{RemoteError, SearchMatch, SearchOptions};

/// One remote hit, tagged with its connection.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct QuickSearchHit {
    pub connection: ConnectionId,
    pub path: String,
    pub is_dir: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QuickSearchOutcome {
    pub hits: Vec<QuickSearchHit>,
    pub count: usize,
    /// The cap truncated the results; more matches may exist.
    pub hit_cap: bool,
    /// The token fired before every search finished.
    pub aborted: bool,
}

/// Searches every `(connection, base)` target for `pattern`.
///
/// Targets of one connection run one after another; different connections
/// run concurrently. Failed searches are logged and skipped.
pub async fn quick_search(
    connections: &ConnectionDirectory,
    targets: &[(ConnectionId, String)],
    pattern: &str,
    result_cap: usize,
    cancel: &CancellationToken,
) -> QuickSearchOutcome {
    let mut grouped: BTreeMap<&ConnectionId, Vec<String>> = BTreeMap::new();
    for (connection, base) in targets {
        grouped
            .entry(connection)
            .or_default()
            .push(path::normalize(base));
    }

    let options = SearchOptions {
        max_results: result_cap,
        ..SearchOptions::default()
    };
    let per_connection = grouped.into_iter().map(|(connection, bases)| {
        let options = &options;
        async move {
            let mut found = Vec::new();
            let mut capped = false;
            for base in bases {
                match search_one(connections, connection, &base, pattern, options, cancel).await {
                    Ok(matches) => {
                        capped |= matches.len() >= result_cap;
                        found.extend(matches.into_iter().map(|m| QuickSearchHit {
                            connection: connection.clone(),
                            path: m.path,
                            is_dir: m.is_dir,
                        }));
                    }
                    Err(RemoteError::Aborted(_)) => break,
                    Err(e) => {
                        tracing::warn!(%connection, base = %base, error = %e, "quick search failed");
                    }
                }
            }
            (found, capped)
        }
    });

    let mut unique = BTreeSet::new();
    let mut hit_cap = false;
    for (found, capped) in join_all(per_connection).await {
        hit_cap |= capped;
        unique.extend(found);
    }

    let mut hits: Vec<QuickSearchHit> = unique.into_iter().collect();
    if hits.len() > result_cap {
        hits.truncate(result_cap);
        hit_cap = true;
    }
    let aborted = cancel.is_cancelled();
    tracing::debug!(pattern, count = hits.len(), hit_cap, aborted, "quick search finished");
    QuickSearchOutcome {
        count: hits.len(),
        hits,
        hit_cap,
        aborted,
    }
}

async fn search_one(
    connections: &ConnectionDirectory,
    connection: &ConnectionId,
    base: &str,
    pattern: &str,
    options: &SearchOptions,
    cancel: &CancellationToken,
) -> Result<Vec<SearchMatch>, RemoteError> {
    let remote = connections.remote(connection)?;
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(RemoteError::Aborted("quick search cancelled".into())),
        result = remote.search(base, pattern, options) => result,
    }
}
