//! Session directory cache with in-flight deduplication.
//!
//! [`DirectoryCache`] stores one [`DirectorySnapshot`] per
//! (connection, path) for the lifetime of the session. Entries never expire;
//! they are replaced by a refetch or dropped by [`DirectoryCache::invalidate`].
//!
//! Concurrent [`DirectoryCache::request`]s for the same key share a single
//! remote listing: the first caller spawns the fetch and records it as
//! pending, later callers receive a clone of the same shared future.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use futures::future::{self, BoxFuture, FutureExt, Shared};

use crate::connection::{ConnectionDirectory, ConnectionId};
use crate::fs::entry::FileEntry;
use crate::fs::path;
use crate::remote::RemoteError;
use crate::sync::lock;

/// Outcome of a directory request.
pub type ListingResult = Result<Arc<DirectorySnapshot>, RemoteError>;

/// A listing that may still be in flight. Cloning it shares the fetch.
pub type Listing = Shared<BoxFuture<'static, ListingResult>>;

/// An immutable directory listing captured at one fetch time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectorySnapshot {
    connection: ConnectionId,
    path: String,
    entries: Vec<FileEntry>,
    fetched_at: SystemTime,
}

impl DirectorySnapshot {
    pub fn new(connection: ConnectionId, path: impl Into<String>, entries: Vec<FileEntry>) -> Self {
        Self {
            connection,
            path: path::normalize(&path.into()),
            entries,
            fetched_at: SystemTime::now(),
        }
    }

    pub fn connection(&self) -> &ConnectionId {
        &self.connection
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Entries in the order the remote returned them.
    pub fn entries(&self) -> &[FileEntry] {
        &self.entries
    }

    pub fn fetched_at(&self) -> SystemTime {
        self.fetched_at
    }

    /// Returns `true` if an entry with exactly `entry_path` is listed.
    pub fn contains(&self, entry_path: &str) -> bool {
        let entry_path = path::normalize(entry_path);
        self.entries.iter().any(|e| e.path() == entry_path)
    }

    /// Directory entries only.
    pub fn subdirectories(&self) -> impl Iterator<Item = &FileEntry> {
        self.entries.iter().filter(|e| e.is_dir())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    connection: ConnectionId,
    path: String,
}

impl CacheKey {
    fn new(connection: &ConnectionId, dir: &str) -> Self {
        Self {
            connection: connection.clone(),
            path: path::normalize(dir),
        }
    }
}

struct Pending {
    ticket: u64,
    listing: Listing,
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<CacheKey, Arc<DirectorySnapshot>>,
    pending: HashMap<CacheKey, Pending>,
    next_ticket: u64,
}

impl CacheState {
    /// Records the end of fetch `ticket`.
    ///
    /// A fetch whose pending marker was dropped by an invalidation, or
    /// superseded by a forced refetch, leaves the cache untouched.
    fn settle(&mut self, key: &CacheKey, ticket: u64, result: &ListingResult) {
        let current = self.pending.get(key).map(|p| p.ticket);
        if current != Some(ticket) {
            tracing::debug!(connection = %key.connection, path = %key.path, "discarding stale listing");
            return;
        }
        self.pending.remove(key);
        if let Ok(snapshot) = result {
            self.entries.insert(key.clone(), Arc::clone(snapshot));
        }
    }
}

/// Deduplicating, session-lifetime cache of remote directory listings.
pub struct DirectoryCache {
    state: Arc<Mutex<CacheState>>,
    connections: Arc<ConnectionDirectory>,
}

impl DirectoryCache {
    pub fn new(connections: Arc<ConnectionDirectory>) -> Self {
        Self {
            state: Arc::new(Mutex::new(CacheState::default())),
            connections,
        }
    }

    /// Synchronous lookup. Never performs I/O.
    pub fn get(&self, connection: &ConnectionId, dir: &str) -> Option<Arc<DirectorySnapshot>> {
        lock(&self.state)
            .entries
            .get(&CacheKey::new(connection, dir))
            .cloned()
    }

    pub fn contains(&self, connection: &ConnectionId, dir: &str) -> bool {
        lock(&self.state)
            .entries
            .contains_key(&CacheKey::new(connection, dir))
    }

    /// Returns `true` while a fetch for the key is in flight.
    pub fn is_pending(&self, connection: &ConnectionId, dir: &str) -> bool {
        lock(&self.state)
            .pending
            .contains_key(&CacheKey::new(connection, dir))
    }

    /// Requests the listing of `dir`.
    ///
    /// With `use_cache`, a cached snapshot resolves immediately. Otherwise an
    /// in-flight fetch for the same key is joined, or a new one is spawned.
    /// The dedup decision is taken synchronously, before the returned future
    /// is first polled. Must be called within a Tokio runtime.
    pub fn request(&self, connection: &ConnectionId, dir: &str, use_cache: bool) -> Listing {
        let key = CacheKey::new(connection, dir);
        let mut state = lock(&self.state);

        if use_cache {
            if let Some(snapshot) = state.entries.get(&key) {
                tracing::debug!(connection = %key.connection, path = %key.path, "cache hit");
                return resolved(Ok(Arc::clone(snapshot)));
            }
        }
        if let Some(pending) = state.pending.get(&key) {
            tracing::debug!(connection = %key.connection, path = %key.path, "joining in-flight listing");
            return pending.listing.clone();
        }

        let remote = match self.connections.remote(connection) {
            Ok(remote) => remote,
            Err(e) => return resolved(Err(e)),
        };

        let ticket = state.next_ticket;
        state.next_ticket += 1;
        tracing::debug!(connection = %key.connection, path = %key.path, "fetching listing");

        let shared_state = Arc::clone(&self.state);
        let fetch_key = key.clone();
        let task = tokio::spawn(async move {
            let result = remote
                .list_directory(&fetch_key.path)
                .await
                .map(|entries| {
                    Arc::new(DirectorySnapshot::new(
                        fetch_key.connection.clone(),
                        fetch_key.path.clone(),
                        entries,
                    ))
                });
            lock(&shared_state).settle(&fetch_key, ticket, &result);
            result
        });
        let listing = async move {
            task.await
                .unwrap_or_else(|e| Err(RemoteError::Aborted(e.to_string())))
        }
        .boxed()
        .shared();

        state.pending.insert(
            key,
            Pending {
                ticket,
                listing: listing.clone(),
            },
        );
        listing
    }

    /// Drops every entry and pending marker for `connection`, or for all
    /// connections when `None`.
    pub fn invalidate(&self, connection: Option<&ConnectionId>) {
        let mut state = lock(&self.state);
        match connection {
            Some(id) => {
                state.entries.retain(|k, _| &k.connection != id);
                state.pending.retain(|k, _| &k.connection != id);
            }
            None => {
                state.entries.clear();
                state.pending.clear();
            }
        }
    }

    /// Drops the entry and pending marker for a single directory.
    pub fn invalidate_path(&self, connection: &ConnectionId, dir: &str) {
        let key = CacheKey::new(connection, dir);
        let mut state = lock(&self.state);
        state.entries.remove(&key);
        state.pending.remove(&key);
    }

    /// Every cached snapshot of `connection` at or below `base`.
    pub fn snapshots_within(
        &self,
        connection: &ConnectionId,
        base: &str,
    ) -> Vec<Arc<DirectorySnapshot>> {
        lock(&self.state)
            .entries
            .iter()
            .filter(|(k, _)| &k.connection == connection && path::is_within(&k.path, base))
            .map(|(_, s)| Arc::clone(s))
            .collect()
    }

    /// Number of cached snapshots.
    pub fn len(&self) -> usize {
        lock(&self.state).entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn resolved(result: ListingResult) -> Listing {
    future::ready(result).boxed().shared()
}
