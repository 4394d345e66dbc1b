//! Test utilities for the remote module.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use super::{EntryKind, RemoteAccess, RemoteError, SearchMatch, SearchOptions};
use crate::connection::ConnectionId;
use crate::filter::pattern::NamePattern;
use crate::fs::entry::FileEntry;
use crate::fs::path;

/// In-memory remote filesystem that records every listing it serves.
///
/// Directories are declared with [`MockRemote::with_dir`]; a child name
/// ending in `/` is a directory. Listings can be slowed with
/// [`MockRemote::with_latency`] so concurrent callers overlap, and the
/// high-water mark of simultaneous listings is tracked. Latency applies
/// to searches too.
pub struct MockRemote {
    connection: ConnectionId,
    dirs: BTreeMap<String, Vec<(String, bool)>>,
    failures: Mutex<HashMap<String, RemoteError>>,
    home: Option<String>,
    latency: Option<Duration>,
    files: Mutex<HashMap<String, Vec<u8>>>,
    list_calls: Mutex<Vec<String>>,
    search_calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockRemote {
    pub fn new() -> Self {
        Self::for_connection("test")
    }

    pub fn for_connection(id: &str) -> Self {
        Self {
            connection: ConnectionId::from(id),
            dirs: BTreeMap::new(),
            failures: Mutex::new(HashMap::new()),
            home: None,
            latency: None,
            files: Mutex::new(HashMap::new()),
            list_calls: Mutex::new(Vec::new()),
            search_calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Declares `dir` with the given children (`"name/"` for directories).
    pub fn with_dir(mut self, dir: &str, children: &[&str]) -> Self {
        let children = children
            .iter()
            .map(|c| match c.strip_suffix('/') {
                Some(name) => (name.to_string(), true),
                None => (c.to_string(), false),
            })
            .collect();
        self.dirs.insert(path::normalize(dir), children);
        self
    }

    /// Makes listing `dir` fail with `err`.
    pub fn with_failure(mut self, dir: &str, err: RemoteError) -> Self {
        self.failures
            .get_mut()
            .unwrap()
            .insert(path::normalize(dir), err);
        self
    }

    /// Lets listings of `dir` succeed again.
    pub fn clear_failure(&self, dir: &str) {
        self.failures.lock().unwrap().remove(&path::normalize(dir));
    }

    /// Sets what `pwd` reports. Without it, `exec` fails.
    pub fn with_home(mut self, home: &str) -> Self {
        self.home = Some(home.to_string());
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Paths passed to `list_directory`, in call order.
    pub fn list_calls(&self) -> Vec<String> {
        self.list_calls.lock().unwrap().clone()
    }

    pub fn list_count(&self, dir: &str) -> usize {
        self.list_calls().iter().filter(|c| c.as_str() == dir).count()
    }

    pub fn search_count(&self) -> usize {
        self.search_calls.load(Ordering::SeqCst)
    }

    /// Highest number of listings that were in progress at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn walk(&self, dir: &str, out: &mut Vec<SearchMatch>) {
        if let Some(children) = self.dirs.get(dir) {
            for (name, is_dir) in children {
                let child = path::join(dir, name);
                out.push(SearchMatch {
                    path: child.clone(),
                    is_dir: *is_dir,
                });
                if *is_dir {
                    self.walk(&child, out);
                }
            }
        }
    }
}

impl Default for MockRemote {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteAccess for MockRemote {
    async fn list_directory(&self, dir: &str) -> Result<Vec<FileEntry>, RemoteError> {
        let dir = path::normalize(dir);
        self.list_calls.lock().unwrap().push(dir.clone());

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let failure = self.failures.lock().unwrap().get(&dir).cloned();
        if let Some(err) = failure {
            return Err(err);
        }
        let children = self
            .dirs
            .get(&dir)
            .ok_or_else(|| RemoteError::NotFound(dir.clone()))?;
        Ok(children
            .iter()
            .map(|(name, is_dir)| {
                FileEntry::new(self.connection.clone(), path::join(&dir, name), *is_dir)
                    .with_size(10)
            })
            .collect())
    }

    async fn read_file(&self, file: &str) -> Result<Vec<u8>, RemoteError> {
        self.files
            .lock()
            .unwrap()
            .get(file)
            .cloned()
            .ok_or_else(|| RemoteError::NotFound(file.to_string()))
    }

    async fn write_file(&self, file: &str, data: &[u8]) -> Result<(), RemoteError> {
        self.files
            .lock()
            .unwrap()
            .insert(file.to_string(), data.to_vec());
        Ok(())
    }

    async fn exec(&self, command: &str) -> Result<String, RemoteError> {
        match (command.trim(), &self.home) {
            ("pwd", Some(home)) => Ok(format!("{home}\n")),
            _ => Err(RemoteError::CommandFailed {
                status: 127,
                message: format!("{command}: not available"),
            }),
        }
    }

    async fn search(
        &self,
        base: &str,
        pattern: &str,
        options: &SearchOptions,
    ) -> Result<Vec<SearchMatch>, RemoteError> {
        self.search_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        let matcher = NamePattern::new(pattern);
        let mut all = Vec::new();
        self.walk(&path::normalize(base), &mut all);
        Ok(all
            .into_iter()
            .filter(|m| match options.entry_kind {
                EntryKind::Files => !m.is_dir,
                EntryKind::Directories => m.is_dir,
                EntryKind::Any => true,
            })
            .filter(|m| matcher.matches(path::file_name(&m.path)))
            .take(options.max_results)
            .collect())
    }
}

/// Builds a connection directory serving each mock under its id.
pub fn directory_with(
    remotes: &[(&str, std::sync::Arc<MockRemote>)],
) -> std::sync::Arc<crate::connection::ConnectionDirectory> {
    use crate::connection::{ConnectionDirectory, ConnectionInfo, ConnectionState};

    let (directory, _changes) = ConnectionDirectory::new();
    for (id, remote) in remotes {
        directory.add(
            ConnectionInfo {
                id: ConnectionId::from(*id),
                label: format!("user@{id}"),
                state: ConnectionState::Connected,
            },
            remote.clone(),
        );
    }
    std::sync::Arc::new(directory)
}
