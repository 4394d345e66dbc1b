//! Navigation engine: user actions that move, expand, filter or reveal.
//!
//! [`NavigationEngine`] is the only writer of navigation state and of the
//! filter overlay. It reads and fills the directory cache through its
//! public contract, feeds the preload scheduler and records visits.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio_util::sync::CancellationToken;

use crate::cache::{DirectoryCache, DirectorySnapshot};
use crate::connection::{ConnectionDirectory, ConnectionId};
use crate::event::ChangeNotifier;
use crate::filter::folder::FilterMode;
use crate::filter::overlay::{build_folder_filter, FilterOverlay};
use crate::filter::search::{quick_search, QuickSearchOutcome};
use crate::fs::path;
use crate::nav::history::VisitHistory;
use crate::nav::reveal::{self, RevealReport, RevealStrategy};
use crate::nav::state::{CurrentPath, ExpandKey, NavigationState, HOME_MARKER};
use crate::preload::PreloadScheduler;
use crate::remote::RemoteError;
use crate::sync::lock;

type FailureKey = (ConnectionId, String);

pub struct NavigationEngine {
    connections: Arc<ConnectionDirectory>,
    cache: Arc<DirectoryCache>,
    preload: Arc<PreloadScheduler>,
    history: Arc<VisitHistory>,
    state: NavigationState,
    overlay: Mutex<FilterOverlay>,
    failures: Mutex<HashMap<FailureKey, RemoteError>>,
    notifier: ChangeNotifier,
    result_cap: usize,
}

impl NavigationEngine {
    pub fn new(
        connections: Arc<ConnectionDirectory>,
        cache: Arc<DirectoryCache>,
        preload: Arc<PreloadScheduler>,
        history: Arc<VisitHistory>,
        notifier: ChangeNotifier,
        result_cap: usize,
    ) -> Self {
        Self {
            connections,
            cache,
            preload,
            history,
            state: NavigationState::new(),
            overlay: Mutex::new(FilterOverlay::new()),
            failures: Mutex::new(HashMap::new()),
            notifier,
            result_cap,
        }
    }

    pub fn state(&self) -> &NavigationState {
        &self.state
    }

    pub fn cache(&self) -> &DirectoryCache {
        &self.cache
    }

    pub fn connections(&self) -> &ConnectionDirectory {
        &self.connections
    }

    pub fn notifier(&self) -> &ChangeNotifier {
        &self.notifier
    }

    /// Locks the filter overlay for reading or direct edits.
    pub fn overlay(&self) -> MutexGuard<'_, FilterOverlay> {
        lock(&self.overlay)
    }

    /// The last foreground failure for `dir`, until it loads or is refreshed.
    pub fn failure(&self, connection: &ConnectionId, dir: &str) -> Option<RemoteError> {
        lock(&self.failures)
            .get(&(connection.clone(), path::normalize(dir)))
            .cloned()
    }

    /// The current path as an absolute path, probing the home directory
    /// when it is not known yet.
    ///
    /// A failed probe yields the literal `~`.
    pub async fn resolve_current(&self, connection: &ConnectionId) -> Result<String, RemoteError> {
        if let Some(dir) = self.state.current_dir(connection) {
            return Ok(dir);
        }
        let remote = self.connections.remote(connection)?;
        match reveal::probe_home(remote.as_ref()).await {
            Some(home) => {
                self.state.set_home(connection, &home);
                Ok(home)
            }
            None => {
                tracing::info!(%connection, "home probe failed, using literal marker");
                Ok(HOME_MARKER.to_string())
            }
        }
    }

    /// Makes `dir` the current path of `connection`.
    pub async fn navigate(
        &self,
        connection: &ConnectionId,
        dir: &str,
    ) -> Result<Arc<DirectorySnapshot>, RemoteError> {
        let dir = path::normalize(dir);
        self.preload.preload_parent(connection, &dir);
        let snapshot = self.load(connection, &dir).await?;
        self.history.record(connection, &dir, true);
        self.state
            .set_current(connection, CurrentPath::Absolute(dir.clone()));
        tracing::debug!(%connection, path = %dir, "navigated");
        self.notifier.notify_connection(connection);
        Ok(snapshot)
    }

    /// Navigates to the parent of the current path. `None` at the root.
    pub async fn go_up(
        &self,
        connection: &ConnectionId,
    ) -> Result<Option<Arc<DirectorySnapshot>>, RemoteError> {
        let current = self.resolve_current(connection).await?;
        match path::parent(&current) {
            Some(parent) => self.navigate(connection, &parent).await.map(Some),
            None => Ok(None),
        }
    }

    /// Resets the current path to the login directory.
    pub async fn go_home(
        &self,
        connection: &ConnectionId,
    ) -> Result<Arc<DirectorySnapshot>, RemoteError> {
        self.state.set_current(connection, CurrentPath::Home);
        self.notifier.notify_connection(connection);
        let home = self.resolve_current(connection).await?;
        self.preload.preload_parent(connection, &home);
        self.load(connection, &home).await
    }

    /// User-initiated expansion. Directories are loaded right away and lift
    /// a drained preload cancellation.
    pub async fn expand(&self, key: ExpandKey) -> Result<(), RemoteError> {
        let connection = key.connection().clone();
        self.preload.on_user_expand(&connection);
        let dir = match &key {
            ExpandKey::Directory(_, dir) => Some(dir.clone()),
            ExpandKey::Connection(_) => None,
        };
        self.state.expand(key);
        self.notifier.notify_connection(&connection);
        if let Some(dir) = dir {
            self.load(&connection, &dir).await?;
            self.notifier.notify_connection(&connection);
        }
        Ok(())
    }

    pub fn collapse(&self, key: &ExpandKey) {
        self.state.collapse(key);
        self.notifier.notify_connection(key.connection());
    }

    /// Drops cached listings of one connection (or all) and re-renders.
    pub fn refresh(&self, connection: Option<&ConnectionId>) {
        self.cache.invalidate(connection);
        match connection {
            Some(id) => {
                lock(&self.failures).retain(|(c, _), _| c != id);
                self.notifier.notify_connection(id);
            }
            None => {
                lock(&self.failures).clear();
                self.notifier.notify_all();
            }
        }
    }

    /// Forgets everything about a connection that went away.
    pub fn forget_connection(&self, connection: &ConnectionId) {
        self.cache.invalidate(Some(connection));
        self.preload.cancel(connection);
        self.state.forget(connection);
        self.overlay().clear_connection(connection);
        lock(&self.failures).retain(|(c, _), _| c != connection);
    }

    pub fn set_quick_filter(&self, pattern: &str) {
        self.overlay().set_quick_filter(pattern);
        self.notifier.notify_all();
    }

    /// Runs the explicit remote search for the quick filter over every
    /// connection's current path.
    pub async fn search_quick_filter(&self, cancel: &CancellationToken) -> QuickSearchOutcome {
        let Some(pattern) = self.overlay().quick_filter().map(str::to_string) else {
            return QuickSearchOutcome::default();
        };
        let mut targets = Vec::new();
        for info in self.connections.list() {
            if let Ok(current) = self.resolve_current(&info.id).await {
                if current != HOME_MARKER {
                    targets.push((info.id, current));
                }
            }
        }
        quick_search(&self.connections, &targets, &pattern, self.result_cap, cancel).await
    }

    /// Builds and installs a per-folder filter. Returns its match count.
    pub async fn apply_folder_filter(
        &self,
        connection: &ConnectionId,
        base: &str,
        pattern: &str,
        mode: FilterMode,
    ) -> usize {
        let filter = build_folder_filter(
            &self.connections,
            &self.cache,
            connection,
            base,
            pattern,
            mode,
            self.result_cap,
        )
        .await;
        let total = filter.match_total();
        self.overlay().insert_folder_filter(filter);
        self.notifier.notify_connection(connection);
        total
    }

    pub fn toggle_folder_filter(&self, connection: &ConnectionId, base: &str) -> Option<bool> {
        let toggled = self.overlay().toggle_folder_filter(connection, base);
        self.notifier.notify_connection(connection);
        toggled
    }

    pub fn remove_folder_filter(&self, connection: &ConnectionId, base: &str) -> bool {
        let removed = self.overlay().remove_folder_filter(connection, base);
        self.notifier.notify_connection(connection);
        removed
    }

    pub fn clear_filters(&self) {
        {
            let mut overlay = self.overlay();
            overlay.clear_quick_filter();
            overlay.clear_folder_filters();
        }
        self.notifier.notify_all();
    }

    /// Makes `target` visible in the tree of `connection`.
    ///
    /// Filters that would hide the target are cleared first. A target whose
    /// parent is cached and lists it needs nothing else. Otherwise its
    /// ancestors are loaded (stopping quietly at the first failure) and
    /// queued for a one-shot expansion on the next render.
    pub async fn reveal(
        &self,
        connection: &ConnectionId,
        target: &str,
    ) -> Result<RevealReport, RemoteError> {
        if self.connections.info(connection).is_none() {
            return Err(RemoteError::UnknownConnection(connection.to_string()));
        }
        let target = path::normalize(target);
        let parent = path::parent(&target).unwrap_or_else(|| path::ROOT.to_string());
        let parent_listing = self.cache.get(connection, &parent);
        let is_dir = parent_listing
            .as_ref()
            .and_then(|s| s.entries().iter().find(|e| e.path() == target))
            .is_some_and(|e| e.is_dir());

        let filters_cleared = self.overlay().would_hide(connection, &target, is_dir);
        if filters_cleared {
            tracing::info!(%connection, path = %target, "clearing filters that hide the reveal target");
            self.clear_filters();
        }

        if parent_listing.is_some_and(|s| s.contains(&target)) {
            return Ok(RevealReport {
                strategy: RevealStrategy::AlreadyVisible,
                resolved_current: self
                    .state
                    .current_dir(connection)
                    .unwrap_or_else(|| HOME_MARKER.to_string()),
                loaded: Vec::new(),
                stopped_at: None,
                filters_cleared,
            });
        }

        let resolved = self.resolve_current(connection).await?;
        let strategy = reveal::choose_strategy(&resolved, &target);
        tracing::info!(%connection, path = %target, current = %resolved, ?strategy, "revealing");

        let mut loaded = Vec::new();
        let mut stopped_at = None;
        let mut auto_expand = vec![ExpandKey::Connection(connection.clone())];
        match strategy {
            RevealStrategy::ExpandDown => {
                let chain = reveal::expand_down_chain(&resolved, &target);
                let outcome = reveal::load_chain(&self.cache, connection, &chain).await;
                loaded = outcome.loaded;
                stopped_at = outcome.stopped_at;
                auto_expand.extend(
                    chain
                        .iter()
                        .filter(|dir| path::is_strictly_within(dir, &resolved))
                        .map(|dir| ExpandKey::directory(connection, dir)),
                );
            }
            RevealStrategy::ReanchorAtRoot => {
                let durable = self.state.expanded_dirs(connection);
                auto_expand.extend(
                    reveal::reanchor_auto_expand(&resolved, &target, &durable)
                        .iter()
                        .map(|dir| ExpandKey::directory(connection, dir)),
                );
                for chain in reveal::reanchor_chains(&resolved, &target) {
                    let outcome = reveal::load_chain(&self.cache, connection, &chain).await;
                    loaded.extend(outcome.loaded);
                    if stopped_at.is_none() {
                        stopped_at = outcome.stopped_at;
                    }
                }
                self.state
                    .set_current(connection, CurrentPath::Absolute(path::ROOT.to_string()));
            }
            RevealStrategy::AlreadyVisible => {}
        }

        self.state.add_auto_expand(auto_expand);
        self.notifier.notify_connection(connection);
        Ok(RevealReport {
            strategy,
            resolved_current: resolved,
            loaded,
            stopped_at,
            filters_cleared,
        })
    }

    /// Starts loading `dir` without waiting. The outcome is published as a
    /// change notification; failures are kept for [`Self::failure`].
    pub fn load_in_background(self: &Arc<Self>, connection: &ConnectionId, dir: &str) {
        if self.cache.is_pending(connection, dir) {
            return;
        }
        let this = Arc::clone(self);
        let connection = connection.clone();
        let dir = dir.to_string();
        tokio::spawn(async move {
            // Failures are recorded by `load`.
            let _ = this.load(&connection, &dir).await;
            this.notifier.notify_connection(&connection);
        });
    }

    /// Probes the home directory without waiting, then loads it.
    pub fn resolve_in_background(self: &Arc<Self>, connection: &ConnectionId) {
        let this = Arc::clone(self);
        let connection = connection.clone();
        tokio::spawn(async move {
            match this.resolve_current(&connection).await {
                Ok(dir) => {
                    this.preload.preload_parent(&connection, &dir);
                    let _ = this.load(&connection, &dir).await;
                }
                Err(e) => {
                    tracing::warn!(%connection, error = %e, "cannot resolve current path");
                }
            }
            this.notifier.notify_connection(&connection);
        });
    }

    /// Foreground load: failures are logged, remembered per directory and
    /// returned; successes feed the preload scheduler.
    async fn load(
        &self,
        connection: &ConnectionId,
        dir: &str,
    ) -> Result<Arc<DirectorySnapshot>, RemoteError> {
        let key = (connection.clone(), path::normalize(dir));
        match self.cache.request(connection, dir, true).await {
            Ok(snapshot) => {
                lock(&self.failures).remove(&key);
                self.preload.on_listing(&snapshot);
                Ok(snapshot)
            }
            Err(e) => {
                tracing::warn!(%connection, path = %key.1, error = %e, "listing failed");
                lock(&self.failures).insert(key, e.clone());
                Err(e)
            }
        }
    }
}
