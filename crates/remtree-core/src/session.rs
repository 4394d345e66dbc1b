//! Session wiring.
//!
//! [`Session::start`] builds every component explicitly, then spawns the
//! background work: the preload dispatcher, the connectivity reconciler and
//! the optional auto refresh. [`Session::shutdown`] stops all of it.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::cache::DirectoryCache;
use crate::config::settings::Config;
use crate::connection::{
    spawn_reconciler, ConnectionDirectory, ConnectionId, ConnectionState, ConnectivityChange,
    Reconciliation,
};
use crate::event::{ChangeNotifier, TreeChange};
use crate::nav::engine::NavigationEngine;
use crate::nav::history::VisitHistory;
use crate::preload::PreloadScheduler;
use crate::sync::lock;
use crate::tree::materializer::TreeMaterializer;

pub struct Session {
    config: Config,
    connections: Arc<ConnectionDirectory>,
    cache: Arc<DirectoryCache>,
    history: Arc<VisitHistory>,
    preload: Arc<PreloadScheduler>,
    engine: Arc<NavigationEngine>,
    tree: TreeMaterializer,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Session {
    /// Builds the engine around `connections` and starts background work.
    ///
    /// `changes` is the receiver returned by [`ConnectionDirectory::new`].
    /// Must be called within a Tokio runtime.
    pub fn start(
        config: Config,
        connections: Arc<ConnectionDirectory>,
        changes: UnboundedReceiver<ConnectivityChange>,
        history: Arc<VisitHistory>,
    ) -> Self {
        let cache = Arc::new(DirectoryCache::new(Arc::clone(&connections)));
        let preload = PreloadScheduler::new(
            config.preload.clone(),
            Arc::clone(&cache),
            Arc::clone(&history),
        );
        let engine = Arc::new(NavigationEngine::new(
            Arc::clone(&connections),
            Arc::clone(&cache),
            Arc::clone(&preload),
            Arc::clone(&history),
            ChangeNotifier::new(),
            config.search.result_cap,
        ));
        let tree = TreeMaterializer::new(Arc::clone(&engine), config.tree.clone());

        preload.start();
        let mut tasks = vec![spawn_reconciler(
            changes,
            config.tree.debounce(),
            reconcile_with(Arc::clone(&connections), Arc::clone(&engine), Arc::clone(&preload)),
        )];
        if let Some(period) = config.tree.auto_refresh() {
            tasks.push(spawn_auto_refresh(Arc::clone(&engine), period));
        }
        tracing::info!(
            connections = connections.list().len(),
            preload = config.preload.enabled,
            auto_refresh_secs = config.tree.auto_refresh_secs,
            "session started"
        );

        Self {
            config,
            connections,
            cache,
            history,
            preload,
            engine,
            tree,
            tasks: Mutex::new(tasks),
        }
    }

    /// Stops background tasks and drops all queued preload work.
    pub fn shutdown(&self) {
        for task in lock(&self.tasks).drain(..) {
            task.abort();
        }
        self.preload.shutdown();
        tracing::info!("session stopped");
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn connections(&self) -> &Arc<ConnectionDirectory> {
        &self.connections
    }

    pub fn cache(&self) -> &Arc<DirectoryCache> {
        &self.cache
    }

    pub fn history(&self) -> &Arc<VisitHistory> {
        &self.history
    }

    pub fn preload(&self) -> &Arc<PreloadScheduler> {
        &self.preload
    }

    pub fn engine(&self) -> &Arc<NavigationEngine> {
        &self.engine
    }

    pub fn tree(&self) -> &TreeMaterializer {
        &self.tree
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TreeChange> {
        self.engine.notifier().subscribe()
    }
}

/// Builds the reconciler callback.
///
/// A full pass diffs the connection set against the last pass: state of
/// removed connections is dropped, then everything re-renders. A targeted
/// pass re-renders only the named connections and pauses preloading for
/// those that are reconnecting.
fn reconcile_with(
    connections: Arc<ConnectionDirectory>,
    engine: Arc<NavigationEngine>,
    preload: Arc<PreloadScheduler>,
) -> impl FnMut(Reconciliation) + Send + 'static {
    let mut known: BTreeSet<ConnectionId> = BTreeSet::new();
    move |pass| match pass {
        Reconciliation::Full => {
            let current: BTreeSet<ConnectionId> =
                connections.list().into_iter().map(|c| c.id).collect();
            for gone in known.difference(&current) {
                tracing::info!(connection = %gone, "connection removed");
                engine.forget_connection(gone);
            }
            known = current;
            engine.notifier().notify_all();
        }
        Reconciliation::Connections(ids) => {
            for id in ids {
                if connections
                    .info(&id)
                    .is_some_and(|c| c.state == ConnectionState::Reconnecting)
                {
                    preload.cancel(&id);
                }
                engine.notifier().notify_connection(&id);
            }
        }
    }
}

/// Periodically drops every cached listing and asks for a full re-render.
fn spawn_auto_refresh(engine: Arc<NavigationEngine>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            tracing::debug!("auto refresh");
            engine.refresh(None);
        }
    })
}
