//! Background directory prefetch.
//!
//! [`PreloadScheduler`] warms the [`DirectoryCache`] for directories the user
//! is likely to open next. Tasks wait in five strict priority levels (FIFO
//! within a level). A single dispatcher task hands out concurrency slots,
//! backed by Tokio semaphores, one at a time under the scheduler lock, so
//! the number of running tasks never exceeds the cap and a freed slot always
//! goes to the highest-priority waiter.
//!
//! Every preload failure is swallowed: prefetch is best effort and must
//! never disturb foreground listings.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use tokio::sync::{Notify, OwnedSemaphorePermit, Semaphore};
use tokio::task::{JoinHandle, JoinSet};

use crate::cache::{DirectoryCache, DirectorySnapshot};
use crate::config::settings::PreloadConfig;
use crate::connection::ConnectionId;
use crate::fs::path;
use crate::nav::history::VisitHistory;
use crate::sync::lock;

/// Directories queued per freshly exposed listing.
const MAX_CANDIDATES_PER_LISTING: usize = 5;
/// Child tasks spawned by a completed task with depth left.
const MAX_CHILDREN_PER_TASK: usize = 3;
/// How many top-ranked folders count as "frequently visited".
const FREQUENT_FOLDER_LIMIT: usize = 20;

/// Service order of preload tasks, highest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PreloadPriority {
    Critical,
    High,
    Medium,
    Low,
    Idle,
}

impl PreloadPriority {
    /// All levels in service order.
    pub const ALL: [Self; 5] = [
        Self::Critical,
        Self::High,
        Self::Medium,
        Self::Low,
        Self::Idle,
    ];

    fn index(self) -> usize {
        self as usize
    }

    /// One level down, saturating at [`PreloadPriority::Idle`].
    pub fn lower(self) -> Self {
        match self {
            Self::Critical => Self::High,
            Self::High => Self::Medium,
            Self::Medium => Self::Low,
            Self::Low | Self::Idle => Self::Idle,
        }
    }
}

/// A directory to warm, with how many levels below it may follow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreloadTask {
    pub connection: ConnectionId,
    pub path: String,
    pub priority: PreloadPriority,
    pub depth: u32,
}

impl PreloadTask {
    pub fn new(
        connection: ConnectionId,
        dir: impl Into<String>,
        priority: PreloadPriority,
        depth: u32,
    ) -> Self {
        Self {
            connection,
            path: path::normalize(&dir.into()),
            priority,
            depth,
        }
    }
}

/// Per-priority task counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PriorityCounts {
    pub active: usize,
    pub queued: usize,
    pub completed: usize,
}

/// Point-in-time scheduler counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PreloadStatus {
    pub active: usize,
    pub queued: usize,
    pub completed: usize,
    /// Tasks dropped because their connection was cancelled.
    pub cancelled: usize,
    /// Every task ever accepted.
    pub total: usize,
    pub by_priority: BTreeMap<PreloadPriority, PriorityCounts>,
}

#[derive(Default)]
struct SchedulerState {
    enabled: bool,
    queues: [VecDeque<PreloadTask>; 5],
    cancelled_connections: HashSet<ConnectionId>,
    connection_slots: HashMap<ConnectionId, Arc<Semaphore>>,
    active_by_connection: HashMap<ConnectionId, usize>,
    active_paths: HashSet<(ConnectionId, String)>,
    counts: [PriorityCounts; 5],
    cancelled: usize,
    total: usize,
    running: JoinSet<()>,
}

impl SchedulerState {
    fn has_work_for(&self, connection: &ConnectionId) -> bool {
        self.active_by_connection
            .get(connection)
            .is_some_and(|n| *n > 0)
            || self
                .queues
                .iter()
                .any(|q| q.iter().any(|t| &t.connection == connection))
    }

    fn is_tracked(&self, connection: &ConnectionId, dir: &str) -> bool {
        self.active_paths
            .contains(&(connection.clone(), dir.to_string()))
            || self
                .queues
                .iter()
                .any(|q| q.iter().any(|t| &t.connection == connection && t.path == dir))
    }

    /// Drops queued tasks of cancelled connections.
    fn sweep_cancelled(&mut self) {
        let Self {
            queues,
            cancelled_connections,
            counts,
            cancelled,
            ..
        } = self;
        for (idx, queue) in queues.iter_mut().enumerate() {
            let before = queue.len();
            queue.retain(|t| !cancelled_connections.contains(&t.connection));
            let dropped = before - queue.len();
            counts[idx].queued -= dropped;
            *cancelled += dropped;
        }
    }

    fn drop_all_queued(&mut self) {
        for (idx, queue) in self.queues.iter_mut().enumerate() {
            self.cancelled += queue.len();
            self.counts[idx].queued = 0;
            queue.clear();
        }
    }
}

/// Releases a concurrency slot and wakes the dispatcher.
struct Slot {
    permit: Option<OwnedSemaphorePermit>,
    wake: Arc<Notify>,
}

impl Drop for Slot {
    fn drop(&mut self) {
        drop(self.permit.take());
        self.wake.notify_one();
    }
}

/// Priority- and concurrency-bounded background prefetcher.
///
/// Create with [`PreloadScheduler::new`], then [`start`](Self::start) the
/// dispatcher. [`shutdown`](Self::shutdown) must be called at session end
/// to stop the dispatcher and abort running tasks.
pub struct PreloadScheduler {
    state: Mutex<SchedulerState>,
    wake: Arc<Notify>,
    global_slots: Arc<Semaphore>,
    config: PreloadConfig,
    cache: Arc<DirectoryCache>,
    history: Arc<VisitHistory>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
}

impl PreloadScheduler {
    pub fn new(
        config: PreloadConfig,
        cache: Arc<DirectoryCache>,
        history: Arc<VisitHistory>,
    ) -> Arc<Self> {
        let cap = config.concurrency.max(1);
        Arc::new(Self {
            state: Mutex::new(SchedulerState {
                enabled: config.enabled,
                ..SchedulerState::default()
            }),
            wake: Arc::new(Notify::new()),
            global_slots: Arc::new(Semaphore::new(cap)),
            config,
            cache,
            history,
            dispatcher: Mutex::new(None),
        })
    }

    /// Spawns the dispatcher. Calling it twice is a no-op.
    pub fn start(self: &Arc<Self>) {
        let mut dispatcher = lock(&self.dispatcher);
        if dispatcher.is_some() {
            return;
        }
        let this = Arc::clone(self);
        *dispatcher = Some(tokio::spawn(async move { this.dispatch().await }));
    }

    /// Stops the dispatcher, aborts running tasks and drops queued ones.
    pub fn shutdown(&self) {
        if let Some(handle) = lock(&self.dispatcher).take() {
            handle.abort();
        }
        let mut state = lock(&self.state);
        state.enabled = false;
        state.drop_all_queued();
        state.running.abort_all();
        // Aborted tasks never reach `finish`.
        let aborted: usize = state.counts.iter().map(|c| c.active).sum();
        state.cancelled += aborted;
        for counts in state.counts.iter_mut() {
            counts.active = 0;
        }
        state.active_by_connection.clear();
        state.active_paths.clear();
    }

    pub fn is_enabled(&self) -> bool {
        lock(&self.state).enabled
    }

    /// Toggles speculative preloading. Disabling drops queued tasks.
    pub fn set_enabled(&self, enabled: bool) {
        let mut state = lock(&self.state);
        state.enabled = enabled;
        if !enabled {
            state.drop_all_queued();
        }
    }

    /// Queues `task`. Returns `false` if preloading is disabled, the task's
    /// connection is cancelled, or the directory is already cached, queued
    /// or being fetched.
    pub fn enqueue(&self, task: PreloadTask) -> bool {
        if self.cache.contains(&task.connection, &task.path) {
            return false;
        }
        {
            let mut state = lock(&self.state);
            if !state.enabled
                || state.cancelled_connections.contains(&task.connection)
                || state.is_tracked(&task.connection, &task.path)
            {
                return false;
            }
            let idx = task.priority.index();
            tracing::debug!(connection = %task.connection, path = %task.path, priority = ?task.priority, depth = task.depth, "preload queued");
            state.counts[idx].queued += 1;
            state.total += 1;
            state.queues[idx].push_back(task);
        }
        self.wake.notify_one();
        true
    }

    /// Ranks the subdirectories of a freshly available listing and queues
    /// up to five of them.
    ///
    /// Frequently visited folders get [`PreloadPriority::Medium`] with two
    /// levels of depth; unfamiliar ones get [`PreloadPriority::High`] with
    /// one.
    pub fn on_listing(&self, snapshot: &DirectorySnapshot) {
        if !self.is_enabled() {
            return;
        }
        let connection = snapshot.connection();
        let frequent = self
            .history
            .frequent_folders(connection, FREQUENT_FOLDER_LIMIT);

        let mut candidates: Vec<(Option<usize>, &str)> = snapshot
            .subdirectories()
            .map(|d| (frequent.iter().position(|f| f == d.path()), d.path()))
            .collect();
        // Frequent folders first in rank order, then listing order.
        candidates.sort_by_key(|(rank, _)| rank.unwrap_or(usize::MAX));

        for (rank, dir) in candidates.into_iter().take(MAX_CANDIDATES_PER_LISTING) {
            let (priority, depth) = match rank {
                Some(_) => (PreloadPriority::Medium, 2),
                None => (PreloadPriority::High, 1),
            };
            self.enqueue(PreloadTask::new(connection.clone(), dir, priority, depth));
        }
    }

    /// Fetches the parent of `current` right away, regardless of the
    /// enabled toggle, the queue or the cap.
    pub fn preload_parent(&self, connection: &ConnectionId, current: &str) {
        let Some(parent) = path::parent(current) else {
            return;
        };
        let listing = self.cache.request(connection, &parent, true);
        let connection = connection.clone();
        tokio::spawn(async move {
            if let Err(e) = listing.await {
                tracing::debug!(%connection, path = %parent, error = %e, "parent preload failed");
            }
        });
    }

    /// Cancels all queued and not-yet-started work for `connection`.
    pub fn cancel(&self, connection: &ConnectionId) {
        lock(&self.state)
            .cancelled_connections
            .insert(connection.clone());
        tracing::debug!(%connection, "preload cancelled");
        self.wake.notify_one();
    }

    pub fn is_cancelled(&self, connection: &ConnectionId) -> bool {
        lock(&self.state)
            .cancelled_connections
            .contains(connection)
    }

    /// Called on a user-initiated expansion: a cancellation whose work has
    /// fully drained is lifted so speculation resumes.
    pub fn on_user_expand(&self, connection: &ConnectionId) {
        let mut state = lock(&self.state);
        if state.cancelled_connections.contains(connection) && !state.has_work_for(connection) {
            state.cancelled_connections.remove(connection);
            tracing::debug!(%connection, "preload resumed");
        }
    }

    pub fn status(&self) -> PreloadStatus {
        let state = lock(&self.state);
        let by_priority: BTreeMap<_, _> = PreloadPriority::ALL
            .iter()
            .map(|p| (*p, state.counts[p.index()]))
            .collect();
        PreloadStatus {
            active: by_priority.values().map(|c| c.active).sum(),
            queued: by_priority.values().map(|c| c.queued).sum(),
            completed: by_priority.values().map(|c| c.completed).sum(),
            cancelled: state.cancelled,
            total: state.total,
            by_priority,
        }
    }

    /// Queued tasks in service order.
    pub fn queued_tasks(&self) -> Vec<PreloadTask> {
        lock(&self.state)
            .queues
            .iter()
            .flat_map(|q| q.iter().cloned())
            .collect()
    }

    async fn dispatch(self: Arc<Self>) {
        loop {
            match self.next_ready() {
                Some((task, slot)) => {
                    let this = Arc::clone(&self);
                    let mut state = lock(&self.state);
                    while state.running.try_join_next().is_some() {}
                    state.running.spawn(async move { this.run(task, slot).await });
                }
                None => self.wake.notified().await,
            }
        }
    }

    /// Pops the highest-priority task that can get a slot right now.
    fn next_ready(&self) -> Option<(PreloadTask, Slot)> {
        let mut state = lock(&self.state);
        state.sweep_cancelled();

        for priority in PreloadPriority::ALL {
            let idx = priority.index();
            let mut pos = 0;
            while pos < state.queues[idx].len() {
                let connection = state.queues[idx][pos].connection.clone();
                match self.try_slot(&mut state, &connection) {
                    Some(permit) => {
                        let task = state.queues[idx].remove(pos)?;
                        state.counts[idx].queued -= 1;
                        state.counts[idx].active += 1;
                        state
                            .active_paths
                            .insert((connection.clone(), task.path.clone()));
                        *state.active_by_connection.entry(connection).or_default() += 1;
                        let slot = Slot {
                            permit: Some(permit),
                            wake: Arc::clone(&self.wake),
                        };
                        return Some((task, slot));
                    }
                    // A global cap blocks every waiter alike.
                    None if !self.config.per_connection => return None,
                    None => pos += 1,
                }
            }
        }
        None
    }

    fn try_slot(
        &self,
        state: &mut SchedulerState,
        connection: &ConnectionId,
    ) -> Option<OwnedSemaphorePermit> {
        let slots = if self.config.per_connection {
            let cap = self.config.concurrency.max(1);
            Arc::clone(
                state
                    .connection_slots
                    .entry(connection.clone())
                    .or_insert_with(|| Arc::new(Semaphore::new(cap))),
            )
        } else {
            Arc::clone(&self.global_slots)
        };
        slots.try_acquire_owned().ok()
    }

    async fn run(self: Arc<Self>, task: PreloadTask, slot: Slot) {
        if self.is_cancelled(&task.connection) {
            self.finish(&task, false);
            drop(slot);
            return;
        }

        match self.cache.request(&task.connection, &task.path, true).await {
            Ok(snapshot) if task.depth > 0 => {
                let children: Vec<String> = snapshot
                    .subdirectories()
                    .take(MAX_CHILDREN_PER_TASK)
                    .map(|d| d.path().to_string())
                    .collect();
                for child in children {
                    self.enqueue(PreloadTask::new(
                        task.connection.clone(),
                        child,
                        task.priority.lower(),
                        task.depth - 1,
                    ));
                }
            }
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(connection = %task.connection, path = %task.path, error = %e, "preload failed");
            }
        }
        self.finish(&task, true);
        drop(slot);
    }

    fn finish(&self, task: &PreloadTask, completed: bool) {
        let mut state = lock(&self.state);
        let idx = task.priority.index();
        // Saturating: `shutdown` may have reset the counters already.
        state.counts[idx].active = state.counts[idx].active.saturating_sub(1);
        state
            .active_paths
            .remove(&(task.connection.clone(), task.path.clone()));
        if completed {
            state.counts[idx].completed += 1;
        } else {
            state.cancelled += 1;
        }
        if let Some(n) = state.active_by_connection.get_mut(&task.connection) {
            *n = n.saturating_sub(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::testing::{directory_with, MockRemote};
    use std::time::Duration;

    fn srv() -> ConnectionId {
        ConnectionId::from("srv")
    }

    fn setup(
        remotes: &[(&str, Arc<MockRemote>)],
        config: PreloadConfig,
        history: Arc<VisitHistory>,
    ) -> Arc<PreloadScheduler> {
        let cache = Arc::new(DirectoryCache::new(directory_with(remotes)));
        PreloadScheduler::new(config, cache, history)
    }

    fn capped(concurrency: usize) -> PreloadConfig {
        PreloadConfig {
            enabled: true,
            concurrency,
            per_connection: false,
        }
    }

    async fn wait_until_idle(scheduler: &PreloadScheduler) {
        for _ in 0..1000 {
            let status = scheduler.status();
            if status.active == 0 && status.queued == 0 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("scheduler never drained: {:?}", scheduler.status());
    }

    fn flat_remote(dirs: &[&str]) -> MockRemote {
        dirs.iter().fold(
            MockRemote::for_connection("srv").with_latency(Duration::from_millis(10)),
            |remote, dir| remote.with_dir(dir, &["file.txt"]),
        )
    }

    #[test]
    fn priority_lowering_saturates() {
        assert_eq!(PreloadPriority::Critical.lower(), PreloadPriority::High);
        assert_eq!(PreloadPriority::Low.lower(), PreloadPriority::Idle);
        assert_eq!(PreloadPriority::Idle.lower(), PreloadPriority::Idle);
        assert!(PreloadPriority::High < PreloadPriority::Low);
    }

    #[tokio::test(start_paused = true)]
    async fn running_tasks_never_exceed_cap() {
        let dirs = ["/d1", "/d2", "/d3", "/d4", "/d5"];
        let remote = Arc::new(flat_remote(&dirs));
        let scheduler = setup(
            &[("srv", Arc::clone(&remote))],
            capped(2),
            Arc::new(VisitHistory::new()),
        );
        scheduler.start();

        for dir in dirs {
            assert!(scheduler.enqueue(PreloadTask::new(srv(), dir, PreloadPriority::High, 0)));
        }
        wait_until_idle(&scheduler).await;

        assert_eq!(remote.max_in_flight(), 2);
        let status = scheduler.status();
        assert_eq!(status.completed, 5);
        assert_eq!(status.total, 5);
        assert_eq!(status.by_priority[&PreloadPriority::High].completed, 5);
        scheduler.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn higher_priority_fetch_starts_first() {
        let remote = Arc::new(flat_remote(&["/low", "/high"]));
        let scheduler = setup(
            &[("srv", Arc::clone(&remote))],
            capped(1),
            Arc::new(VisitHistory::new()),
        );
        scheduler.start();

        scheduler.enqueue(PreloadTask::new(srv(), "/low", PreloadPriority::Low, 0));
        scheduler.enqueue(PreloadTask::new(srv(), "/high", PreloadPriority::High, 0));
        wait_until_idle(&scheduler).await;

        assert_eq!(remote.list_calls(), vec!["/high", "/low"]);
        scheduler.shutdown();
    }

    #[tokio::test]
    async fn listing_candidates_ranked_by_visit_history() {
        let history = Arc::new(VisitHistory::new());
        history.record(&srv(), "/srv/g", true);
        let scheduler = setup(
            &[("srv", Arc::new(MockRemote::for_connection("srv")))],
            capped(1),
            history,
        );

        let entries = ["a", "b", "c", "d", "e", "f", "g"]
            .iter()
            .map(|n| crate::FileEntry::new(srv(), format!("/srv/{n}"), true))
            .chain(std::iter::once(crate::FileEntry::new(srv(), "/srv/x.txt", false)))
            .collect();
        scheduler.on_listing(&DirectorySnapshot::new(srv(), "/srv", entries));

        let queued = scheduler.queued_tasks();
        assert_eq!(queued.len(), 5);
        assert_eq!(queued[0].path, "/srv/a");
        assert_eq!(
            (queued[0].priority, queued[0].depth),
            (PreloadPriority::High, 1)
        );
        let frequent = queued.iter().find(|t| t.path == "/srv/g").unwrap();
        assert_eq!((frequent.priority, frequent.depth), (PreloadPriority::Medium, 2));
        assert!(queued.iter().all(|t| t.path != "/srv/x.txt"));
    }

    #[tokio::test(start_paused = true)]
    async fn completed_task_spawns_limited_children() {
        let remote = Arc::new(
            MockRemote::for_connection("srv")
                .with_dir("/root", &["c1/", "c2/", "c3/", "c4/"])
                .with_dir("/root/c1", &[])
                .with_dir("/root/c2", &[])
                .with_dir("/root/c3", &[])
                .with_dir("/root/c4", &[]),
        );
        let scheduler = setup(
            &[("srv", Arc::clone(&remote))],
            capped(1),
            Arc::new(VisitHistory::new()),
        );
        scheduler.start();

        scheduler.enqueue(PreloadTask::new(srv(), "/root", PreloadPriority::High, 1));
        wait_until_idle(&scheduler).await;

        assert_eq!(
            remote.list_calls(),
            vec!["/root", "/root/c1", "/root/c2", "/root/c3"]
        );
        let status = scheduler.status();
        assert_eq!(status.by_priority[&PreloadPriority::Medium].completed, 3);
        assert_eq!(status.total, 4);
        scheduler.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn failures_are_swallowed() {
        let remote = Arc::new(
            MockRemote::for_connection("srv")
                .with_failure("/denied", crate::RemoteError::PermissionDenied("/denied".into())),
        );
        let scheduler = setup(
            &[("srv", Arc::clone(&remote))],
            capped(1),
            Arc::new(VisitHistory::new()),
        );
        scheduler.start();

        scheduler.enqueue(PreloadTask::new(srv(), "/denied", PreloadPriority::High, 2));
        wait_until_idle(&scheduler).await;

        assert_eq!(scheduler.status().completed, 1);
        scheduler.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_connection_tasks_become_no_ops() {
        let a = Arc::new(flat_remote(&["/a1", "/a2"]));
        let b = Arc::new(
            MockRemote::for_connection("b").with_dir("/b1", &[]),
        );
        let scheduler = setup(
            &[("srv", Arc::clone(&a)), ("b", Arc::clone(&b))],
            capped(1),
            Arc::new(VisitHistory::new()),
        );
        let id_b = ConnectionId::from("b");

        scheduler.enqueue(PreloadTask::new(srv(), "/a1", PreloadPriority::High, 0));
        scheduler.enqueue(PreloadTask::new(srv(), "/a2", PreloadPriority::High, 0));
        scheduler.enqueue(PreloadTask::new(id_b.clone(), "/b1", PreloadPriority::Low, 0));
        scheduler.cancel(&srv());
        assert!(!scheduler.enqueue(PreloadTask::new(srv(), "/a3", PreloadPriority::High, 0)));

        scheduler.start();
        wait_until_idle(&scheduler).await;

        assert!(a.list_calls().is_empty());
        assert_eq!(b.list_calls(), vec!["/b1"]);
        let status = scheduler.status();
        assert_eq!(status.cancelled, 2);
        assert_eq!(status.completed, 1);

        scheduler.on_user_expand(&srv());
        assert!(!scheduler.is_cancelled(&srv()));
        assert!(scheduler.enqueue(PreloadTask::new(srv(), "/a1", PreloadPriority::High, 0)));
        scheduler.shutdown();
    }

    #[tokio::test]
    async fn user_expand_keeps_cancellation_while_work_remains() {
        let scheduler = setup(
            &[("srv", Arc::new(MockRemote::for_connection("srv")))],
            capped(1),
            Arc::new(VisitHistory::new()),
        );
        scheduler.enqueue(PreloadTask::new(srv(), "/x", PreloadPriority::High, 0));
        scheduler.cancel(&srv());

        scheduler.on_user_expand(&srv());
        assert!(scheduler.is_cancelled(&srv()));
    }

    #[tokio::test(start_paused = true)]
    async fn per_connection_cap_lets_other_connections_run() {
        let a = Arc::new(flat_remote(&["/a1", "/a2", "/a3"]));
        let b = Arc::new(
            MockRemote::for_connection("b")
                .with_dir("/b1", &[])
                .with_latency(Duration::from_millis(10)),
        );
        let scheduler = setup(
            &[("srv", Arc::clone(&a)), ("b", Arc::clone(&b))],
            PreloadConfig {
                enabled: true,
                concurrency: 1,
                per_connection: true,
            },
            Arc::new(VisitHistory::new()),
        );
        scheduler.start();

        for dir in ["/a1", "/a2", "/a3"] {
            scheduler.enqueue(PreloadTask::new(srv(), dir, PreloadPriority::High, 0));
        }
        scheduler.enqueue(PreloadTask::new(ConnectionId::from("b"), "/b1", PreloadPriority::Idle, 0));
        tokio::time::sleep(Duration::from_millis(1)).await;

        assert_eq!(scheduler.status().active, 2);
        wait_until_idle(&scheduler).await;
        assert_eq!(a.max_in_flight(), 1);
        assert_eq!(scheduler.status().completed, 4);
        scheduler.shutdown();
    }

    #[tokio::test]
    async fn disabled_scheduler_rejects_speculation_but_preloads_parent() {
        let remote = Arc::new(MockRemote::for_connection("srv").with_dir("/srv", &["app/"]));
        let scheduler = setup(
            &[("srv", Arc::clone(&remote))],
            PreloadConfig {
                enabled: false,
                ..capped(2)
            },
            Arc::new(VisitHistory::new()),
        );

        assert!(!scheduler.enqueue(PreloadTask::new(srv(), "/srv", PreloadPriority::High, 0)));
        scheduler.preload_parent(&srv(), "/srv/app");
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }

        assert!(scheduler.cache.contains(&srv(), "/srv"));
        assert_eq!(scheduler.status().total, 0);
    }

    #[tokio::test]
    async fn duplicate_and_cached_directories_are_not_requeued() {
        let remote = Arc::new(MockRemote::for_connection("srv").with_dir("/cached", &[]));
        let scheduler = setup(
            &[("srv", Arc::clone(&remote))],
            capped(1),
            Arc::new(VisitHistory::new()),
        );
        scheduler.cache.request(&srv(), "/cached", true).await.unwrap();

        assert!(scheduler.enqueue(PreloadTask::new(srv(), "/x", PreloadPriority::Low, 0)));
        assert!(!scheduler.enqueue(PreloadTask::new(srv(), "/x/", PreloadPriority::High, 1)));
        assert!(!scheduler.enqueue(PreloadTask::new(srv(), "/cached", PreloadPriority::High, 0)));
        assert!(scheduler.enqueue(PreloadTask::new(ConnectionId::from("b"), "/x", PreloadPriority::Low, 0)));

        let status = scheduler.status();
        assert_eq!(status.total, 2);
        assert_eq!(status.queued, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn running_task_is_not_requeued() {
        let remote = Arc::new(flat_remote(&["/slow"]));
        let scheduler = setup(
            &[("srv", Arc::clone(&remote))],
            capped(2),
            Arc::new(VisitHistory::new()),
        );
        scheduler.start();

        assert!(scheduler.enqueue(PreloadTask::new(srv(), "/slow", PreloadPriority::High, 0)));
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(scheduler.status().active, 1);
        assert!(!scheduler.enqueue(PreloadTask::new(srv(), "/slow", PreloadPriority::High, 0)));

        wait_until_idle(&scheduler).await;
        assert_eq!(remote.list_count("/slow"), 1);
        scheduler.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_releases_running_tasks() {
        let remote = Arc::new(
            MockRemote::for_connection("srv")
                .with_dir("/slow", &[])
                .with_latency(Duration::from_secs(10)),
        );
        let scheduler = setup(
            &[("srv", Arc::clone(&remote))],
            capped(2),
            Arc::new(VisitHistory::new()),
        );
        scheduler.start();
        scheduler.enqueue(PreloadTask::new(srv(), "/slow", PreloadPriority::High, 0));
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(scheduler.status().active, 1);

        scheduler.shutdown();

        let status = scheduler.status();
        assert_eq!(status.active, 0);
        assert_eq!(status.by_priority[&PreloadPriority::High].active, 0);
        assert_eq!(status.cancelled, 1);
    }

    #[tokio::test]
    async fn shutdown_drops_queued_work() {
        let scheduler = setup(
            &[("srv", Arc::new(MockRemote::for_connection("srv")))],
            capped(1),
            Arc::new(VisitHistory::new()),
        );
        scheduler.enqueue(PreloadTask::new(srv(), "/x", PreloadPriority::Idle, 0));
        scheduler.shutdown();

        let status = scheduler.status();
        assert_eq!(status.queued, 0);
        assert_eq!(status.cancelled, 1);
        assert!(!scheduler.is_enabled());
    }
}
