//! Connection directory and connectivity reconciliation.
//!
//! [`ConnectionDirectory`] enumerates the active and reconnecting remote
//! connections together with their [`RemoteAccess`] handles. Every change is
//! reported as a [`ConnectivityChange`]; [`spawn_reconciler`] coalesces bursts
//! of those changes into a single [`Reconciliation`] pass.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;

use crate::remote::{RemoteAccess, RemoteError};
use crate::sync::lock;

/// Stable identity of a remote connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(String);

impl ConnectionId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ConnectionId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for ConnectionId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Liveness of a connection as seen by the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connected,
    Reconnecting,
}

/// Display metadata for one connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionInfo {
    pub id: ConnectionId,
    /// Human-readable label such as `"user@host"`.
    pub label: String,
    pub state: ConnectionState,
}

/// A change in the set or state of connections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectivityChange {
    /// Connections were added or removed.
    Structural,
    /// One connection changed state without the set changing.
    State(ConnectionId),
}

/// The work a coalesced burst of [`ConnectivityChange`]s requires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reconciliation {
    /// Re-materialize everything.
    Full,
    /// Re-materialize only these connections' subtrees.
    Connections(BTreeSet<ConnectionId>),
}

impl Reconciliation {
    fn from_change(change: ConnectivityChange) -> Self {
        match change {
            ConnectivityChange::Structural => Self::Full,
            ConnectivityChange::State(id) => Self::Connections(BTreeSet::from([id])),
        }
    }

    fn merge(&mut self, change: ConnectivityChange) {
        match (self, change) {
            (this, ConnectivityChange::Structural) => *this = Self::Full,
            (Self::Connections(ids), ConnectivityChange::State(id)) => {
                ids.insert(id);
            }
            (Self::Full, ConnectivityChange::State(_)) => {}
        }
    }
}

struct Registered {
    info: ConnectionInfo,
    remote: Arc<dyn RemoteAccess>,
}

/// Registry of remote connections in insertion order.
pub struct ConnectionDirectory {
    connections: Mutex<Vec<Registered>>,
    changes: UnboundedSender<ConnectivityChange>,
}

impl ConnectionDirectory {
    /// Creates an empty directory and the receiver of its change stream.
    pub fn new() -> (Self, UnboundedReceiver<ConnectivityChange>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let directory = Self {
            connections: Mutex::new(Vec::new()),
            changes: tx,
        };
        (directory, rx)
    }

    /// Registers (or replaces) a connection.
    pub fn add(&self, info: ConnectionInfo, remote: Arc<dyn RemoteAccess>) {
        {
            let mut connections = lock(&self.connections);
            connections.retain(|c| c.info.id != info.id);
            connections.push(Registered { info, remote });
        }
        self.notify(ConnectivityChange::Structural);
    }

    /// Removes a connection. Returns `false` if it was not registered.
    pub fn remove(&self, id: &ConnectionId) -> bool {
        let removed = {
            let mut connections = lock(&self.connections);
            let before = connections.len();
            connections.retain(|c| &c.info.id != id);
            connections.len() != before
        };
        if removed {
            self.notify(ConnectivityChange::Structural);
        }
        removed
    }

    /// Updates a connection's state, notifying only on an actual change.
    pub fn set_state(&self, id: &ConnectionId, state: ConnectionState) {
        let changed = {
            let mut connections = lock(&self.connections);
            match connections.iter_mut().find(|c| &c.info.id == id) {
                Some(c) if c.info.state != state => {
                    c.info.state = state;
                    true
                }
                _ => false,
            }
        };
        if changed {
            self.notify(ConnectivityChange::State(id.clone()));
        }
    }

    /// Snapshot of all connections, active and reconnecting.
    pub fn list(&self) -> Vec<ConnectionInfo> {
        lock(&self.connections)
            .iter()
            .map(|c| c.info.clone())
            .collect()
    }

    pub fn info(&self, id: &ConnectionId) -> Option<ConnectionInfo> {
        lock(&self.connections)
            .iter()
            .find(|c| &c.info.id == id)
            .map(|c| c.info.clone())
    }

    /// The remote handle for `id`.
    pub fn remote(&self, id: &ConnectionId) -> Result<Arc<dyn RemoteAccess>, RemoteError> {
        lock(&self.connections)
            .iter()
            .find(|c| &c.info.id == id)
            .map(|c| Arc::clone(&c.remote))
            .ok_or_else(|| RemoteError::UnknownConnection(id.to_string()))
    }

    fn notify(&self, change: ConnectivityChange) {
        // Nobody listening is fine: the directory is still usable standalone.
        let _ = self.changes.send(change);
    }
}

/// Spawns a task that coalesces connectivity changes.
///
/// The first change of a burst opens a `window`; every change arriving
/// before it closes is merged, then `on_pass` runs once. The task ends when
/// the sending side is dropped.
pub fn spawn_reconciler<F>(
    mut rx: UnboundedReceiver<ConnectivityChange>,
    window: Duration,
    mut on_pass: F,
) -> JoinHandle<()>
where
    F: FnMut(Reconciliation) + Send + 'static,
{
    tokio::spawn(async move {
        while let Some(first) = rx.recv().await {
            let mut pass = Reconciliation::from_change(first);
            let deadline = tokio::time::Instant::now() + window;
            let mut closed = false;
            loop {
                match tokio::time::timeout_at(deadline, rx.recv()).await {
                    Ok(Some(change)) => pass.merge(change),
                    Ok(None) => {
                        closed = true;
                        break;
                    }
                    Err(_) => break,
                }
            }
            tracing::debug!(?pass, "reconciling connectivity changes");
            on_pass(pass);
            if closed {
                break;
            }
        }
    })
}
