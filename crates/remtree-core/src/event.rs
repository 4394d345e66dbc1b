//! Tree change notifications.

use tokio::sync::broadcast;

use crate::connection::ConnectionId;

/// Buffered notifications per subscriber before the oldest are dropped.
const CHANNEL_CAPACITY: usize = 64;

/// What part of the tree must be re-materialized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeChange {
    /// Structural change: rebuild everything.
    All,
    /// Only one connection's subtree changed.
    Connection(ConnectionId),
}

/// Fan-out of [`TreeChange`]s to every subscribed view.
#[derive(Debug, Clone)]
pub struct ChangeNotifier {
    tx: broadcast::Sender<TreeChange>,
}

impl ChangeNotifier {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TreeChange> {
        self.tx.subscribe()
    }

    pub fn notify_all(&self) {
        self.send(TreeChange::All);
    }

    pub fn notify_connection(&self, connection: &ConnectionId) {
        self.send(TreeChange::Connection(connection.clone()));
    }

    fn send(&self, change: TreeChange) {
        // No subscribers yet is not an error.
        let _ = self.tx.send(change);
    }
}

impl Default for ChangeNotifier {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_see_changes_in_order() {
        let notifier = ChangeNotifier::new();
        let mut rx = notifier.subscribe();
        notifier.notify_all();
        notifier.notify_connection(&ConnectionId::from("srv"));

        assert_eq!(rx.recv().await.unwrap(), TreeChange::All);
        assert_eq!(
            rx.recv().await.unwrap(),
            TreeChange::Connection(ConnectionId::from("srv"))
        );
    }

    #[test]
    fn sending_without_subscribers_is_fine() {
        ChangeNotifier::new().notify_all();
    }
}
