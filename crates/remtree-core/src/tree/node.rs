//! Nodes handed to the UI.

use crate::connection::{ConnectionId, ConnectionInfo};
use crate::filter::overlay::NodeDecoration;
use crate::fs::entry::FileEntry;
use crate::fs::path;

#[derive(Debug, Clone, PartialEq)]
pub enum TreeNode {
    /// A connected host; its children are the current path's entries.
    Connection { info: ConnectionInfo, expanded: bool },
    /// A host that is reconnecting. Has no children until it is back.
    Reconnecting { info: ConnectionInfo },
    Entry {
        entry: FileEntry,
        decoration: NodeDecoration,
        expanded: bool,
    },
    /// Goes to the parent of the connection's current path.
    NavigateUp { connection: ConnectionId, target: String },
    /// Placeholder while `path` is being listed.
    Loading { connection: ConnectionId, path: String },
    /// Listing `path` failed.
    Error {
        connection: ConnectionId,
        path: String,
        message: String,
    },
    /// Header above the children of an active per-folder filter's base.
    FilterResults {
        connection: ConnectionId,
        base: String,
        pattern: String,
        matches: usize,
    },
}

impl TreeNode {
    pub fn connection(&self) -> &ConnectionId {
        match self {
            Self::Connection { info, .. } | Self::Reconnecting { info } => &info.id,
            Self::Entry { entry, .. } => entry.connection(),
            Self::NavigateUp { connection, .. }
            | Self::Loading { connection, .. }
            | Self::Error { connection, .. }
            | Self::FilterResults { connection, .. } => connection,
        }
    }

    /// Text a UI would show for the node.
    pub fn label(&self) -> String {
        match self {
            Self::Connection { info, .. } => info.label.clone(),
            Self::Reconnecting { info } => format!("{} (reconnecting)", info.label),
            Self::Entry { entry, .. } if entry.is_dir() => format!("{}/", entry.name()),
            Self::Entry { entry, .. } => entry.name().to_string(),
            Self::NavigateUp { .. } => "..".to_string(),
            Self::Loading { .. } => "loading…".to_string(),
            Self::Error { message, .. } => format!("error: {message}"),
            Self::FilterResults {
                pattern, matches, ..
            } => format!("filter \"{pattern}\": {matches} matches"),
        }
    }

    /// Returns `true` for nodes that can have children.
    pub fn is_expandable(&self) -> bool {
        match self {
            Self::Connection { .. } => true,
            Self::Entry { entry, .. } => entry.is_dir(),
            _ => false,
        }
    }

    pub fn is_expanded(&self) -> bool {
        matches!(
            self,
            Self::Connection { expanded: true, .. } | Self::Entry { expanded: true, .. }
        )
    }

    /// The remote path the node stands for, if any.
    pub fn path(&self) -> Option<&str> {
        match self {
            Self::Entry { entry, .. } => Some(entry.path()),
            Self::NavigateUp { target, .. } => Some(target),
            Self::Loading { path, .. } | Self::Error { path, .. } => Some(path),
            Self::FilterResults { base, .. } => Some(base),
            Self::Connection { .. } | Self::Reconnecting { .. } => None,
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.path().map(path::file_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::ConnectionState;

    fn info(state: ConnectionState) -> ConnectionInfo {
        ConnectionInfo {
            id: ConnectionId::from("srv"),
            label: "me@srv".to_string(),
            state,
        }
    }

    #[test]
    fn labels() {
        let conn = TreeNode::Connection {
            info: info(ConnectionState::Connected),
            expanded: false,
        };
        assert_eq!(conn.label(), "me@srv");
        assert_eq!(
            TreeNode::Reconnecting {
                info: info(ConnectionState::Reconnecting)
            }
            .label(),
            "me@srv (reconnecting)"
        );

        let dir = TreeNode::Entry {
            entry: FileEntry::new(ConnectionId::from("srv"), "/etc", true),
            decoration: NodeDecoration::default(),
            expanded: true,
        };
        assert_eq!(dir.label(), "etc/");
        assert!(dir.is_expandable() && dir.is_expanded());
        assert_eq!(dir.name(), Some("etc"));
        assert_eq!(dir.connection().as_str(), "srv");
    }

    #[test]
    fn placeholders_are_leaves() {
        let loading = TreeNode::Loading {
            connection: ConnectionId::from("srv"),
            path: "/var".into(),
        };
        assert!(!loading.is_expandable());
        assert_eq!(loading.path(), Some("/var"));

        let header = TreeNode::FilterResults {
            connection: ConnectionId::from("srv"),
            base: "/srv/logs".into(),
            pattern: "*.log".into(),
            matches: 3,
        };
        assert!(!header.is_expandable());
        assert_eq!(header.label(), "filter \"*.log\": 3 matches");
    }
}
