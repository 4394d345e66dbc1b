//! On-demand tree materialization.
//!
//! [`TreeMaterializer::get_children`] never waits on the network. A
//! directory that is not cached yields a [`TreeNode::Loading`] placeholder
//! and a background load; when it lands a [`TreeChange`] asks the UI to
//! render again.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use tokio::sync::broadcast;

use crate::config::settings::TreeConfig;
use crate::connection::{ConnectionId, ConnectionState};
use crate::event::TreeChange;
use crate::fs::entry::{sort_entries, FileEntry};
use crate::fs::path;
use crate::nav::engine::NavigationEngine;
use crate::nav::state::{ExpandKey, HOME_MARKER};
use crate::sync::lock;
use crate::tree::node::TreeNode;

pub struct TreeMaterializer {
    engine: Arc<NavigationEngine>,
    config: TreeConfig,
    /// Auto-expand keys taken at the start of the current pass.
    pass_expand: Mutex<HashSet<ExpandKey>>,
}

impl TreeMaterializer {
    pub fn new(engine: Arc<NavigationEngine>, config: TreeConfig) -> Self {
        Self {
            engine,
            config,
            pass_expand: Mutex::new(HashSet::new()),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TreeChange> {
        self.engine.notifier().subscribe()
    }

    /// Children of `node`, or the connection nodes for `None`.
    ///
    /// The root call starts a new pass: it consumes any pending one-shot
    /// auto-expand set, which then applies until the next root call.
    pub fn get_children(&self, node: Option<&TreeNode>) -> Vec<TreeNode> {
        match node {
            None => {
                *lock(&self.pass_expand) = self.engine.state().take_auto_expand();
                self.connection_nodes()
            }
            Some(TreeNode::Connection { info, .. }) => self.connection_children(&info.id),
            Some(TreeNode::Entry { entry, .. }) if entry.is_dir() => {
                self.directory_children(entry.connection(), entry.path(), false)
            }
            Some(_) => Vec::new(),
        }
    }

    /// The node `node` hangs under, or `None` for top-level nodes and
    /// entries outside the connection's current path.
    pub fn get_parent(&self, node: &TreeNode) -> Option<TreeNode> {
        let connection = node.connection();
        match node {
            TreeNode::Connection { .. } | TreeNode::Reconnecting { .. } => None,
            TreeNode::NavigateUp { .. } => self.connection_node(connection),
            TreeNode::Loading { path, .. }
            | TreeNode::Error { path, .. }
            | TreeNode::FilterResults { base: path, .. } => self.directory_node(connection, path),
            TreeNode::Entry { entry, .. } => {
                let parent = path::parent(entry.path())?;
                self.directory_node(connection, &parent)
            }
        }
    }

    pub fn is_expanded(&self, key: &ExpandKey) -> bool {
        self.engine.state().is_expanded(key) || lock(&self.pass_expand).contains(key)
    }

    fn connection_nodes(&self) -> Vec<TreeNode> {
        self.engine
            .connections()
            .list()
            .into_iter()
            .map(|info| match info.state {
                ConnectionState::Connected => TreeNode::Connection {
                    expanded: self.is_expanded(&ExpandKey::Connection(info.id.clone())),
                    info,
                },
                ConnectionState::Reconnecting => TreeNode::Reconnecting { info },
            })
            .collect()
    }

    fn connection_node(&self, connection: &ConnectionId) -> Option<TreeNode> {
        let info = self.engine.connections().info(connection)?;
        Some(match info.state {
            ConnectionState::Connected => TreeNode::Connection {
                expanded: self.is_expanded(&ExpandKey::Connection(connection.clone())),
                info,
            },
            ConnectionState::Reconnecting => TreeNode::Reconnecting { info },
        })
    }

    /// The node showing `dir`: the connection itself for its current path,
    /// an entry for directories below it.
    fn directory_node(&self, connection: &ConnectionId, dir: &str) -> Option<TreeNode> {
        let current = self
            .engine
            .state()
            .current_dir(connection)
            .unwrap_or_else(|| HOME_MARKER.to_string());
        if path::normalize(dir) == current {
            return self.connection_node(connection);
        }
        if !path::is_strictly_within(dir, &current) {
            return None;
        }
        let entry = self.lookup_entry(connection, dir);
        Some(self.entry_node(entry))
    }

    fn lookup_entry(&self, connection: &ConnectionId, dir: &str) -> FileEntry {
        let dir = path::normalize(dir);
        path::parent(&dir)
            .and_then(|parent| self.engine.cache().get(connection, &parent))
            .and_then(|snapshot| snapshot.entries().iter().find(|e| e.path() == dir).cloned())
            .unwrap_or_else(|| FileEntry::new(connection.clone(), dir, true))
    }

    fn connection_children(&self, connection: &ConnectionId) -> Vec<TreeNode> {
        match self.engine.state().current_dir(connection) {
            Some(dir) => self.directory_children(connection, &dir, true),
            None => {
                self.engine.resolve_in_background(connection);
                vec![TreeNode::Loading {
                    connection: connection.clone(),
                    path: HOME_MARKER.to_string(),
                }]
            }
        }
    }

    fn directory_children(
        &self,
        connection: &ConnectionId,
        dir: &str,
        with_up: bool,
    ) -> Vec<TreeNode> {
        let mut nodes = Vec::new();
        if with_up {
            if let Some(parent) = path::parent(dir) {
                nodes.push(TreeNode::NavigateUp {
                    connection: connection.clone(),
                    target: parent,
                });
            }
        }

        // A listing cached since the failure, e.g. by a preload, wins.
        let Some(snapshot) = self.engine.cache().get(connection, dir) else {
            if let Some(err) = self.engine.failure(connection, dir) {
                nodes.push(TreeNode::Error {
                    connection: connection.clone(),
                    path: path::normalize(dir),
                    message: err.to_string(),
                });
                return nodes;
            }
            self.engine.load_in_background(connection, dir);
            nodes.push(TreeNode::Loading {
                connection: connection.clone(),
                path: path::normalize(dir),
            });
            return nodes;
        };

        if let Some(header) = self.filter_header(connection, dir) {
            nodes.push(header);
        }
        let shown: Vec<FileEntry> = snapshot
            .entries()
            .iter()
            .filter(|e| self.config.show_hidden || !e.is_hidden())
            .cloned()
            .collect();
        nodes.extend(
            sort_entries(&shown, self.config.dirs_first)
                .into_iter()
                .map(|entry| self.entry_node(entry))
                .filter(|node| match node {
                    TreeNode::Entry { decoration, .. } => decoration.visible,
                    _ => true,
                }),
        );
        nodes
    }

    fn filter_header(&self, connection: &ConnectionId, dir: &str) -> Option<TreeNode> {
        let overlay = self.engine.overlay();
        let filter = overlay
            .folder_filter(connection, dir)
            .filter(|f| f.is_enabled())?;
        Some(TreeNode::FilterResults {
            connection: connection.clone(),
            base: filter.base().to_string(),
            pattern: filter.pattern().to_string(),
            matches: filter.match_total(),
        })
    }

    fn entry_node(&self, entry: FileEntry) -> TreeNode {
        let decoration = self.engine.overlay().decorate(&entry);
        let expanded =
            entry.is_dir() && self.is_expanded(&ExpandKey::directory(entry.connection(), entry.path()));
        TreeNode::Entry {
            entry,
            decoration,
            expanded,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::folder::{FilterMode, FolderFilter};
    use crate::nav::engine::tests::engine_for;
    use crate::remote::testing::MockRemote;
    use crate::remote::RemoteError;

    fn srv() -> ConnectionId {
        ConnectionId::from("srv")
    }

    fn tree() -> MockRemote {
        MockRemote::for_connection("srv")
            .with_home("/home/user")
            .with_dir("/", &["home/", "var/"])
            .with_dir("/home", &["user/"])
            .with_dir("/home/user", &["notes.txt", ".bashrc", "projects/", "App.ts"])
            .with_dir("/home/user/projects", &["app.ts"])
            .with_dir("/var", &["log/"])
            .with_dir("/var/log", &["app.log"])
            .with_failure("/var/secret", RemoteError::PermissionDenied("/var/secret".into()))
    }

    fn labels(nodes: &[TreeNode]) -> Vec<String> {
        nodes.iter().map(TreeNode::label).collect()
    }

    fn connection_node(m: &TreeMaterializer) -> TreeNode {
        m.get_children(None).remove(0)
    }

    #[tokio::test]
    async fn lists_current_path_sorted_with_up_link() {
        let (engine, _remote) = engine_for(tree());
        engine.navigate(&srv(), "/home/user").await.unwrap();
        let m = TreeMaterializer::new(engine, TreeConfig::default());

        let root = m.get_children(None);
        assert_eq!(labels(&root), vec!["user@srv"]);

        let children = m.get_children(Some(&root[0]));
        assert_eq!(
            labels(&children),
            vec!["..", "projects/", ".bashrc", "App.ts", "notes.txt"]
        );
    }

    #[tokio::test]
    async fn hidden_entries_dropped_when_configured() {
        let (engine, _remote) = engine_for(tree());
        engine.navigate(&srv(), "/home/user").await.unwrap();
        let config = TreeConfig {
            show_hidden: false,
            dirs_first: false,
            ..TreeConfig::default()
        };
        let m = TreeMaterializer::new(engine, config);

        let children = m.get_children(Some(&connection_node(&m)));
        assert_eq!(
            labels(&children),
            vec!["..", "App.ts", "notes.txt", "projects/"]
        );
    }

    #[tokio::test]
    async fn quick_filter_keeps_directories() {
        let (engine, _remote) = engine_for(tree());
        engine.navigate(&srv(), "/home/user").await.unwrap();
        engine.set_quick_filter("*.ts");
        let m = TreeMaterializer::new(engine, TreeConfig::default());

        let children = m.get_children(Some(&connection_node(&m)));
        assert_eq!(labels(&children), vec!["..", "projects/", "App.ts"]);
    }

    #[tokio::test]
    async fn folder_filter_dims_and_counts() {
        let (engine, _remote) = engine_for(tree());
        engine.navigate(&srv(), "/home/user").await.unwrap();
        let mut filter = FolderFilter::new(srv(), "/home/user", "app*", FilterMode::Both);
        filter.add_match("/home/user/projects/app.ts");
        engine.overlay().insert_folder_filter(filter);
        let m = TreeMaterializer::new(engine, TreeConfig::default());

        let children = m.get_children(Some(&connection_node(&m)));
        let projects = children
            .iter()
            .find(|n| n.name() == Some("projects"))
            .unwrap();
        let TreeNode::Entry { decoration, .. } = projects else {
            panic!("expected an entry");
        };
        assert!(decoration.highlighted);
        assert_eq!(decoration.match_count, 1);
        assert_eq!(children[1].label(), "filter \"app*\": 1 matches");
        assert_eq!(m.get_parent(&children[1]).map(|n| n.label()), Some("user@srv".to_string()));

        let notes = children
            .iter()
            .find(|n| n.name() == Some("notes.txt"))
            .unwrap();
        let TreeNode::Entry { decoration, .. } = notes else {
            panic!("expected an entry");
        };
        assert!(decoration.visible && decoration.dimmed);
    }

    #[tokio::test]
    async fn uncached_directory_loads_in_background() {
        let (engine, _remote) = engine_for(tree());
        engine.navigate(&srv(), "/").await.unwrap();
        let m = TreeMaterializer::new(engine, TreeConfig::default());
        let var = m
            .get_children(Some(&connection_node(&m)))
            .into_iter()
            .find(|n| n.name() == Some("var"))
            .unwrap();

        let mut changes = m.subscribe();
        assert!(matches!(
            m.get_children(Some(&var)).as_slice(),
            [TreeNode::Loading { .. }]
        ));
        assert_eq!(changes.recv().await.unwrap(), TreeChange::Connection(srv()));
        assert_eq!(labels(&m.get_children(Some(&var))), vec!["log/"]);
    }

    #[tokio::test]
    async fn failed_directory_shows_error_node() {
        let (engine, _remote) = engine_for(tree());
        let _ = engine.navigate(&srv(), "/var/secret").await;
        let m = TreeMaterializer::new(engine, TreeConfig::default());
        let secret = TreeNode::Entry {
            entry: FileEntry::new(srv(), "/var/secret", true),
            decoration: Default::default(),
            expanded: true,
        };

        let children = m.get_children(Some(&secret));
        assert!(matches!(children.as_slice(), [TreeNode::Error { .. }]));
    }

    #[tokio::test]
    async fn cached_listing_replaces_earlier_failure() {
        let remote = tree().with_dir("/var/secret", &["key"]);
        let (engine, remote) = engine_for(remote);
        assert!(engine.navigate(&srv(), "/var/secret").await.is_err());
        remote.clear_failure("/var/secret");
        engine.cache().request(&srv(), "/var/secret", true).await.unwrap();
        let m = TreeMaterializer::new(engine, TreeConfig::default());
        let secret = TreeNode::Entry {
            entry: FileEntry::new(srv(), "/var/secret", true),
            decoration: Default::default(),
            expanded: true,
        };

        assert_eq!(labels(&m.get_children(Some(&secret))), vec!["key"]);
    }

    #[tokio::test]
    async fn resolved_home_warms_its_parent() {
        let (engine, remote) = engine_for(tree());
        let m = TreeMaterializer::new(Arc::clone(&engine), TreeConfig::default());
        let conn = connection_node(&m);
        let mut changes = m.subscribe();

        m.get_children(Some(&conn));
        assert_eq!(changes.recv().await.unwrap(), TreeChange::Connection(srv()));
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }

        assert!(engine.cache().contains(&srv(), "/home"));
        assert_eq!(remote.list_count("/home"), 1);
    }

    #[tokio::test]
    async fn unresolved_home_resolves_in_background() {
        let (engine, _remote) = engine_for(tree());
        let m = TreeMaterializer::new(engine, TreeConfig::default());
        let conn = connection_node(&m);
        let mut changes = m.subscribe();

        assert!(matches!(
            m.get_children(Some(&conn)).as_slice(),
            [TreeNode::Loading { .. }]
        ));
        assert_eq!(changes.recv().await.unwrap(), TreeChange::Connection(srv()));
        assert_eq!(m.get_children(Some(&conn)).len(), 5);
    }

    #[tokio::test]
    async fn reveal_auto_expand_applies_for_one_pass() {
        let (engine, _remote) = engine_for(tree());
        engine.navigate(&srv(), "/home/user").await.unwrap();
        engine.reveal(&srv(), "/var/log/app.log").await.unwrap();
        let m = TreeMaterializer::new(engine, TreeConfig::default());

        let conn = connection_node(&m);
        assert!(conn.is_expanded());
        let var = m
            .get_children(Some(&conn))
            .into_iter()
            .find(|n| n.name() == Some("var"))
            .unwrap();
        assert!(var.is_expanded());
        assert_eq!(labels(&m.get_children(Some(&var))), vec!["log/"]);

        let conn = connection_node(&m);
        assert!(!conn.is_expanded());
        assert!(!m.is_expanded(&ExpandKey::directory(&srv(), "/var")));
    }

    #[tokio::test]
    async fn parents_walk_back_to_the_connection() {
        let (engine, _remote) = engine_for(tree());
        engine.navigate(&srv(), "/home").await.unwrap();
        engine.expand(ExpandKey::directory(&srv(), "/home/user")).await.unwrap();
        let m = TreeMaterializer::new(engine, TreeConfig::default());

        let conn = connection_node(&m);
        let user = m
            .get_children(Some(&conn))
            .into_iter()
            .find(|n| n.name() == Some("user"))
            .unwrap();
        let notes = m
            .get_children(Some(&user))
            .into_iter()
            .find(|n| n.name() == Some("notes.txt"))
            .unwrap();

        assert_eq!(m.get_parent(&notes), Some(user.clone()));
        assert_eq!(m.get_parent(&user).map(|n| n.label()), Some("user@srv".to_string()));
        assert_eq!(m.get_parent(&conn), None);

        let outside = TreeNode::Entry {
            entry: FileEntry::new(srv(), "/var/log", true),
            decoration: Default::default(),
            expanded: false,
        };
        assert_eq!(m.get_parent(&outside), None);
    }
}
