//! remtree core library: a lazy, cached, filterable directory tree over
//! remote filesystems.
//!
//! `remtree-core` is UI-agnostic: a frontend asks the
//! [`TreeMaterializer`] for children on demand, listens for [`TreeChange`]s
//! and drives user actions through the [`NavigationEngine`].
//!
//! # Modules
//!
//! - [`cache`]: Deduplicating session cache of directory listings.
//! - [`preload`]: Priority-based speculative prefetch with a concurrency cap.
//! - [`filter`]: Quick filter, per-folder filters and remote search.
//! - [`nav`]: Current paths, expand state, visit history and path reveal.
//! - [`tree`]: Materialization of tree nodes for a UI.
//! - [`remote`]: The [`RemoteAccess`] seam and its SFTP implementation.
//! - [`connection`]: Connection registry and debounced reconciliation.
//! - [`session`]: Wiring of all of the above.
//! - [`config`]: TOML settings.
//! - [`error`]: Error types ([`CoreError`], [`RemoteError`]).

pub mod cache;
pub mod config;
pub mod connection;
pub mod error;
pub mod event;
pub mod filter;
pub mod fs;
pub mod nav;
pub mod preload;
pub mod remote;
pub mod session;
pub mod tree;

mod sync;

pub use cache::{DirectoryCache, DirectorySnapshot};
pub use config::settings::Config;
pub use connection::{
    ConnectionDirectory, ConnectionId, ConnectionInfo, ConnectionState, ConnectivityChange,
};
pub use error::{CoreError, CoreResult, RemoteError};
pub use event::TreeChange;
pub use filter::folder::{FilterMode, FolderFilter};
pub use filter::overlay::{FilterOverlay, NodeDecoration};
pub use fs::entry::{sort_entries, FileEntry};
pub use nav::engine::NavigationEngine;
pub use nav::history::VisitHistory;
pub use nav::reveal::{RevealReport, RevealStrategy};
pub use nav::state::{CurrentPath, ExpandKey};
pub use preload::{PreloadPriority, PreloadScheduler, PreloadStatus, PreloadTask};
pub use remote::sftp::{SftpConfig, SftpRemote};
pub use remote::RemoteAccess;
pub use session::Session;
pub use tree::materializer::TreeMaterializer;
pub use tree::node::TreeNode;
