//! remtree prints a remote directory tree built by `remtree-core`.
//!
//! Connects every host listed in the config file, renders each connection's
//! tree down to a fixed depth and optionally reveals one path first.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::Parser;
use tokio::sync::broadcast;
use tracing_subscriber::EnvFilter;

use remtree_core::{
    Config, ConnectionDirectory, ConnectionId, ConnectionInfo, ConnectionState, ExpandKey,
    FilterMode, Session, SftpConfig, SftpRemote, TreeChange, TreeMaterializer, TreeNode,
    VisitHistory,
};

/// Rendering rounds spent waiting for background listings.
const MAX_RENDER_ROUNDS: usize = 20;
const LOAD_WAIT: Duration = Duration::from_secs(5);

/// Print directory trees of remote hosts.
#[derive(Parser, Debug)]
#[command(name = "remtree", version, about)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, default_value = "remtree.toml")]
    config: PathBuf,

    /// Reveal a path before printing, as `connection:/absolute/path`
    #[arg(long)]
    reveal: Option<String>,

    /// Directory levels to print below each connection
    #[arg(short, long, default_value_t = 1)]
    depth: usize,

    /// Quick filter pattern (substring or glob)
    #[arg(short, long)]
    filter: Option<String>,

    /// Per-folder filter, as `connection:/base=pattern`
    #[arg(long)]
    folder_filter: Option<String>,

    /// Visit history file, loaded at start and saved on exit
    #[arg(long)]
    history: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::load(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    if config.connections.is_empty() {
        bail!("no [[connections]] configured in {}", cli.config.display());
    }

    let history = match &cli.history {
        Some(file) if file.exists() => Arc::new(
            VisitHistory::load_from_file(file)
                .with_context(|| format!("loading history {}", file.display()))?,
        ),
        _ => Arc::new(VisitHistory::new()),
    };

    let (directory, changes) = ConnectionDirectory::new();
    for conn in &config.connections {
        let sftp = SftpConfig {
            host: conn.host.clone(),
            port: conn.port,
            username: conn.username.clone(),
            password: conn.password.clone(),
        };
        let label = sftp.display_label();
        let id = ConnectionId::from(conn.id.as_str());
        match SftpRemote::connect(id.clone(), sftp).await {
            Ok(remote) => directory.add(
                ConnectionInfo {
                    id,
                    label,
                    state: ConnectionState::Connected,
                },
                Arc::new(remote),
            ),
            Err(e) => tracing::warn!(connection = %id, error = %e, "skipping connection"),
        }
    }

    let session = Session::start(config, Arc::new(directory), changes, Arc::clone(&history));
    let engine = session.engine();
    let mut updates = session.subscribe();

    for info in session.connections().list() {
        if let Err(e) = engine.go_home(&info.id).await {
            tracing::warn!(connection = %info.id, error = %e, "cannot list home directory");
        }
        engine.expand(ExpandKey::Connection(info.id)).await?;
    }

    if let Some(pattern) = &cli.filter {
        engine.set_quick_filter(pattern);
    }

    if let Some(spec) = &cli.folder_filter {
        let (target, pattern) = spec
            .split_once('=')
            .context("--folder-filter expects connection:/base=pattern")?;
        let (connection, base) = parse_target(target)?;
        let matches = engine
            .apply_folder_filter(&connection, &base, pattern, FilterMode::Files)
            .await;
        tracing::info!(%connection, base = %base, pattern, matches, "folder filter applied");
    }

    if let Some(target) = &cli.reveal {
        let (connection, target) = parse_target(target)?;
        let report = engine.reveal(&connection, &target).await?;
        tracing::info!(
            %connection,
            path = %target,
            strategy = ?report.strategy,
            loaded = report.loaded.len(),
            "revealed"
        );
        if let Some((dir, err)) = &report.stopped_at {
            eprintln!("reveal stopped at {dir}: {err}");
        }
    }

    let lines = render_settled(session.tree(), cli.depth, &mut updates).await;
    for line in lines {
        println!("{line}");
    }

    if let Some(file) = &cli.history {
        history
            .save_to_file(file)
            .with_context(|| format!("saving history {}", file.display()))?;
    }
    session.shutdown();
    Ok(())
}

/// Splits `connection:/path`.
fn parse_target(spec: &str) -> anyhow::Result<(ConnectionId, String)> {
    match spec.split_once(':') {
        Some((connection, path)) if !connection.is_empty() && path.starts_with('/') => {
            Ok((ConnectionId::from(connection), path.to_string()))
        }
        _ => bail!("expected connection:/absolute/path, got {spec:?}"),
    }
}

/// Renders until no `Loading` placeholder is left or the rounds run out.
///
/// Connection nodes are fetched once so a pending reveal expansion applies
/// to every round.
async fn render_settled(
    tree: &TreeMaterializer,
    depth: usize,
    updates: &mut broadcast::Receiver<TreeChange>,
) -> Vec<String> {
    let roots = tree.get_children(None);
    let mut lines = Vec::new();
    for _ in 0..MAX_RENDER_ROUNDS {
        lines.clear();
        let mut loading = 0;
        for root in &roots {
            render_node(tree, root, 0, depth, &mut lines, &mut loading);
        }
        if loading == 0 {
            break;
        }
        if tokio::time::timeout(LOAD_WAIT, updates.recv()).await.is_err() {
            tracing::warn!(loading, "gave up waiting for listings");
            break;
        }
    }
    lines
}

fn render_node(
    tree: &TreeMaterializer,
    node: &TreeNode,
    level: usize,
    depth: usize,
    lines: &mut Vec<String>,
    loading: &mut usize,
) {
    let mut line = format!("{}{}", "  ".repeat(level), node.label());
    if let TreeNode::Entry { decoration, .. } = node {
        if decoration.match_count > 0 {
            line.push_str(&format!(" ({})", decoration.match_count));
        }
        if decoration.highlighted {
            line.push_str(" *");
        } else if decoration.dimmed || decoration.empty_after_filter {
            line.push_str(" ~");
        }
    }
    if matches!(node, TreeNode::Loading { .. }) {
        *loading += 1;
    }
    lines.push(line);

    if !node.is_expandable() || (level >= depth && !node.is_expanded()) {
        return;
    }
    for child in tree.get_children(Some(node)) {
        render_node(tree, &child, level + 1, depth, lines, loading);
    }
}
