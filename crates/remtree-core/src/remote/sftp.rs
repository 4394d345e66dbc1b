//! SFTP client implementation using `russh` and `russh-sftp`.
//!
//! [`SftpRemote`] holds one SSH connection with an SFTP subsystem channel
//! for listings and file transfer. Commands (`exec`, `search`) open a
//! fresh session channel each time.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use russh::client;
use russh::ChannelMsg;
use russh_keys::key::PublicKey;
use russh_sftp::client::SftpSession;

use super::{EntryKind, RemoteAccess, RemoteError, SearchMatch, SearchOptions};
use crate::connection::ConnectionId;
use crate::filter::pattern::is_glob;
use crate::fs::entry::FileEntry;
use crate::fs::path;

/// Configuration for an SFTP connection.
#[derive(Debug, Clone)]
pub struct SftpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
}

impl SftpConfig {
    /// Returns a display label like `"user@host"` or `"user@host:port"`.
    pub fn display_label(&self) -> String {
        if self.port == 22 {
            format!("{}@{}", self.username, self.host)
        } else {
            format!("{}@{}:{}", self.username, self.host, self.port)
        }
    }
}

/// Accepts every host key. Host key verification is not implemented yet.
struct SshHandler;

#[async_trait]
impl client::Handler for SshHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        _server_public_key: &PublicKey,
    ) -> Result<bool, Self::Error> {
        Ok(true)
    }
}

/// An active SSH/SFTP connection to one remote host.
pub struct SftpRemote {
    connection: ConnectionId,
    config: SftpConfig,
    sftp: SftpSession,
    handle: client::Handle<SshHandler>,
}

impl SftpRemote {
    /// Connects via SSH, authenticates with a password and opens SFTP.
    pub async fn connect(connection: ConnectionId, config: SftpConfig) -> Result<Self, RemoteError> {
        let ssh_config = client::Config {
            inactivity_timeout: Some(Duration::from_secs(30)),
            ..Default::default()
        };

        let mut handle = client::connect(
            Arc::new(ssh_config),
            (config.host.as_str(), config.port),
            SshHandler,
        )
        .await
        .map_err(|e| RemoteError::ConnectionFailed(e.to_string()))?;

        let auth_ok = handle
            .authenticate_password(&config.username, &config.password)
            .await
            .map_err(|e| RemoteError::AuthFailed(e.to_string()))?;
        if !auth_ok {
            return Err(RemoteError::AuthFailed(
                "invalid username or password".to_string(),
            ));
        }

        let channel = handle
            .channel_open_session()
            .await
            .map_err(|e| RemoteError::ConnectionFailed(e.to_string()))?;
        channel
            .request_subsystem(true, "sftp")
            .await
            .map_err(|e| RemoteError::Protocol(e.to_string()))?;
        let sftp = SftpSession::new(channel.into_stream())
            .await
            .map_err(|e| RemoteError::Protocol(e.to_string()))?;

        tracing::info!(%connection, label = %config.display_label(), "connected");
        Ok(Self {
            connection,
            config,
            sftp,
            handle,
        })
    }

    pub fn config(&self) -> &SftpConfig {
        &self.config
    }
}

#[async_trait]
impl RemoteAccess for SftpRemote {
    async fn list_directory(&self, dir: &str) -> Result<Vec<FileEntry>, RemoteError> {
        let read_dir = self
            .sftp
            .read_dir(dir)
            .await
            .map_err(|e| map_sftp_error(e, dir))?;

        let entries = read_dir
            .filter(|de| {
                let name = de.file_name();
                name != "." && name != ".."
            })
            .map(|de| {
                let attrs = de.metadata();
                FileEntry::new(
                    self.connection.clone(),
                    path::join(dir, &de.file_name()),
                    attrs.is_dir(),
                )
                .with_size(attrs.size.unwrap_or(0))
                .with_modified(attrs.mtime.map(epoch_secs))
                .with_accessed(attrs.atime.map(epoch_secs))
                .with_ownership(
                    attrs.uid.map(|u| u.to_string()),
                    attrs.gid.map(|g| g.to_string()),
                )
                .with_permissions(attrs.permissions.map(|p| p & 0o7777))
                .with_symlink(attrs.file_type().is_symlink())
            })
            .collect();
        Ok(entries)
    }

    async fn read_file(&self, file: &str) -> Result<Vec<u8>, RemoteError> {
        self.sftp
            .read(file)
            .await
            .map_err(|e| map_sftp_error(e, file))
    }

    async fn write_file(&self, file: &str, data: &[u8]) -> Result<(), RemoteError> {
        self.sftp
            .write(file, data)
            .await
            .map_err(|e| map_sftp_error(e, file))
    }

    async fn exec(&self, command: &str) -> Result<String, RemoteError> {
        let mut channel = self
            .handle
            .channel_open_session()
            .await
            .map_err(|e| RemoteError::ConnectionFailed(e.to_string()))?;
        channel
            .exec(true, command)
            .await
            .map_err(|e| RemoteError::Protocol(e.to_string()))?;

        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let mut status = None;
        while let Some(msg) = channel.wait().await {
            match msg {
                ChannelMsg::Data { ref data } => stdout.extend_from_slice(data),
                ChannelMsg::ExtendedData { ref data, ext: 1 } => stderr.extend_from_slice(data),
                ChannelMsg::ExitStatus { exit_status } => status = Some(exit_status),
                _ => {}
            }
        }

        match status {
            Some(0) | None => Ok(String::from_utf8_lossy(&stdout).into_owned()),
            Some(code) => Err(RemoteError::CommandFailed {
                status: code,
                message: String::from_utf8_lossy(&stderr).trim().to_string(),
            }),
        }
    }

    async fn search(
        &self,
        base: &str,
        pattern: &str,
        options: &SearchOptions,
    ) -> Result<Vec<SearchMatch>, RemoteError> {
        let command = search_command(base, pattern, options);
        tracing::debug!(connection = %self.connection, %command, "remote search");
        let output = self.exec(&command).await?;
        Ok(parse_search_output(&output, options))
    }
}

fn epoch_secs(secs: u32) -> SystemTime {
    UNIX_EPOCH + Duration::from_secs(u64::from(secs))
}

fn map_sftp_error(err: russh_sftp::client::error::Error, target: &str) -> RemoteError {
    let message = err.to_string();
    if message.contains("No such file") || message.contains("not found") {
        RemoteError::NotFound(target.to_string())
    } else if message.contains("Permission denied") {
        RemoteError::PermissionDenied(target.to_string())
    } else {
        RemoteError::Protocol(message)
    }
}

/// Single-quotes `arg` for a POSIX shell.
fn shell_quote(arg: &str) -> String {
    format!("'{}'", arg.replace('\'', r"'\''"))
}

/// Builds the shell pipeline run by [`SftpRemote::search`].
///
/// Name search uses `find -printf` (GNU findutils) so each line carries the
/// entry type. A pattern without glob characters matches as a substring.
/// Content search lists matching files with `grep -rl`.
fn search_command(base: &str, pattern: &str, options: &SearchOptions) -> String {
    let base = shell_quote(base);
    let limit = options.max_results.max(1);
    if options.content_search {
        let case = if options.case_sensitive { "" } else { "i" };
        return format!(
            "grep -rl{case} -- {} {base} 2>/dev/null | head -n {limit}",
            shell_quote(pattern)
        );
    }

    let name_pattern = if is_glob(pattern) {
        pattern.to_string()
    } else {
        format!("*{pattern}*")
    };
    let name_test = if options.case_sensitive { "-name" } else { "-iname" };
    let type_test = match options.entry_kind {
        EntryKind::Files => " -type f",
        EntryKind::Directories => " -type d",
        EntryKind::Any => "",
    };
    format!(
        "find {base} -mindepth 1{type_test} {name_test} {} -printf '%y\\t%p\\n' 2>/dev/null | head -n {limit}",
        shell_quote(&name_pattern)
    )
}

fn parse_search_output(output: &str, options: &SearchOptions) -> Vec<SearchMatch> {
    output
        .lines()
        .filter(|line| !line.is_empty())
        .filter_map(|line| {
            if options.content_search {
                return Some(SearchMatch {
                    path: line.to_string(),
                    is_dir: false,
                });
            }
            let (kind, found) = line.split_once('\t')?;
            Some(SearchMatch {
                path: found.to_string(),
                is_dir: kind == "d",
            })
        })
        .take(options.max_results)
        .collect()
}
