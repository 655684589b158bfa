//! SFTP file channel.
//!
//! Opened on demand over the live transport; the file-browsing layer above
//! only ever sees [`FileChannel`].

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use russh::client::Handle;
use russh_sftp::client::SftpSession;
use russh_sftp::protocol::FileAttributes;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::error::{DockError, Result};
use crate::ssh::client::ClientHandler;
use crate::ssh::transport::FileChannel;

/// Kind of a remote directory entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
    Symlink,
}

/// A single entry returned by [`FileChannel::list_dir`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEntry {
    pub name: String,
    pub path: String,
    pub kind: EntryKind,
    pub size: u64,
    pub permissions: u32,
    pub modified: Option<SystemTime>,
}

impl RemoteEntry {
    pub fn new(name: impl Into<String>, path: impl Into<String>, kind: EntryKind) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            kind,
            size: 0,
            permissions: 0,
            modified: None,
        }
    }

    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }
}

/// Join a directory and a child name without doubling the separator.
pub fn join_remote(dir: &str, name: &str) -> String {
    if dir == "/" {
        format!("/{}", name)
    } else {
        format!("{}/{}", dir.trim_end_matches('/'), name)
    }
}

fn entry_from_attrs(name: String, path: String, attrs: &FileAttributes) -> RemoteEntry {
    let kind = if attrs.is_dir() {
        EntryKind::Directory
    } else if attrs.is_symlink() {
        EntryKind::Symlink
    } else {
        EntryKind::File
    };

    let mut entry = RemoteEntry::new(name, path, kind);
    entry.size = attrs.size.unwrap_or(0);
    entry.permissions = attrs.permissions.map(|p| p as u32).unwrap_or(0);
    entry.modified = attrs
        .mtime
        .map(|mtime| UNIX_EPOCH + Duration::from_secs(mtime as u64));
    entry
}

/// SFTP client bound to one channel.
pub struct SftpClient {
    session: SftpSession,
}

impl SftpClient {
    /// Open the SFTP subsystem on a new channel of `ssh_session`.
    pub async fn new(ssh_session: &Handle<ClientHandler>) -> Result<Self> {
        let channel = ssh_session
            .channel_open_session()
            .await
            .map_err(|e| DockError::ssh("Failed to open SFTP channel", e))?;

        channel
            .request_subsystem(true, "sftp")
            .await
            .map_err(|e| DockError::ssh("Failed to request SFTP subsystem", e))?;

        let sftp = SftpSession::new(channel.into_stream())
            .await
            .map_err(|e| DockError::Sftp(format!("Failed to initialize SFTP: {}", e)))?;

        Ok(Self { session: sftp })
    }
}

#[async_trait]
impl FileChannel for SftpClient {
    async fn list_dir(&self, path: &str) -> Result<Vec<RemoteEntry>> {
        tracing::debug!("Listing remote directory {}", path);

        let dir = self
            .session
            .read_dir(path)
            .await
            .map_err(|e| DockError::Sftp(format!("Failed to read directory {}: {}", path, e)))?;

        let entries = dir
            .filter(|entry| {
                let name = entry.file_name();
                name != "." && name != ".."
            })
            .map(|entry| {
                let name = entry.file_name();
                let full_path = join_remote(path, &name);
                entry_from_attrs(name, full_path, &entry.metadata())
            })
            .collect();

        Ok(entries)
    }

    async fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        let mut file = self
            .session
            .open(path)
            .await
            .map_err(|e| DockError::Sftp(format!("Failed to open {}: {}", path, e)))?;

        let mut content = Vec::new();
        file.read_to_end(&mut content)
            .await
            .map_err(|e| DockError::Sftp(format!("Failed to read {}: {}", path, e)))?;

        tracing::debug!("Read {} bytes from {}", content.len(), path);
        Ok(content)
    }

    async fn write_file(&self, path: &str, data: &[u8]) -> Result<()> {
        let mut remote_file = self
            .session
            .create(path)
            .await
            .map_err(|e| DockError::Sftp(format!("Failed to create remote file {}: {}", path, e)))?;

        remote_file
            .write_all(data)
            .await
            .map_err(|e| DockError::Sftp(format!("Failed to write to remote file: {}", e)))?;

        // Ensure data is flushed
        remote_file
            .shutdown()
            .await
            .map_err(|e| DockError::Sftp(format!("Failed to close remote file: {}", e)))?;

        tracing::debug!("Wrote {} bytes to {}", data.len(), path);
        Ok(())
    }
}
