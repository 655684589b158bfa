//! A live connection and the channels opened on it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::error::{ConnectionError, Result};
use crate::ssh::auth::Authenticator;
use crate::ssh::descriptor::ServerDescriptor;
use crate::ssh::exec::decode_output;
use crate::ssh::pty::PtySize;
use crate::ssh::transport::{FileChannel, ShellStream, Transport};

const PROBE_COMMAND: &str = "echo ok";

/// One authenticated transport, shared by every channel opened on it.
///
/// A session is tagged with the manager epoch it was opened under; that tag
/// is its identity.
pub struct Session {
    id: u64,
    server_id: String,
    transport: Arc<dyn Transport>,
    closed: AtomicBool,
}

impl Session {
    /// Authenticate and open a transport for `descriptor`.
    pub async fn open(
        authenticator: &Authenticator,
        descriptor: &ServerDescriptor,
        id: u64,
    ) -> Result<Self> {
        let transport = authenticator.resolve(descriptor).await?;
        Ok(Self::from_transport(id, &descriptor.id, transport))
    }

    pub fn from_transport(id: u64, server_id: &str, transport: Arc<dyn Transport>) -> Self {
        Self {
            id,
            server_id: server_id.to_string(),
            transport,
            closed: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn server_id(&self) -> &str {
        &self.server_id
    }

    pub fn is_alive(&self) -> bool {
        !self.closed.load(Ordering::SeqCst) && !self.transport.is_closed()
    }

    fn ensure_alive(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ConnectionError::Closed(format!("session {} was closed", self.id)).into());
        }
        Ok(())
    }

    /// Run a command and return its raw combined output.
    pub async fn exec_bytes(&self, command: &str) -> Result<Vec<u8>> {
        self.ensure_alive()?;
        tracing::debug!("[session {}] exec: {}", self.id, command);
        self.transport.exec(command).await
    }

    /// Run a command and return its combined output as text.
    pub async fn exec(&self, command: &str) -> Result<String> {
        let bytes = self.exec_bytes(command).await?;
        Ok(decode_output(&bytes))
    }

    /// Open an interactive shell channel.
    pub async fn shell(&self, pty: &PtySize) -> Result<ShellStream> {
        self.ensure_alive()?;
        tracing::debug!("[session {}] opening shell {}x{}", self.id, pty.cols, pty.rows);
        self.transport.open_shell(pty).await
    }

    /// Open a file channel on this transport.
    pub async fn files(&self) -> Result<Box<dyn FileChannel>> {
        self.ensure_alive()?;
        self.transport.open_files().await
    }

    /// Check that the remote end still answers within `timeout`.
    pub async fn probe(&self, timeout: Duration) -> bool {
        if !self.is_alive() {
            return false;
        }
        match tokio::time::timeout(timeout, self.exec_bytes(PROBE_COMMAND)).await {
            Ok(Ok(_)) => true,
            Ok(Err(e)) => {
                tracing::debug!("[session {}] probe failed: {}", self.id, e);
                false
            }
            Err(_) => {
                tracing::debug!("[session {}] probe timed out", self.id);
                false
            }
        }
    }

    /// Release the transport and every channel on it. Safe to call repeatedly.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::debug!("[session {}] closing", self.id);
        if let Err(e) = self.transport.close().await {
            // Closing a dead transport commonly fails; nothing to recover
            tracing::debug!("[session {}] close reported: {}", self.id, e);
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("server_id", &self.server_id)
            .field("alive", &self.is_alive())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockTransport;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn test_exec_decodes_lossy_utf8() {
        let transport = MockTransport::new();
        transport.respond("uname", vec![b'L', 0xfe, b'x']);
        let session = Session::from_transport(1, "srv", transport.clone());

        let out = session.exec("uname").await.unwrap();

        assert_eq!(out, "L\u{fffd}x");
        assert_eq!(transport.exec_count(), 1);
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let transport = MockTransport::new();
        let session = Session::from_transport(1, "srv", transport.clone());

        session.close().await;
        session.close().await;
        session.close().await;

        assert!(!session.is_alive());
        assert_eq!(transport.close_count(), 1);
    }

    #[tokio::test]
    async fn test_closed_session_refuses_channels_without_io() {
        let transport = MockTransport::new();
        let session = Session::from_transport(7, "srv", transport.clone());
        session.close().await;

        let err = session.exec("ls").await.unwrap_err();
        assert!(err.is_connection_class());
        assert!(session.shell(&PtySize::default()).await.is_err());
        assert!(session.files().await.is_err());
        assert_eq!(transport.exec_count(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_execs_are_independent() {
        let transport = MockTransport::new();
        transport.respond("a", b"A".to_vec());
        transport.respond("b", b"B".to_vec());
        let session = Session::from_transport(1, "srv", transport.clone());

        let (a, b) = tokio::join!(session.exec("a"), session.exec("b"));

        assert_eq!(a.unwrap(), "A");
        assert_eq!(b.unwrap(), "B");
        assert_eq!(transport.exec_count(), 2);
    }

    #[tokio::test]
    async fn test_probe() {
        let transport = MockTransport::new();
        let session = Session::from_transport(1, "srv", transport.clone());
        assert!(session.probe(Duration::from_secs(1)).await);

        transport.fail_exec(ConnectionError::Closed("gone".into()).into());
        assert!(!session.probe(Duration::from_secs(1)).await);
    }

    #[tokio::test]
    async fn test_shell_reaches_remote() {
        let transport = MockTransport::new();
        let session = Session::from_transport(1, "srv", transport.clone());

        let shell = session.shell(&PtySize::new(100, 30)).await.unwrap();
        let mut remote = transport.take_shell_remote().unwrap();
        drop(shell);

        let mut buf = Vec::new();
        remote.read_to_end(&mut buf).await.unwrap();
        assert!(buf.is_empty());
        assert_eq!(transport.last_pty(), Some(PtySize::new(100, 30)));
    }
}
