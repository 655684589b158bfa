//! SSH client implementation using russh.
//!
//! Provides connection management and authentication, and implements the
//! [`Connector`]/[`Transport`] seam the connection core talks to.

use std::net::ToSocketAddrs;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use russh::client::{self, Handle};
use russh::Disconnect;
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::error::{AuthError, ConnectionError, DockError, Result};
use crate::ssh::config::SshConfig;
use crate::ssh::descriptor::{Credential, ServerDescriptor};
use crate::ssh::handler::SeenHostKeys;
use crate::ssh::pty::PtySize;
use crate::ssh::sftp::SftpClient;
use crate::ssh::transport::{Connector, FileChannel, ShellStream, Transport};

pub use crate::ssh::handler::ClientHandler;

/// Opens russh connections.
pub struct SshConnector {
    config: SshConfig,
    seen_host_keys: SeenHostKeys,
}

impl SshConnector {
    pub fn new(config: SshConfig) -> Self {
        Self {
            config,
            seen_host_keys: SeenHostKeys::default(),
        }
    }

    /// Authenticate with the SSH server.
    async fn authenticate(
        session: &mut Handle<ClientHandler>,
        descriptor: &ServerDescriptor,
    ) -> Result<()> {
        let accepted = match &descriptor.credential {
            Credential::Password(password) => {
                tracing::debug!("Using password authentication for {}", descriptor.target());
                session
                    .authenticate_password(&descriptor.username, password)
                    .await
                    .map_err(|e| {
                        AuthError::Rejected(format!("Password authentication failed: {}", e))
                    })?
            }
            Credential::PrivateKey { pem, passphrase } => {
                tracing::debug!("Using public key authentication for {}", descriptor.target());
                let key = russh_keys::decode_secret_key(pem, passphrase.as_deref())
                    .map_err(|e| AuthError::Rejected(format!("Invalid private key: {}", e)))?;

                session
                    .authenticate_publickey(&descriptor.username, Arc::new(key))
                    .await
                    .map_err(|e| {
                        AuthError::Rejected(format!("Public key authentication failed: {}", e))
                    })?
            }
        };

        if accepted {
            Ok(())
        } else {
            Err(AuthError::Rejected(format!(
                "Server rejected credentials for {}",
                descriptor.username
            ))
            .into())
        }
    }
}

#[async_trait]
impl Connector for SshConnector {
    async fn connect(
        &self,
        descriptor: &ServerDescriptor,
        connect_timeout: Duration,
    ) -> Result<Arc<dyn Transport>> {
        let endpoint = format!("{}:{}", descriptor.host, descriptor.port);

        // Resolve hostname to IP
        let addr = endpoint
            .to_socket_addrs()
            .map_err(|e| {
                ConnectionError::Unreachable(format!("Failed to resolve {}: {}", endpoint, e))
            })?
            .next()
            .ok_or_else(|| {
                ConnectionError::Unreachable(format!("No address found for {}", endpoint))
            })?;

        tracing::debug!("Connecting to {} ({})", endpoint, addr);

        let stream = timeout(connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| {
                ConnectionError::Timeout(format!(
                    "TCP connect to {} after {}s",
                    endpoint,
                    connect_timeout.as_secs()
                ))
            })?
            .map_err(|e| {
                let message = format!("{}: {}", endpoint, e);
                match e.kind() {
                    std::io::ErrorKind::ConnectionRefused => ConnectionError::Refused(message),
                    std::io::ErrorKind::TimedOut => ConnectionError::Timeout(message),
                    _ => ConnectionError::Unreachable(message),
                }
            })?;

        let handler = ClientHandler {
            host_key_policy: self.config.host_key_policy,
            endpoint: endpoint.clone(),
            seen: self.seen_host_keys.clone(),
        };

        let russh_config = Arc::new(self.config.to_russh_config());
        let mut session = timeout(
            connect_timeout,
            client::connect_stream(russh_config, stream, handler),
        )
        .await
        .map_err(|_| ConnectionError::Timeout(format!("SSH handshake with {}", endpoint)))??;

        Self::authenticate(&mut session, descriptor).await?;

        tracing::info!("Authenticated to {}", descriptor.target());

        Ok(Arc::new(SshTransport {
            session,
            closed: AtomicBool::new(false),
        }))
    }
}

/// A live russh connection.
pub struct SshTransport {
    session: Handle<ClientHandler>,
    closed: AtomicBool,
}

impl SshTransport {
    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(ConnectionError::Closed("SSH session is closed".to_string()).into());
        }
        Ok(())
    }
}

#[async_trait]
impl Transport for SshTransport {
    async fn exec(&self, command: &str) -> Result<Vec<u8>> {
        self.ensure_open()?;
        crate::ssh::exec::exec_command(&self.session, command).await
    }

    async fn open_shell(&self, pty: &PtySize) -> Result<ShellStream> {
        self.ensure_open()?;
        crate::ssh::pty::open_shell(&self.session, pty).await
    }

    async fn open_files(&self) -> Result<Box<dyn FileChannel>> {
        self.ensure_open()?;
        let sftp = SftpClient::new(&self.session).await?;
        Ok(Box::new(sftp))
    }

    async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        if self.session.is_closed() {
            return Ok(());
        }
        self.session
            .disconnect(Disconnect::ByApplication, "", "en")
            .await
            .map_err(DockError::from)
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst) || self.session.is_closed()
    }
}
