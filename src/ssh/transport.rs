//! The seam between the connection core and the SSH library.
//!
//! [`Connector`] opens a [`Transport`]; a transport multiplexes exec, shell and
//! file channels. The russh implementation lives in [`crate::ssh::client`];
//! tests substitute in-memory doubles.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

use crate::error::Result;
use crate::ssh::descriptor::ServerDescriptor;
use crate::ssh::pty::PtySize;
use crate::ssh::sftp::RemoteEntry;

/// Opens transports to remote servers.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Connect and authenticate. The credential has already been validated.
    async fn connect(
        &self,
        descriptor: &ServerDescriptor,
        timeout: Duration,
    ) -> Result<Arc<dyn Transport>>;
}

/// One live, authenticated connection.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Run `command` on a fresh exec channel, returning stdout followed by stderr.
    async fn exec(&self, command: &str) -> Result<Vec<u8>>;

    /// Open a PTY-backed shell channel.
    async fn open_shell(&self, pty: &PtySize) -> Result<ShellStream>;

    /// Open a file channel (SFTP).
    async fn open_files(&self) -> Result<Box<dyn FileChannel>>;

    /// Tear the connection down. Calling this more than once is harmless.
    async fn close(&self) -> Result<()>;

    fn is_closed(&self) -> bool;
}

/// File operations over a channel on an existing transport.
#[async_trait]
pub trait FileChannel: Send + Sync {
    async fn list_dir(&self, path: &str) -> Result<Vec<RemoteEntry>>;

    async fn read_file(&self, path: &str) -> Result<Vec<u8>>;

    async fn write_file(&self, path: &str, data: &[u8]) -> Result<()>;
}

/// Anything usable as the byte pipe behind a shell.
pub trait ShellIo: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> ShellIo for T {}

/// A bidirectional byte stream attached to a remote terminal.
pub struct ShellStream {
    io: Box<dyn ShellIo>,
}

impl ShellStream {
    pub fn new(io: impl ShellIo + 'static) -> Self {
        Self { io: Box::new(io) }
    }
}

impl std::fmt::Debug for ShellStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShellStream").finish_non_exhaustive()
    }
}

impl AsyncRead for ShellStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        Pin::new(&mut *self.io).poll_read(cx, buf)
    }
}

impl AsyncWrite for ShellStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        Pin::new(&mut *self.io).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut *self.io).poll_flush(cx)
    }

    fn poll_shutdown(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<std::io::Result<()>> {
        Pin::new(&mut *self.io).poll_shutdown(cx)
    }
}
