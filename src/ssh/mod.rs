//! SSH transport for dockssh.
//!
//! Everything above this module talks to a remote host through the
//! [`Connector`] / [`Transport`] seam; [`SshConnector`] is the russh-backed
//! implementation and the test doubles in `crate::testing` are the other.
//!
//! ## Modules
//!
//! - [`descriptor`] - Server identity and credentials
//! - [`auth`] - Credential validation and transport establishment
//! - [`transport`] - Connector, transport and file channel traits
//! - [`session`] - A live connection and its channels
//! - [`pty`] - Interactive terminal sessions
//! - [`sftp`] - File access via SFTP
//! - `client` - russh connector and transport

pub mod auth;
mod client;
pub mod config;
pub mod descriptor;
mod exec;
mod handler;
pub mod pty;
pub mod session;
pub mod sftp;
pub mod transport;

// Re-exports for public API
pub use auth::{Authenticator, DEFAULT_CONNECT_TIMEOUT};
pub use client::{SshConnector, SshTransport};
pub use config::{HostKeyPolicy, SshConfig};
pub use descriptor::{Credential, ServerDescriptor};
pub use pty::{attach_terminal, PtySize};
pub use session::Session;
pub use sftp::{EntryKind, RemoteEntry};
pub use transport::{Connector, FileChannel, ShellStream, Transport};
