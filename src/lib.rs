//! SSH connection core for driving a remote Docker host.
//!
//! [`connection::ConnectionManager`] owns one session to the current server
//! and exposes command execution, interactive shells and file access on top
//! of it. A command that fails because the connection dropped is retried once
//! on a fresh connection.

pub mod cli;
pub mod config;
pub mod connection;
pub mod error;
pub mod ssh;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use connection::{ConnectionManager, ConnectionResult, ConnectionStatus};
pub use error::{DockError, Result};
