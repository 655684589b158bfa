//! Notifications published by the connection manager.
//!
//! Every subscriber gets its own copy of each event, so no single poller has
//! to consume a shared "changed" flag on behalf of the others.

use super::status::ConnectionStatus;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// The observable status changed.
    StatusChanged {
        from: ConnectionStatus,
        to: ConnectionStatus,
    },

    /// `switch_server` was called. Emitted even when the id is unchanged.
    ServerChanged {
        previous: Option<String>,
        current: String,
    },

    /// A lost connection was transparently re-established.
    Reconnected { server_id: String, session_id: u64 },
}

/// Events buffered per subscriber before the oldest are dropped.
pub const EVENT_CAPACITY: usize = 64;
