use std::fmt;

use serde::Serialize;

/// Externally observed connection status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
    Failed,
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ConnectionStatus::Disconnected => "disconnected",
            ConnectionStatus::Connecting => "connecting",
            ConnectionStatus::Connected => "connected",
            ConnectionStatus::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// Outcome of `connect`/`switch_server`. Returned, never raised, so callers
/// can render the message inline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionResult {
    pub success: bool,
    pub error: Option<String>,
    pub status: ConnectionStatus,
}

impl ConnectionResult {
    pub fn connected() -> Self {
        Self {
            success: true,
            error: None,
            status: ConnectionStatus::Connected,
        }
    }

    pub fn failed(error: impl Into<String>, status: ConnectionStatus) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            status,
        }
    }
}
