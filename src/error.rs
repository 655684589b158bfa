use std::io::ErrorKind;

use thiserror::Error;

/// Keywords that mark an error message as coming from transport loss.
///
/// The SSH layer does not expose a typed taxonomy for every failure, so this
/// list is the fallback used when no typed error is available. It is
/// imprecise by nature: any message mentioning e.g. "session" matches.
const CONNECTION_KEYWORDS: &[&str] = &[
    "socket",
    "connection",
    "closed",
    "timeout",
    "broken pipe",
    "session",
];

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("Exactly one of password or private key must be provided")]
    MissingCredential,

    #[error("Authentication rejected: {0}")]
    Rejected(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectionError {
    #[error("Host unreachable: {0}")]
    Unreachable(String),

    #[error("Connection timed out: {0}")]
    Timeout(String),

    #[error("Connection closed: {0}")]
    Closed(String),

    #[error("Connection refused: {0}")]
    Refused(String),
}

impl ConnectionError {
    /// Best-effort mapping of an untyped error message onto a connection error.
    ///
    /// Returns `None` when the message does not look like transport loss.
    pub fn from_text(text: &str) -> Option<Self> {
        if !is_connection_error_text(text) {
            return None;
        }

        let lower = text.to_lowercase();
        let message = text.to_string();
        let error = if lower.contains("timeout") || lower.contains("timed out") {
            ConnectionError::Timeout(message)
        } else if lower.contains("refused") {
            ConnectionError::Refused(message)
        } else if lower.contains("closed")
            || lower.contains("broken pipe")
            || lower.contains("session")
        {
            ConnectionError::Closed(message)
        } else {
            ConnectionError::Unreachable(message)
        };
        Some(error)
    }

    /// Typed mapping of russh failures that mean the session is gone.
    fn from_russh(err: &russh::Error) -> Option<Self> {
        let message = err.to_string();
        match err {
            russh::Error::Disconnect | russh::Error::HUP | russh::Error::SendError => {
                Some(ConnectionError::Closed(message))
            }
            russh::Error::ConnectionTimeout
            | russh::Error::KeepaliveTimeout
            | russh::Error::InactivityTimeout => Some(ConnectionError::Timeout(message)),
            russh::Error::IO(e) => {
                Some(ConnectionError::from_io(e).unwrap_or(ConnectionError::Closed(message)))
            }
            _ => ConnectionError::from_text(&message),
        }
    }

    fn from_io(err: &std::io::Error) -> Option<Self> {
        let message = err.to_string();
        match err.kind() {
            ErrorKind::ConnectionRefused => Some(ConnectionError::Refused(message)),
            ErrorKind::TimedOut => Some(ConnectionError::Timeout(message)),
            ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::BrokenPipe
            | ErrorKind::UnexpectedEof
            | ErrorKind::NotConnected => Some(ConnectionError::Closed(message)),
            ErrorKind::AddrNotAvailable => Some(ConnectionError::Unreachable(message)),
            _ => ConnectionError::from_text(&message),
        }
    }
}

#[derive(Error, Debug)]
pub enum DockError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error("Not connected to a server")]
    NotConnected,

    #[error("Connection attempt superseded by a newer connect or disconnect")]
    Superseded,

    #[error("SSH channel error: {0}")]
    Channel(String),

    /// A russh request failed; the source is kept for classification.
    #[error("{context}: {source}")]
    Ssh {
        context: String,
        #[source]
        source: russh::Error,
    },

    #[error("SFTP error: {0}")]
    Sftp(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SSH protocol error: {0}")]
    SshProtocol(#[from] russh::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl DockError {
    pub fn ssh(context: impl Into<String>, source: russh::Error) -> Self {
        DockError::Ssh {
            context: context.into(),
            source,
        }
    }

    /// Whether this error most likely means the transport itself is gone,
    /// as opposed to the remote command or request failing.
    ///
    /// Typed errors are checked first; everything else falls back to keyword
    /// matching on the rendered message.
    pub fn is_connection_class(&self) -> bool {
        self.as_connection_error().is_some()
    }

    /// The connection error this failure maps to, if any.
    pub fn as_connection_error(&self) -> Option<ConnectionError> {
        match self {
            DockError::Connection(e) => Some(e.clone()),
            DockError::Io(e) => ConnectionError::from_io(e),
            DockError::Auth(_)
            | DockError::NotConnected
            | DockError::Superseded
            | DockError::Config(_)
            | DockError::Yaml(_) => None,
            DockError::SshProtocol(e) | DockError::Ssh { source: e, .. } => {
                ConnectionError::from_russh(e)
            }
            DockError::Channel(msg) | DockError::Sftp(msg) => ConnectionError::from_text(msg),
        }
    }
}

/// Case-insensitive keyword check used when no typed error is available.
pub fn is_connection_error_text(text: &str) -> bool {
    let lower = text.to_lowercase();
    CONNECTION_KEYWORDS.iter().any(|kw| lower.contains(kw))
}

pub type Result<T> = std::result::Result<T, DockError>;
