//! Remote server descriptors and their credentials.

use std::fmt;

use crate::error::AuthError;

/// How to authenticate against a server.
///
/// Holding an enum makes "both" or "neither" unrepresentable; emptiness is
/// still possible and is rejected by the authenticator before any I/O.
#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
    /// Password authentication.
    Password(String),

    /// Public key authentication with an OpenSSH/PEM encoded private key.
    PrivateKey {
        pem: String,
        passphrase: Option<String>,
    },
}

impl Credential {
    /// Build a credential from the optional password / private key fields a
    /// form or config file provides. Exactly one must be present.
    pub fn from_parts(
        password: Option<String>,
        private_key: Option<String>,
    ) -> Result<Self, AuthError> {
        let password = password.filter(|p| !p.is_empty());
        let private_key = private_key.filter(|k| !k.trim().is_empty());

        match (password, private_key) {
            (Some(password), None) => Ok(Credential::Password(password)),
            (None, Some(pem)) => Ok(Credential::PrivateKey {
                pem,
                passphrase: None,
            }),
            _ => Err(AuthError::MissingCredential),
        }
    }

    /// Attach a passphrase to a private key credential. No-op for passwords.
    pub fn with_passphrase(self, passphrase: Option<String>) -> Self {
        match self {
            Credential::PrivateKey { pem, .. } => Credential::PrivateKey {
                pem,
                passphrase: passphrase.filter(|p| !p.is_empty()),
            },
            other => other,
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Credential::Password(password) => password.is_empty(),
            Credential::PrivateKey { pem, .. } => pem.trim().is_empty(),
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Credential::Password(_) => "password",
            Credential::PrivateKey { .. } => "private-key",
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Credential::{}(<redacted>)", self.kind())
    }
}

/// A remote host the manager can connect to.
///
/// Identity is the `id`: two descriptors describe the same server when their
/// ids match, regardless of the other fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerDescriptor {
    pub id: String,
    pub name: String,
    pub host: String,
    pub port: u16,
    pub username: String,
    pub credential: Credential,
}

impl ServerDescriptor {
    pub fn new(
        id: impl Into<String>,
        host: impl Into<String>,
        username: impl Into<String>,
        credential: Credential,
    ) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            host: host.into(),
            port: 22,
            username: username.into(),
            credential,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Whether `other` refers to the same server (id comparison only).
    pub fn same_server(&self, other: &ServerDescriptor) -> bool {
        self.id == other.id
    }

    /// `user@host:port`, for logs.
    pub fn target(&self) -> String {
        format!("{}@{}:{}", self.username, self.host, self.port)
    }
}
