//! Credential validation and transport establishment.

use std::sync::Arc;
use std::time::Duration;

use crate::error::{AuthError, Result};
use crate::ssh::descriptor::ServerDescriptor;
use crate::ssh::transport::{Connector, Transport};

/// Default time allowed for TCP connect plus SSH handshake.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Validates a descriptor's credential and opens a transport for it.
///
/// Failures are reported as-is; retrying is the caller's decision.
#[derive(Clone)]
pub struct Authenticator {
    connector: Arc<dyn Connector>,
    timeout: Duration,
}

impl Authenticator {
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self {
            connector,
            timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Check the credential without touching the network.
    pub fn validate(descriptor: &ServerDescriptor) -> std::result::Result<(), AuthError> {
        if descriptor.credential.is_empty() {
            return Err(AuthError::MissingCredential);
        }
        Ok(())
    }

    /// Validate the credential, then connect and authenticate.
    pub async fn resolve(&self, descriptor: &ServerDescriptor) -> Result<Arc<dyn Transport>> {
        Self::validate(descriptor)?;

        tracing::debug!(
            "Opening transport to {} (timeout {}s)",
            descriptor.target(),
            self.timeout.as_secs()
        );
        self.connector.connect(descriptor, self.timeout).await
    }
}
