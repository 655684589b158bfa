//! russh client callbacks.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use russh::client;

use crate::error::DockError;
use crate::ssh::config::HostKeyPolicy;

/// Host key fingerprints seen during this process, keyed by `host:port`.
pub type SeenHostKeys = Arc<Mutex<HashMap<String, String>>>;

/// Client handler for russh connection callbacks.
pub struct ClientHandler {
    pub host_key_policy: HostKeyPolicy,
    pub endpoint: String,
    pub seen: SeenHostKeys,
}

impl ClientHandler {
    /// Decide whether `fingerprint` is acceptable for this endpoint,
    /// recording it when first seen.
    fn accept_fingerprint(&self, fingerprint: String) -> bool {
        let mut seen = match self.seen.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        match seen.get(&self.endpoint) {
            Some(known) if *known != fingerprint => match self.host_key_policy {
                HostKeyPolicy::AcceptAny => {
                    tracing::warn!("Host key for {} changed, accepting", self.endpoint);
                    seen.insert(self.endpoint.clone(), fingerprint);
                    true
                }
                HostKeyPolicy::AcceptNew => {
                    tracing::warn!(
                        "Host key for {} changed (was {}, now {}), rejecting",
                        self.endpoint,
                        known,
                        fingerprint
                    );
                    false
                }
            },
            Some(_) => true,
            None => {
                tracing::debug!("Recording host key {} for {}", fingerprint, self.endpoint);
                seen.insert(self.endpoint.clone(), fingerprint);
                true
            }
        }
    }
}

#[async_trait]
impl client::Handler for ClientHandler {
    type Error = DockError;

    async fn check_server_key(
        &mut self,
        server_public_key: &russh_keys::PublicKey,
    ) -> std::result::Result<bool, Self::Error> {
        let fingerprint = server_public_key.fingerprint(Default::default()).to_string();
        Ok(self.accept_fingerprint(fingerprint))
    }
}
