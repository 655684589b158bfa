//! SSH transport settings.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Transport-level settings shared by every connection the connector opens.
#[derive(Debug, Clone)]
pub struct SshConfig {
    /// Send a keepalive this often; `None` disables keepalives.
    pub keepalive_interval: Option<Duration>,

    /// Missed keepalives tolerated before the transport is dropped.
    pub keepalive_max: usize,

    /// Host key verification policy.
    pub host_key_policy: HostKeyPolicy,
}

/// Host key verification policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HostKeyPolicy {
    /// Accept any host key (insecure, but matches OpenSSH StrictHostKeyChecking=no).
    #[default]
    AcceptAny,

    /// Remember the first key seen per host for the lifetime of the process and
    /// reject a different one later (like StrictHostKeyChecking=accept-new).
    AcceptNew,
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            keepalive_interval: Some(Duration::from_secs(15)),
            keepalive_max: 4,
            host_key_policy: HostKeyPolicy::AcceptAny,
        }
    }
}

impl SshConfig {
    pub fn to_russh_config(&self) -> russh::client::Config {
        russh::client::Config {
            // Liveness is tracked through keepalives, not idle time
            inactivity_timeout: None,
            keepalive_interval: self.keepalive_interval,
            keepalive_max: self.keepalive_max,
            ..Default::default()
        }
    }
}
