use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{DockError, Result};
use crate::ssh::{Credential, HostKeyPolicy, ServerDescriptor, SshConfig};

/// Fills in the password of a server entry that has no credential of its own.
pub const PASSWORD_ENV: &str = "DOCKSSH_PASSWORD";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub servers: Vec<ServerEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_server: Option<String>,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,
    /// 0 disables keepalives.
    #[serde(default = "default_keepalive_interval")]
    pub keepalive_interval_secs: u64,
    #[serde(default = "default_keepalive_max")]
    pub keepalive_max: usize,
    #[serde(default)]
    pub host_key_policy: HostKeyPolicy,
}

/// One server as written in the config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerEntry {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// Inline PEM private key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_key: Option<String>,
    /// Path to a private key file; `~` is expanded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_key_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub passphrase: Option<String>,
}

fn default_connect_timeout() -> u64 {
    30
}

fn default_probe_timeout() -> u64 {
    5
}

fn default_keepalive_interval() -> u64 {
    15
}

fn default_keepalive_max() -> usize {
    4
}

fn default_port() -> u16 {
    22
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            servers: Vec::new(),
            default_server: None,
            connect_timeout_secs: default_connect_timeout(),
            probe_timeout_secs: default_probe_timeout(),
            keepalive_interval_secs: default_keepalive_interval(),
            keepalive_max: default_keepalive_max(),
            host_key_policy: HostKeyPolicy::default(),
        }
    }
}

impl AppConfig {
    pub fn config_dir() -> Result<PathBuf> {
        let home = std::env::var("HOME")
            .map_err(|_| DockError::Config("HOME environment variable not set".to_string()))?;
        Ok(PathBuf::from(home).join(".config").join("dockssh"))
    }

    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.yaml"))
    }

    /// Load from `path`, or from the default location when `None`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => Self::config_path()?,
        };

        if !path.exists() {
            return Err(DockError::Config(format!(
                "Config file not found: {}",
                path.display()
            )));
        }

        let content = std::fs::read_to_string(&path)?;
        let config: AppConfig = serde_yaml::from_str(&content)
            .map_err(|e| DockError::Config(format!("Invalid config: {}", e)))?;

        config.validate()?;
        tracing::debug!(
            "Loaded {} server(s) from {}",
            config.servers.len(),
            path.display()
        );
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_yaml::to_string(self)
            .map_err(|e| DockError::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content)?;

        // Holds passwords and keys
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perms = std::fs::metadata(path)?.permissions();
            perms.set_mode(0o600);
            std::fs::set_permissions(path, perms)?;
        }

        Ok(())
    }

    /// Validate the configuration.
    ///
    /// Rejects duplicate server ids and a default server that is not listed.
    pub fn validate(&self) -> Result<()> {
        let mut seen = std::collections::HashSet::new();
        for server in &self.servers {
            if server.id.trim().is_empty() {
                return Err(DockError::Config(format!(
                    "Server for host '{}' has an empty id",
                    server.host
                )));
            }
            if !seen.insert(server.id.as_str()) {
                return Err(DockError::Config(format!(
                    "Duplicate server id '{}'",
                    server.id
                )));
            }
        }

        if let Some(default) = &self.default_server {
            if !seen.contains(default.as_str()) {
                return Err(DockError::Config(format!(
                    "Default server '{}' is not defined in servers",
                    default
                )));
            }
        }

        Ok(())
    }

    /// Look up a server by id, falling back to the default server and then to
    /// the only configured server.
    pub fn server(&self, id: Option<&str>) -> Result<&ServerEntry> {
        let wanted = id.or(self.default_server.as_deref());

        match wanted {
            Some(id) => self
                .servers
                .iter()
                .find(|s| s.id == id)
                .ok_or_else(|| DockError::Config(format!("Unknown server '{}'", id))),
            None if self.servers.len() == 1 => Ok(&self.servers[0]),
            None if self.servers.is_empty() => {
                Err(DockError::Config("No servers configured".to_string()))
            }
            None => Err(DockError::Config(
                "Several servers configured; pick one with --server or set default_server"
                    .to_string(),
            )),
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    pub fn ssh_config(&self) -> SshConfig {
        SshConfig {
            keepalive_interval: match self.keepalive_interval_secs {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            },
            keepalive_max: self.keepalive_max,
            host_key_policy: self.host_key_policy,
        }
    }
}

impl ServerEntry {
    /// Build a descriptor, taking the password from `DOCKSSH_PASSWORD` when the
    /// entry has no credential of its own.
    pub fn to_descriptor(&self) -> Result<ServerDescriptor> {
        self.to_descriptor_with(std::env::var(PASSWORD_ENV).ok())
    }

    pub fn to_descriptor_with(&self, env_password: Option<String>) -> Result<ServerDescriptor> {
        let private_key = match (&self.private_key, &self.private_key_path) {
            (Some(pem), _) => Some(pem.clone()),
            (None, Some(path)) => {
                let expanded = shellexpand::tilde(path);
                let pem = std::fs::read_to_string(expanded.as_ref()).map_err(|e| {
                    DockError::Config(format!("Cannot read private key '{}': {}", path, e))
                })?;
                Some(pem)
            }
            (None, None) => None,
        };

        let password = match (&self.password, &private_key) {
            (Some(password), _) => Some(password.clone()),
            (None, None) => env_password,
            (None, Some(_)) => None,
        };

        let credential = Credential::from_parts(password, private_key)?
            .with_passphrase(self.passphrase.clone());

        let mut descriptor = ServerDescriptor::new(&self.id, &self.host, &self.username, credential)
            .with_port(self.port);
        if let Some(name) = &self.name {
            descriptor = descriptor.with_name(name);
        }
        Ok(descriptor)
    }
}
