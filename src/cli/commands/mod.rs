pub mod files;
pub mod remote;
pub mod servers;
pub mod shell;

use std::sync::Arc;

use anyhow::{bail, Result};
use console::style;

use crate::config::AppConfig;
use crate::connection::{ConnectionEvent, ConnectionManager};
use crate::ssh::{Authenticator, SshConnector};

/// Build a manager from `config` and connect it to the selected server.
pub async fn connect(config: &AppConfig, server: Option<&str>) -> Result<ConnectionManager> {
    let entry = config.server(server)?;
    let descriptor = entry.to_descriptor()?;

    let connector = Arc::new(SshConnector::new(config.ssh_config()));
    let authenticator = Authenticator::new(connector).with_timeout(config.connect_timeout());
    let manager = ConnectionManager::new(authenticator).with_probe_timeout(config.probe_timeout());
    log_events(&manager);

    let result = manager.connect(descriptor).await;
    if !result.success {
        bail!(
            "Could not connect to '{}': {}",
            entry.id,
            result.error.unwrap_or_else(|| "unknown error".to_string())
        );
    }

    Ok(manager)
}

/// Surface reconnects and status changes in the log.
fn log_events(manager: &ConnectionManager) {
    let mut events = manager.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                ConnectionEvent::StatusChanged { from, to } => {
                    tracing::debug!("status {} -> {}", from, to);
                }
                ConnectionEvent::ServerChanged { current, .. } => {
                    tracing::debug!("server changed to {}", current);
                }
                ConnectionEvent::Reconnected { server_id, .. } => {
                    eprintln!(
                        "{} {}",
                        style("↻").yellow(),
                        style(format!("reconnected to {}", server_id)).dim()
                    );
                }
            }
        }
    });
}
