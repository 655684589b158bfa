use std::path::{Path, PathBuf};

use anyhow::{bail, Result};
use console::style;

use crate::config::{AppConfig, ServerEntry};

pub fn list(config: &AppConfig) -> Result<()> {
    if config.servers.is_empty() {
        println!("  {}", style("No servers configured").dim());
        return Ok(());
    }

    for server in &config.servers {
        let is_default = config.default_server.as_deref() == Some(server.id.as_str());
        let marker = if is_default { "*" } else { " " };
        println!(
            "{} {} {}",
            style(marker).green().bold(),
            style(&server.id).white().bold(),
            style(format!(
                "{}@{}:{}{}",
                server.username,
                server.host,
                server.port,
                server
                    .name
                    .as_deref()
                    .map(|n| format!(" ({})", n))
                    .unwrap_or_default()
            ))
            .dim()
        );
    }

    Ok(())
}

/// Add `entry` to the config file at `path` (default location when `None`),
/// creating the file if needed.
pub fn add(path: Option<&Path>, entry: ServerEntry, make_default: bool) -> Result<()> {
    let path: PathBuf = match path {
        Some(path) => path.to_path_buf(),
        None => AppConfig::config_path()?,
    };

    let mut config = if path.exists() {
        AppConfig::load(Some(&path))?
    } else {
        AppConfig::default()
    };

    let id = entry.id.clone();
    add_entry(&mut config, entry, make_default)?;
    config.save(&path)?;

    println!(
        "{} Added {} to {}",
        style("✓").green().bold(),
        style(&id).bold(),
        style(path.display()).dim()
    );
    Ok(())
}

fn add_entry(config: &mut AppConfig, entry: ServerEntry, make_default: bool) -> Result<()> {
    if config.servers.iter().any(|s| s.id == entry.id) {
        bail!("Server '{}' already exists", entry.id);
    }

    if make_default || config.servers.is_empty() {
        config.default_server = Some(entry.id.clone());
    }
    config.servers.push(entry);
    config.validate()?;
    Ok(())
}
