use std::path::Path;

use anyhow::{Context, Result};
use console::style;
use tokio::io::AsyncWriteExt;

use crate::config::AppConfig;
use crate::ssh::{EntryKind, RemoteEntry};

pub async fn list(config: &AppConfig, server: Option<&str>, path: &str) -> Result<()> {
    let manager = super::connect(config, server).await?;
    let entries = manager.list_files(path).await;
    manager.disconnect().await;

    let mut entries = entries?;
    entries.sort_by(|a, b| b.is_dir().cmp(&a.is_dir()).then_with(|| a.name.cmp(&b.name)));
    for entry in &entries {
        println!("{}", format_entry(entry));
    }
    Ok(())
}

pub async fn cat(config: &AppConfig, server: Option<&str>, path: &str) -> Result<()> {
    let manager = super::connect(config, server).await?;
    let content = manager.read_file(path).await;
    manager.disconnect().await;

    let mut stdout = tokio::io::stdout();
    stdout.write_all(&content?).await?;
    stdout.flush().await?;
    Ok(())
}

pub async fn put(config: &AppConfig, server: Option<&str>, local: &Path, remote: &str) -> Result<()> {
    let data = tokio::fs::read(local)
        .await
        .with_context(|| format!("Failed to read {}", local.display()))?;

    let manager = super::connect(config, server).await?;
    let result = manager.write_file(remote, &data).await;
    manager.disconnect().await;
    result?;

    println!(
        "{} {} -> {} ({} bytes)",
        style("✓").green().bold(),
        local.display(),
        remote,
        data.len()
    );
    Ok(())
}

fn format_entry(entry: &RemoteEntry) -> String {
    let kind = match entry.kind {
        EntryKind::Directory => "d",
        EntryKind::Symlink => "l",
        EntryKind::File => "-",
    };
    let mode = match entry.permissions {
        0 => "----".to_string(),
        p => format!("{:o}", p & 0o7777),
    };
    format!("{}{:>5} {:>10}  {}", kind, mode, entry.size, entry.name)
}
