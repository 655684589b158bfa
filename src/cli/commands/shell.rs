use anyhow::Result;
use console::style;

use crate::config::AppConfig;
use crate::connection::ShellTarget;
use crate::ssh::{attach_terminal, PtySize};

fn default_entry(container: &str) -> String {
    format!("docker exec -it {} sh", container)
}

pub async fn execute(
    config: &AppConfig,
    server: Option<&str>,
    container: Option<String>,
    entry: Option<String>,
) -> Result<()> {
    let manager = super::connect(config, server).await?;

    let target = container.map(|container| {
        let entry = entry.unwrap_or_else(|| default_entry(&container));
        ShellTarget::new(container, entry)
    });

    if let Some(server) = manager.current_server() {
        println!(
            "  {} {} {}",
            style("→").bold(),
            style(&server.name).white().bold(),
            style(format!("({})", server.target())).dim()
        );
    }

    let shell = manager
        .open_interactive_session(&PtySize::from_local_terminal(), target.as_ref())
        .await?;
    let result = attach_terminal(shell).await;
    manager.disconnect().await;

    result?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_entry() {
        assert_eq!(default_entry("web"), "docker exec -it web sh");
    }
}
