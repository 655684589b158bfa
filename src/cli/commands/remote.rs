use anyhow::Result;
use console::style;
use serde::Serialize;

use crate::config::AppConfig;
use crate::connection::ConnectionStatus;

pub async fn exec(config: &AppConfig, server: Option<&str>, command: &str) -> Result<()> {
    let manager = super::connect(config, server).await?;

    let output = manager.execute_command(command).await;
    manager.disconnect().await;

    print!("{}", output?);
    Ok(())
}

#[derive(Serialize)]
struct TestReport<'a> {
    server: &'a str,
    status: ConnectionStatus,
    alive: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

pub async fn test(config: &AppConfig, server: Option<&str>, json: bool) -> Result<()> {
    let id = config.server(server)?.id.clone();

    let (alive, status, error) = match super::connect(config, server).await {
        Ok(manager) => {
            let alive = manager.test_connection().await;
            let status = manager.status();
            let error = manager.last_error();
            manager.disconnect().await;
            (alive, status, error)
        }
        Err(e) => (false, ConnectionStatus::Failed, Some(e.to_string())),
    };

    if json {
        let report = TestReport {
            server: &id,
            status,
            alive,
            error,
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else if alive {
        println!("{} {} is reachable", style("✓").green().bold(), style(&id).bold());
    } else {
        println!(
            "{} {} is not reachable{}",
            style("✗").red().bold(),
            style(&id).bold(),
            error.map(|e| format!(": {}", e)).unwrap_or_default()
        );
    }

    if !alive {
        std::process::exit(1);
    }
    Ok(())
}
