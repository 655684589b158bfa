pub mod commands;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::config::{AppConfig, ServerEntry};

#[derive(Parser)]
#[command(name = "dockssh")]
#[command(version)]
#[command(about = "Run commands, shells and file transfers on a Docker host over SSH")]
#[command(long_about = "Connects to one configured server at a time and transparently reconnects once when a command hits a dropped connection.")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (default: ~/.config/dockssh/config.yaml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Server id from the config file
    #[arg(short, long, global = true)]
    pub server: Option<String>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Execute a command on the server
    Exec {
        /// Command to execute
        #[arg(required = true, trailing_var_arg = true)]
        command: Vec<String>,
    },

    /// Open an interactive shell, optionally inside a container
    Shell {
        /// Container to enter after the shell opens
        #[arg(long)]
        container: Option<String>,

        /// Command used to enter the container (default: docker exec -it <container> sh)
        #[arg(long, requires = "container")]
        entry: Option<String>,
    },

    /// List a remote directory
    Ls {
        /// Remote path
        #[arg(default_value = ".")]
        path: String,
    },

    /// Print a remote file
    Cat {
        /// Remote path
        path: String,
    },

    /// Upload a local file
    Put {
        /// Local file
        local: PathBuf,
        /// Remote destination path
        remote: String,
    },

    /// Connect and probe the server
    Test {
        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// List configured servers
    Servers,

    /// Add a server to the config file
    Add {
        /// Server id
        id: String,

        /// Host name or address
        #[arg(long)]
        host: String,

        /// SSH user
        #[arg(short, long)]
        user: String,

        /// SSH port
        #[arg(short, long, default_value = "22")]
        port: u16,

        /// Display name
        #[arg(long)]
        name: Option<String>,

        /// Private key file (default: password from DOCKSSH_PASSWORD)
        #[arg(long)]
        key: Option<String>,

        /// Make this the default server
        #[arg(long)]
        default: bool,
    },
}

impl Cli {
    pub async fn execute(self) -> Result<()> {
        let config_path = self.config.as_deref();
        let server = self.server.as_deref();
        let load = || AppConfig::load(config_path);

        match self.command {
            Commands::Add {
                id,
                host,
                user,
                port,
                name,
                key,
                default,
            } => {
                let entry = ServerEntry {
                    id,
                    name,
                    host,
                    port,
                    username: user,
                    password: None,
                    private_key: None,
                    private_key_path: key,
                    passphrase: None,
                };
                commands::servers::add(config_path, entry, default)
            }
            Commands::Servers => commands::servers::list(&load()?),
            Commands::Exec { command } => {
                commands::remote::exec(&load()?, server, &command.join(" ")).await
            }
            Commands::Test { json } => commands::remote::test(&load()?, server, json).await,
            Commands::Shell { container, entry } => {
                commands::shell::execute(&load()?, server, container, entry).await
            }
            Commands::Ls { path } => commands::files::list(&load()?, server, &path).await,
            Commands::Cat { path } => commands::files::cat(&load()?, server, &path).await,
            Commands::Put { local, remote } => {
                commands::files::put(&load()?, server, &local, &remote).await
            }
        }
    }
}
