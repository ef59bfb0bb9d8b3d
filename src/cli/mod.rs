pub mod client;
pub mod commands;
pub mod config;
pub mod utils;

use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};

#[derive(Parser)]
#[command(name = "roadnet")]
#[command(about = "Road network CLI - upload, version and query road networks")]
#[command(version)]
pub struct Cli {
    #[arg(long, global = true, help = "Output in JSON format")]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Select and inspect the API server")]
    Server {
        #[command(subcommand)]
        cmd: commands::server::ServerCommands,
    },

    #[command(about = "Authentication and token management")]
    Auth {
        #[command(subcommand)]
        cmd: commands::auth::AuthCommands,
    },

    #[command(about = "User account management")]
    User {
        #[command(subcommand)]
        cmd: commands::user::UserCommands,
    },

    #[command(about = "Road network upload, update and queries")]
    Network {
        #[command(subcommand)]
        cmd: commands::network::NetworkCommands,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum OutputFormat {
    Text,
    Json,
}

impl OutputFormat {
    pub fn from_cli(cli: &Cli) -> Self {
        if cli.json {
            OutputFormat::Json
        } else {
            OutputFormat::Text
        }
    }
}

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let output_format = OutputFormat::from_cli(&cli);

    let result = match cli.command {
        Commands::Server { cmd } => commands::server::handle(cmd, output_format.clone()).await,
        Commands::Auth { cmd } => commands::auth::handle(cmd, output_format.clone()).await,
        Commands::User { cmd } => commands::user::handle(cmd, output_format.clone()).await,
        Commands::Network { cmd } => commands::network::handle(cmd, output_format.clone()).await,
    };

    if let (Err(e), OutputFormat::Json) = (&result, &output_format) {
        utils::output_error(&output_format, &e.to_string())?;
    }
    result
}
