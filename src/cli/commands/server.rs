use clap::Subcommand;
use serde_json::json;

use crate::cli::client::ApiClient;
use crate::cli::config::{load_config, save_config};
use crate::cli::utils::{field, output_data, output_success};
use crate::cli::OutputFormat;

#[derive(Subcommand)]
pub enum ServerCommands {
    #[command(about = "Switch to a server by base URL")]
    Use {
        #[arg(help = "Server base URL, e.g. http://localhost:8000")]
        url: String,
    },

    #[command(about = "Show the selected server and its health")]
    Show,
}

pub async fn handle(cmd: ServerCommands, output_format: OutputFormat) -> anyhow::Result<()> {
    match cmd {
        ServerCommands::Use { url } => {
            let parsed = url::Url::parse(&url).map_err(|e| anyhow::anyhow!("Invalid server URL '{}': {}", url, e))?;
            if !matches!(parsed.scheme(), "http" | "https") {
                anyhow::bail!("Server URL must use http or https");
            }

            let mut config = load_config()?;
            let url = url.trim_end_matches('/').to_string();
            if config.server_url.as_deref() != Some(url.as_str()) {
                // A token from another server is useless here
                config.clear_session();
            }
            config.server_url = Some(url.clone());
            save_config(&config)?;

            output_success(
                &output_format,
                &format!("Switched to server '{}'", url),
                Some(json!({ "server_url": url })),
            )
        }
        ServerCommands::Show => {
            let config = load_config()?;
            let client = ApiClient::from_config(&config)?;
            let health = match client.get("/health").await {
                Ok(data) => data,
                Err(e) => json!({ "status": "down", "error": e.to_string() }),
            };

            let details = json!({
                "server_url": client.base_url(),
                "logged_in_as": config.email,
                "health": health,
            });
            output_data(&output_format, &details, |d| {
                println!("Server: {}", field(d, "server_url"));
                println!("Status: {}", field(&d["health"], "status"));
                println!("Logged in as: {}", field(d, "logged_in_as"));
            })
        }
    }
}
