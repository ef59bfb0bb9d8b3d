use chrono::Utc;
use clap::Subcommand;
use serde_json::json;

use crate::cli::client::ApiClient;
use crate::cli::config::{load_config, save_config};
use crate::cli::utils::{field, output_data, output_success, resolve_password};
use crate::cli::OutputFormat;

#[derive(Subcommand)]
pub enum AuthCommands {
    #[command(about = "Login to the selected server")]
    Login {
        #[arg(help = "Account email")]
        email: String,
        #[arg(long, help = "Password (falls back to ROADNET_PASSWORD, then stdin)")]
        password: Option<String>,
    },

    #[command(about = "Forget the stored token")]
    Logout,

    #[command(about = "Show current user information")]
    Whoami,
}

pub async fn handle(cmd: AuthCommands, output_format: OutputFormat) -> anyhow::Result<()> {
    match cmd {
        AuthCommands::Login { email, password } => {
            let password = resolve_password(password)?;
            let mut config = load_config()?;
            let client = ApiClient::new(config.server_url(), None)?;

            let token = client
                .post_form("/auth/login", &[("username", email.as_str()), ("password", password.as_str())])
                .await?;
            let access_token = token
                .get("access_token")
                .and_then(|t| t.as_str())
                .ok_or_else(|| anyhow::anyhow!("Server response did not include an access token"))?;

            config.token = Some(access_token.to_string());
            config.email = Some(email.clone());
            config.logged_in_at = Some(Utc::now());
            save_config(&config)?;

            output_success(
                &output_format,
                &format!("Logged in as {}", email),
                Some(json!({ "email": email, "expires_in": token.get("expires_in") })),
            )
        }
        AuthCommands::Logout => {
            let mut config = load_config()?;
            config.clear_session();
            save_config(&config)?;
            output_success(&output_format, "Logged out", None)
        }
        AuthCommands::Whoami => {
            let config = load_config()?;
            let user = ApiClient::authenticated(&config)?.get("/auth/whoami").await?;
            output_data(&output_format, &user, |u| {
                println!("{} <{}>", field(u, "username"), field(u, "email"));
                println!("ID: {}", field(u, "id"));
                println!("Role: {}", field(u, "role"));
            })
        }
    }
}
