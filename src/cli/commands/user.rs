use clap::Subcommand;
use serde_json::json;

use crate::cli::client::ApiClient;
use crate::cli::config::load_config;
use crate::cli::utils::{field, output_data, output_success, resolve_password};
use crate::cli::OutputFormat;

#[derive(Subcommand)]
pub enum UserCommands {
    #[command(about = "Register a new account")]
    Register {
        #[arg(help = "Username")]
        username: String,
        #[arg(help = "Email")]
        email: String,
        #[arg(long, help = "Password (falls back to ROADNET_PASSWORD, then stdin)")]
        password: Option<String>,
        #[arg(long, help = "Role: USER, GUEST, MODERATOR or ADMIN")]
        role: Option<String>,
    },

    #[command(about = "Show a user")]
    Show {
        #[arg(help = "User ID")]
        id: i64,
    },

    #[command(about = "Delete a user and everything they own (admin only)")]
    Delete {
        #[arg(help = "User ID")]
        id: i64,
    },
}

pub async fn handle(cmd: UserCommands, output_format: OutputFormat) -> anyhow::Result<()> {
    let config = load_config()?;

    match cmd {
        UserCommands::Register { username, email, password, role } => {
            let password = resolve_password(password)?;
            let mut body = json!({ "username": username, "email": email, "password": password });
            if let Some(role) = role {
                body["role"] = json!(role.to_uppercase());
            }

            let user = ApiClient::from_config(&config)?.post_json("/users", &body).await?;
            output_success(
                &output_format,
                &format!("Registered user {} ({})", field(&user, "username"), field(&user, "id")),
                Some(json!({ "user": user })),
            )
        }
        UserCommands::Show { id } => {
            let user = ApiClient::authenticated(&config)?.get(&format!("/users/{}", id)).await?;
            output_data(&output_format, &user, |u| {
                println!("{} <{}>", field(u, "username"), field(u, "email"));
                println!("ID: {}", field(u, "id"));
                println!("Role: {}", field(u, "role"));
                println!("Created: {}", field(u, "created_at"));
            })
        }
        UserCommands::Delete { id } => {
            ApiClient::authenticated(&config)?.delete(&format!("/users/{}", id)).await?;
            output_success(&output_format, &format!("User {} deleted", id), Some(json!({ "id": id })))
        }
    }
}
