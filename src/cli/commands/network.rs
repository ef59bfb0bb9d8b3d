use clap::Subcommand;
use serde_json::{json, Value};
use std::path::PathBuf;

use crate::cli::client::ApiClient;
use crate::cli::config::load_config;
use crate::cli::utils::{field, output_data, output_success};
use crate::cli::OutputFormat;

#[derive(Subcommand)]
pub enum NetworkCommands {
    #[command(about = "Create a network from a GeoJSON FeatureCollection file")]
    Upload {
        #[arg(help = "Path to the .geojson file")]
        file: PathBuf,
    },

    #[command(about = "Replace the current edges of a network")]
    Update {
        #[arg(help = "Network ID")]
        id: i64,
        #[arg(help = "Path to the .geojson file")]
        file: PathBuf,
    },

    #[command(about = "Fetch edges as GeoJSON, optionally as of a point in time")]
    Edges {
        #[arg(help = "Network ID")]
        id: i64,
        #[arg(long, help = "Reconstruct at this time (RFC 3339 or ISO 8601)")]
        at: Option<String>,
        #[arg(long, short, help = "Write the FeatureCollection to a file instead of stdout")]
        output: Option<PathBuf>,
    },

    #[command(about = "List networks (defaults to your own)")]
    List {
        #[arg(long, help = "Owner user ID")]
        user: Option<i64>,
    },

    #[command(about = "Show the generation history of a network")]
    History {
        #[arg(help = "Network ID")]
        id: i64,
    },

    #[command(about = "Delete a network with its whole history")]
    Delete {
        #[arg(help = "Network ID")]
        id: i64,
    },
}

pub async fn handle(cmd: NetworkCommands, output_format: OutputFormat) -> anyhow::Result<()> {
    let config = load_config()?;
    let client = ApiClient::authenticated(&config)?;

    match cmd {
        NetworkCommands::Upload { file } => {
            let network = client.post_file("/networks/upload", &file).await?;
            output_success(
                &output_format,
                &format!("Uploaded network '{}' with ID {}", field(&network, "name"), field(&network, "network_id")),
                Some(json!({ "network": network })),
            )
        }
        NetworkCommands::Update { id, file } => {
            let outcome = client.post_file(&format!("/networks/{}/update", id), &file).await?;
            output_success(
                &output_format,
                &format!(
                    "Network {} is now at generation {}: {} edges retired, {} inserted",
                    id,
                    field(&outcome, "generation"),
                    field(&outcome, "retired"),
                    field(&outcome, "inserted")
                ),
                Some(json!({ "outcome": outcome })),
            )
        }
        NetworkCommands::Edges { id, at, output } => {
            let path = format!("/networks/{}/edges", id);
            let collection = match &at {
                Some(timestamp) => client.get_with_query(&path, &[("timestamp", timestamp.as_str())]).await?,
                None => client.get(&path).await?,
            };

            match output {
                Some(file) => {
                    tokio::fs::write(&file, serde_json::to_vec_pretty(&collection)?).await?;
                    let count = feature_count(&collection);
                    output_success(
                        &output_format,
                        &format!("Wrote {} edges to {}", count, file.display()),
                        Some(json!({ "features": count, "path": file.display().to_string() })),
                    )
                }
                // GeoJSON is the useful text form too
                None => {
                    println!("{}", serde_json::to_string_pretty(&collection)?);
                    Ok(())
                }
            }
        }
        NetworkCommands::List { user } => {
            let user_id = match user {
                Some(id) => id,
                None => client
                    .get("/auth/whoami")
                    .await?
                    .get("id")
                    .and_then(Value::as_i64)
                    .ok_or_else(|| anyhow::anyhow!("Could not determine the current user"))?,
            };

            let networks = client.get(&format!("/users/{}/networks", user_id)).await?;
            output_data(&output_format, &networks, |list| {
                let rows = list.as_array().map(Vec::as_slice).unwrap_or_default();
                if rows.is_empty() {
                    println!("No networks found");
                }
                for network in rows {
                    println!(
                        "{:>6}  {:<32}  {}",
                        field(network, "id"),
                        field(network, "name"),
                        field(network, "timestamp")
                    );
                }
            })
        }
        NetworkCommands::History { id } => {
            let generations = client.get(&format!("/networks/{}/generations", id)).await?;
            output_data(&output_format, &generations, |list| {
                for generation in list.as_array().map(Vec::as_slice).unwrap_or_default() {
                    println!(
                        "generation {:>4}  {}  {} edges",
                        field(generation, "generation"),
                        field(generation, "started_at"),
                        field(generation, "edge_count")
                    );
                }
            })
        }
        NetworkCommands::Delete { id } => {
            client.delete(&format!("/networks/{}", id)).await?;
            output_success(&output_format, &format!("Network {} deleted", id), Some(json!({ "id": id })))
        }
    }
}

fn feature_count(collection: &Value) -> usize {
    collection
        .get("features")
        .and_then(Value::as_array)
        .map(Vec::len)
        .unwrap_or(0)
}
