use anyhow::Context;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use roadnet_api::app::{app, AppState};
use roadnet_api::config::{self, StoreBackend};
use roadnet_api::database::{DatabaseManager, MemoryStore, PgStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present so cargo run picks up DATABASE_URL, JWT_SECRET, etc.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("roadnet_api=info,tower_http=info")),
        )
        .init();

    let config = config::config().clone();
    tracing::info!("Starting Road Network API in {:?} mode", config.environment);

    if config.uses_development_secret() {
        if roadnet_api::is_production!() {
            anyhow::bail!("JWT_SECRET must be set in production");
        }
        tracing::warn!("Using the built-in development JWT secret");
    }

    let port = config.api.port;
    let state = match config.database.backend {
        StoreBackend::Memory => {
            tracing::warn!("Using the in-memory store; data is lost on shutdown");
            AppState::new(config, Arc::new(MemoryStore::new()))
        }
        StoreBackend::Postgres => {
            let pool = DatabaseManager::connect(&config.database).context("failed to configure database pool")?;
            if config.database.run_migrations {
                DatabaseManager::migrate(&pool).await.context("failed to apply migrations")?;
            }
            AppState::new(config, Arc::new(PgStore::new(pool)))
        }
    };

    let bind_addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", bind_addr))?;

    tracing::info!("Road Network API listening on http://{}", bind_addr);

    axum::serve(listener, app(state)).await.context("server error")?;
    Ok(())
}
