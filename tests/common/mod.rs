#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use reqwest::{multipart, StatusCode};
use serde_json::{json, Value};

use roadnet_api::app::{app, AppState};
use roadnet_api::config::{AppConfig, StoreBackend};
use roadnet_api::database::MemoryStore;

pub const PASSWORD: &str = "correct horse battery";

/// An API server running inside the test's runtime, backed by its own memory store
pub struct TestServer {
    pub port: u16,
    pub base_url: String,
    pub store: MemoryStore,
    pub client: reqwest::Client,
}

/// A registered user with a bearer token
pub struct TestUser {
    pub id: i64,
    pub email: String,
    pub token: String,
}

pub fn test_config() -> AppConfig {
    let mut config = AppConfig::development();
    config.database.backend = StoreBackend::Memory;
    config.api.enable_request_logging = false;
    config.security.bcrypt_cost = 4;
    config.security.allow_privileged_signup = true;
    config
}

impl TestServer {
    pub async fn spawn() -> Result<Self> {
        Self::spawn_with(test_config()).await
    }

    pub async fn spawn_with(mut config: AppConfig) -> Result<Self> {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();

        // Pick an unused port for isolation
        let port = portpicker::pick_unused_port().context("failed to pick free port")?;
        config.api.port = port;

        let store = MemoryStore::new();
        let state = AppState::new(config, Arc::new(store.clone()));
        let listener = tokio::net::TcpListener::bind(("127.0.0.1", port))
            .await
            .context("failed to bind test listener")?;
        tokio::spawn(async move {
            let _ = axum::serve(listener, app(state)).await;
        });

        let server = Self {
            port,
            base_url: format!("http://127.0.0.1:{}", port),
            store,
            client: reqwest::Client::new(),
        };
        server.wait_ready(Duration::from_secs(10)).await?;
        Ok(server)
    }

    async fn wait_ready(&self, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if let Ok(resp) = self.client.get(self.url("/health")).send().await {
                if resp.status() == StatusCode::OK {
                    return Ok(());
                }
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        anyhow::bail!("server did not become ready on {} within {:?}", self.base_url, timeout)
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub async fn register(&self, username: &str, role: Option<&str>) -> Result<reqwest::Response> {
        let mut body = json!({
            "username": username,
            "email": format!("{}@example.com", username),
            "password": PASSWORD,
        });
        if let Some(role) = role {
            body["role"] = json!(role);
        }
        Ok(self.client.post(self.url("/users")).json(&body).send().await?)
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<reqwest::Response> {
        Ok(self
            .client
            .post(self.url("/auth/login"))
            .form(&[("username", email), ("password", password)])
            .send()
            .await?)
    }

    /// Register and log in, returning id and token
    pub async fn user(&self, username: &str, role: Option<&str>) -> Result<TestUser> {
        let res = self.register(username, role).await?;
        anyhow::ensure!(res.status() == StatusCode::CREATED, "register failed: {}", res.status());
        let id = data(res).await?["id"].as_i64().context("missing user id")?;

        let email = format!("{}@example.com", username);
        let res = self.login(&email, PASSWORD).await?;
        anyhow::ensure!(res.status() == StatusCode::OK, "login failed: {}", res.status());
        let token = data(res).await?["access_token"]
            .as_str()
            .context("missing access token")?
            .to_string();

        Ok(TestUser { id, email, token })
    }

    pub async fn upload(&self, user: &TestUser, geojson: &str) -> Result<reqwest::Response> {
        self.send_file(user, "/networks/upload", geojson).await
    }

    pub async fn update(&self, user: &TestUser, network_id: i64, geojson: &str) -> Result<reqwest::Response> {
        self.send_file(user, &format!("/networks/{}/update", network_id), geojson).await
    }

    async fn send_file(&self, user: &TestUser, path: &str, geojson: &str) -> Result<reqwest::Response> {
        let part = multipart::Part::text(geojson.to_string()).file_name("network.geojson");
        let form = multipart::Form::new().part("file", part);
        Ok(self
            .client
            .post(self.url(path))
            .bearer_auth(&user.token)
            .multipart(form)
            .send()
            .await?)
    }

    pub async fn get(&self, user: &TestUser, path: &str) -> Result<reqwest::Response> {
        Ok(self.client.get(self.url(path)).bearer_auth(&user.token).send().await?)
    }

    pub async fn delete(&self, user: &TestUser, path: &str) -> Result<reqwest::Response> {
        Ok(self.client.delete(self.url(path)).bearer_auth(&user.token).send().await?)
    }
}

/// Body of a success envelope
pub async fn data(res: reqwest::Response) -> Result<Value> {
    let body: Value = res.json().await?;
    anyhow::ensure!(body["success"] == json!(true), "not a success envelope: {}", body);
    Ok(body["data"].clone())
}

pub fn fixture(name: &str) -> String {
    let path: PathBuf = [env!("CARGO_MANIFEST_DIR"), "tests", "fixtures", name].iter().collect();
    std::fs::read_to_string(&path).unwrap_or_else(|e| panic!("failed to read fixture {}: {}", path.display(), e))
}

/// Feature names of a FeatureCollection, sorted
pub fn edge_names(collection: &Value) -> Vec<String> {
    let mut names: Vec<String> = collection["features"]
        .as_array()
        .map(|features| {
            features
                .iter()
                .filter_map(|f| f["properties"]["name"].as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default();
    names.sort();
    names
}
