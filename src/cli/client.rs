use anyhow::{anyhow, bail, Context};
use reqwest::{multipart, Method, RequestBuilder, Response, StatusCode};
use serde::Serialize;
use serde_json::Value;
use std::path::Path;
use std::time::Duration;

use crate::cli::config::CliConfig;

/// Thin HTTP client for the road network API. Unwraps the success envelope.
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(300))
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
        })
    }

    pub fn from_config(config: &CliConfig) -> anyhow::Result<Self> {
        Self::new(config.server_url(), config.token.clone())
    }

    /// Like `from_config`, but fails early when no one is logged in
    pub fn authenticated(config: &CliConfig) -> anyhow::Result<Self> {
        if config.token.is_none() {
            bail!("Not logged in. Run `roadnet auth login <email>` first");
        }
        Self::from_config(config)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn get(&self, path: &str) -> anyhow::Result<Value> {
        self.send(self.request(Method::GET, path)).await
    }

    pub async fn get_with_query<Q: Serialize + ?Sized>(&self, path: &str, query: &Q) -> anyhow::Result<Value> {
        self.send(self.request(Method::GET, path).query(query)).await
    }

    pub async fn delete(&self, path: &str) -> anyhow::Result<Value> {
        self.send(self.request(Method::DELETE, path)).await
    }

    pub async fn post_json<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> anyhow::Result<Value> {
        self.send(self.request(Method::POST, path).json(body)).await
    }

    pub async fn post_form<B: Serialize + ?Sized>(&self, path: &str, form: &B) -> anyhow::Result<Value> {
        self.send(self.request(Method::POST, path).form(form)).await
    }

    /// Upload a file as the multipart `file` field
    pub async fn post_file(&self, path: &str, file: &Path) -> anyhow::Result<Value> {
        let bytes = tokio::fs::read(file)
            .await
            .with_context(|| format!("failed to read {}", file.display()))?;
        let file_name = file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "network.geojson".to_string());

        let part = multipart::Part::bytes(bytes)
            .file_name(file_name)
            .mime_str("application/geo+json")?;
        let form = multipart::Form::new().part("file", part);

        self.send(self.request(Method::POST, path).multipart(form)).await
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self.http.request(method, format!("{}{}", self.base_url, path));
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder) -> anyhow::Result<Value> {
        let response = builder
            .send()
            .await
            .with_context(|| format!("failed to reach {}", self.base_url))?;
        unwrap_envelope(response).await
    }
}

async fn unwrap_envelope(response: Response) -> anyhow::Result<Value> {
    let status = response.status();
    if status == StatusCode::NO_CONTENT {
        return Ok(Value::Null);
    }

    let text = response.text().await?;
    let body: Value = serde_json::from_str(&text).unwrap_or(Value::String(text));

    if status.is_success() {
        return Ok(body.get("data").cloned().unwrap_or(body));
    }

    let message = body
        .get("message")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| body.to_string());
    let code = body.get("code").and_then(Value::as_str).unwrap_or("HTTP_ERROR");
    Err(anyhow!("{} ({} {})", message, status.as_u16(), code))
}
