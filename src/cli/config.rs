use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

pub const DEFAULT_SERVER_URL: &str = "http://localhost:8000";

const CONFIG_FILE: &str = "config.json";

/// Persistent client state: which server to talk to and the current session
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CliConfig {
    pub server_url: Option<String>,
    pub token: Option<String>,
    pub email: Option<String>,
    pub logged_in_at: Option<DateTime<Utc>>,
}

impl CliConfig {
    pub fn server_url(&self) -> String {
        self.server_url
            .clone()
            .unwrap_or_else(|| DEFAULT_SERVER_URL.to_string())
    }

    pub fn clear_session(&mut self) {
        self.token = None;
        self.email = None;
        self.logged_in_at = None;
    }
}

pub fn get_config_dir() -> anyhow::Result<PathBuf> {
    let config_dir = if let Ok(custom_dir) = std::env::var("ROADNET_CLI_CONFIG_DIR") {
        PathBuf::from(custom_dir)
    } else {
        let home = std::env::var("HOME").map_err(|_| anyhow::anyhow!("HOME environment variable not set"))?;
        PathBuf::from(home).join(".config").join("roadnet").join("cli")
    };

    if !config_dir.exists() {
        fs::create_dir_all(&config_dir)?;
    }

    Ok(config_dir)
}

pub fn load_config() -> anyhow::Result<CliConfig> {
    let config_file = get_config_dir()?.join(CONFIG_FILE);

    if !config_file.exists() {
        return Ok(CliConfig::default());
    }

    let content = fs::read_to_string(config_file)?;
    let config: CliConfig = serde_json::from_str(&content)?;
    Ok(config)
}

pub fn save_config(config: &CliConfig) -> anyhow::Result<()> {
    let config_file = get_config_dir()?.join(CONFIG_FILE);

    let content = serde_json::to_string_pretty(config)?;
    fs::write(config_file, content)?;
    Ok(())
}
