use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::env;

/// Signing secret used when JWT_SECRET is not set. Refused in production.
pub const DEVELOPMENT_JWT_SECRET: &str = "roadnet-development-secret";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub environment: Environment,
    pub database: DatabaseConfig,
    pub api: ApiConfig,
    pub security: SecurityConfig,
    pub network: NetworkConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

/// Which store implementation backs the service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Postgres,
    Memory,
}

impl std::str::FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" | "pg" => Ok(StoreBackend::Postgres),
            "memory" | "mem" => Ok(StoreBackend::Memory),
            other => Err(format!("unknown store backend '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub backend: StoreBackend,
    pub url: Option<String>,
    pub max_connections: u32,
    pub connection_timeout: u64,
    pub run_migrations: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub port: u16,
    pub enable_request_logging: bool,
    pub max_request_size_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    pub enable_cors: bool,
    pub cors_origins: Vec<String>,
    pub jwt_secret: String,
    pub jwt_expiry_hours: u64,
    pub bcrypt_cost: u32,
    pub allow_privileged_signup: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub default_name: String,
    pub max_features_per_upload: Option<usize>,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let environment = match env::var("APP_ENV").as_deref() {
            Ok("production") | Ok("prod") => Environment::Production,
            Ok("staging") | Ok("stage") => Environment::Staging,
            _ => Environment::Development,
        };

        // Set defaults based on environment, then override with specific env vars
        match environment {
            Environment::Production => Self::production(),
            Environment::Staging => Self::staging(),
            Environment::Development => Self::development(),
        }
        .with_env_overrides()
    }

    fn with_env_overrides(mut self) -> Self {
        // Database overrides
        if let Ok(v) = env::var("ROADNET_STORE") {
            self.database.backend = v.parse().unwrap_or(self.database.backend);
        }
        if let Ok(v) = env::var("DATABASE_URL") {
            self.database.url = Some(v);
        }
        if let Ok(v) = env::var("DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = v.parse().unwrap_or(self.database.max_connections);
        }
        if let Ok(v) = env::var("DATABASE_CONNECTION_TIMEOUT") {
            self.database.connection_timeout = v.parse().unwrap_or(self.database.connection_timeout);
        }
        if let Ok(v) = env::var("DATABASE_RUN_MIGRATIONS") {
            self.database.run_migrations = v.parse().unwrap_or(self.database.run_migrations);
        }

        // API overrides
        if let Some(port) = env::var("ROADNET_API_PORT")
            .ok()
            .or_else(|| env::var("PORT").ok())
            .and_then(|s| s.parse::<u16>().ok())
        {
            self.api.port = port;
        }
        if let Ok(v) = env::var("API_ENABLE_REQUEST_LOGGING") {
            self.api.enable_request_logging = v.parse().unwrap_or(self.api.enable_request_logging);
        }
        if let Ok(v) = env::var("API_MAX_REQUEST_SIZE_BYTES") {
            self.api.max_request_size_bytes = v.parse().unwrap_or(self.api.max_request_size_bytes);
        }

        // Security overrides
        if let Ok(v) = env::var("SECURITY_ENABLE_CORS") {
            self.security.enable_cors = v.parse().unwrap_or(self.security.enable_cors);
        }
        if let Ok(v) = env::var("SECURITY_CORS_ORIGINS") {
            self.security.cors_origins = v.split(',').map(|s| s.trim().to_string()).collect();
        }
        if let Ok(v) = env::var("JWT_SECRET") {
            if !v.is_empty() {
                self.security.jwt_secret = v;
            }
        }
        if let Ok(v) = env::var("SECURITY_JWT_EXPIRY_HOURS") {
            self.security.jwt_expiry_hours = v.parse().unwrap_or(self.security.jwt_expiry_hours);
        }
        if let Ok(v) = env::var("SECURITY_BCRYPT_COST") {
            self.security.bcrypt_cost = v.parse().unwrap_or(self.security.bcrypt_cost);
        }
        if let Ok(v) = env::var("SECURITY_ALLOW_PRIVILEGED_SIGNUP") {
            self.security.allow_privileged_signup = v.parse().unwrap_or(self.security.allow_privileged_signup);
        }

        // Network overrides
        if let Ok(v) = env::var("NETWORK_DEFAULT_NAME") {
            self.network.default_name = v;
        }
        if let Ok(v) = env::var("NETWORK_MAX_FEATURES_PER_UPLOAD") {
            self.network.max_features_per_upload = v.parse().ok();
        }

        self
    }

    pub fn development() -> Self {
        Self {
            environment: Environment::Development,
            database: DatabaseConfig {
                backend: StoreBackend::Postgres,
                url: None,
                max_connections: 10,
                connection_timeout: 30,
                run_migrations: true,
            },
            api: ApiConfig {
                port: 8000,
                enable_request_logging: true,
                max_request_size_bytes: 50 * 1024 * 1024, // 50MB
            },
            security: SecurityConfig {
                enable_cors: true,
                cors_origins: vec!["http://localhost:3000".to_string(), "http://localhost:5173".to_string()],
                jwt_secret: DEVELOPMENT_JWT_SECRET.to_string(),
                jwt_expiry_hours: 24,
                bcrypt_cost: 6,
                allow_privileged_signup: true,
            },
            network: NetworkConfig {
                default_name: "Unnamed Network".to_string(),
                max_features_per_upload: None,
            },
        }
    }

    pub fn staging() -> Self {
        Self {
            environment: Environment::Staging,
            database: DatabaseConfig {
                backend: StoreBackend::Postgres,
                url: None,
                max_connections: 20,
                connection_timeout: 10,
                run_migrations: true,
            },
            api: ApiConfig {
                port: 8000,
                enable_request_logging: true,
                max_request_size_bytes: 25 * 1024 * 1024, // 25MB
            },
            security: SecurityConfig {
                enable_cors: true,
                cors_origins: vec!["https://staging.example.com".to_string()],
                jwt_secret: DEVELOPMENT_JWT_SECRET.to_string(),
                jwt_expiry_hours: 24,
                bcrypt_cost: bcrypt::DEFAULT_COST,
                allow_privileged_signup: false,
            },
            network: NetworkConfig {
                default_name: "Unnamed Network".to_string(),
                max_features_per_upload: Some(250_000),
            },
        }
    }

    pub fn production() -> Self {
        Self {
            environment: Environment::Production,
            database: DatabaseConfig {
                backend: StoreBackend::Postgres,
                url: None,
                max_connections: 50,
                connection_timeout: 5,
                run_migrations: false,
            },
            api: ApiConfig {
                port: 8000,
                enable_request_logging: false,
                max_request_size_bytes: 25 * 1024 * 1024, // 25MB
            },
            security: SecurityConfig {
                enable_cors: true,
                cors_origins: vec!["https://app.example.com".to_string()],
                jwt_secret: DEVELOPMENT_JWT_SECRET.to_string(),
                jwt_expiry_hours: 4,
                bcrypt_cost: bcrypt::DEFAULT_COST,
                allow_privileged_signup: false,
            },
            network: NetworkConfig {
                default_name: "Unnamed Network".to_string(),
                max_features_per_upload: Some(250_000),
            },
        }
    }

    /// True when the signing secret is still the built-in development value
    pub fn uses_development_secret(&self) -> bool {
        self.security.jwt_secret == DEVELOPMENT_JWT_SECRET
    }
}

// Global singleton config - initialized once at startup
pub static CONFIG: Lazy<AppConfig> = Lazy::new(AppConfig::from_env);

// Convenience function for accessing config
pub fn config() -> &'static AppConfig {
    &CONFIG
}

#[macro_export]
macro_rules! is_production {
    () => {
        matches!($crate::config::CONFIG.environment, $crate::config::Environment::Production)
    };
}
