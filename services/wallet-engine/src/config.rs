use config::{ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::env;

use crate::models::TransferMethod;

/// Minimum length of the HS256 signing secret, in bytes.
pub const MIN_JWT_SECRET_LEN: usize = 32;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub storage: StorageConfig,
    pub auth: AuthConfig,
    pub transfer: TransferConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub workers: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Postgres,
    Memory,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct StorageConfig {
    pub backend: StorageBackend,
}

#[derive(Deserialize, Serialize, Clone)]
pub struct AuthConfig {
    #[serde(default)]
    pub jwt_secret: String,
    pub token_ttl_secs: i64,
}

// Keeps the signing secret out of startup logs.
impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("jwt_secret", &"<redacted>")
            .field("token_ttl_secs", &self.token_ttl_secs)
            .finish()
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct TransferConfig {
    pub max_amount: i64,
    pub allowed_methods: Vec<TransferMethod>,
}

impl Default for TransferConfig {
    fn default() -> Self {
        TransferConfig {
            max_amount: 10_000_000,
            allowed_methods: vec![
                TransferMethod::Qr,
                TransferMethod::Bluetooth,
                TransferMethod::Nfc,
            ],
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let environment = env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());

        let mut builder = config::Config::builder()
            // Start with default configuration
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 5000)?
            .set_default("server.workers", 4)?
            .set_default("database.max_connections", 10)?
            .set_default("database.min_connections", 2)?
            .set_default("database.acquire_timeout_secs", 5)?
            .set_default("storage.backend", "postgres")?
            .set_default("auth.token_ttl_secs", 3600)?
            .set_default("transfer.max_amount", 10_000_000)?
            .set_default("transfer.allowed_methods", vec!["qr", "bluetooth", "nfc"])?;

        if let Ok(config_file) = env::var("CONFIG_FILE") {
            builder = builder.add_source(File::with_name(&config_file).required(false));
        } else {
            builder = builder.add_source(
                File::with_name(&format!("config/{}", environment)).required(false),
            );
        }

        // Override with environment variables
        builder = builder.add_source(
            Environment::with_prefix("WALLET_ENGINE").separator("__"),
        );

        if let Ok(db_url) = env::var("DATABASE_URL") {
            builder = builder.set_override("database.url", db_url)?;
        }

        if let Ok(secret) = env::var("JWT_SECRET") {
            builder = builder.set_override("auth.jwt_secret", secret)?;
        }

        if let Ok(port) = env::var("WALLET_ENGINE_PORT") {
            builder = builder.set_override("server.port", port)?;
        }

        builder.build()?.try_deserialize()
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.server.port == 0 {
            return Err("Server port cannot be 0".to_string());
        }

        if self.storage.backend == StorageBackend::Postgres && self.database.url.is_empty() {
            return Err("Database URL is required for the postgres backend".to_string());
        }

        if self.auth.jwt_secret.len() < MIN_JWT_SECRET_LEN {
            return Err(format!(
                "JWT secret must be at least {} bytes",
                MIN_JWT_SECRET_LEN
            ));
        }

        if self.auth.token_ttl_secs <= 0 {
            return Err("Token lifetime must be positive".to_string());
        }

        if self.transfer.max_amount <= 0 {
            return Err("Maximum transfer amount must be positive".to_string());
        }

        if self.transfer.allowed_methods.is_empty() {
            return Err("At least one transfer method is required".to_string());
        }

        Ok(())
    }
}
