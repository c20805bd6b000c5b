use std::time::Duration;

use serde::Deserialize;
use tokio::fs;

use crate::errors::AppResult;

pub async fn load_config(path: &str) -> AppResult<Config> {
    let contents = fs::read_to_string(path).await?;
    let mut parsed: Config = toml::from_str(&contents).map_err(anyhow::Error::from)?;

    if let Ok(url) = dotenvy::var("DATABASE_URL") {
        parsed.database.url = Some(url);
    }

    Ok(parsed)
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    pub bind_address: String,
    pub cors_origin: String,
    /// Base used when building share links returned by uploads.
    pub public_url: String,
    pub storage_dir: String,
    pub temp_dir: String,
    pub max_request_bytes: usize,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:8080".to_string(),
            cors_origin: "http://localhost:3000".to_string(),
            public_url: "http://localhost:8080".to_string(),
            storage_dir: "./storage/uploads/".to_string(),
            temp_dir: "./storage/temp/".to_string(),
            max_request_bytes: 500 * 1024 * 1024 + 1024,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Without a url the service keeps records in memory.
    pub url: Option<String>,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: 50,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    pub default_expiry_days: i64,
    /// 0 turns the background sweep off.
    pub sweep_interval_secs: u64,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            default_expiry_days: 365,
            sweep_interval_secs: 3600,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub ttl_secs: i64,
    pub volatile_ttl_secs: i64,
    pub imminent_expiry_mins: i64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_secs: 300,
            volatile_ttl_secs: 60,
            imminent_expiry_mins: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    pub archive_timeout_secs: u64,
    pub stream_timeout_secs: u64,
}

impl TransferConfig {
    pub fn archive_timeout(&self) -> Duration {
        Duration::from_secs(self.archive_timeout_secs)
    }

    pub fn stream_timeout(&self) -> Duration {
        Duration::from_secs(self.stream_timeout_secs)
    }
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            archive_timeout_secs: 300,
            stream_timeout_secs: 3600,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct InstrumentationConfig {
    pub directives: Vec<String>,
}

impl Default for InstrumentationConfig {
    fn default() -> Self {
        Self {
            directives: vec!["info".to_string()],
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,
    pub database: DatabaseConfig,
    pub lifecycle: LifecycleConfig,
    pub cache: CacheConfig,
    pub transfer: TransferConfig,
    pub instrumentation: InstrumentationConfig,
}
