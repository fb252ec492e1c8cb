//! Application configuration.
//!
//! Configuration is loaded from a YAML file with environment variable
//! overrides. The file path defaults to `config.yaml` and can be set with the
//! `-f` flag or the `VGCTL_CONFIG` environment variable.
//!
//! Sources are merged in order, later ones winning:
//!
//! 1. YAML config file
//! 2. Environment variables prefixed with `VGCTL_` (double underscore for
//!    nesting, e.g. `VGCTL_RECONCILER__POLL_INTERVAL=10s`)
//! 3. `DATABASE_URL`, which overrides `database.url` when set

use clap::Parser;
use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::provider::DEFAULT_BASE_URL;

/// CLI args: config file path plus a validate-and-exit switch.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to configuration file
    #[arg(short = 'f', long, env = "VGCTL_CONFIG", default_value = "config.yaml")]
    pub config: String,

    /// Validate configuration and exit without starting the server
    #[arg(long)]
    pub validate: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// HTTP server host to bind to
    pub host: String,
    /// HTTP server port to bind to
    pub port: u16,
    /// `DATABASE_URL` override; folded into `database.url` during load
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database_url: Option<String>,
    pub database: DatabaseConfig,
    pub provider: ProviderConfig,
    pub reconciler: ReconcilerConfig,
    /// Object storage for input assets. Uploads are disabled when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uploads: Option<UploadConfig>,
    /// Origins allowed by CORS. Empty list means same-origin only.
    pub cors_allowed_origins: Vec<String>,
    /// Enable OpenTelemetry OTLP export for distributed tracing
    pub enable_otel_export: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            database_url: None,
            database: DatabaseConfig::default(),
            provider: ProviderConfig::default(),
            reconciler: ReconcilerConfig::default(),
            uploads: None,
            cors_allowed_origins: Vec::new(),
            enable_otel_export: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct DatabaseConfig {
    /// PostgreSQL connection string
    pub url: String,
    pub pool: PoolSettings,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "postgresql://localhost/vgctl".to_string(),
            pool: PoolSettings::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct PoolSettings {
    /// Maximum number of connections in the pool
    pub max_connections: u32,
    /// Minimum number of idle connections to maintain
    pub min_connections: u32,
    /// Maximum time to wait for a connection (seconds)
    pub acquire_timeout_secs: u64,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_connections: 10,
            min_connections: 0,
            acquire_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProviderConfig {
    /// Queue base URL
    pub base_url: String,
    /// Per-request HTTP timeout
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReconcilerConfig {
    /// Run the background reconciliation loop
    pub enabled: bool,
    /// Time between sweeps
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
    /// Maximum records fetched per sweep
    pub batch_size: i64,
    /// Concurrent provider polls within a sweep
    pub concurrency: usize,
    /// Fail and refund processing records older than this, even without a
    /// provider handle. Disabled when unset.
    #[serde(with = "humantime_serde")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stale_after: Option<Duration>,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval: Duration::from_secs(30),
            batch_size: 50,
            concurrency: 8,
            stale_after: None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct UploadConfig {
    /// S3 bucket name
    pub bucket: String,
    /// AWS region override; falls back to the ambient environment when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    /// Public base URL the bucket is served from
    pub public_base_url: String,
}

impl Config {
    pub fn figment(args: &Args) -> Figment {
        Figment::new()
            .merge(Yaml::file(&args.config))
            .merge(Env::prefixed("VGCTL_").split("__"))
            .merge(Env::raw().only(&["DATABASE_URL"]))
    }

    pub fn load(args: &Args) -> Result<Self, figment::Error> {
        let mut config: Self = Self::figment(args).extract()?;

        if let Some(url) = config.database_url.take() {
            config.database.url = url;
        }

        config.validate().map_err(figment::Error::from)?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.database.url.is_empty() {
            return Err("database.url must be set".to_string());
        }
        if self.reconciler.batch_size <= 0 {
            return Err("reconciler.batch_size must be positive".to_string());
        }
        if self.reconciler.concurrency == 0 {
            return Err("reconciler.concurrency must be positive".to_string());
        }
        if let Some(uploads) = &self.uploads {
            if uploads.bucket.is_empty() || uploads.public_base_url.is_empty() {
                return Err("uploads.bucket and uploads.public_base_url must both be set".to_string());
            }
        }
        Ok(())
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
