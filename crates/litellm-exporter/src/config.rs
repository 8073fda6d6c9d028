//! Exporter configuration
//!
//! Layered with the `config` crate: compiled defaults, then an optional
//! file named by `LITELLM_EXPORTER_CONFIG`, then `LITELLM_EXPORTER_*`
//! environment variables (`__` separates sections). The flat `METRICS_PORT`
//! and `LOG_LEVEL` variables override everything else.

use std::net::SocketAddr;
use std::time::Duration;

use config::{Config, ConfigError, Environment, File, Map};
use litellm_exporter_collector::db::DatabaseSettings;
use litellm_exporter_collector::{EngineConfig, RetryPolicy, StaleSeries, REQUIRED_TABLES};
use litellm_exporter_common::{ExporterError, Result, TimeWindow, DEFAULT_TABLE_WAIT_SECS};
use serde::{Deserialize, Serialize};

/// Variable naming the configuration file
pub const CONFIG_FILE_ENV: &str = "LITELLM_EXPORTER_CONFIG";

/// Prefix of nested environment overrides
pub const ENV_PREFIX: &str = "LITELLM_EXPORTER";

/// Exporter configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ExporterConfig {
    /// HTTP pull endpoint
    pub server: ServerSettings,
    /// LiteLLM database
    pub database: DatabaseSettings,
    /// Collection behaviour
    pub metrics: MetricsSettings,
    /// Per-query retry schedule
    pub retry: RetrySettings,
    pub logging: LoggingSettings,
}

impl ExporterConfig {
    /// Load configuration from `.env`, the optional file and the process environment
    pub fn load() -> Result<Self> {
        // Try to load .env file
        let _ = dotenvy::dotenv();

        let file = std::env::var(CONFIG_FILE_ENV).ok();
        let vars: Map<String, String> = std::env::vars().collect();
        Self::from_sources(file.as_deref(), vars)
    }

    /// Build from an explicit file path and variable map
    pub fn from_sources(file: Option<&str>, vars: Map<String, String>) -> Result<Self> {
        let metrics_port = vars.get("METRICS_PORT").cloned();
        let log_level = vars.get("LOG_LEVEL").cloned();

        let mut builder = Config::builder();
        if let Some(path) = file {
            // format follows the extension: toml, yaml or json
            builder = builder.add_source(File::with_name(path));
        }

        let cfg: Self = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .source(Some(vars)),
            )
            .set_override_option("server.port", metrics_port)
            .map_err(config_error)?
            .set_override_option("logging.level", log_level)
            .map_err(config_error)?
            .build()
            .map_err(config_error)?
            .try_deserialize()
            .map_err(config_error)?;

        cfg.validate()?;
        Ok(cfg)
    }

    /// Reject configuration the exporter cannot start with
    pub fn validate(&self) -> Result<()> {
        self.database.validate()?;
        self.engine_config()?;
        self.listen_addr()?;

        if self.metrics.update_interval == 0 {
            return Err(ExporterError::Config("metrics.update_interval must be at least 1 second".into()));
        }
        if self.retry.max_attempts == 0 {
            return Err(ExporterError::Config("retry.max_attempts must be at least 1".into()));
        }
        if self.retry.multiplier.is_nan() || self.retry.multiplier < 1.0 {
            return Err(ExporterError::Config(format!(
                "retry.multiplier must be at least 1.0, got {}",
                self.retry.multiplier
            )));
        }
        if self.metrics.required_tables.is_empty() {
            return Err(ExporterError::Config("metrics.required_tables must not be empty".into()));
        }
        Ok(())
    }

    /// Address the HTTP endpoint binds to
    pub fn listen_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.server.host, self.server.port)
            .parse()
            .map_err(|e| ExporterError::Config(format!("invalid server address: {}", e)))
    }

    /// Windows and stale policy for the engine
    pub fn engine_config(&self) -> Result<EngineConfig> {
        Ok(EngineConfig {
            spend_window: TimeWindow::parse("spend", &self.metrics.spend_window)?,
            request_window: TimeWindow::parse("request", &self.metrics.request_window)?,
            error_window: TimeWindow::parse("error", &self.metrics.error_window)?,
            stale_series: self.metrics.stale_series,
        })
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.retry.max_attempts,
            Duration::from_millis(self.retry.initial_delay_ms),
            Duration::from_millis(self.retry.max_delay_ms),
            self.retry.multiplier,
        )
    }

    pub fn update_interval(&self) -> Duration {
        Duration::from_secs(self.metrics.update_interval)
    }

    pub fn table_wait(&self) -> Duration {
        Duration::from_secs(self.metrics.table_wait_secs)
    }
}

fn config_error(err: ConfigError) -> ExporterError {
    ExporterError::Config(err.to_string())
}

/// HTTP server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Bind host
    pub host: String,
    /// Bind port
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 9090,
        }
    }
}

/// Collection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsSettings {
    /// Trailing window for spend, tokens, requests and cache metrics
    pub spend_window: String,
    /// Reported as `litellm_exporter_window_seconds{window="request"}`
    pub request_window: String,
    /// Reported as `litellm_exporter_window_seconds{window="error"}`
    pub error_window: String,
    /// Seconds between the end of one cycle and the start of the next
    pub update_interval: u64,
    /// What happens to series that disappear from query results
    pub stale_series: StaleSeries,
    /// Tables that must exist before collection starts
    pub required_tables: Vec<String>,
    /// Bound on the startup wait for required tables
    pub table_wait_secs: u64,
}

impl Default for MetricsSettings {
    fn default() -> Self {
        Self {
            spend_window: "30d".to_string(),
            request_window: "24h".to_string(),
            error_window: "1h".to_string(),
            update_interval: 15,
            stale_series: StaleSeries::default(),
            required_tables: REQUIRED_TABLES.iter().map(|t| t.to_string()).collect(),
            table_wait_secs: DEFAULT_TABLE_WAIT_SECS,
        }
    }
}

/// Query retry settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    /// Total attempts per query, including the first
    pub max_attempts: u32,
    /// Delay before the second attempt
    pub initial_delay_ms: u64,
    /// Cap on any single delay
    pub max_delay_ms: u64,
    pub multiplier: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            max_attempts: policy.max_attempts,
            initial_delay_ms: policy.initial_delay.as_millis() as u64,
            max_delay_ms: policy.max_delay.as_millis() as u64,
            multiplier: policy.multiplier,
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Filter used when `RUST_LOG` is unset
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
        }
    }
}
