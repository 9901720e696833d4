//! Application configuration loaded from environment variables.

use std::str::FromStr;
use std::time::Duration;

use commands::{CommandsConfig, RetryPolicy};
use projections::ProcessorConfig;

/// Output format of the log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "text" | "pretty" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format {other:?}")),
        }
    }
}

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`, `PORT`: bind address (default `0.0.0.0:3000`)
/// - `RUST_LOG`: tracing filter directive (default `info`)
/// - `LOG_FORMAT`: `text` or `json`
/// - `DATABASE_URL`: PostgreSQL backend; the in-memory backend without it
/// - `EXTERNAL_DOMAIN`: instance domain org domains are derived under
/// - `DEFAULT_ORG_ID`: the organization that cannot be removed
/// - `PROJECTION_INTERVAL_MS`, `PROJECTION_BATCH_SIZE`, `PROJECTION_LOCK_TTL_MS`
/// - `PUBLIC_KEY_CACHE_MAX_AGE_SECS`
/// - `COMMAND_MAX_RETRIES`, `COMMAND_TIMEOUT_MS`
/// - `INITIAL_CODE_EXPIRY_SECS`
///
/// Unparsable values fall back to the default.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub database_url: Option<String>,
    pub external_domain: String,
    pub default_org_id: String,
    pub projection_interval: Duration,
    pub projection_batch_size: usize,
    pub projection_lock_ttl: Duration,
    pub public_key_cache_max_age: Duration,
    pub command_max_retries: u32,
    pub command_timeout: Duration,
    pub initial_code_expiry: Duration,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration from `lookup`, which maps a variable name to its
    /// value.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let millis = |key: &str, default: Duration| {
            parsed(&lookup, key).map(Duration::from_millis).unwrap_or(default)
        };
        let secs = |key: &str, default: Duration| {
            parsed(&lookup, key).map(Duration::from_secs).unwrap_or(default)
        };

        Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            port: parsed(&lookup, "PORT").unwrap_or(defaults.port),
            log_level: lookup("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: lookup("LOG_FORMAT")
                .and_then(|value| value.parse().ok())
                .unwrap_or(defaults.log_format),
            database_url: lookup("DATABASE_URL").filter(|url| !url.trim().is_empty()),
            external_domain: lookup("EXTERNAL_DOMAIN").unwrap_or(defaults.external_domain),
            default_org_id: lookup("DEFAULT_ORG_ID").unwrap_or(defaults.default_org_id),
            projection_interval: millis("PROJECTION_INTERVAL_MS", defaults.projection_interval),
            projection_batch_size: parsed(&lookup, "PROJECTION_BATCH_SIZE")
                .unwrap_or(defaults.projection_batch_size),
            projection_lock_ttl: millis("PROJECTION_LOCK_TTL_MS", defaults.projection_lock_ttl),
            public_key_cache_max_age: secs(
                "PUBLIC_KEY_CACHE_MAX_AGE_SECS",
                defaults.public_key_cache_max_age,
            ),
            command_max_retries: parsed(&lookup, "COMMAND_MAX_RETRIES")
                .unwrap_or(defaults.command_max_retries),
            command_timeout: millis("COMMAND_TIMEOUT_MS", defaults.command_timeout),
            initial_code_expiry: secs("INITIAL_CODE_EXPIRY_SECS", defaults.initial_code_expiry),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn commands_config(&self) -> CommandsConfig {
        CommandsConfig {
            instance_domain: self.external_domain.clone(),
            default_org_id: self.default_org_id.clone(),
            initial_code_expiry: self.initial_code_expiry,
            retry: RetryPolicy {
                max_attempts: self.command_max_retries,
                timeout: Some(self.command_timeout),
                ..RetryPolicy::default()
            },
            ..CommandsConfig::default()
        }
    }

    pub fn processor_config(&self) -> ProcessorConfig {
        ProcessorConfig {
            batch_size: self.projection_batch_size,
            interval: self.projection_interval,
            lock_ttl: self.projection_lock_ttl,
            ..ProcessorConfig::default()
        }
    }
}

fn parsed<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    lookup(key).and_then(|value| value.trim().parse().ok())
}

impl Default for Config {
    fn default() -> Self {
        let commands = CommandsConfig::default();
        let processor = ProcessorConfig::default();
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            database_url: None,
            external_domain: commands.instance_domain,
            default_org_id: commands.default_org_id,
            projection_interval: processor.interval,
            projection_batch_size: processor.batch_size,
            projection_lock_ttl: processor.lock_ttl,
            public_key_cache_max_age: Duration::from_secs(300),
            command_max_retries: commands.retry.max_attempts,
            command_timeout: commands.retry.timeout.unwrap_or(Duration::from_secs(10)),
            initial_code_expiry: commands.initial_code_expiry,
        }
    }
}
