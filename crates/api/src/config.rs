use axum::http::HeaderValue;
use taskgate_broker::config::{parse_var, BrokerConfig, ConfigError};

/// Log output format for the `fmt` subscriber layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable, multi-field lines (default).
    Pretty,
    /// One JSON object per event.
    Json,
}

/// Server configuration loaded from environment variables.
///
/// All fields have sensible defaults suitable for local development.
/// In production, override via environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `60`). Must outlast the
    /// task timeout so a missing result surfaces as 504, not 408.
    pub request_timeout_secs: u64,
    /// Names advertised by `/api/tags` and `/api/ps`.
    pub models: Vec<String>,
    /// Log output format (default: pretty).
    pub log_format: LogFormat,
    /// Broker connection, queue naming and result timeout.
    pub broker: BrokerConfig,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                | Default                    |
    /// |------------------------|----------------------------|
    /// | `HOST`                 | `0.0.0.0`                  |
    /// | `PORT`                 | `3000`                     |
    /// | `CORS_ORIGINS`         | `http://localhost:5173`    |
    /// | `REQUEST_TIMEOUT_SECS` | `60`                       |
    /// | `MODELS`               | empty                      |
    /// | `LOG_FORMAT`           | `pretty`                   |
    ///
    /// Broker variables are documented on [`BrokerConfig::from_env`].
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Same as [`from_env`](Self::from_env) but reads variables through
    /// `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let host = lookup("HOST")
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| "0.0.0.0".into());
        let port: u16 = parse_var(&lookup, "PORT", 3000)?;

        let cors_origins = split_list(
            &lookup("CORS_ORIGINS").unwrap_or_else(|| "http://localhost:5173".into()),
        );
        for origin in &cors_origins {
            HeaderValue::from_str(origin).map_err(|e| ConfigError {
                var: "CORS_ORIGINS",
                value: origin.clone(),
                reason: e.to_string(),
            })?;
        }

        let request_timeout_secs: u64 = parse_var(&lookup, "REQUEST_TIMEOUT_SECS", 60)?;
        let models = split_list(&lookup("MODELS").unwrap_or_default());

        let log_format = match lookup("LOG_FORMAT").as_deref().map(str::trim) {
            None | Some("") | Some("pretty") => LogFormat::Pretty,
            Some("json") => LogFormat::Json,
            Some(other) => {
                return Err(ConfigError {
                    var: "LOG_FORMAT",
                    value: other.to_string(),
                    reason: "expected 'pretty' or 'json'".into(),
                })
            }
        };

        let broker = BrokerConfig::from_lookup(&lookup)?;
        if request_timeout_secs.saturating_mul(1000) <= broker.task_timeout.as_millis() as u64 {
            return Err(ConfigError {
                var: "REQUEST_TIMEOUT_SECS",
                value: request_timeout_secs.to_string(),
                reason: format!(
                    "must exceed TASK_TIMEOUT ({} ms)",
                    broker.task_timeout.as_millis()
                ),
            });
        }

        Ok(Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            models,
            log_format,
            broker,
        })
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
