//! Broker and queue configuration.

use std::str::FromStr;
use std::time::Duration;

use taskgate_core::heartbeat::{DEFAULT_HEARTBEAT_EXPIRY_MS, DEFAULT_WORKERS_KEY};
use taskgate_core::task::queue_key;

/// Default broker address when neither `REDIS_URL` nor `REDIS_IP` is set.
const DEFAULT_REDIS_ADDR: &str = "localhost:6379";

const DEFAULT_NAMESPACE: &str = "sgnet";

const DEFAULT_QUEUE_SET: &str = "tasks";

/// Default result timeout for the blocking path, in milliseconds.
pub const DEFAULT_TASK_TIMEOUT_MS: u64 = 30_000;

/// A configuration variable held a value that could not be used.
#[derive(Debug, thiserror::Error)]
#[error("Invalid value '{value}' for {var}: {reason}")]
pub struct ConfigError {
    pub var: &'static str,
    pub value: String,
    pub reason: String,
}

/// Parse `var` from `lookup`, falling back to `default` when unset or empty.
pub fn parse_var<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(var).filter(|v| !v.trim().is_empty()) {
        Some(value) => value.trim().parse().map_err(|e: T::Err| ConfigError {
            var,
            value,
            reason: e.to_string(),
        }),
        None => Ok(default),
    }
}

/// Where the broker lives and how the gateway uses it.
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// Connection URL, e.g. `redis://localhost:6379`.
    pub url: String,
    /// Queue key namespace (default: `sgnet`).
    pub namespace: String,
    /// Queue key name inside the namespace (default: `tasks`).
    pub queue_set: String,
    /// Result timeout for non-streaming requests (default: 30 s).
    pub task_timeout: Duration,
    /// Hash holding worker heartbeat records.
    pub workers_key: String,
    /// Heartbeat age after which a worker is reported down, in milliseconds.
    pub heartbeat_expiry_ms: i64,
}

impl BrokerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var               | Default              |
    /// |-----------------------|----------------------|
    /// | `REDIS_URL`           | unset                |
    /// | `REDIS_IP`            | `localhost:6379`     |
    /// | `REDIS_NAMESPACE`     | `sgnet`              |
    /// | `REDIS_SET`           | `tasks`              |
    /// | `TASK_TIMEOUT`        | `30000` (ms)         |
    /// | `WORKERS_KEY`         | `workers:registered` |
    /// | `HEARTBEAT_EXPIRY_MS` | `15000`              |
    ///
    /// `REDIS_URL` takes precedence over `REDIS_IP`, which is a bare
    /// `host:port`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Same as [`from_env`](Self::from_env) but reads variables through
    /// `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let url = match lookup("REDIS_URL").filter(|v| !v.trim().is_empty()) {
            Some(url) => url,
            None => {
                let addr = lookup("REDIS_IP")
                    .filter(|v| !v.trim().is_empty())
                    .unwrap_or_else(|| DEFAULT_REDIS_ADDR.to_string());
                format!("redis://{}", addr.trim())
            }
        };

        let namespace = lookup("REDIS_NAMESPACE").unwrap_or_else(|| DEFAULT_NAMESPACE.into());
        let queue_set = lookup("REDIS_SET")
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_QUEUE_SET.into());

        let timeout_ms: u64 = parse_var(&lookup, "TASK_TIMEOUT", DEFAULT_TASK_TIMEOUT_MS)?;
        if timeout_ms == 0 {
            return Err(ConfigError {
                var: "TASK_TIMEOUT",
                value: "0".into(),
                reason: "must be greater than zero".into(),
            });
        }

        let workers_key = lookup("WORKERS_KEY")
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_WORKERS_KEY.into());
        let heartbeat_expiry_ms =
            parse_var(&lookup, "HEARTBEAT_EXPIRY_MS", DEFAULT_HEARTBEAT_EXPIRY_MS)?;

        Ok(Self {
            url,
            namespace,
            queue_set,
            task_timeout: Duration::from_millis(timeout_ms),
            workers_key,
            heartbeat_expiry_ms,
        })
    }

    /// The work queue key, `<namespace>:<set>`.
    pub fn queue_key(&self) -> String {
        queue_key(&self.namespace, &self.queue_set)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |var| map.get(var).cloned()
    }

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let config = BrokerConfig::from_lookup(lookup_from(&[])).unwrap();

        assert_eq!(config.url, "redis://localhost:6379");
        assert_eq!(config.queue_key(), "sgnet:tasks");
        assert_eq!(config.task_timeout, Duration::from_secs(30));
        assert_eq!(config.workers_key, "workers:registered");
        assert_eq!(config.heartbeat_expiry_ms, 15_000);
    }

    #[test]
    fn redis_ip_builds_url() {
        let config = BrokerConfig::from_lookup(lookup_from(&[("REDIS_IP", "10.0.0.5:6380")])).unwrap();
        assert_eq!(config.url, "redis://10.0.0.5:6380");
    }

    #[test]
    fn redis_url_wins_over_redis_ip() {
        let config = BrokerConfig::from_lookup(lookup_from(&[
            ("REDIS_URL", "redis://broker:6379/2"),
            ("REDIS_IP", "10.0.0.5:6380"),
        ]))
        .unwrap();
        assert_eq!(config.url, "redis://broker:6379/2");
    }

    #[test]
    fn queue_key_uses_namespace_and_set() {
        let config = BrokerConfig::from_lookup(lookup_from(&[
            ("REDIS_NAMESPACE", "prod"),
            ("REDIS_SET", "llm"),
        ]))
        .unwrap();
        assert_eq!(config.queue_key(), "prod:llm");
    }

    #[test]
    fn task_timeout_is_milliseconds() {
        let config = BrokerConfig::from_lookup(lookup_from(&[("TASK_TIMEOUT", "1500")])).unwrap();
        assert_eq!(config.task_timeout, Duration::from_millis(1500));
    }

    #[test]
    fn invalid_timeout_names_the_variable() {
        let err = BrokerConfig::from_lookup(lookup_from(&[("TASK_TIMEOUT", "soon")])).unwrap_err();
        assert_eq!(err.var, "TASK_TIMEOUT");
        assert_eq!(err.value, "soon");
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let err = BrokerConfig::from_lookup(lookup_from(&[("TASK_TIMEOUT", "0")])).unwrap_err();
        assert_eq!(err.var, "TASK_TIMEOUT");
    }
}
