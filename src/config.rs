//! Configuration types.

use std::net::SocketAddr;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;

/// Service configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address the HTTP server listens on.
    pub bind_addr: SocketAddr,
    /// Search endpoint of the recognition service.
    pub upstream_url: String,
    /// Optional bearer token sent to the recognition service.
    pub upstream_token: Option<SecretString>,
    /// Hard limit on a single recognition call.
    pub upstream_timeout: Duration,
    /// Result count used when a submission doesn't ask for one.
    pub default_top_k: usize,
    /// Upper bound on a requested result count.
    pub max_top_k: usize,
    /// How often a status channel samples the job's queue position.
    pub poll_interval: Duration,
    /// How long a status channel keeps draining events after the job turns terminal.
    pub close_grace: Duration,
    /// Number of terminal job ids remembered for position lookups.
    pub finished_retention: usize,
    /// Largest accepted request body.
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 5000)),
            upstream_url: "http://127.0.0.1:8000/search".to_string(),
            upstream_token: None,
            upstream_timeout: Duration::from_secs(120),
            default_top_k: 10,
            max_top_k: 50,
            poll_interval: Duration::from_millis(1000),
            close_grace: Duration::from_millis(500),
            finished_retention: 10_000,
            max_upload_bytes: 10 * 1024 * 1024, // 10 MiB
        }
    }
}

impl ServerConfig {
    /// Build config from `FACE_QUEUE_*` environment variables, falling back
    /// to the defaults for anything unset or unparsable.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let upstream_token = std::env::var("FACE_QUEUE_UPSTREAM_TOKEN")
            .ok()
            .filter(|s| !s.is_empty())
            .map(SecretString::from);

        Self {
            bind_addr: env_parse("FACE_QUEUE_BIND", defaults.bind_addr),
            upstream_url: std::env::var("FACE_QUEUE_UPSTREAM_URL")
                .unwrap_or(defaults.upstream_url),
            upstream_token,
            upstream_timeout: Duration::from_secs(env_parse(
                "FACE_QUEUE_UPSTREAM_TIMEOUT_SECS",
                defaults.upstream_timeout.as_secs(),
            )),
            default_top_k: env_parse("FACE_QUEUE_TOP_K", defaults.default_top_k),
            max_top_k: env_parse("FACE_QUEUE_MAX_TOP_K", defaults.max_top_k),
            poll_interval: Duration::from_millis(env_parse(
                "FACE_QUEUE_POLL_INTERVAL_MS",
                defaults.poll_interval.as_millis() as u64,
            )),
            close_grace: Duration::from_millis(env_parse(
                "FACE_QUEUE_CLOSE_GRACE_MS",
                defaults.close_grace.as_millis() as u64,
            )),
            finished_retention: env_parse(
                "FACE_QUEUE_FINISHED_RETENTION",
                defaults.finished_retention,
            ),
            max_upload_bytes: env_parse("FACE_QUEUE_MAX_UPLOAD_BYTES", defaults.max_upload_bytes),
        }
    }

    /// Reject combinations the scheduler can't work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.upstream_timeout.is_zero() {
            return Err(ConfigError::InvalidValue {
                key: "FACE_QUEUE_UPSTREAM_TIMEOUT_SECS".into(),
                message: "must be greater than zero".into(),
            });
        }
        if self.poll_interval.is_zero() {
            return Err(ConfigError::InvalidValue {
                key: "FACE_QUEUE_POLL_INTERVAL_MS".into(),
                message: "must be greater than zero".into(),
            });
        }
        if self.default_top_k == 0 || self.default_top_k > self.max_top_k {
            return Err(ConfigError::InvalidValue {
                key: "FACE_QUEUE_TOP_K".into(),
                message: format!("must be between 1 and {}", self.max_top_k),
            });
        }
        Ok(())
    }

    /// Resolve a requested result count against the configured bounds.
    pub fn resolve_top_k(&self, requested: Option<usize>) -> usize {
        requested
            .unwrap_or(self.default_top_k)
            .clamp(1, self.max_top_k.max(1))
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %raw, "Ignoring unparsable config value");
            default
        }),
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = ServerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.default_top_k, 10);
        assert_eq!(config.poll_interval, Duration::from_secs(1));
    }

    #[test]
    fn top_k_is_clamped() {
        let config = ServerConfig::default();
        assert_eq!(config.resolve_top_k(None), 10);
        assert_eq!(config.resolve_top_k(Some(0)), 1);
        assert_eq!(config.resolve_top_k(Some(3)), 3);
        assert_eq!(config.resolve_top_k(Some(500)), 50);
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let config = ServerConfig {
            upstream_timeout: Duration::ZERO,
            ..ServerConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn default_top_k_above_max_is_rejected() {
        let config = ServerConfig {
            default_top_k: 80,
            ..ServerConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
