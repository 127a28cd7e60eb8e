//! Declarative configuration for [`RedisStore`](crate::RedisStore).

use std::time::Duration;

use serde::{Deserialize, Serialize};

pub(crate) const DEFAULT_SERVER: &str = "127.0.0.1:6379";
pub(crate) const DEFAULT_MAX_SIZE: u32 = 5;
pub(crate) const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(240);

/// Connection and expiry settings for a Redis store.
///
/// ```
/// use cask_redis::RedisConfig;
///
/// let config: RedisConfig = serde_json::from_str(r#"{
///     "server": "cache.internal:6379",
///     "database": 2,
///     "default_ttl_secs": 3600
/// }"#).unwrap();
///
/// assert_eq!(config.max_size, 5);
/// assert_eq!(config.password, None);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisConfig {
    /// `host:port` of the single Redis endpoint.
    pub server: String,
    /// Sent with `AUTH` once per connection when set.
    pub password: Option<String>,
    /// Logical database selected once per connection when non-zero.
    pub database: i64,
    /// TTL applied to writes that ask for the default; `0` means no expiry.
    pub default_ttl_secs: u64,
    /// Upper bound on pooled connections.
    pub max_size: u32,
    /// Idle connections older than this are discarded.
    pub idle_timeout_secs: u64,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            server: DEFAULT_SERVER.to_owned(),
            password: None,
            database: 0,
            default_ttl_secs: 0,
            max_size: DEFAULT_MAX_SIZE,
            idle_timeout_secs: DEFAULT_IDLE_TIMEOUT.as_secs(),
        }
    }
}

impl RedisConfig {
    /// Default TTL as a duration.
    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_secs)
    }

    /// Idle timeout as a duration.
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_pool_settings() {
        let config = RedisConfig::default();
        assert_eq!(config.server, "127.0.0.1:6379");
        assert_eq!(config.max_size, 5);
        assert_eq!(config.idle_timeout(), Duration::from_secs(240));
        assert_eq!(config.default_ttl(), Duration::ZERO);
    }
}
