//! Declarative configuration for [`MokaStore`](crate::MokaStore).

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Capacity and expiry settings for an in-process store.
///
/// ```
/// use cask_moka::MokaConfig;
///
/// let config: MokaConfig = serde_json::from_str(r#"{"max_capacity": 500}"#).unwrap();
/// assert_eq!(config.default_ttl_secs, 0);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MokaConfig {
    /// Maximum number of entries held before eviction.
    pub max_capacity: u64,
    /// TTL applied to writes that ask for the default; `0` means no expiry.
    pub default_ttl_secs: u64,
}

impl Default for MokaConfig {
    fn default() -> Self {
        Self {
            max_capacity: 10_000,
            default_ttl_secs: 0,
        }
    }
}

impl MokaConfig {
    /// Default TTL as a duration.
    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_secs)
    }
}
