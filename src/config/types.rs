//! Configuration data types.

use crate::endpoint::{Address, WeightedAddress};
use serde::{Deserialize, Serialize};

/// Upper bound for both ring size fields.
pub const RING_SIZE_LIMIT: u64 = 8_388_608;

/// Ring-hash policy configuration.
///
/// Consumed from a JSON-like tree; both size fields are optional and must
/// lie in `[1, 8_388_608]` with `min_ring_size <= max_ring_size`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct RingHashConfig {
    /// Lower bound on the number of ring entries.
    #[serde(default = "default_min_ring_size")]
    pub min_ring_size: u64,

    /// Upper bound on the number of ring entries.
    #[serde(default = "default_max_ring_size")]
    pub max_ring_size: u64,

    /// Reject server lists that omit a weight instead of defaulting to 1.
    #[serde(default)]
    pub require_weights: bool,
}

impl Default for RingHashConfig {
    fn default() -> Self {
        Self {
            min_ring_size: default_min_ring_size(),
            max_ring_size: default_max_ring_size(),
            require_weights: false,
        }
    }
}

/// Root configuration for the `ringlb` inspection tool.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ToolConfig {
    /// Global settings
    #[serde(default)]
    pub global: GlobalConfig,

    /// Ring-hash policy configuration
    #[serde(default)]
    pub ring: RingHashConfig,

    /// Backend servers to place on the ring
    #[serde(default)]
    pub servers: Vec<ServerConfig>,
}

impl ToolConfig {
    /// Materialize the server list into weighted addresses, applying the
    /// default weight of 1 where none was given.
    pub fn weighted_addresses(&self) -> Vec<WeightedAddress> {
        self.servers
            .iter()
            .map(|s| WeightedAddress {
                address: s.address.clone(),
                weight: s.weight.unwrap_or(1),
            })
            .collect()
    }
}

/// Global configuration settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GlobalConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log format: json or pretty
    #[serde(default)]
    pub log_format: LogFormat,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: LogFormat::Json,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

/// Individual server configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Server address in canonical form
    pub address: Address,

    /// Weight for ring construction (default: 1)
    #[serde(default)]
    pub weight: Option<u32>,
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_min_ring_size() -> u64 {
    1024
}

fn default_max_ring_size() -> u64 {
    RING_SIZE_LIMIT
}
