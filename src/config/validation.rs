//! Configuration validation.

use crate::config::{RingHashConfig, ToolConfig, RING_SIZE_LIMIT};
use std::collections::HashSet;

/// Validate a ring-hash policy configuration.
///
/// Checks that both size fields are in `[1, 8_388_608]` and that
/// `min_ring_size <= max_ring_size`. All problems are reported in a single
/// aggregated error.
pub fn validate_ring_config(config: &RingHashConfig) -> Result<(), String> {
    let mut errors = Vec::new();

    if config.min_ring_size == 0 || config.min_ring_size > RING_SIZE_LIMIT {
        errors.push(format!(
            "min_ring_size {} out of range [1, {}]",
            config.min_ring_size, RING_SIZE_LIMIT
        ));
    }

    if config.max_ring_size == 0 || config.max_ring_size > RING_SIZE_LIMIT {
        errors.push(format!(
            "max_ring_size {} out of range [1, {}]",
            config.max_ring_size, RING_SIZE_LIMIT
        ));
    }

    if config.min_ring_size > config.max_ring_size {
        errors.push(format!(
            "min_ring_size {} cannot be larger than max_ring_size {}",
            config.min_ring_size, config.max_ring_size
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors.join("; "))
    }
}

/// Validate the full inspection-tool configuration.
pub fn validate_config(config: &ToolConfig) -> Result<(), String> {
    let mut errors = Vec::new();

    if let Err(e) = validate_ring_config(&config.ring) {
        errors.push(e);
    }

    if config.servers.is_empty() {
        errors.push("at least one server must be defined".to_string());
    }

    let mut seen = HashSet::new();
    for server in &config.servers {
        if server.address.as_key().is_empty() {
            errors.push("server address cannot be empty".to_string());
        }

        if !seen.insert(server.address.clone()) {
            errors.push(format!("duplicate server address: {}", server.address));
        }

        if server.weight == Some(0) {
            errors.push(format!(
                "server {} has weight 0 (must be >= 1)",
                server.address
            ));
        }

        if config.ring.require_weights && server.weight.is_none() {
            errors.push(format!(
                "server {} has no weight but require_weights is set",
                server.address
            ));
        }
    }

    // Validate log level
    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    if !valid_levels.contains(&config.global.log_level.to_lowercase().as_str()) {
        errors.push(format!(
            "invalid log level '{}', must be one of: {}",
            config.global.log_level,
            valid_levels.join(", ")
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors.join("; "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{GlobalConfig, ServerConfig};
    use crate::endpoint::Address;

    fn minimal_config() -> ToolConfig {
        ToolConfig {
            global: GlobalConfig::default(),
            ring: RingHashConfig::default(),
            servers: vec![ServerConfig {
                address: Address::new("127.0.0.1:9000"),
                weight: Some(1),
            }],
        }
    }

    #[test]
    fn test_valid_config() {
        assert!(validate_config(&minimal_config()).is_ok());
    }

    #[test]
    fn test_zero_min_ring_size() {
        let mut config = minimal_config();
        config.ring.min_ring_size = 0;
        let result = validate_config(&config);
        assert!(result.unwrap_err().contains("min_ring_size 0 out of range"));
    }

    #[test]
    fn test_oversized_max_ring_size() {
        let mut config = minimal_config();
        config.ring.max_ring_size = RING_SIZE_LIMIT + 1;
        let result = validate_config(&config);
        assert!(result.unwrap_err().contains("max_ring_size"));
    }

    #[test]
    fn test_inverted_bounds() {
        let mut config = minimal_config();
        config.ring.min_ring_size = 4096;
        config.ring.max_ring_size = 1024;
        let result = validate_config(&config);
        assert!(result
            .unwrap_err()
            .contains("cannot be larger than max_ring_size"));
    }

    #[test]
    fn test_errors_are_aggregated() {
        let mut config = minimal_config();
        config.ring.min_ring_size = 0;
        config.ring.max_ring_size = RING_SIZE_LIMIT + 1;
        let message = validate_config(&config).unwrap_err();
        assert!(message.contains("min_ring_size"));
        assert!(message.contains("max_ring_size"));
    }

    #[test]
    fn test_no_servers() {
        let mut config = minimal_config();
        config.servers.clear();
        let result = validate_config(&config);
        assert!(result.unwrap_err().contains("at least one server"));
    }

    #[test]
    fn test_duplicate_server_address() {
        let mut config = minimal_config();
        config.servers.push(config.servers[0].clone());
        let result = validate_config(&config);
        assert!(result.unwrap_err().contains("duplicate server address"));
    }

    #[test]
    fn test_zero_weight() {
        let mut config = minimal_config();
        config.servers[0].weight = Some(0);
        let result = validate_config(&config);
        assert!(result.unwrap_err().contains("weight 0"));
    }

    #[test]
    fn test_require_weights() {
        let mut config = minimal_config();
        config.ring.require_weights = true;
        config.servers[0].weight = None;
        let result = validate_config(&config);
        assert!(result.unwrap_err().contains("require_weights"));

        config.servers[0].weight = Some(2);
        assert!(validate_config(&config).is_ok());
    }
}
