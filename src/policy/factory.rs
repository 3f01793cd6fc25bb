//! Policy factory and registry name.

use super::{ControlHelper, RingHashPolicy};
use crate::config::{validate_ring_config, ConfigError, RingHashConfig};
use std::sync::Arc;

/// Name the policy registers under in the channel's policy registry.
pub const POLICY_NAME: &str = "ring_hash_experimental";

/// Factory for [`RingHashPolicy`] instances.
#[derive(Debug, Default)]
pub struct RingHashFactory;

impl RingHashFactory {
    pub fn new() -> Self {
        Self
    }

    /// Registry key for this policy.
    pub fn name(&self) -> &'static str {
        POLICY_NAME
    }

    /// Parse a policy configuration from a JSON-like tree.
    ///
    /// All field and range problems are reported in one aggregated error; a
    /// rejected config never reaches a policy instance, so the previously
    /// installed configuration stays active.
    pub fn parse_config(&self, value: &serde_yaml::Value) -> Result<RingHashConfig, ConfigError> {
        if !value.is_mapping() {
            return Err(ConfigError::ValidationError(format!(
                "{POLICY_NAME} config should be of type object"
            )));
        }

        let mut errors = Vec::new();
        let mut config = RingHashConfig::default();

        if let Some(field) = value.get("min_ring_size") {
            match field.as_u64() {
                Some(n) => config.min_ring_size = n,
                None => {
                    errors.push("field:min_ring_size error: should be of type number".to_string())
                }
            }
        }

        if let Some(field) = value.get("max_ring_size") {
            match field.as_u64() {
                Some(n) => config.max_ring_size = n,
                None => {
                    errors.push("field:max_ring_size error: should be of type number".to_string())
                }
            }
        }

        if let Some(field) = value.get("require_weights") {
            match field.as_bool() {
                Some(b) => config.require_weights = b,
                None => {
                    errors.push("field:require_weights error: should be of type boolean".to_string())
                }
            }
        }

        if let Err(e) = validate_ring_config(&config) {
            errors.push(e);
        }

        if errors.is_empty() {
            Ok(config)
        } else {
            Err(ConfigError::ValidationError(format!(
                "{POLICY_NAME} policy config: {}",
                errors.join("; ")
            )))
        }
    }

    /// Create a policy instance reporting into `helper`.
    pub fn create(&self, helper: Arc<dyn ControlHelper>) -> RingHashPolicy {
        RingHashPolicy::new(helper)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(yaml: &str) -> Result<RingHashConfig, ConfigError> {
        let value: serde_yaml::Value = serde_yaml::from_str(yaml).unwrap();
        RingHashFactory::new().parse_config(&value)
    }

    #[test]
    fn test_empty_object_yields_defaults() {
        let config = parse("{}").unwrap();
        assert_eq!(config, RingHashConfig::default());
    }

    #[test]
    fn test_explicit_fields() {
        let config = parse("{min_ring_size: 16, max_ring_size: 4096}").unwrap();
        assert_eq!(config.min_ring_size, 16);
        assert_eq!(config.max_ring_size, 4096);
    }

    #[test]
    fn test_non_object_rejected() {
        let err = parse("42").unwrap_err();
        assert!(err.to_string().contains("should be of type object"));
    }

    #[test]
    fn test_wrong_field_type_rejected() {
        let err = parse("{min_ring_size: \"big\"}").unwrap_err();
        assert!(err.to_string().contains("field:min_ring_size"));
    }

    #[test]
    fn test_range_and_type_errors_aggregate() {
        let err = parse("{min_ring_size: \"big\", max_ring_size: 0}").unwrap_err();
        let message = err.to_string();
        assert!(message.contains("field:min_ring_size"));
        assert!(message.contains("max_ring_size 0 out of range"));
    }

    #[test]
    fn test_inverted_bounds_rejected() {
        let err = parse("{min_ring_size: 2048, max_ring_size: 8}").unwrap_err();
        assert!(err.to_string().contains("cannot be larger than"));
    }

    #[test]
    fn test_factory_name() {
        assert_eq!(RingHashFactory::new().name(), "ring_hash_experimental");
    }
}
