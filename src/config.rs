//! Tunables of the provisioning core.
//!
//! ```rust
//! use resource_provisioning::config::ProvisioningConfig;
//!
//! let config = ProvisioningConfig::from_json_str(r#"{"largeValueSetThreshold": 50}"#).unwrap();
//! assert_eq!(config.large_value_set_threshold, 50);
//! assert!(config.cache_enabled);
//! ```

use crate::error::{BuildError, BuildResult};
use crate::resource::CachingStrategy;
use serde::{Deserialize, Serialize};

/// Configuration shared by the resource manager and the shadow delta computer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProvisioningConfig {
    /// Number of availability-history entries kept on a resource.
    pub operational_state_history_size: usize,
    /// Strategy used when neither resource nor object type declares one.
    pub default_caching_strategy: CachingStrategy,
    /// Initial attribute values at or above this count are written by replace.
    pub large_value_set_threshold: usize,
    /// When false every read runs a full completion.
    pub cache_enabled: bool,
}

impl Default for ProvisioningConfig {
    fn default() -> Self {
        Self {
            operational_state_history_size: 10,
            default_caching_strategy: CachingStrategy::None,
            large_value_set_threshold: 100,
            cache_enabled: true,
        }
    }
}

impl ProvisioningConfig {
    /// Parse a configuration document; missing keys take their defaults.
    pub fn from_json_str(content: &str) -> BuildResult<Self> {
        let config: Self =
            serde_json::from_str(content).map_err(|e| BuildError::InvalidConfiguration {
                message: e.to_string(),
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the core cannot work with.
    pub fn validate(&self) -> BuildResult<()> {
        if self.large_value_set_threshold == 0 {
            return Err(BuildError::InvalidConfiguration {
                message: "largeValueSetThreshold must be positive".to_string(),
            });
        }
        if let CachingStrategy::Other(name) = &self.default_caching_strategy {
            return Err(BuildError::InvalidConfiguration {
                message: format!("unsupported default caching strategy '{}'", name),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ProvisioningConfig::default();
        assert_eq!(config.operational_state_history_size, 10);
        assert_eq!(config.large_value_set_threshold, 100);
        assert_eq!(config.default_caching_strategy, CachingStrategy::None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_document_keeps_defaults() {
        let config =
            ProvisioningConfig::from_json_str(r#"{"defaultCachingStrategy": "passive"}"#).unwrap();
        assert_eq!(config.default_caching_strategy, CachingStrategy::Passive);
        assert_eq!(config.operational_state_history_size, 10);
    }

    #[test]
    fn test_rejects_unknown_default_strategy() {
        let result = ProvisioningConfig::from_json_str(r#"{"defaultCachingStrategy": "active"}"#);
        assert!(matches!(result, Err(BuildError::InvalidConfiguration { .. })));
    }

    #[test]
    fn test_rejects_zero_threshold() {
        let result = ProvisioningConfig::from_json_str(r#"{"largeValueSetThreshold": 0}"#);
        assert!(result.is_err());
    }
}
