//! Configuration types

use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// What to emit for a single reference that does not resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MissingPolicy {
    /// Leave the relationship slot out of the output.
    #[default]
    Omit,
    /// Emit the slot with a null value.
    Null,
}

/// Denormalizer configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DenormalizerConfig {
    /// Policy for missing or empty single references. Missing members of a
    /// reference sequence are always skipped.
    pub missing_single: MissingPolicy,
    /// Whether a cycle stub carries the entity's attributes or only
    /// `id` and `type`.
    pub stub_attributes: bool,
    /// Emit a warning for every reference that does not resolve.
    pub log_missing: bool,
    /// Depth at which expansion stops and stubs are emitted, counted from
    /// the root at depth 0. `None` relies on cycle detection alone.
    pub max_depth: Option<usize>,
}

impl Default for DenormalizerConfig {
    fn default() -> Self {
        Self {
            missing_single: MissingPolicy::Omit,
            stub_attributes: true,
            log_missing: true,
            max_depth: None,
        }
    }
}

impl DenormalizerConfig {
    /// Create a config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the missing single reference policy.
    pub fn with_missing_single(mut self, policy: MissingPolicy) -> Self {
        self.missing_single = policy;
        self
    }

    /// Enable or disable attributes on cycle stubs.
    pub fn with_stub_attributes(mut self, enabled: bool) -> Self {
        self.stub_attributes = enabled;
        self
    }

    /// Enable or disable warnings for missing references.
    pub fn with_log_missing(mut self, enabled: bool) -> Self {
        self.log_missing = enabled;
        self
    }

    /// Set the expansion depth limit.
    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_depth == Some(0) {
            return Err(ConfigError::InvalidValue {
                field: "max_depth".to_string(),
                value: "0".to_string(),
                reason: "must be greater than zero; the root is always expanded".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = DenormalizerConfig::default();
        assert_eq!(config.missing_single, MissingPolicy::Omit);
        assert!(config.stub_attributes);
        assert!(config.log_missing);
        assert_eq!(config.max_depth, None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builder() {
        let config = DenormalizerConfig::new()
            .with_missing_single(MissingPolicy::Null)
            .with_stub_attributes(false)
            .with_log_missing(false)
            .with_max_depth(4);

        assert_eq!(config.missing_single, MissingPolicy::Null);
        assert!(!config.stub_attributes);
        assert!(!config.log_missing);
        assert_eq!(config.max_depth, Some(4));
    }

    #[test]
    fn test_zero_depth_rejected() {
        let err = DenormalizerConfig::new().with_max_depth(0).validate().unwrap_err();
        assert!(err.to_string().contains("max_depth"));
    }

    #[test]
    fn test_config_partial_deserialize() {
        let config: DenormalizerConfig =
            serde_json::from_str(r#"{"missing_single": "null", "max_depth": 8}"#).unwrap();
        assert_eq!(config.missing_single, MissingPolicy::Null);
        assert_eq!(config.max_depth, Some(8));
        assert!(config.stub_attributes);
    }
}
