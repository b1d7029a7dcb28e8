//! Engine configuration
//!
//! Feature flags that change how a customization pass behaves. Loaded
//! from an optional YAML file and overridden by the environment; see
//! [`loader`].

pub mod loader;

pub use loader::load_config;

use crate::constants::TEMPLATING_FEATURE_ENV;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Configuration for the customization engine
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Render metadata values as templates before customization
    pub templating_enabled: bool,
}

impl EngineConfig {
    /// Parse configuration from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self, serde_yaml::Error> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(yaml)
    }

    /// Apply overrides from the process environment
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary variable lookup
    pub fn with_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(TEMPLATING_FEATURE_ENV) {
            match parse_bool(&value) {
                Some(enabled) => self.templating_enabled = enabled,
                None => warn!(
                    "Ignoring {}={:?}: expected true or false",
                    TEMPLATING_FEATURE_ENV, value
                ),
            }
        }
        self
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::from_yaml("").unwrap();
        assert!(!config.templating_enabled);
    }

    #[test]
    fn test_parse_yaml() {
        let config = EngineConfig::from_yaml("templating_enabled: true\n").unwrap();
        assert!(config.templating_enabled);
    }

    #[test]
    fn test_env_override() {
        let config = EngineConfig::default().with_overrides(|key| {
            (key == TEMPLATING_FEATURE_ENV).then(|| "TRUE".to_string())
        });
        assert!(config.templating_enabled);

        let config = EngineConfig {
            templating_enabled: true,
        }
        .with_overrides(|_| Some("false".to_string()));
        assert!(!config.templating_enabled);
    }

    #[test]
    fn test_invalid_env_value_is_ignored() {
        let config = EngineConfig {
            templating_enabled: true,
        }
        .with_overrides(|_| Some("maybe".to_string()));
        assert!(config.templating_enabled);
    }
}
