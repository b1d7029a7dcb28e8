//! Engine configuration loader
//!
//! Precedence, lowest first: defaults, the YAML file, the environment.

use super::EngineConfig;
use crate::CustomizationError;
use std::path::Path;
use tokio::fs;
use tracing::{debug, info};

/// Load configuration from `path` (if given and present) and the environment
pub async fn load_config(path: Option<&Path>) -> Result<EngineConfig, CustomizationError> {
    let config = match path {
        Some(path) => load_config_file(path).await?.unwrap_or_default(),
        None => EngineConfig::default(),
    };

    let config = config.with_env_overrides();
    info!(
        "Engine configuration: templating {}",
        if config.templating_enabled {
            "enabled"
        } else {
            "disabled"
        }
    );
    Ok(config)
}

/// Load configuration from a single file. A missing file is not an error.
async fn load_config_file(path: &Path) -> Result<Option<EngineConfig>, CustomizationError> {
    if !path.exists() {
        debug!("No configuration file at {}", path.display());
        return Ok(None);
    }

    let content = fs::read_to_string(path).await?;
    let config = EngineConfig::from_yaml(&content).map_err(|e| {
        CustomizationError::Config(format!("Failed to parse {}: {}", path.display(), e))
    })?;

    debug!("Loaded configuration from {}", path.display());
    Ok(Some(config))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_load_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("engine.yaml");
        std::fs::write(&path, "templating_enabled: true\n").unwrap();

        let config = load_config_file(&path).await.unwrap().unwrap();
        assert!(config.templating_enabled);
    }

    #[tokio::test]
    async fn test_missing_file() {
        let dir = TempDir::new().unwrap();
        let config = load_config_file(&dir.path().join("absent.yaml"))
            .await
            .unwrap();
        assert!(config.is_none());
    }

    #[tokio::test]
    async fn test_invalid_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("engine.yaml");
        std::fs::write(&path, "templating_enabled: [not, a, bool]\n").unwrap();

        let result = load_config_file(&path).await;
        assert!(matches!(result, Err(CustomizationError::Config(_))));
    }
}
