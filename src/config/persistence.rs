use crate::error::{MirrorFsError, Result};
use std::path::Path;

use crate::config::schema::*;

/// Load and validate an adapter configuration from a TOML file.
///
/// A missing file yields the defaults for the host platform.
pub fn load_config(config_path: &Path) -> Result<AdapterConfig> {
    if !config_path.exists() {
        tracing::debug!(
            "No config file at {}, using defaults",
            config_path.display()
        );
        let config = AdapterConfig::default();
        validate_config(&config)?;
        return Ok(config);
    }

    let toml_content = std::fs::read_to_string(config_path).map_err(|e| {
        MirrorFsError::Config(format!(
            "Failed to read config file {}: {}",
            config_path.display(),
            e
        ))
    })?;

    parse_config(&toml_content)
}

pub fn parse_config(toml_content: &str) -> Result<AdapterConfig> {
    let config: AdapterConfig = toml::from_str(toml_content)
        .map_err(|e| MirrorFsError::Config(format!("Failed to parse config: {}", e)))?;
    validate_config(&config)?;
    Ok(config)
}

pub fn save_config(config: &AdapterConfig, config_path: &Path) -> Result<()> {
    let toml_str = toml::to_string_pretty(config)
        .map_err(|e| MirrorFsError::Config(format!("Failed to serialize config: {}", e)))?;
    std::fs::write(config_path, toml_str).map_err(|e| {
        MirrorFsError::Config(format!(
            "Failed to write config file {}: {}",
            config_path.display(),
            e
        ))
    })?;
    Ok(())
}
