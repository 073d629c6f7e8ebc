use std::{fs, path::Path};

use anyhow::{Context, Result};
use mocap_ekf_core::{EstimatorConfig, RawEstimatorConfig};

pub fn load_config(path: &Path) -> Result<EstimatorConfig> {
    let config_str = fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    parse_config(&config_str).with_context(|| format!("invalid config {}", path.display()))
}

pub fn parse_config(config_str: &str) -> Result<EstimatorConfig> {
    let raw: RawEstimatorConfig = toml::from_str(config_str)?;
    Ok(raw.try_into_config()?)
}

pub fn default_config_toml() -> Result<String> {
    let raw = RawEstimatorConfig::from(&EstimatorConfig::default());
    Ok(toml::to_string_pretty(&raw)?)
}

pub fn save_default_config(path: &Path) -> Result<()> {
    let config_str = default_config_toml()?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, config_str)?;
    Ok(())
}
