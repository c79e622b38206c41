use std::path::Path;

use anyhow::{Context, Result};
use mission_manager::MissionManagerConfig;

/// Loads the manager config from an optional TOML file, then applies `MISSION_*` env overrides.
pub fn load_manager_config(path: Option<&Path>) -> Result<MissionManagerConfig> {
    let base = match path {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read config file {}", path.display()))?;
            parse_manager_config(&raw)
                .with_context(|| format!("invalid config file {}", path.display()))?
        }
        None => MissionManagerConfig::default(),
    };
    Ok(base.with_env_overrides())
}

pub fn parse_manager_config(raw: &str) -> Result<MissionManagerConfig> {
    let config = toml::from_str::<MissionManagerConfig>(raw)?;
    if config.launcher_bundle_name.trim().is_empty() {
        anyhow::bail!("launcher_bundle_name must not be empty");
    }
    Ok(config)
}
