pub mod model;

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

pub use model::{BridgeConfig, HostConfig, IrcConfig};

pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("ircrarria")
        .join("config.toml")
}

pub fn load_config(path: &Path) -> Result<BridgeConfig> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config from {}", path.display()))?;
    parse_config(&contents)
}

pub fn parse_config(contents: &str) -> Result<BridgeConfig> {
    let config: BridgeConfig =
        toml::from_str(contents).with_context(|| "Failed to parse config file")?;
    Ok(config)
}
