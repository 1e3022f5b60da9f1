use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use crate::config::Config;

/// Load config from a TOML file path. Returns default config if file doesn't exist.
pub fn load_toml_config(path: &Path) -> Result<Config> {
    if !path.exists() {
        return Ok(Config::default());
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading config file {}", path.display()))?;
    let config: Config = toml::from_str(&content)
        .with_context(|| format!("parsing config file {}", path.display()))?;
    Ok(config)
}

/// Config file location: DB_REPORT_CONFIG, or db-report.toml in the working directory.
pub fn default_config_path() -> PathBuf {
    std::env::var("DB_REPORT_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("db-report.toml"))
}

pub fn load_default_config() -> Result<Config> {
    load_toml_config(&default_config_path())
}
