use serde::{Deserialize, Serialize};

pub mod toml_config;
pub mod env_config;
pub mod merge;

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub db: DbConfig,
    pub index: IndexConfig,
    pub monitoring: MonitoringConfig,
}

/// Credentials for the single report connection (`db.url`, `db.user`, `db.password`).
#[derive(Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct DbConfig {
    /// `mysql://host:port/database[?options]`
    pub url: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
}

impl std::fmt::Debug for DbConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbConfig")
            .field("url", &self.url.as_deref().map(crate::error::sanitize_diagnostic))
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// How a failed `DROP INDEX` is interpreted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DropPolicy {
    /// Only the server's "index does not exist" error means not found;
    /// every other failure is reported as an error. Opt-in.
    Classify,
    /// Every drop failure means not found.
    #[default]
    AnyFailureIsMissing,
}

impl std::str::FromStr for DropPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "classify" => Ok(Self::Classify),
            "any-failure-is-missing" => Ok(Self::AnyFailureIsMissing),
            other => Err(format!(
                "unknown drop policy '{}' (expected classify or any-failure-is-missing)",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct IndexConfig {
    pub drop_policy: DropPolicy,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MonitoringConfig {
    pub log_level: String,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

impl MonitoringConfig {
    pub fn level(&self) -> anyhow::Result<tracing::Level> {
        self.log_level.parse::<tracing::Level>().map_err(|_| {
            anyhow::anyhow!(
                "Config error: monitoring.log_level must be one of trace, debug, info, warn, error (got {:?})",
                self.log_level
            )
        })
    }
}

impl Config {
    pub fn validate(&self) -> anyhow::Result<()> {
        require("db.url", &self.db.url)?;
        require("db.user", &self.db.user)?;
        // An empty password is valid (passwordless accounts); only absence is not.
        if self.db.password.is_none() {
            anyhow::bail!("Config error: required key db.password is not set");
        }

        if let Some(url) = &self.db.url {
            if !url.starts_with("mysql://") {
                anyhow::bail!(
                    "Config error: db.url must be a mysql:// URL (got {:?})",
                    crate::error::sanitize_diagnostic(url)
                );
            }
        }

        self.monitoring.level()?;
        Ok(())
    }
}

fn require(key: &str, value: &Option<String>) -> anyhow::Result<()> {
    match value {
        Some(v) if !v.is_empty() => Ok(()),
        _ => anyhow::bail!("Config error: required key {} is not set", key),
    }
}
