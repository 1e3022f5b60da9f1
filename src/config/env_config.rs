use crate::config::{Config, DropPolicy};

// ---------------------------------------------------------------------------
// Helpers: use eprintln! because this runs before the logging system starts.
// ---------------------------------------------------------------------------

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|s| !s.is_empty())
}

fn parse_drop_policy_env(key: &str) -> Option<DropPolicy> {
    let raw = non_empty_env(key)?;
    match raw.parse::<DropPolicy>() {
        Ok(policy) => Some(policy),
        Err(e) => {
            eprintln!("Warning: {} is set to {:?}: {}; using default", key, raw, e);
            None
        }
    }
}

/// Read the environment overrides. Only fields whose variable is present are set.
pub fn load_env_config() -> EnvConfig {
    EnvConfig {
        url: non_empty_env("DB_URL"),
        user: non_empty_env("DB_USER"),
        // An explicitly empty password is still an override.
        password: std::env::var("DB_PASSWORD").ok(),
        drop_policy: parse_drop_policy_env("DB_REPORT_DROP_POLICY"),
        log_level: non_empty_env("DB_REPORT_LOG_LEVEL"),
    }
}

/// All env var overrides (None = not set, don't override).
#[derive(Debug, Default)]
pub struct EnvConfig {
    pub url: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub drop_policy: Option<DropPolicy>,
    pub log_level: Option<String>,
}

impl EnvConfig {
    /// Apply env var overrides onto a base Config, returning the merged result.
    pub fn apply_to(self, mut base: Config) -> Config {
        if let Some(v) = self.url {
            base.db.url = Some(v);
        }
        if let Some(v) = self.user {
            base.db.user = Some(v);
        }
        if let Some(v) = self.password {
            base.db.password = Some(v);
        }
        if let Some(v) = self.drop_policy {
            base.index.drop_policy = v;
        }
        if let Some(v) = self.log_level {
            base.monitoring.log_level = v;
        }
        base
    }
}
