//! Error taxonomy for every database operation, plus diagnostic sanitization.
//!
//! Each component surfaces its own error type; the session decides which of
//! them are fatal (only [`ConnectionError`]) and which are recorded per step.

use regex::Regex;
use std::sync::LazyLock;
use thiserror::Error;

// Pre-compiled regex patterns for diagnostic sanitization
static URL_CREDENTIALS_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b([a-z][a-z0-9+.-]*://)[^/@\s:]+(:[^/@\s]*)?@").unwrap());

static OS_ERROR_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*\(os error \d+\)").unwrap());

static MULTIPLE_SPACES_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Strip credentials and OS noise from a driver diagnostic before it is shown.
pub fn sanitize_diagnostic(message: &str) -> String {
    tracing::debug!("Original diagnostic (before sanitization): {}", message);

    let mut sanitized = URL_CREDENTIALS_REGEX
        .replace_all(message, "${1}[REDACTED]@")
        .to_string();

    sanitized = OS_ERROR_REGEX.replace_all(&sanitized, "").to_string();

    sanitized = MULTIPLE_SPACES_REGEX
        .replace_all(&sanitized, " ")
        .to_string();
    sanitized = sanitized.trim().to_string();

    if sanitized.ends_with(':') || sanitized.ends_with(',') {
        sanitized.pop();
    }

    sanitized
}

/// Error reported by the driver adapter for a single call.
///
/// `code` is the server error number when the server produced the error
/// (e.g. 1061 for a duplicate key name); client-side failures such as a
/// dropped socket have no code.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct DriverError {
    pub code: Option<u16>,
    pub message: String,
}

impl DriverError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: message.into(),
        }
    }

    pub fn with_code(code: u16, message: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            message: message.into(),
        }
    }
}

impl From<sqlx::Error> for DriverError {
    fn from(err: sqlx::Error) -> Self {
        use sqlx::mysql::MySqlDatabaseError;

        let code = err
            .as_database_error()
            .and_then(|db_err| db_err.try_downcast_ref::<MySqlDatabaseError>())
            .map(|mysql_err| mysql_err.number());
        Self {
            code,
            message: sanitize_diagnostic(&err.to_string()),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("database driver has not been initialized; call db::init_driver() at startup")]
    DriverNotInitialized,
    #[error("missing required configuration key '{0}'")]
    MissingCredential(&'static str),
    #[error("invalid database url: {0}")]
    InvalidUrl(String),
    #[error("connect failed: {0}")]
    Connect(DriverError),
    #[error("closing connection failed: {0}")]
    Close(DriverError),
}

/// Failure of a read query. Rows emitted before the failure remain emitted.
#[derive(Debug, Clone, Error)]
#[error("query failed: {message} (statement: {sql})")]
pub struct QueryError {
    pub sql: String,
    pub message: String,
    pub code: Option<u16>,
}

impl QueryError {
    pub fn new(sql: &str, err: DriverError) -> Self {
        Self {
            sql: sql.to_string(),
            message: err.message,
            code: err.code,
        }
    }
}

#[derive(Debug, Error)]
pub enum PlanError {
    #[error("plan compile step failed: {0}")]
    Compile(DriverError),
    #[error("plan display step failed: {0}")]
    Display(DriverError),
    #[error("plan display step returned no plan text")]
    EmptyPlan,
}

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("index '{name}' already exists: {message}")]
    AlreadyExists { name: String, message: String },
    #[error("index '{name}' has an invalid definition: {message}")]
    Invalid { name: String, message: String },
    #[error("index '{name}' does not exist")]
    NotFound { name: String },
    #[error("index '{name}' operation failed: {message}")]
    Other { name: String, message: String },
}
