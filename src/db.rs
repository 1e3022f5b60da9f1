//! Driver adapter and connection provider.
//!
//! [`DbConnection`] is the seam between the report logic and the driver: the
//! query, plan and index modules only talk to this trait, so they can be
//! exercised against a scripted connection in tests and against MySQL in
//! production through [`MySqlSession`].

use std::str::FromStr;
use std::sync::OnceLock;

use futures::future::{BoxFuture, FutureExt};
use futures::stream::{BoxStream, StreamExt};
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection, MySqlRow};
use sqlx::{Column, Connection, Executor, Row, TypeInfo};
use tracing::{debug, info};

use crate::config::DbConfig;
use crate::error::{ConnectionError, DriverError};

/// One named column value of a result row, rendered as text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub name: String,
    pub value: Option<String>,
}

impl Field {
    pub fn new(name: impl Into<String>, value: Option<&str>) -> Self {
        Self {
            name: name.into(),
            value: value.map(str::to_string),
        }
    }
}

/// A result row in the column order of the statement that produced it.
pub type TextRow = Vec<Field>;

/// A single live database session.
///
/// Statements are issued one at a time: both `execute` and `fetch` borrow the
/// connection mutably, so a result stream must be dropped before the next
/// statement can start. `close` consumes the connection.
pub trait DbConnection: Send {
    /// Run a statement that produces no result set; returns rows affected.
    fn execute<'c>(&'c mut self, sql: &'c str) -> BoxFuture<'c, Result<u64, DriverError>>;

    /// Run a statement and stream its rows. Dropping the stream releases the
    /// statement and its result set, whether or not every row was read.
    fn fetch<'c>(&'c mut self, sql: &'c str) -> BoxStream<'c, Result<TextRow, DriverError>>;

    fn close(self) -> BoxFuture<'static, Result<(), DriverError>>
    where
        Self: Sized;
}

/// Produces the single connection a session runs on.
pub trait ConnectionProvider {
    type Connection: DbConnection;

    fn open(&self) -> BoxFuture<'_, Result<Self::Connection, ConnectionError>>;
}

static DRIVER: OnceLock<()> = OnceLock::new();

/// Process-wide driver initialization. Call once at startup; later calls are no-ops.
pub fn init_driver() {
    DRIVER.get_or_init(|| {
        info!("MySQL driver initialized");
    });
}

pub fn driver_initialized() -> bool {
    DRIVER.get().is_some()
}

/// Opens MySQL connections from `db.url`, `db.user` and `db.password`.
pub struct MySqlProvider {
    config: DbConfig,
}

impl MySqlProvider {
    pub fn new(config: DbConfig) -> Self {
        Self { config }
    }

    fn connect_options(&self) -> Result<MySqlConnectOptions, ConnectionError> {
        let url = required("db.url", &self.config.url)?;
        let user = required("db.user", &self.config.user)?;
        // An empty password is a legitimate credential; only absence is an error.
        let password = self
            .config
            .password
            .as_deref()
            .ok_or(ConnectionError::MissingCredential("db.password"))?;

        let opts = MySqlConnectOptions::from_str(url)
            .map_err(|e| ConnectionError::InvalidUrl(DriverError::from(e).message))?;
        Ok(opts.username(user).password(password))
    }
}

impl ConnectionProvider for MySqlProvider {
    type Connection = MySqlSession;

    fn open(&self) -> BoxFuture<'_, Result<MySqlSession, ConnectionError>> {
        Box::pin(async move {
            if !driver_initialized() {
                return Err(ConnectionError::DriverNotInitialized);
            }
            let opts = self.connect_options()?;
            let conn = MySqlConnection::connect_with(&opts)
                .await
                .map_err(|e| ConnectionError::Connect(e.into()))?;
            info!("Connected to MySQL");
            Ok(MySqlSession { conn })
        })
    }
}

fn required<'a>(key: &'static str, value: &'a Option<String>) -> Result<&'a str, ConnectionError> {
    value
        .as_deref()
        .filter(|v| !v.is_empty())
        .ok_or(ConnectionError::MissingCredential(key))
}

/// [`DbConnection`] over one sqlx MySQL connection.
///
/// Statements go through the text protocol: the plan directive and DDL are
/// not guaranteed to be preparable on every server version.
pub struct MySqlSession {
    conn: MySqlConnection,
}

impl DbConnection for MySqlSession {
    fn execute<'c>(&'c mut self, sql: &'c str) -> BoxFuture<'c, Result<u64, DriverError>> {
        debug!(sql, "execute");
        // No async block here: it trips the higher-ranked `Executor` bound.
        (&mut self.conn)
            .execute(sqlx::raw_sql(sql))
            .map(|result| result.map(|r| r.rows_affected()).map_err(DriverError::from))
            .boxed()
    }

    fn fetch<'c>(&'c mut self, sql: &'c str) -> BoxStream<'c, Result<TextRow, DriverError>> {
        debug!(sql, "fetch");
        (&mut self.conn)
            .fetch(sqlx::raw_sql(sql))
            .map(|row| row.map(|r| row_to_text(&r)).map_err(DriverError::from))
            .boxed()
    }

    fn close(self) -> BoxFuture<'static, Result<(), DriverError>> {
        Box::pin(async move {
            self.conn.close().await?;
            debug!("MySQL connection closed");
            Ok(())
        })
    }
}

fn row_to_text(row: &MySqlRow) -> TextRow {
    row.columns()
        .iter()
        .enumerate()
        .map(|(i, col)| Field {
            name: col.name().to_string(),
            value: column_to_text(row, i, col.type_info().name()),
        })
        .collect()
}

fn column_to_text(row: &MySqlRow, idx: usize, type_name: &str) -> Option<String> {
    match type_name {
        "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" => {
            if let Ok(v) = row.try_get::<Option<i64>, _>(idx) {
                return v.map(|n| n.to_string());
            }
        }
        "TINYINT UNSIGNED" | "SMALLINT UNSIGNED" | "MEDIUMINT UNSIGNED" | "INT UNSIGNED" | "BIGINT UNSIGNED" => {
            if let Ok(v) = row.try_get::<Option<u64>, _>(idx) {
                return v.map(|n| n.to_string());
            }
        }
        "FLOAT" | "DOUBLE" => {
            if let Ok(v) = row.try_get::<Option<f64>, _>(idx) {
                return v.map(|n| n.to_string());
            }
        }
        // Exact digits as the server sent them; going through f64 would round.
        "DECIMAL" | "NUMERIC" => {
            if let Ok(v) = row.try_get_unchecked::<Option<String>, _>(idx) {
                return v;
            }
        }
        _ => {}
    }
    // VARCHAR, TEXT, CHAR and the other character types
    if let Ok(v) = row.try_get::<Option<String>, _>(idx) {
        return v;
    }
    // Binary columns: decode as UTF-8 when possible (MySQL reports some
    // function results such as JSON_PRETTY over user variables as blobs),
    // otherwise hex.
    if let Ok(v) = row.try_get::<Option<Vec<u8>>, _>(idx) {
        return v.map(|b| {
            String::from_utf8(b).unwrap_or_else(|e| {
                let hex: String = e.into_bytes().iter().map(|byte| format!("{:02x}", byte)).collect();
                format!("0x{}", hex)
            })
        });
    }
    // DATE, TIME, DATETIME and anything else: statements run over the text
    // protocol, so the raw value is already the server's text rendering.
    row.try_get_unchecked::<Option<String>, _>(idx).ok().flatten()
}
