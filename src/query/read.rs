use std::fmt;

use futures::future;
use futures::stream::{BoxStream, StreamExt};

use crate::db::{DbConnection, Field, TextRow};
use crate::error::QueryError;

/// One result row: named string fields in the column order of the query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    fields: Vec<Field>,
}

impl Record {
    pub fn new(fields: TextRow) -> Self {
        Self { fields }
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|f| f.name.eq_ignore_ascii_case(name))
            .and_then(|f| f.value.as_deref())
    }

    /// Field values in column order; SQL NULL becomes `None`.
    pub fn values(&self) -> Vec<Option<&str>> {
        self.fields.iter().map(|f| f.value.as_deref()).collect()
    }
}

/// Renders the values joined with `" | "`; NULL is shown as `NULL`.
impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, field) in self.fields.iter().enumerate() {
            if i > 0 {
                f.write_str(" | ")?;
            }
            f.write_str(field.value.as_deref().unwrap_or("NULL"))?;
        }
        Ok(())
    }
}

/// Lazily produced records of one query execution.
///
/// Yields at most one error, after which the stream ends. Dropping it early
/// releases the underlying statement.
pub type RecordStream<'c> = BoxStream<'c, Result<Record, QueryError>>;

/// Execute a read query. Rows are fetched from the server as the stream is polled.
///
/// The stream holds the connection's mutable borrow, so no other statement can
/// run on it until the stream is dropped. Calling this again re-executes the query.
pub fn run_query<'c, C: DbConnection>(conn: &'c mut C, sql: &'c str) -> RecordStream<'c> {
    tracing::debug!(sql, "running read query");
    conn.fetch(sql)
        .scan(false, move |failed, row| {
            if *failed {
                return future::ready(None);
            }
            let item = match row {
                Ok(fields) => Ok(Record::new(fields)),
                Err(e) => {
                    *failed = true;
                    tracing::warn!(error = %e, "read query failed mid-stream");
                    Err(QueryError::new(sql, e))
                }
            };
            future::ready(Some(item))
        })
        .boxed()
}
