use crate::config::DropPolicy;
use crate::db::DbConnection;
use crate::error::{DriverError, IndexError};

/// MySQL server error numbers that decide how an index DDL failure is reported.
mod codes {
    /// ER_DUP_KEYNAME
    pub const DUPLICATE_KEY_NAME: u16 = 1061;
    /// ER_CANT_DROP_FIELD_OR_KEY
    pub const CANT_DROP_FIELD_OR_KEY: u16 = 1091;
    /// ER_BAD_FIELD_ERROR
    pub const BAD_FIELD: u16 = 1054;
    /// ER_KEY_COLUMN_DOES_NOT_EXITS
    pub const KEY_COLUMN_MISSING: u16 = 1072;
    /// ER_WRONG_TABLE_NAME
    pub const WRONG_TABLE_NAME: u16 = 1103;
    /// ER_NO_SUCH_TABLE
    pub const NO_SUCH_TABLE: u16 = 1146;
    /// ER_WRONG_NAME_FOR_INDEX
    pub const WRONG_INDEX_NAME: u16 = 1280;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexDescriptor {
    pub name: String,
    pub table: String,
    pub column: String,
}

impl IndexDescriptor {
    pub fn new(name: &str, table: &str, column: &str) -> Self {
        Self {
            name: name.to_string(),
            table: table.to_string(),
            column: column.to_string(),
        }
    }

    /// The department-number index the report compares plans around.
    pub fn employee_dno() -> Self {
        Self::new("index_employee_dno", "employee", "dno")
    }

    pub fn create_statement(&self) -> String {
        format!(
            "CREATE INDEX {} ON {} ({})",
            quote_ident(&self.name),
            quote_ident(&self.table),
            quote_ident(&self.column)
        )
    }

    pub fn drop_statement(&self) -> String {
        format!(
            "DROP INDEX {} ON {}",
            quote_ident(&self.name),
            quote_ident(&self.table)
        )
    }
}

fn quote_ident(ident: &str) -> String {
    format!("`{}`", ident.replace('`', "``"))
}

/// Issue CREATE INDEX once.
pub async fn create_index<C: DbConnection>(
    conn: &mut C,
    index: &IndexDescriptor,
) -> Result<(), IndexError> {
    let sql = index.create_statement();
    match conn.execute(&sql).await {
        Ok(_) => {
            tracing::info!(index = %index.name, table = %index.table, column = %index.column, "index created");
            Ok(())
        }
        Err(e) => Err(classify_create_error(&index.name, e)),
    }
}

/// Issue DROP INDEX once.
///
/// `Err(IndexError::NotFound)` is the expected outcome when the index is
/// absent; callers treat it as informational. Under [`DropPolicy::Classify`]
/// only the server's "check that it exists" error maps to `NotFound`.
pub async fn drop_index<C: DbConnection>(
    conn: &mut C,
    index: &IndexDescriptor,
    policy: DropPolicy,
) -> Result<(), IndexError> {
    let sql = index.drop_statement();
    match conn.execute(&sql).await {
        Ok(_) => {
            tracing::info!(index = %index.name, "index dropped");
            Ok(())
        }
        Err(e) => match policy {
            DropPolicy::Classify => Err(classify_drop_error(&index.name, e)),
            DropPolicy::AnyFailureIsMissing => {
                tracing::debug!(index = %index.name, error = %e, "drop failed; treating index as missing");
                Err(IndexError::NotFound {
                    name: index.name.clone(),
                })
            }
        },
    }
}

fn classify_create_error(name: &str, err: DriverError) -> IndexError {
    let name = name.to_string();
    match err.code {
        Some(codes::DUPLICATE_KEY_NAME) => IndexError::AlreadyExists {
            name,
            message: err.message,
        },
        Some(
            codes::BAD_FIELD
            | codes::KEY_COLUMN_MISSING
            | codes::WRONG_TABLE_NAME
            | codes::NO_SUCH_TABLE
            | codes::WRONG_INDEX_NAME,
        ) => IndexError::Invalid {
            name,
            message: err.message,
        },
        _ => IndexError::Other {
            name,
            message: err.message,
        },
    }
}

fn classify_drop_error(name: &str, err: DriverError) -> IndexError {
    let name = name.to_string();
    match err.code {
        Some(codes::CANT_DROP_FIELD_OR_KEY) => IndexError::NotFound { name },
        Some(codes::NO_SUCH_TABLE | codes::WRONG_TABLE_NAME | codes::WRONG_INDEX_NAME) => {
            IndexError::Invalid {
                name,
                message: err.message,
            }
        }
        _ => IndexError::Other {
            name,
            message: err.message,
        },
    }
}
