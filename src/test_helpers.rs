//! Test doubles for the driver seam, and live MySQL setup for e2e tests.
//!
//! [`FakeDb`] is a tiny scripted "server" holding the company tables, the
//! index catalog and counters the tests assert on. Every [`FakeConnection`]
//! opened on it is a separate session: plan variables are per connection.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use futures::future::{self, BoxFuture};
use futures::stream::{self, BoxStream, StreamExt};
use testcontainers_modules::{
    mysql::Mysql,
    testcontainers::{runners::AsyncRunner, ContainerAsync},
};

use crate::config::DbConfig;
use crate::db::{ConnectionProvider, DbConnection, Field, TextRow};
use crate::error::{ConnectionError, DriverError};
use crate::query::REPORT_QUERY;

const PLAN_FULL_SCAN: &str = r#"{
  "query_block": {
    "select_id": 1,
    "nested_loop": [
      {
        "table": {
          "table_name": "department",
          "access_type": "ALL",
          "rows_examined_per_scan": 2
        }
      },
      {
        "table": {
          "table_name": "employee",
          "access_type": "ALL",
          "rows_examined_per_scan": 2,
          "using_join_buffer": "hash join"
        }
      }
    ]
  }
}"#;

const PLAN_INDEX_LOOKUP: &str = r#"{
  "query_block": {
    "select_id": 1,
    "nested_loop": [
      {
        "table": {
          "table_name": "department",
          "access_type": "ALL",
          "rows_examined_per_scan": 2
        }
      },
      {
        "table": {
          "table_name": "employee",
          "access_type": "ref",
          "key": "index_employee_dno",
          "ref": ["company.department.dnumber"],
          "rows_examined_per_scan": 1
        }
      }
    ]
  }
}"#;

struct FakeState {
    employees: Vec<(String, String, i64)>,
    departments: Vec<(i64, String)>,
    indexes: BTreeSet<String>,
    failures: HashMap<String, DriverError>,
    fail_row_at: Option<usize>,
    panic_on: Option<String>,
    keep_plans: bool,
    close_failure: Option<DriverError>,
    executed: Vec<String>,
    fetched: Vec<String>,
    opens: usize,
    closes: usize,
    open_statements: usize,
}

#[derive(Clone)]
pub struct FakeDb {
    state: Arc<Mutex<FakeState>>,
}

impl FakeDb {
    /// employee `(A,B,10)`, `(C,D,20)`; department `(10,Sales)`, `(20,R&D)`; no indexes.
    pub fn company() -> Self {
        let state = FakeState {
            employees: vec![
                ("A".to_string(), "B".to_string(), 10),
                ("C".to_string(), "D".to_string(), 20),
            ],
            departments: vec![(10, "Sales".to_string()), (20, "R&D".to_string())],
            indexes: BTreeSet::new(),
            failures: HashMap::new(),
            fail_row_at: None,
            panic_on: None,
            keep_plans: true,
            close_failure: None,
            executed: Vec::new(),
            fetched: Vec::new(),
            opens: 0,
            closes: 0,
            open_statements: 0,
        };
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        // A panic injected by `panic_on` must not poison the counters.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn add_index(&self, name: &str) {
        self.lock().indexes.insert(name.to_string());
    }

    pub fn has_index(&self, name: &str) -> bool {
        self.lock().indexes.contains(name)
    }

    /// Make the exact statement `sql` fail, whether executed or fetched.
    pub fn fail_statement(&self, sql: &str, err: DriverError) {
        self.lock().failures.insert(sql.to_string(), err);
    }

    /// The report query fails after yielding `n` rows.
    pub fn fail_fetch_at_row(&self, n: usize) {
        self.lock().fail_row_at = Some(n);
    }

    pub fn panic_on(&self, sql: &str) {
        self.lock().panic_on = Some(sql.to_string());
    }

    /// Plan compiles succeed but store nothing, so the display step reads NULL.
    pub fn discard_compiled_plans(&self) {
        self.lock().keep_plans = false;
    }

    pub fn fail_close(&self, err: DriverError) {
        self.lock().close_failure = Some(err);
    }

    pub fn executed(&self) -> Vec<String> {
        self.lock().executed.clone()
    }

    pub fn execute_count(&self, sql: &str) -> usize {
        self.lock().executed.iter().filter(|s| *s == sql).count()
    }

    pub fn fetch_count(&self, sql: &str) -> usize {
        self.lock().fetched.iter().filter(|s| *s == sql).count()
    }

    pub fn opens(&self) -> usize {
        self.lock().opens
    }

    pub fn closes(&self) -> usize {
        self.lock().closes
    }

    /// Statements whose result stream has not been dropped yet.
    pub fn open_statements(&self) -> usize {
        self.lock().open_statements
    }
}

/// Counts one open statement until dropped.
struct StatementGuard(FakeDb);

impl StatementGuard {
    fn open(db: &FakeDb) -> Self {
        db.lock().open_statements += 1;
        Self(db.clone())
    }
}

impl Drop for StatementGuard {
    fn drop(&mut self) {
        self.0.lock().open_statements -= 1;
    }
}

fn table_columns(table: &str) -> Option<&'static [&'static str]> {
    match table {
        "employee" => Some(&["fname", "lname", "dno"]),
        "department" => Some(&["dnumber", "dname"]),
        _ => None,
    }
}

fn no_such_table(table: &str) -> DriverError {
    DriverError::with_code(1146, format!("Table 'company.{}' doesn't exist", table))
}

pub struct FakeConnection {
    db: FakeDb,
    plans: HashMap<String, String>,
}

impl FakeConnection {
    pub fn new(db: &FakeDb) -> Self {
        Self {
            db: db.clone(),
            plans: HashMap::new(),
        }
    }

    fn run_statement(&mut self, sql: &str) -> Result<u64, DriverError> {
        let mut st = self.db.lock();
        st.executed.push(sql.to_string());
        if st.panic_on.as_deref() == Some(sql) {
            drop(st);
            panic!("injected panic on {}", sql);
        }
        if let Some(err) = st.failures.get(sql) {
            return Err(err.clone());
        }

        // Identifiers arrive backtick-quoted: CREATE INDEX `i` ON `t` (`c`)
        let parts: Vec<&str> = sql.split('`').collect();
        if sql.starts_with("CREATE INDEX ") && parts.len() >= 6 {
            let (name, table, column) = (parts[1], parts[3], parts[5]);
            let columns = table_columns(table).ok_or_else(|| no_such_table(table))?;
            if !columns.contains(&column) {
                return Err(DriverError::with_code(
                    1072,
                    format!("Key column '{}' doesn't exist in table", column),
                ));
            }
            if !st.indexes.insert(name.to_string()) {
                return Err(DriverError::with_code(1061, format!("Duplicate key name '{}'", name)));
            }
            return Ok(0);
        }
        if sql.starts_with("DROP INDEX ") && parts.len() >= 4 {
            let (name, table) = (parts[1], parts[3]);
            table_columns(table).ok_or_else(|| no_such_table(table))?;
            if !st.indexes.remove(name) {
                return Err(DriverError::with_code(
                    1091,
                    format!("Can't DROP '{}'; check that column/key exists", name),
                ));
            }
            return Ok(0);
        }
        if let Some(rest) = sql.strip_prefix("EXPLAIN FORMAT=JSON INTO @") {
            let (variable, query) = rest.split_once(' ').unwrap_or((rest, ""));
            if query != REPORT_QUERY {
                return Err(DriverError::with_code(1064, "You have an error in your SQL syntax"));
            }
            let plan = if st.indexes.contains("index_employee_dno") {
                PLAN_INDEX_LOOKUP
            } else {
                PLAN_FULL_SCAN
            };
            let keep = st.keep_plans;
            drop(st);
            if keep {
                self.plans.insert(variable.to_string(), plan.to_string());
            }
            return Ok(0);
        }
        Err(DriverError::with_code(1064, "You have an error in your SQL syntax"))
    }

    fn fetch_rows(&self, sql: &str) -> Vec<Result<TextRow, DriverError>> {
        let mut st = self.db.lock();
        st.fetched.push(sql.to_string());
        if st.panic_on.as_deref() == Some(sql) {
            drop(st);
            panic!("injected panic on {}", sql);
        }
        if let Some(err) = st.failures.get(sql) {
            return vec![Err(err.clone())];
        }

        if sql == REPORT_QUERY {
            let mut rows: Vec<Result<TextRow, DriverError>> = st
                .employees
                .iter()
                .filter_map(|(fname, lname, dno)| {
                    st.departments
                        .iter()
                        .find(|(dnumber, _)| dnumber == dno)
                        .map(|(_, dname)| {
                            Ok(vec![
                                Field::new("fname", Some(fname.as_str())),
                                Field::new("lname", Some(lname.as_str())),
                                Field::new("dname", Some(dname.as_str())),
                            ])
                        })
                })
                .collect();
            if let Some(n) = st.fail_row_at {
                let at = n.min(rows.len());
                rows.insert(
                    at,
                    Err(DriverError::with_code(2013, "Lost connection to MySQL server during query")),
                );
            }
            return rows;
        }

        let variable = sql
            .strip_prefix("SELECT CAST(JSON_PRETTY(@")
            .and_then(|s| s.strip_suffix(") AS CHAR)"));
        if let Some(variable) = variable {
            let plan = self.plans.get(variable).map(String::as_str);
            return vec![Ok(vec![Field::new("plan", plan)])];
        }

        vec![Err(DriverError::with_code(1054, "Unknown column in 'field list'"))]
    }
}

impl DbConnection for FakeConnection {
    fn execute<'c>(&'c mut self, sql: &'c str) -> BoxFuture<'c, Result<u64, DriverError>> {
        Box::pin(future::ready(self.run_statement(sql)))
    }

    fn fetch<'c>(&'c mut self, sql: &'c str) -> BoxStream<'c, Result<TextRow, DriverError>> {
        let guard = StatementGuard::open(&self.db);
        let rows = self.fetch_rows(sql);
        stream::iter(rows)
            .map(move |row| {
                let _held = &guard;
                row
            })
            .boxed()
    }

    fn close(self) -> BoxFuture<'static, Result<(), DriverError>> {
        let mut st = self.db.lock();
        st.closes += 1;
        let result = match &st.close_failure {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        };
        Box::pin(future::ready(result))
    }
}

pub struct FakeProvider {
    db: FakeDb,
    fail: bool,
}

impl FakeProvider {
    pub fn new(db: &FakeDb) -> Self {
        Self {
            db: db.clone(),
            fail: false,
        }
    }

    /// Every open is rejected as bad credentials.
    pub fn failing(db: &FakeDb) -> Self {
        Self {
            db: db.clone(),
            fail: true,
        }
    }
}

impl ConnectionProvider for FakeProvider {
    type Connection = FakeConnection;

    fn open(&self) -> BoxFuture<'_, Result<FakeConnection, ConnectionError>> {
        let result = if self.fail {
            Err(ConnectionError::Connect(DriverError::with_code(
                1045,
                "Access denied for user 'report'@'localhost' (using password: YES)",
            )))
        } else {
            self.db.lock().opens += 1;
            Ok(FakeConnection::new(&self.db))
        };
        Box::pin(future::ready(result))
    }
}

/// Live MySQL coordinates plus the container keeping them alive.
pub struct TestDb {
    pub config: DbConfig,
    _container: Option<ContainerAsync<Mysql>>,
}

/// Connection settings for e2e tests, or `None` when no MySQL is available.
///
/// - If `DB_REPORT_TEST_URL` is set it is used with `DB_REPORT_TEST_USER` /
///   `DB_REPORT_TEST_PASSWORD`. The tests create and drop the `employee` and
///   `department` tables there, so point it at a scratch schema.
/// - Otherwise a throwaway MySQL 8.1 container is started via testcontainers
///   (requires Docker). MySQL 8's `caching_sha2_password` needs TLS for its
///   first full authentication, hence `ssl-mode=preferred`.
pub async fn setup_test_db() -> Option<TestDb> {
    if let Ok(url) = std::env::var("DB_REPORT_TEST_URL") {
        return Some(TestDb {
            config: DbConfig {
                url: Some(url),
                user: std::env::var("DB_REPORT_TEST_USER").ok(),
                password: Some(std::env::var("DB_REPORT_TEST_PASSWORD").unwrap_or_default()),
            },
            _container: None,
        });
    }

    let container = match Mysql::default().start().await {
        Ok(c) => c,
        Err(e) => {
            eprintln!("skipping live MySQL test: cannot start container ({e})");
            return None;
        }
    };
    let host = container.get_host().await.ok()?.to_string();
    let port = container.get_host_port_ipv4(3306).await.ok()?;

    Some(TestDb {
        config: DbConfig {
            url: Some(format!("mysql://{}:{}/test?ssl-mode=preferred", host, port)),
            user: Some("root".to_string()),
            password: Some(String::new()),
        },
        _container: Some(container),
    })
}
