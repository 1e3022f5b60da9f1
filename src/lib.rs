//! Employee/department report over a single MySQL connection, with an
//! execution-plan comparison before and after creating `index_employee_dno`.
//! The binary entry point lives in src/main.rs.

pub mod config;
pub mod db;
pub mod error;
pub mod query;
pub mod session;
#[cfg(test)]
pub mod test_helpers;
