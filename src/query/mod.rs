//! Statement execution on a single [`DbConnection`](crate::db::DbConnection).
//!
//! - `read`:    read queries streamed back as [`read::Record`]s
//! - `explain`: the two-step plan compile/display protocol
//! - `index`:   CREATE/DROP INDEX with server error classification
//!
//! The statements the report issues are fixed and live here.

pub mod explain;
pub mod index;
pub mod read;

/// Employees joined with their department, in the join's natural row order.
pub const REPORT_QUERY: &str =
    "SELECT fname, lname, dname FROM employee JOIN department ON dno = dnumber";

/// User variable the plan compile step stores the plan in.
pub const PLAN_VARIABLE: &str = "db_report_plan";
