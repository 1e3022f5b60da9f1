use futures::stream::StreamExt;

use crate::db::DbConnection;
use crate::error::PlanError;

/// One line of the optimizer's plan, passed through verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanLine(pub String);

impl std::fmt::Display for PlanLine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Directive that compiles the plan of `sql` into the session variable `@variable`.
/// It returns no result set.
pub fn compile_statement(variable: &str, sql: &str) -> String {
    format!("EXPLAIN FORMAT=JSON INTO @{} {}", variable, sql)
}

/// Query reading the stored plan back as text.
pub fn display_statement(variable: &str) -> String {
    format!("SELECT CAST(JSON_PRETTY(@{}) AS CHAR)", variable)
}

/// Split a plan text value into lines, dropping the trailing empty line.
pub fn split_plan_text(text: &str) -> impl Iterator<Item = PlanLine> + '_ {
    text.lines().map(|line| PlanLine(line.to_string()))
}

/// Compile the plan for `sql` and read it back, both on `conn`.
///
/// The plan is stored in a user variable, which only the session that
/// compiled it can see; holding `&mut conn` across both steps keeps them on
/// one session. If the compile step fails the display query is not issued.
pub async fn explain<C: DbConnection>(
    conn: &mut C,
    variable: &str,
    sql: &str,
) -> Result<Vec<PlanLine>, PlanError> {
    let compile_sql = compile_statement(variable, sql);
    conn.execute(&compile_sql)
        .await
        .map_err(PlanError::Compile)?;
    tracing::debug!(variable, "plan compiled");

    let display_sql = display_statement(variable);
    let mut lines = Vec::new();
    {
        let mut rows = conn.fetch(&display_sql);
        while let Some(row) = rows.next().await {
            let row = row.map_err(PlanError::Display)?;
            for field in row {
                if let Some(text) = field.value {
                    lines.extend(split_plan_text(&text));
                }
            }
        }
    }

    if lines.is_empty() {
        return Err(PlanError::EmptyPlan);
    }
    tracing::debug!(lines = lines.len(), "plan displayed");
    Ok(lines)
}
