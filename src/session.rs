//! The report session: one connection, a fixed sequence of steps.
//!
//! Steps run in order on the same connection and a failing step never stops
//! the ones after it. The connection is closed exactly once when the sequence
//! ends, also when a step panics.

use std::fmt;
use std::io::Write;
use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use futures::stream::StreamExt;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::config::{Config, DropPolicy};
use crate::db::{ConnectionProvider, DbConnection};
use crate::error::{ConnectionError, IndexError, PlanError, QueryError};
use crate::query::explain::{explain, PlanLine};
use crate::query::index::{create_index, drop_index, IndexDescriptor};
use crate::query::read::run_query;
use crate::query::{PLAN_VARIABLE, REPORT_QUERY};

pub const SEPARATOR: &str =
    "------------------------------------------------------------------";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    DropIndex,
    Report,
    PlanBeforeIndex,
    CreateIndex,
    PlanAfterIndex,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Step::DropIndex => "drop index",
            Step::Report => "employee report",
            Step::PlanBeforeIndex => "explain plan (before index)",
            Step::CreateIndex => "create index",
            Step::PlanAfterIndex => "explain plan (after index)",
        })
    }
}

#[derive(Debug, Error)]
pub enum StepError {
    #[error(transparent)]
    Query(#[from] QueryError),
    #[error(transparent)]
    Plan(#[from] PlanError),
    #[error(transparent)]
    Index(#[from] IndexError),
    #[error("writing report output failed: {0}")]
    Output(#[from] std::io::Error),
}

#[derive(Debug)]
pub enum StepOutcome {
    Completed,
    /// Expected non-success, e.g. dropping an index that is not there.
    Informational(String),
    Failed(StepError),
}

#[derive(Debug)]
pub struct StepReport {
    pub step: Step,
    pub outcome: StepOutcome,
}

#[derive(Debug, Default)]
pub struct RunSummary {
    pub steps: Vec<StepReport>,
    /// Records written by the report step, including those before a failure.
    pub records: usize,
    pub close_error: Option<ConnectionError>,
}

impl RunSummary {
    pub fn failures(&self) -> impl Iterator<Item = (Step, &StepError)> {
        self.steps.iter().filter_map(|r| match &r.outcome {
            StepOutcome::Failed(e) => Some((r.step, e)),
            _ => None,
        })
    }

    pub fn succeeded(&self) -> bool {
        self.failures().next().is_none() && self.close_error.is_none()
    }

    /// Process exit status: 0 when every step and the close succeeded, else 1.
    /// Failures are logged as they are recorded, not again here.
    pub fn exit_status(&self) -> u8 {
        if self.succeeded() { 0 } else { 1 }
    }

    pub fn outcome(&self, step: Step) -> Option<&StepOutcome> {
        self.steps.iter().find(|r| r.step == step).map(|r| &r.outcome)
    }
}

pub struct Session {
    index: IndexDescriptor,
    drop_policy: DropPolicy,
}

impl Session {
    pub fn new(drop_policy: DropPolicy) -> Self {
        Self {
            index: IndexDescriptor::employee_dno(),
            drop_policy,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.index.drop_policy)
    }

    /// Open a connection and run every step on it.
    ///
    /// Only a failure to open is returned as an error; step failures are
    /// recorded in the summary.
    pub async fn run<P, W>(&self, provider: &P, out: &mut W) -> Result<RunSummary, ConnectionError>
    where
        P: ConnectionProvider,
        W: Write,
    {
        let mut conn = provider.open().await?;

        let steps = AssertUnwindSafe(self.run_steps(&mut conn, out))
            .catch_unwind()
            .await;
        let closed = conn.close().await;

        match steps {
            Ok(mut summary) => {
                if let Err(e) = closed {
                    error!(error = %e, "closing connection failed");
                    summary.close_error = Some(ConnectionError::Close(e));
                }
                info!(failed = summary.failures().count(), records = summary.records, "session finished");
                Ok(summary)
            }
            Err(panic) => {
                if let Err(e) = closed {
                    error!(error = %e, "closing connection after panic failed");
                }
                std::panic::resume_unwind(panic)
            }
        }
    }

    async fn run_steps<C: DbConnection, W: Write>(&self, conn: &mut C, out: &mut W) -> RunSummary {
        let mut summary = RunSummary::default();

        if let Err(e) = banner(out) {
            warn!(error = %e, "writing banner failed");
        }

        let outcome = self.drop_step(conn, out).await;
        end_section(out);
        record(&mut summary, Step::DropIndex, outcome);

        let mut records = 0;
        let outcome = report_step(conn, out, &mut records).await;
        end_section(out);
        summary.records = records;
        record(&mut summary, Step::Report, outcome);

        let outcome = plan_step(conn, out).await;
        end_section(out);
        record(&mut summary, Step::PlanBeforeIndex, outcome);

        let outcome = self.create_step(conn, out).await;
        end_section(out);
        record(&mut summary, Step::CreateIndex, outcome);

        let outcome = plan_step(conn, out).await;
        end_section(out);
        record(&mut summary, Step::PlanAfterIndex, outcome);

        summary
    }

    async fn drop_step<C: DbConnection, W: Write>(
        &self,
        conn: &mut C,
        out: &mut W,
    ) -> Result<StepOutcome, StepError> {
        let name = &self.index.name;
        let outcome = match drop_index(conn, &self.index, self.drop_policy).await {
            Ok(()) => {
                writeln!(out, "Index '{}' deleted successfully!", name)?;
                StepOutcome::Completed
            }
            Err(IndexError::NotFound { .. }) => {
                let message = format!("Index '{}' does not exist, hence unable to delete.", name);
                writeln!(out, "{}", message)?;
                StepOutcome::Informational(message)
            }
            Err(e) => return Err(e.into()),
        };
        Ok(outcome)
    }

    async fn create_step<C: DbConnection, W: Write>(
        &self,
        conn: &mut C,
        out: &mut W,
    ) -> Result<StepOutcome, StepError> {
        create_index(conn, &self.index).await?;
        writeln!(out, "Index '{}' created successfully!", self.index.name)?;
        Ok(StepOutcome::Completed)
    }
}

fn banner<W: Write>(out: &mut W) -> std::io::Result<()> {
    writeln!(out, "{}", SEPARATOR)?;
    writeln!(out, "Successfully connected to the database!")?;
    writeln!(out, "{}", SEPARATOR)
}

/// Every section ends with a separator, whatever its step's outcome.
fn end_section<W: Write>(out: &mut W) {
    if let Err(e) = writeln!(out, "{}", SEPARATOR) {
        warn!(error = %e, "writing separator failed");
    }
}

fn record(summary: &mut RunSummary, step: Step, outcome: Result<StepOutcome, StepError>) {
    let outcome = match outcome {
        Ok(StepOutcome::Informational(message)) => {
            info!(step = %step, "{}", message);
            StepOutcome::Informational(message)
        }
        Ok(outcome) => outcome,
        Err(e) => {
            error!(step = %step, error = %e, "step failed");
            StepOutcome::Failed(e)
        }
    };
    summary.steps.push(StepReport { step, outcome });
}

async fn report_step<C: DbConnection, W: Write>(
    conn: &mut C,
    out: &mut W,
    records: &mut usize,
) -> Result<StepOutcome, StepError> {
    writeln!(out, "EMPLOYEE LIST:")?;
    let mut stream = run_query(conn, REPORT_QUERY);
    while let Some(item) = stream.next().await {
        let record = item?;
        writeln!(out, "{}", record)?;
        *records += 1;
    }
    Ok(StepOutcome::Completed)
}

async fn plan_step<C: DbConnection, W: Write>(
    conn: &mut C,
    out: &mut W,
) -> Result<StepOutcome, StepError> {
    let lines: Vec<PlanLine> = explain(conn, PLAN_VARIABLE, REPORT_QUERY).await?;
    writeln!(out, "EXPLAIN PLAN:")?;
    for line in &lines {
        writeln!(out, "{}", line)?;
    }
    Ok(StepOutcome::Completed)
}
