use std::process::ExitCode;

use tracing::{error, info};

use db_report::config;
use db_report::db::{self, MySqlProvider};
use db_report::session::Session;

/// Configuration or connection failure; nothing ran.
const EXIT_NO_SESSION: u8 = 2;

// Single-threaded: every statement is awaited before the next is issued.
#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    // Config is loaded before logging starts; its warnings go to stderr directly.
    let config = match config::merge::load_config().and_then(|c| c.validate().map(|_| c)) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("db-report: {:#}", e);
            return ExitCode::from(EXIT_NO_SESSION);
        }
    };

    // Logs MUST go to stderr: stdout carries the report itself.
    let level = config.monitoring.level().unwrap_or(tracing::Level::INFO);
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(level)
        .init();
    info!("db-report starting");

    db::init_driver();

    let provider = MySqlProvider::new(config.db.clone());
    let session = Session::from_config(&config);
    let mut stdout = std::io::stdout().lock();

    match session.run(&provider, &mut stdout).await {
        Ok(summary) => ExitCode::from(summary.exit_status()),
        Err(e) => {
            error!("{}", e);
            ExitCode::from(EXIT_NO_SESSION)
        }
    }
}
