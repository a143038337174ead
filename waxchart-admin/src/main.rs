//! waxchart-admin - Operational jobs for the position & achievement ledger
//!
//! Runs the recovery backfills against the shared waxchart database:
//! position repair, trend re-detection, or both. Exits non-zero when any
//! subject could not be repaired so schedulers notice.

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::{error, info, warn};
use waxchart_core::backfill::{run_position_backfill, run_trend_backfill, BackfillReport};
use waxchart_core::config::{database_path, ensure_root_folder, resolve_root_folder};
use waxchart_core::db::init::init_database;

/// Ledger administration utility
#[derive(Parser, Debug)]
#[clap(name = "waxchart-admin")]
#[clap(about = "Recovery and maintenance jobs for the waxchart ledger")]
struct Args {
    /// Root folder holding waxchart.db (overrides WAXCHART_ROOT and config file)
    #[clap(long, value_name = "DIR")]
    root_folder: Option<String>,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Recovery backfills for the ledger database
    #[clap(subcommand)]
    Backfill(BackfillJob),
}

#[derive(Subcommand, Debug)]
enum BackfillJob {
    /// Repair contribution positions and realign subject counters
    Positions,
    /// Re-run trend detection and badge awards for subjects past threshold
    Trending,
    /// Run both backfills, positions first
    All,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    info!("Starting waxchart-admin v{}", env!("CARGO_PKG_VERSION"));

    let root_folder = resolve_root_folder(args.root_folder.as_deref());
    ensure_root_folder(&root_folder)?;

    let db_path = database_path(&root_folder);
    info!("Database path: {}", db_path.display());

    let pool = init_database(&db_path).await?;

    let mut failed = 0;
    match args.command {
        Command::Backfill(BackfillJob::Positions) => {
            failed += print_report("positions", &run_position_backfill(&pool).await?);
        }
        Command::Backfill(BackfillJob::Trending) => {
            failed += print_report("trending", &run_trend_backfill(&pool).await?);
        }
        Command::Backfill(BackfillJob::All) => {
            failed += print_report("positions", &run_position_backfill(&pool).await?);
            failed += print_report("trending", &run_trend_backfill(&pool).await?);
        }
    }

    if failed > 0 {
        error!("{} subjects could not be repaired; re-run after resolving", failed);
        std::process::exit(1);
    }

    Ok(())
}

/// Log and print one job's report, returning its failure count
fn print_report(job: &str, report: &BackfillReport) -> usize {
    info!(
        job,
        processed = report.processed,
        succeeded = report.succeeded,
        failed = report.failed,
        "Backfill finished"
    );
    for err in &report.errors {
        warn!(job, subject_id = %err.subject_id, "{}", err.message);
    }
    println!(
        "{} backfill: processed {}, succeeded {}, failed {}",
        job, report.processed, report.succeeded, report.failed
    );
    report.failed
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn command_line_definition_is_consistent() {
        Args::command().debug_assert();
    }

    #[test]
    fn backfill_jobs_parse_as_nested_subcommands() {
        let args = Args::try_parse_from(["waxchart-admin", "backfill", "positions"]).unwrap();
        assert!(matches!(args.command, Command::Backfill(BackfillJob::Positions)));

        let args = Args::try_parse_from(["waxchart-admin", "backfill", "trending"]).unwrap();
        assert!(matches!(args.command, Command::Backfill(BackfillJob::Trending)));

        let args =
            Args::try_parse_from(["waxchart-admin", "--root-folder", "/srv/wax", "backfill", "all"])
                .unwrap();
        assert!(matches!(args.command, Command::Backfill(BackfillJob::All)));
        assert_eq!(args.root_folder.as_deref(), Some("/srv/wax"));
    }
}
