//! Chessy: download a Chess.com game history, parse it, find blunders with
//! Stockfish and tally opening performance.

use std::path::PathBuf;

use anyhow::Context;
use archive_sync::GameFilter;
use chess_core::time_control::TimeClass;
use chessy::config::Config;
use chessy::service::ChessyService;
use chessy::task::{TaskHandle, TaskStatus};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "chessy", about = "Chess.com game archive analysis")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Download new games into the archive
    Sync(FilterArgs),
    /// Parse the archive into game records
    Parse {
        /// Merge games from this PGN file instead of re-parsing the archive
        #[arg(long)]
        incremental: Option<PathBuf>,
    },
    /// Run engine analysis over the parsed games
    Analyze {
        /// Analyze at most this many games
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Rebuild the opening (ECO) performance table
    Openings,
    /// Print summary statistics of the last analysis
    Stats,
    /// Sync, then parse, analyze and tally openings
    Run(FilterArgs),
    /// Empty the archive and reset the sync watermark
    Clear,
}

#[derive(Args)]
struct FilterArgs {
    /// First day to include (YYYY-MM-DD)
    #[arg(long)]
    from: Option<NaiveDate>,
    /// Last day to include (YYYY-MM-DD)
    #[arg(long)]
    to: Option<NaiveDate>,
    /// bullet, blitz, rapid, classical or daily
    #[arg(long)]
    time_class: Option<TimeClass>,
}

impl From<FilterArgs> for GameFilter {
    fn from(args: FilterArgs) -> Self {
        GameFilter {
            from: args.from,
            to: args.to,
            time_class: args.time_class,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();
    let service = ChessyService::new(Config::from_env());

    let task = TaskHandle::new(command_name(&cli.command));
    tokio::spawn({
        let task = task.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupt received, stopping after the current game");
                task.cancel();
            }
        }
    });

    task.start();
    let result = run(&service, cli.command, &task).await;
    match &result {
        Ok(()) => task.complete(),
        Err(e) => task.fail(e),
    }
    if task.status() == TaskStatus::Cancelled {
        tracing::info!("Partial results were saved");
    }
    result
}

fn command_name(command: &Command) -> &'static str {
    match command {
        Command::Sync(_) => "sync",
        Command::Parse { .. } => "parse",
        Command::Analyze { .. } => "analyze",
        Command::Openings => "openings",
        Command::Stats => "stats",
        Command::Run(_) => "run",
        Command::Clear => "clear",
    }
}

async fn run(service: &ChessyService, command: Command, task: &TaskHandle) -> anyhow::Result<()> {
    match command {
        Command::Sync(args) => {
            let updates = service.check_for_updates(&args.into(), task).await?;
            report_save(updates.save_error.as_ref());
            println!("{} new games", updates.value);
        }
        Command::Parse { incremental: Some(file) } => {
            let merged = service
                .parse_incremental(&file, task)
                .with_context(|| format!("parsing {}", file.display()))?;
            report_save(merged.save_error.as_ref());
            println!("{} games in parsed data", merged.value.len());
        }
        Command::Parse { incremental: None } => {
            let report = service.parse(task)?;
            report_save(report.save_error.as_ref());
            println!("{} games parsed", report.value.records.len());
        }
        Command::Analyze { limit } => {
            let run = service.analyze(limit, task).await?;
            report_save(run.save_error.as_ref());
            println!("{} games analyzed", run.value.records.len());
        }
        Command::Openings => {
            let perf = service.openings(task)?;
            report_save(perf.save_error.as_ref());
            for row in perf.value.rows() {
                println!(
                    "{:<4} white {:>3} (+{} ={} -{})  black {:>3} (+{} ={} -{})",
                    row.eco,
                    row.white_games,
                    row.white_wins,
                    row.white_draws,
                    row.white_losses,
                    row.black_games,
                    row.black_wins,
                    row.black_draws,
                    row.black_losses
                );
            }
        }
        Command::Stats => {
            let stats = service.statistics()?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        Command::Run(args) => {
            let updates = service.check_for_updates(&args.into(), task).await?;
            report_save(updates.save_error.as_ref());
            println!("{} new games", updates.value);
            let summary = service.process_new_games(task).await?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Command::Clear => service.clear(task)?,
    }
    Ok(())
}

fn report_save(error: Option<&chess_core::StoreError>) {
    if let Some(e) = error {
        eprintln!("warning: results were computed but could not be saved: {e}");
    }
}
