mod alerts;
mod api;
mod config;
mod db;
mod detect;
mod models;
mod services;
mod utils;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::services::scheduler::Daemon;

#[derive(Parser)]
#[command(name = "sharpline")]
#[command(about = "Sharp-action line movement detector for sports betting markets")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ReportPeriod {
    Daily,
    Weekly,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay stored snapshots through the detectors
    Backtest {
        /// Start date (ISO format, e.g. 2025-01-15)
        start: String,
        /// End date, exclusive (ISO format, e.g. 2025-01-16)
        end: String,
    },
    /// Send a summary report to Discord
    Report {
        #[arg(value_enum)]
        period: ReportPeriod,
    },
    /// Show signal performance stats
    Stats,
    /// Initialize the database
    InitDb,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let config = Config::from_env()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone())),
        )
        .init();

    let cli = Cli::parse();

    let pool = db::create_pool(&config.db_path).await?;
    db::init_schema(&pool).await?;

    match cli.command {
        Some(Commands::Backtest { start, end }) => {
            let result = services::backtest::run(&config, &pool, &start, &end).await?;
            println!("{}", result.summary());
        }
        Some(Commands::Report { period }) => {
            let alerter = alerts::Alerter::new(&config);
            match period {
                ReportPeriod::Daily => {
                    services::reports::send_daily_report(&config, &alerter, &pool).await?;
                    println!("Daily report sent to Discord.");
                }
                ReportPeriod::Weekly => {
                    services::reports::send_weekly_report(&config, &alerter, &pool).await?;
                    println!("Weekly report sent to Discord.");
                }
            }
        }
        Some(Commands::Stats) => {
            print_stats(&pool).await?;
        }
        Some(Commands::InitDb) => {
            // Schema creation already ran above; this subcommand just makes
            // it explicit for first-time setup.
            tracing::info!(path = %config.db_path, "database ready");
        }
        None => {
            tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting sharpline");
            Daemon::new(config, pool).run().await?;
        }
    }

    Ok(())
}

async fn print_stats(pool: &sqlx::SqlitePool) -> Result<()> {
    let stats = services::performance::get_stats(pool, None).await?;
    if stats.is_empty() {
        println!("No resolved signals yet.");
        return Ok(());
    }

    let rates = services::performance::win_rates(&stats);
    println!("Signal Performance:");
    let mut signal_types: Vec<&String> = stats.keys().collect();
    signal_types.sort();
    for signal_type in signal_types {
        let counts = stats[signal_type];
        let rate = rates.get(signal_type).copied().unwrap_or(0.0);
        println!(
            "  {signal_type}: {:.1}% win rate ({}W / {}L / {}P)",
            rate * 100.0,
            counts.won,
            counts.lost,
            counts.push
        );
    }
    Ok(())
}
