//! sales-bot: post recent OpenSea sales and listings for one collection to
//! Discord, then exit.
//!
//! Meant to be scheduled externally (cron, CI schedule) with `SECONDS`
//! matching the schedule interval.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;

use opensea_sales_bot::api::OpenSeaClient;
use opensea_sales_bot::config::Settings;
use opensea_sales_bot::discord::{DiscordConnector, DryRunConnector};
use opensea_sales_bot::reporter;
use opensea_sales_bot::types::RunReport;

#[derive(Parser)]
#[command(name = "sales-bot", about = "Post recent OpenSea sales and listings to Discord")]
struct Args {
    /// Print messages as JSON lines instead of posting to Discord
    #[arg(long)]
    dry_run: bool,

    /// Load environment from this file instead of ./.env
    #[arg(long)]
    env_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let result = run(&args).await;
    ExitCode::from(reporter::exit_status(&result))
}

async fn run(args: &Args) -> Result<RunReport> {
    match &args.env_file {
        Some(path) => {
            dotenvy::from_path(path)
                .with_context(|| format!("failed to load {}", path.display()))?;
        }
        None => {
            dotenvy::dotenv().ok();
        }
    }

    let feed = OpenSeaClient::new();
    let now = Utc::now();

    if args.dry_run {
        opensea_sales_bot::run(Settings::from_env, &DryRunConnector, &feed, now).await
    } else {
        opensea_sales_bot::run(Settings::from_env, &DiscordConnector::new(), &feed, now).await
    }
}
