//! Circulars sync daemon
//!
//! Periodically mirrors the school portal's circulars feed into a local
//! SQLite database. Required configuration comes from the environment
//! (CIRCULARS_DB_PATH, CIRCULARS_FEED_URL, CIRCULARS_CYCLE_WAIT); the store
//! path may instead come from a TOML file passed as the only argument.

use std::path::PathBuf;

use chrono::Utc;
use clap::Parser;

use circulars::config::Settings;
use circulars::error::Result;
use circulars::pipeline::schedule::Schedule;
use circulars::pipeline::sync::{run_cleanup, run_cycle};
use circulars::services::feed::HttpFeed;
use circulars::store::Store;

/// circulars - School portal circulars sync daemon
#[derive(Parser, Debug)]
#[command(name = "circulars", version, about = "School portal circulars sync daemon")]
struct Cli {
    /// Store credentials file, used when CIRCULARS_DB_PATH is unset
    config: Option<PathBuf>,

    /// Run a single cycle, including cleanup, then exit
    #[arg(long)]
    once: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

/// Initialize logging based on verbosity flag.
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

/// Main entry point for the daemon.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let settings = Settings::load(cli.config.as_deref())?;
    log::info!(
        "cycle period {:?}, cleanup period {:?}",
        settings.cycle_period,
        settings.cleanup_period
    );

    let mut store = Store::open(&settings.db_path)?;
    let feed = HttpFeed::new(settings.feed_url.clone())?;

    if cli.once {
        let outcome = run_cycle(&feed, &mut store).await?;
        let (circulars, attachments) = run_cleanup(&mut store, &outcome.circulars)?;
        log::info!("removed {circulars} circulars and {attachments} attachments");
        return Ok(());
    }

    let mut schedule = Schedule::starting_at(
        Utc::now(),
        settings.cycle_period,
        settings.cleanup_period,
    );

    loop {
        tokio::time::sleep(schedule.wait_for_sync(Utc::now())).await;
        schedule.advance_sync();

        let outcome = match run_cycle(&feed, &mut store).await {
            Ok(outcome) => outcome,
            Err(error) => {
                log::error!("cycle failed: {error}");
                continue;
            }
        };

        if schedule.cleanup_due() {
            schedule.advance_cleanup();

            log::info!("removing deleted circulars");
            match run_cleanup(&mut store, &outcome.circulars) {
                Ok((circulars, attachments)) => {
                    log::info!("removed {circulars} circulars and {attachments} attachments");
                }
                Err(error) => log::error!("cleanup failed: {error}"),
            }
        }

        log::info!("waiting until {}", schedule.next_sync());
    }
}
