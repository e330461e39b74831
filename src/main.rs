//! Signal engine entry point.
//!
//! Runs one batch job and exits, or serves the trigger surface:
//!
//! ```text
//! signal-engine <odds|syndicate|settle|serve> [--date YYYY-MM-DD] [--dry-run]
//! ```

use anyhow::{bail, Context, Result};
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info, warn};

use signal_engine::config::AppConfig;
use signal_engine::engine;
use signal_engine::trigger::{self, ConfigJobs, TriggerState};

const CONFIG_PATH: &str = "config.toml";
const USAGE: &str = "usage: signal-engine <odds|syndicate|settle|serve> [--date YYYY-MM-DD] [--dry-run]";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Odds,
    Syndicate,
    Settle,
    Serve,
}

#[derive(Debug)]
struct Cli {
    command: Command,
    date: String,
    dry_run: bool,
}

fn parse_args(args: impl IntoIterator<Item = String>) -> Result<Cli> {
    let mut args = args.into_iter();
    let command = match args.next().as_deref() {
        Some("odds") => Command::Odds,
        Some("syndicate") => Command::Syndicate,
        Some("settle") => Command::Settle,
        Some("serve") => Command::Serve,
        Some(other) => bail!("unknown command: {other}\n{USAGE}"),
        None => bail!("{USAGE}"),
    };

    let mut date = None;
    let mut dry_run = false;
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--dry-run" => dry_run = true,
            "--date" => {
                let value = args.next().context("--date needs a value")?;
                chrono::NaiveDate::parse_from_str(&value, "%Y-%m-%d")
                    .with_context(|| format!("invalid --date: {value}"))?;
                date = Some(value);
            }
            other => bail!("unknown argument: {other}\n{USAGE}"),
        }
    }

    Ok(Cli {
        command,
        date: date.unwrap_or_else(|| chrono::Utc::now().format("%Y-%m-%d").to_string()),
        dry_run,
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    init_logging();

    let cli = parse_args(std::env::args().skip(1))?;

    let cfg = if Path::new(CONFIG_PATH).exists() {
        AppConfig::load(CONFIG_PATH)?
    } else {
        warn!(path = CONFIG_PATH, "No config file, using defaults");
        AppConfig::default()
    };

    info!(command = ?cli.command, date = %cli.date, dry_run = cli.dry_run, "signal-engine starting");

    let outcome = match cli.command {
        Command::Odds => engine::run_odds(&cfg, &cli.date)
            .await
            .map(|r| print_report(&r)),
        Command::Syndicate => engine::run_syndicate(&cfg, &cli.date, cli.dry_run)
            .await
            .map(|r| print_report(&r)),
        Command::Settle => engine::run_settle(&cfg).await.map(|r| print_report(&r)),
        Command::Serve => {
            let credential = match cfg.trigger_credential() {
                Ok(c) => Some(c),
                Err(e) => {
                    warn!(error = %e, "Trigger credential missing, /run/* will refuse every request");
                    None
                }
            };
            let port = cfg.trigger.port;
            let state = Arc::new(TriggerState::new(credential, Arc::new(ConfigJobs::new(cfg))));
            trigger::serve(state, port).await
        }
    };

    if let Err(e) = &outcome {
        error!(error = %format!("{e:#}"), "Job failed");
    }
    outcome
}

fn print_report<T: serde::Serialize + std::fmt::Display>(report: &T) {
    info!(%report, "Job complete");
    match serde_json::to_string_pretty(report) {
        Ok(json) => println!("{json}"),
        Err(e) => warn!(error = %e, "Failed to render report"),
    }
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("signal_engine=info"));

    let json_logging = std::env::var("SIGNAL_ENGINE_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
