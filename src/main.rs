//! Binary entrypoint for shutdown-at.
//!
//! Collects the target time, then hands over to the library scheduler and
//! prints its events until the power action runs or the user cancels.

use std::io;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{ArgAction, Parser};
use shutdown_at::clock::{Clock, SystemClock};
use shutdown_at::config::ShutdownConfig;
use shutdown_at::console::{Console, prompt_target};
use shutdown_at::power::{PowerMode, PowerPlan, SystemPowerController};
use shutdown_at::scheduler::{
    RunOutcome, SchedulerSettings, ShutdownScheduler, run as run_schedule,
};
use shutdown_at::time::TimeOfDay;
use tokio::io::BufReader;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{Level, error, info};
use tracing_subscriber::filter::Directive;
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Debug, Parser)]
#[command(
    name = "shutdown-at",
    version,
    about = "Shut down or hibernate this machine at a given time"
)]
struct Cli {
    /// Minutes from now used to prefill the prompt (defaults to the config value)
    #[arg(value_name = "DELAY_MINUTES")]
    delay_minutes: Option<u32>,

    /// Target time as HH.MM; skips the prompt
    #[arg(long, value_name = "HH.MM")]
    at: Option<TimeOfDay>,

    /// Hibernate instead of shutting down
    #[arg(long)]
    hibernate: bool,

    /// Path to YAML config file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log the power commands instead of running them
    #[arg(long)]
    dry_run: bool,

    /// Increase log verbosity (repeatable)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    verbose: u8,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    if let Err(err) = try_main().await {
        error!(error = ?err, "shutdown-at exited with error");
        std::process::exit(1);
    }
}

async fn try_main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose)?;

    let mut cfg = ShutdownConfig::load_or_default(cli.config.as_ref())?
        .validated()
        .context("invalid configuration values")?;
    if cli.dry_run {
        cfg.dry_run = true;
    }
    info!(config = ?cfg, "configuration loaded");

    let mode = if cli.hibernate {
        PowerMode::Hibernate
    } else {
        PowerMode::Shutdown
    };

    let target = match cli.at {
        Some(target) => target,
        None => {
            let delay = cli.delay_minutes.unwrap_or(cfg.default_delay_minutes);
            let default = SystemClock.now().plus_minutes(delay);
            let mut stdin = BufReader::new(tokio::io::stdin());
            let mut stdout = tokio::io::stdout();
            match prompt_target(&mut stdin, &mut stdout, default).await? {
                Some(target) => target,
                None => {
                    info!("no target entered; nothing scheduled");
                    return Ok(());
                }
            }
        }
    };

    let power = SystemPowerController::new(PowerPlan::from_config(&cfg))
        .context("invalid power configuration")?;
    let (events_tx, mut events_rx) = mpsc::channel(64);
    let mut scheduler =
        ShutdownScheduler::new(SystemClock, power, SchedulerSettings::from_config(&cfg))
            .with_events(events_tx);
    scheduler.arm(target, mode)?;

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("interrupt received; cancelling schedule");
                cancel.cancel();
            }
        });
    }

    // The scheduler owns the only sender, so the console loop ends once it is dropped.
    let driver = async move {
        let outcome = run_schedule(&mut scheduler, cancel).await;
        drop(scheduler);
        outcome
    };
    let presenter = async move {
        let mut console = Console::new(io::stdout());
        while let Some(event) = events_rx.recv().await {
            console.handle(&event)?;
        }
        Ok::<_, io::Error>(())
    };
    let (outcome, presented) = tokio::join!(driver, presenter);
    presented.context("failed to write to the console")?;

    match outcome {
        RunOutcome::Completed(result) if !result.succeeded => bail!(
            "{} failed: {}",
            result.mode,
            result.error_detail.as_deref().unwrap_or("unknown error")
        ),
        RunOutcome::Completed(result) => {
            info!(
                mode = %result.mode,
                used_fallback = result.used_fallback,
                "power action dispatched"
            );
        }
        RunOutcome::Cancelled => info!("schedule cancelled"),
        RunOutcome::NothingScheduled => info!("nothing scheduled"),
    }
    Ok(())
}

fn init_tracing(verbosity: u8) -> Result<()> {
    // map -v to log level; RUST_LOG still applies to everything else
    let level = match verbosity {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let directive: Directive = format!("shutdown_at={level}")
        .parse()
        .context("invalid log directive")?;
    let filter = EnvFilter::from_default_env().add_directive(directive);
    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .compact()
        .init();
    Ok(())
}
