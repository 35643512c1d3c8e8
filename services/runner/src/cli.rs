use crate::infra;
use account_health::config::StorageConfig;
use account_health::error::AppError;
use account_health::health::{InvocationOutcome, RunState};
use account_health::health::sources::ConfigSource;
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use std::time::Duration;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(
    name = "account-health",
    about = "Score every managed account in resumable batches and publish a health report",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Perform one scheduled invocation (default command)
    Run,
    /// Keep invoking on a fixed interval until interrupted
    Watch(WatchArgs),
    /// Show the open run's progress or when the last run started
    Status,
    /// Edit runner settings; refused while a run holds the configuration lock
    Settings {
        #[command(subcommand)]
        command: SettingsCommand,
    },
}

#[derive(Subcommand, Debug)]
enum SettingsCommand {
    /// Set one key in the settings table
    Set { key: String, value: String },
}

#[derive(Args, Debug)]
struct WatchArgs {
    /// Minutes between invocations
    #[arg(long, default_value_t = 60, value_parser = clap::value_parser!(u64).range(1..))]
    interval_minutes: u64,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let config = infra::bootstrap()?;

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => invoke_once(&config.storage),
        Command::Watch(args) => watch(config.storage, args).await,
        Command::Status => print_status(&config.storage),
        Command::Settings {
            command: SettingsCommand::Set { key, value },
        } => {
            infra::config_source(&config.storage).update_setting(&key, &value)?;
            println!("{key} = {value}");
            Ok(())
        }
    }
}

fn invoke_once(storage: &StorageConfig) -> Result<(), AppError> {
    let outcome = infra::controller(storage).invoke(Utc::now())?;
    print_outcome(&outcome);
    Ok(())
}

/// Each tick builds fresh collaborators so edits to the data files between ticks are
/// picked up.
async fn watch(storage: StorageConfig, args: WatchArgs) -> Result<(), AppError> {
    let mut ticker = tokio::time::interval(Duration::from_secs(args.interval_minutes * 60));
    info!(interval_minutes = args.interval_minutes, "watching for due runs");

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted; stopping watch loop");
                return Ok(());
            }
        }

        let tick_storage = storage.clone();
        let result = tokio::task::spawn_blocking(move || {
            infra::controller(&tick_storage).invoke(Utc::now())
        })
        .await
        .map_err(|err| AppError::Io(std::io::Error::other(err)))?;

        match result {
            Ok(outcome) => print_outcome(&outcome),
            Err(err) => error!(error = %err, "invocation failed; retrying on next tick"),
        }
    }
}

fn print_status(storage: &StorageConfig) -> Result<(), AppError> {
    match infra::controller(storage).state()? {
        RunState::NoRun {
            last_run_start: Some(started),
        } => println!("No run in progress. Last run started {}", started.to_rfc3339()),
        RunState::NoRun {
            last_run_start: None,
        } => println!("No run has been started yet"),
        RunState::InProgress {
            run,
            processed,
            total,
        } => {
            println!("Run {} started {}", run.id, run.started_at.to_rfc3339());
            println!("  Accounts processed: {processed}/{total}");
            println!("  Report: {}", run.report);
        }
    }
    Ok(())
}

fn print_outcome(outcome: &InvocationOutcome) {
    match outcome {
        InvocationOutcome::Idle { next_due, .. } => {
            println!("Nothing to do; next run due {}", next_due.to_rfc3339());
        }
        InvocationOutcome::Progressed {
            run,
            started,
            batch,
        } => {
            let verb = if *started { "Started" } else { "Continued" };
            println!(
                "{verb} {run}: {} scored, {} failed, {} remaining",
                batch.processed, batch.failed, batch.remaining
            );
        }
        InvocationOutcome::Completed {
            run,
            batch,
            report,
            notified,
            ..
        } => {
            println!(
                "Completed {run}: {} scored in final batch, {} failed",
                batch.processed, batch.failed
            );
            println!("  Report: {report}");
            if *notified {
                println!("  Completion notice queued");
            }
        }
    }
}
