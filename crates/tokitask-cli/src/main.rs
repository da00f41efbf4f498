mod cli;
mod config;
mod plan;
mod storage;
mod tasks;
mod tui;

use chrono::Local;
use clap::Parser;
use color_eyre::Result;
use tokitask_core::{storage::DocumentStore, TokiError};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::cli::{Command, ConfigCommand};

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    init_tracing();

    let cli = cli::Cli::parse();
    if let Err(report) = run(cli.command.unwrap_or(Command::Tui)).await {
        // Domain failures get a friendly line; anything else keeps the full report.
        match report.downcast_ref::<TokiError>() {
            Some(err) => {
                error!(error = %err, "command failed");
                eprintln!("{}", err.user_message());
                std::process::exit(1);
            }
            None => return Err(report),
        }
    }
    Ok(())
}

async fn run(command: Command) -> Result<()> {
    let config = config::load()?;
    match command {
        Command::Tui => run_tui(&config).await?,
        Command::Version => print_version(),
        Command::Health => run_health_check(&config).await?,
        Command::Config(ConfigCommand::Init) => init_config(&config)?,
        Command::Task(cmd) => tasks::handle(cmd, &config).await?,
        Command::Template(cmd) => tasks::handle_template(cmd, &config).await?,
        Command::Day(cmd) => tasks::handle_day(cmd, &config).await?,
        Command::Plan { now } => plan::run(&config, now).await?,
        Command::Habits => tasks::show_habits(&config).await?,
        Command::Today { date } => tasks::show_calendar(date, &config).await?,
    }
    Ok(())
}

fn init_tracing() {
    // Respect user-provided filters, default to info to avoid noisy stdout.
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}

fn print_version() {
    println!("tokitask {}", env!("CARGO_PKG_VERSION"));
}

async fn run_tui(config: &config::Config) -> Result<()> {
    let session = storage::open_session(config).await?;
    let done = tui::launch(&session.snapshot().await)?;
    if done.is_empty() {
        return Ok(());
    }
    let today = Local::now().date_naive();
    let count = done.len();
    session
        .apply(|data| {
            for id in done {
                data.set_completed(id, true, today)?;
            }
            Ok(())
        })
        .await?;
    info!(count, "saved completions from day view");
    Ok(())
}

/// Checks that the sealed store can write, read back and delete a document.
async fn run_health_check(config: &config::Config) -> Result<()> {
    let store = storage::store_from_config(config)?;
    run_store_health(&store).await?;
    println!("Storage: ok");
    Ok(())
}

async fn run_store_health<S: DocumentStore>(store: &S) -> Result<()> {
    let probe_key = "health/probe";
    let payload = b"ok";
    store.put(probe_key, payload).await.map_err(TokiError::from)?;
    let round_trip = store.get(probe_key).await.map_err(TokiError::from)?;
    store.delete(probe_key).await.map_err(TokiError::from)?;

    if round_trip != payload {
        color_eyre::eyre::bail!("storage round-trip failed");
    }
    Ok(())
}

fn init_config(config: &config::Config) -> Result<()> {
    let path = config::write_default_if_missing(config)?;
    println!("Config initialized at {}", path.display());
    Ok(())
}
