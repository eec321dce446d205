use std::sync::Arc;

use clap::Parser;
use shelter_engine::{Fetcher, HttpFetcher, RegisterOutcome, Registration};
use tracing::{Level, error, info};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

mod cli;
mod commands;
mod config;
mod error;
mod server;

use cli::{CliArgs, Command};
use config::AppConfig;
use error::AppError;

fn main() {
    if let Err(e) = bootstrap() {
        eprintln!("Error: {e}");
        // Log the full error for debugging
        error!(error = ?e, "Application failed");
        std::process::exit(1);
    }
}

#[tokio::main]
async fn bootstrap() -> Result<(), AppError> {
    // Parse command-line arguments
    let args = CliArgs::parse();

    // Setup logging
    let log_level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open("shelter.log")?;
    let (file_writer, _guard) = tracing_appender::non_blocking(log_file);

    let multi_writer = MakeWriterExt::and(std::io::stdout, file_writer);

    // RUST_LOG takes precedence over --verbose
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(log_level).into())
        .from_env_lossy();
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(multi_writer)
        .with_ansi(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| AppError::Initialization(e.to_string()))?;

    let config = AppConfig::load(args.config.as_deref())?;
    let config = commands::apply_overrides(&args, config)?;

    match &args.command {
        Command::Serve { listen } => {
            let listen = listen.clone().unwrap_or_else(|| config.server.listen.clone());
            serve(&config, &listen).await
        }
        Command::Install => commands::install(&config).await,
        Command::Sync { tag } => commands::sync(&config, tag.as_deref()).await,
        Command::Classify { urls } => commands::classify(&config, urls),
        Command::Fetch { url, dest } => commands::fetch(&config, url, *dest).await,
        Command::Partitions => commands::partitions(&config).await,
        Command::CacheUrls { urls } => commands::cache_urls(&config, urls).await,
        Command::Config { action } => commands::config_action(action, &config, args.config.as_deref()),
    }
}

async fn serve(config: &AppConfig, listen: &str) -> Result<(), AppError> {
    info!("Shelter offline caching proxy");
    info!("==================================================================");

    let registration = Arc::new(Registration::new());
    let engine = commands::build_engine(config)?;
    match registration.resume(engine).await {
        Ok(RegisterOutcome::Activated(report)) => {
            info!(version = %report.version, deleted = report.pruned.deleted.len(), "Version active");
        }
        Ok(RegisterOutcome::Waiting) => info!("Version installed, waiting for SKIP_WAITING"),
        Err(e) => error!(error = %e, "Could not install, requests pass through until a version is active"),
    }

    let passthrough: Arc<dyn Fetcher> = Arc::new(HttpFetcher::new(&config.engine.http)?);
    let state = server::AppState {
        registration,
        engine_config: Arc::new(config.engine.clone()),
        passthrough,
    };
    server::serve(state, &config.server, listen).await
}
