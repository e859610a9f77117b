use anyhow::Result;
use chrono::Local;
use clap::{Parser, Subcommand};
use cot_etl_core::{ConfigLoader, DEFAULT_CONFIG_PATH};

mod commands;

use commands::{DelayedArgs, QueryArgs, RunArgs};

#[derive(Parser)]
#[command(name = "cot-etl")]
#[command(about = "CFTC Commitment of Traders collection pipeline", long_about = None)]
struct Cli {
    /// Config file path
    #[arg(short, long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: String,

    /// Optional log file path (appends to the file instead of logging to stderr)
    #[arg(long, global = true)]
    log_file: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch the configured reports, append history files and upsert the database
    Run(RunArgs),
    /// Create the schema and COT tables if they do not exist
    Migrate,
    /// Drop the COT tables
    Clean,
    /// Build the release-lagged business-day series of one report as CSV
    Delayed(DelayedArgs),
    /// Query stored COT records
    Query(QueryArgs),
}

impl Commands {
    fn name(&self) -> &'static str {
        match self {
            Commands::Run(_) => "run",
            Commands::Migrate => "migrate",
            Commands::Clean => "clean",
            Commands::Delayed(_) => "delayed",
            Commands::Query(_) => "query",
        }
    }
}

fn init_logging(log_file: Option<&str>) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    match log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(std::sync::Mutex::new(file))
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
    Ok(())
}

/// Loads the configuration and runs the selected command.
async fn execute(cli: Cli) -> Result<()> {
    let config = ConfigLoader::load_from(&cli.config)?;

    match cli.command {
        Commands::Run(args) => commands::run_populate(config, args).await,
        Commands::Migrate => commands::run_migrate(&config).await,
        Commands::Clean => commands::run_clean(&config).await,
        Commands::Delayed(args) => commands::run_delayed(config, args).await,
        Commands::Query(args) => commands::run_query(&config, args).await,
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_logging(cli.log_file.as_deref())?;

    let command = cli.command.name();
    if let Err(e) = execute(cli).await {
        tracing::error!(
            "COT {} of {} failed: {:#}",
            command,
            Local::now().format("%Y-%m-%d"),
            e
        );
        std::process::exit(1);
    }

    Ok(())
}
