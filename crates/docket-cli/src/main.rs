//! Command-line interface for invoice ingestion.

mod commands;

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use console::style;
use tracing::Level;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use commands::{batch, config, event, process, query, serve, storage};
use docket_core::DocketError;

/// Invoice ingestion - extract, normalize and store invoice data
#[derive(Parser)]
#[command(name = "docket")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Process a single invoice file
    Process(process::ProcessArgs),

    /// Process multiple invoice files
    Batch(batch::BatchArgs),

    /// Handle one storage event payload
    Event(event::EventArgs),

    /// Serve the storage event endpoint
    Serve(serve::ServeArgs),

    /// List or delete archived files
    Storage(storage::StorageArgs),

    /// Run SQL against the invoice warehouse
    Query(query::QueryArgs),

    /// Manage configuration
    Config(config::ConfigArgs),
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let _ = dotenvy::dotenv();

    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.to_string().to_lowercase()));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("{} Failed to install logger: {}", style("✗").red(), e);
    }

    let config_path = cli.config.as_deref();
    let outcome = match cli.command {
        Commands::Process(args) => process::run(args, config_path).await,
        Commands::Batch(args) => batch::run(args, config_path).await,
        Commands::Event(args) => event::run(args, config_path).await,
        Commands::Serve(args) => serve::run(args, config_path).await,
        Commands::Storage(args) => storage::run(args, config_path).await,
        Commands::Query(args) => query::run(args, config_path).await,
        Commands::Config(args) => config::run(args, config_path).await,
    };

    match outcome {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {:#}", style("✗").red(), e);
            if is_config_error(&e) {
                ExitCode::from(2)
            } else {
                ExitCode::FAILURE
            }
        }
    }
}

fn is_config_error(error: &anyhow::Error) -> bool {
    matches!(error.downcast_ref::<DocketError>(), Some(DocketError::Config(_)))
}
