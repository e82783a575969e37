//! Storage command - inspect and clean up archived files.

use std::process::ExitCode;
use std::sync::Arc;

use clap::{Args, Subcommand};
use console::style;

use docket_core::auth::TokenSource;
use docket_core::storage::{GcsStore, LocalStore};
use docket_core::{DocketConfig, DocketError, ObjectStore, StorageLocator};

use super::load_config;

/// Arguments for the storage command.
#[derive(Args)]
pub struct StorageArgs {
    #[command(subcommand)]
    command: StorageCommand,

    /// Use the local archive directory instead of the bucket
    #[arg(long, global = true)]
    dry_run: bool,
}

#[derive(Subcommand)]
enum StorageCommand {
    /// List archived files
    List {
        /// List the production bucket instead of the ad-hoc bucket
        #[arg(long)]
        production: bool,

        /// Only objects whose names start with this prefix
        #[arg(long, default_value = "")]
        prefix: String,
    },

    /// Delete an archived file
    Delete {
        /// Object URI (gs://bucket/object)
        locator: String,
    },
}

pub async fn run(args: StorageArgs, config_path: Option<&str>) -> anyhow::Result<ExitCode> {
    let config = load_config(config_path)?;
    let store = open_store(&config, args.dry_run)?;

    match args.command {
        StorageCommand::List { production, prefix } => {
            let bucket = if production {
                &config.storage.production_bucket
            } else {
                &config.storage.adhoc_bucket
            };
            if bucket.is_empty() {
                let key = if production { "production_bucket" } else { "adhoc_bucket" };
                return Err(DocketError::Config(format!("storage.{} is not set", key)).into());
            }

            let objects = store.list(bucket, &prefix).await?;
            for object in &objects {
                println!("{}", object);
            }
            eprintln!("{} {} object(s)", style("ℹ").blue(), objects.len());
        }
        StorageCommand::Delete { locator } => {
            let locator: StorageLocator = locator
                .parse::<StorageLocator>()
                .map_err(|e| DocketError::Config(e.to_string()))?;
            store.delete(&locator).await?;
            println!("{} Deleted {}", style("✓").green(), locator);
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn open_store(config: &DocketConfig, dry_run: bool) -> anyhow::Result<Arc<dyn ObjectStore>> {
    if dry_run {
        return Ok(Arc::new(LocalStore::new(&config.storage.local_root)));
    }
    let tokens = TokenSource::from_config(&config.gcp);
    Ok(Arc::new(GcsStore::new(&config.storage, tokens)?))
}
