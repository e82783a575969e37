//! Event command - handle one storage event payload.

use std::io::Read;
use std::process::ExitCode;

use clap::Args;
use tokio::fs;

use docket_core::handle_storage_event;
use docket_core::pipeline::parse_event_payload;

use super::{PipelineOptions, build_pipeline, load_config};

/// Arguments for the event command.
#[derive(Args)]
pub struct EventArgs {
    /// Event payload JSON file, or `-` for stdin
    #[arg(required = true)]
    payload: String,

    #[command(flatten)]
    options: PipelineOptions,
}

pub async fn run(args: EventArgs, config_path: Option<&str>) -> anyhow::Result<ExitCode> {
    let body = if args.payload == "-" {
        let mut buf = Vec::new();
        std::io::stdin().read_to_end(&mut buf)?;
        buf
    } else {
        fs::read(&args.payload).await?
    };

    let event = parse_event_payload(&body)
        .map_err(|e| anyhow::anyhow!("Invalid storage event payload: {}", e))?;

    let config = load_config(config_path)?;
    let production_bucket = config.storage.production_bucket.clone();
    let pipeline = build_pipeline(config, &args.options).await?;

    let response = handle_storage_event(&pipeline, &event, &production_bucket).await;
    println!("{}", serde_json::to_string_pretty(&response)?);

    Ok(if response.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
