//! Batch processing command for multiple invoice files.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;

use clap::Args;
use console::style;
use glob::glob;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, warn};

use docket_core::pipeline::is_supported;
use docket_core::{ProcessRequest, ProcessingResult};

use super::{RunOptions, build_pipeline, load_config};

/// Arguments for the batch command.
#[derive(Args)]
pub struct BatchArgs {
    /// Glob pattern matching input files
    #[arg(required = true)]
    input: String,

    #[command(flatten)]
    options: RunOptions,

    /// Write each result as JSON into this directory
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Write a summary CSV to this path
    #[arg(long)]
    summary: Option<PathBuf>,

    /// Continue on error
    #[arg(long)]
    continue_on_error: bool,
}

/// Outcome for one file.
struct BatchEntry {
    path: PathBuf,
    result: ProcessingResult,
}

pub async fn run(args: BatchArgs, config_path: Option<&str>) -> anyhow::Result<ExitCode> {
    let start = Instant::now();

    let files: Vec<PathBuf> = glob(&args.input)?
        .filter_map(|r| r.ok())
        .filter(|p| p.is_file() && is_supported(p))
        .collect();

    if files.is_empty() {
        anyhow::bail!("No matching files found for pattern: {}", args.input);
    }

    let config = load_config(config_path)?;
    let pipeline = build_pipeline(config, &args.options.pipeline).await?;

    println!(
        "{} Found {} files to process",
        style("ℹ").blue(),
        files.len()
    );

    if let Some(ref output_dir) = args.output_dir {
        fs::create_dir_all(output_dir)?;
    }

    let pb = ProgressBar::new(files.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} files")?
            .progress_chars("=>-"),
    );

    let mut entries = Vec::with_capacity(files.len());
    for path in files {
        let request = ProcessRequest::new(&path)
            .production(args.options.production)
            .project(args.options.project.clone());
        let result = pipeline.process(request).await;
        pb.inc(1);

        if let Some(output_dir) = &args.output_dir {
            let output_path = output_dir.join(output_name(&path, &result));
            fs::write(&output_path, serde_json::to_string_pretty(&result)?)?;
            debug!("Wrote output to {}", output_path.display());
        }

        let failed = !result.success;
        if failed {
            warn!(
                "Failed to process {}: {}",
                path.display(),
                result.error.as_deref().unwrap_or("unknown error")
            );
        }
        entries.push(BatchEntry { path, result });

        if failed && !args.continue_on_error {
            pb.abandon_with_message("Stopped");
            eprintln!(
                "{} Stopping after first failure (use --continue-on-error to keep going)",
                style("✗").red()
            );
            break;
        }
    }

    if !pb.is_finished() {
        pb.finish_with_message("Complete");
    }

    if let Some(summary_path) = &args.summary {
        write_summary(summary_path, &entries)?;
        println!(
            "{} Summary written to {}",
            style("✓").green(),
            summary_path.display()
        );
    }

    let failed: Vec<_> = entries.iter().filter(|e| !e.result.success).collect();
    let successful = entries.len() - failed.len();

    println!();
    println!(
        "{} Processed {} files in {:?}",
        style("✓").green(),
        entries.len(),
        start.elapsed()
    );
    println!(
        "   {} successful, {} failed",
        style(successful).green(),
        style(failed.len()).red()
    );

    if failed.is_empty() {
        return Ok(ExitCode::SUCCESS);
    }

    println!();
    println!("{}", style("Failed files:").red());
    for entry in &failed {
        println!(
            "  - {}: {}",
            entry.path.display(),
            entry.result.error.as_deref().unwrap_or("unknown error")
        );
    }

    Ok(ExitCode::FAILURE)
}

/// `<file name>.<file id>.json`, so equal names from different folders or
/// with different extensions get separate outputs.
fn output_name(path: &Path, result: &ProcessingResult) -> String {
    let file_name = path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("invoice");
    match &result.file_id {
        Some(file_id) => format!("{}.{}.json", file_name, file_id),
        None => format!("{}.json", file_name),
    }
}

fn write_summary(path: &Path, entries: &[BatchEntry]) -> anyhow::Result<()> {
    let mut wtr = csv::Writer::from_path(path)?;

    wtr.write_record([
        "file",
        "success",
        "file_id",
        "invoice_number",
        "invoice_date",
        "total_amount",
        "line_items",
        "error",
    ])?;

    for entry in entries {
        let file = entry.path.display().to_string();
        let result = &entry.result;
        let file_id = result.file_id.clone().unwrap_or_default();
        let error = result.error.clone().unwrap_or_default();

        match &result.record {
            Some(record) => wtr.write_record([
                file.as_str(),
                "true",
                &file_id,
                &record.invoice_number,
                &record.invoice_date.to_string(),
                &format!("{:.2}", record.total_amount),
                &record.line_items.len().to_string(),
                &error,
            ])?,
            None => wtr.write_record([
                file.as_str(),
                "false",
                &file_id,
                "",
                "",
                "",
                "",
                &error,
            ])?,
        }
    }

    wtr.flush()?;
    Ok(())
}
