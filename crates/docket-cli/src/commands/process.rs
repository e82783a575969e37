//! Process command - run the pipeline on a single invoice file.

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::{Duration, Instant};

use clap::Args;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};

use docket_core::models::invoice::is_sentinel;
use docket_core::{ProcessRequest, ProcessingResult};

use super::{RunOptions, build_pipeline, load_config};

/// Arguments for the process command.
#[derive(Args)]
pub struct ProcessArgs {
    /// Input file (PDF or image)
    #[arg(required = true)]
    input: PathBuf,

    #[command(flatten)]
    options: RunOptions,

    /// Output file (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "json")]
    format: OutputFormat,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    /// JSON output
    Json,
    /// Plain text summary
    Text,
}

pub async fn run(args: ProcessArgs, config_path: Option<&str>) -> anyhow::Result<ExitCode> {
    let start = Instant::now();

    let config = load_config(config_path)?;
    let pipeline = build_pipeline(config, &args.options.pipeline).await?;

    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {msg}")?,
    );
    pb.enable_steady_tick(Duration::from_millis(100));
    pb.set_message(format!("Processing {}", args.input.display()));

    let request = ProcessRequest::new(&args.input)
        .production(args.options.production)
        .project(args.options.project.clone());
    let result = pipeline.process(request).await;

    pb.finish_and_clear();

    let output = match args.format {
        OutputFormat::Json => serde_json::to_string_pretty(&result)?,
        OutputFormat::Text => format_result_text(&result),
    };

    if let Some(output_path) = &args.output {
        fs::write(output_path, &output)?;
        eprintln!(
            "{} Output written to {}",
            style("✓").green(),
            output_path.display()
        );
    } else {
        println!("{}", output);
    }

    if result.success {
        eprintln!(
            "{} Processed in {:?}",
            style("✓").green(),
            start.elapsed()
        );
        Ok(ExitCode::SUCCESS)
    } else {
        eprintln!(
            "{} Processing failed: {}",
            style("✗").red(),
            result.error.as_deref().unwrap_or("unknown error")
        );
        Ok(ExitCode::FAILURE)
    }
}

pub fn format_result_text(result: &ProcessingResult) -> String {
    let mut output = String::new();

    let Some(record) = &result.record else {
        output.push_str(&format!(
            "Failed: {}\n",
            result.error.as_deref().unwrap_or("unknown error")
        ));
        if let Some(file_id) = &result.file_id {
            output.push_str(&format!("File ID: {}\n", file_id));
        }
        return output;
    };

    let date = |d| {
        if is_sentinel(d) {
            "unknown".to_string()
        } else {
            d.to_string()
        }
    };

    output.push_str(&format!("Invoice: {}\n", record.invoice_number));
    output.push_str(&format!("File ID: {}\n", record.invoice_id));
    output.push_str(&format!("Date: {}\n", date(record.invoice_date)));
    output.push_str(&format!("Due: {}\n", date(record.due_date)));
    output.push('\n');

    output.push_str("Vendor:\n");
    output.push_str(&format!("  {}\n", record.vendor_name));
    if !record.vendor_address.is_empty() {
        output.push_str(&format!("  {}\n", record.vendor_address));
    }
    output.push('\n');

    output.push_str(&format!("Line items ({}):\n", record.line_items.len()));
    for item in &record.line_items {
        output.push_str(&format!(
            "  - {} ({} x {:.2}) = {:.2}\n",
            item.description, item.quantity, item.unit_price, item.amount
        ));
    }
    output.push('\n');

    output.push_str(&format!("Total: {:.2}\n", record.total_amount));
    if !record.payment_terms.is_empty() {
        output.push_str(&format!("Terms: {}\n", record.payment_terms));
    }
    output.push_str(&format!("Archived: {}\n", record.storage_locator));

    let missing = record.missing_fields();
    if !missing.is_empty() {
        output.push_str(&format!("Missing: {}\n", missing.join(", ")));
    }

    output
}
