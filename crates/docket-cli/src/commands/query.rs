//! Query command - run SQL against the invoice warehouse.

use std::process::ExitCode;

use clap::Args;
use serde_json::Value;

use super::load_config;

/// Arguments for the query command.
#[derive(Args)]
pub struct QueryArgs {
    /// SQL to run; `{invoices}` and `{registry}` expand to the configured tables
    #[arg(required = true)]
    sql: String,

    /// Output format
    #[arg(short, long, value_enum, default_value = "json")]
    format: QueryFormat,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub enum QueryFormat {
    /// JSON array of rows
    Json,
    /// CSV with a header row
    Csv,
}

#[cfg(feature = "bigquery")]
pub async fn run(args: QueryArgs, config_path: Option<&str>) -> anyhow::Result<ExitCode> {
    use docket_core::DocketError;
    use docket_core::warehouse::BigQueryWarehouse;

    let config = load_config(config_path)?;
    if config.gcp.project_id.is_empty() {
        return Err(DocketError::Config("missing settings: gcp.project_id (GCP_PROJECT_ID)".into()).into());
    }

    let warehouse = BigQueryWarehouse::connect(&config.gcp, &config.warehouse)
        .await
        .map_err(DocketError::from)?;
    let rows = warehouse.query(&args.sql).await.map_err(DocketError::from)?;

    let output = match args.format {
        QueryFormat::Json => serde_json::to_string_pretty(&rows)?,
        QueryFormat::Csv => rows_to_csv(&rows)?,
    };
    println!("{}", output);
    Ok(ExitCode::SUCCESS)
}

#[cfg(not(feature = "bigquery"))]
pub async fn run(_args: QueryArgs, _config_path: Option<&str>) -> anyhow::Result<ExitCode> {
    Err(docket_core::DocketError::Config("built without BigQuery support".into()).into())
}

fn rows_to_csv(rows: &[Value]) -> anyhow::Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);

    let columns: Vec<String> = rows
        .first()
        .and_then(Value::as_object)
        .map(|row| row.keys().cloned().collect())
        .unwrap_or_default();
    if columns.is_empty() {
        return Ok(String::new());
    }
    wtr.write_record(&columns)?;

    for row in rows {
        let record: Vec<String> = columns
            .iter()
            .map(|name| match row.get(name) {
                None | Some(Value::Null) => String::new(),
                Some(Value::String(s)) => s.clone(),
                Some(other) => other.to_string(),
            })
            .collect();
        wtr.write_record(&record)?;
    }

    Ok(String::from_utf8(wtr.into_inner()?)?)
}
