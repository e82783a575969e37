//! Subcommands and the configuration loading they share.

pub mod batch;
pub mod config;
pub mod event;
pub mod process;
pub mod query;
pub mod serve;
pub mod storage;

use std::path::{Path, PathBuf};

use clap::Args;
use tracing::debug;

use docket_core::{DocketConfig, DocketError, Pipeline, PipelineBuilder};

/// Flags that shape how the pipeline is wired.
#[derive(Args, Clone, Debug)]
pub struct PipelineOptions {
    /// Refine extracted fields with the LLM
    #[arg(long, conflicts_with = "no_llm")]
    llm: bool,

    /// Skip LLM refinement
    #[arg(long)]
    no_llm: bool,

    /// Archive to a local directory and keep rows in memory
    #[arg(long)]
    dry_run: bool,
}

impl PipelineOptions {
    fn llm_override(&self) -> Option<bool> {
        match (self.llm, self.no_llm) {
            (true, _) => Some(true),
            (_, true) => Some(false),
            _ => None,
        }
    }
}

/// Flags for commands that process local files.
#[derive(Args, Clone, Debug)]
pub struct RunOptions {
    /// Archive as a production invoice
    #[arg(long)]
    production: bool,

    /// Project label stored with the file
    #[arg(long)]
    project: Option<String>,

    #[command(flatten)]
    pipeline: PipelineOptions,
}

pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("docket")
        .join("config.json")
}

/// Read the config file (explicit path, else the default location if it
/// exists, else defaults) and apply environment overrides.
pub fn load_config(config_path: Option<&str>) -> anyhow::Result<DocketConfig> {
    let mut config = match config_path {
        Some(path) => read_config(Path::new(path))?,
        None => {
            let default_path = default_config_path();
            if default_path.exists() {
                read_config(&default_path)?
            } else {
                DocketConfig::default()
            }
        }
    };
    config.apply_env();
    Ok(config)
}

fn read_config(path: &Path) -> Result<DocketConfig, DocketError> {
    debug!("Loading configuration from {}", path.display());
    DocketConfig::from_file(path)
        .map_err(|e| DocketError::Config(format!("cannot read {}: {}", path.display(), e)))
}

pub async fn build_pipeline(
    config: DocketConfig,
    options: &PipelineOptions,
) -> anyhow::Result<Pipeline> {
    let pipeline = PipelineBuilder::new(config)
        .dry_run(options.dry_run)
        .use_llm(options.llm_override())
        .build()
        .await?;
    Ok(pipeline)
}
