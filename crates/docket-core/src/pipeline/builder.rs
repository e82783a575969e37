use std::sync::Arc;
use tracing::{debug, info};

use super::Pipeline;
use crate::auth::TokenSource;
use crate::error::Result;
use crate::extraction::{DocumentAiExtractor, DocumentExtractor};
use crate::invoice::{InvoiceProcessor, RefiningProcessor, StructuredProcessor};
use crate::models::config::DocketConfig;
use crate::refine::{GeminiClient, Refiner};
use crate::registry::FileRegistry;
use crate::storage::{GcsStore, LocalStore, ObjectStore, StorageLayout};
use crate::warehouse::{MemoryWarehouse, Warehouse};

/// Wires collaborators from configuration.
pub struct PipelineBuilder {
    config: DocketConfig,
    dry_run: bool,
    extractor: Option<Arc<dyn DocumentExtractor>>,
    warehouse: Option<Arc<dyn Warehouse>>,
}

impl PipelineBuilder {
    pub fn new(config: DocketConfig) -> Self {
        Self {
            config,
            dry_run: false,
            extractor: None,
            warehouse: None,
        }
    }

    /// Archive to a local directory and keep rows in memory.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Force LLM refinement on or off, overriding configuration.
    pub fn use_llm(mut self, enabled: Option<bool>) -> Self {
        if let Some(enabled) = enabled {
            self.config.llm.enabled = enabled;
        }
        self
    }

    /// Use a specific extractor instead of the Document AI client.
    pub fn with_extractor(mut self, extractor: Arc<dyn DocumentExtractor>) -> Self {
        self.extractor = Some(extractor);
        self
    }

    /// Use a specific warehouse instead of the configured one.
    pub fn with_warehouse(mut self, warehouse: Arc<dyn Warehouse>) -> Self {
        self.warehouse = Some(warehouse);
        self
    }

    pub fn config(&self) -> &DocketConfig {
        &self.config
    }

    /// Validate configuration and build the pipeline.
    pub async fn build(self) -> Result<Pipeline> {
        let config = &self.config;
        if self.extractor.is_none() {
            config.validate(self.dry_run)?;
        }

        let tokens = TokenSource::from_config(&config.gcp);

        let extractor: Arc<dyn DocumentExtractor> = match self.extractor {
            Some(extractor) => extractor,
            None => Arc::new(DocumentAiExtractor::new(
                &config.gcp,
                &config.extraction,
                tokens.clone(),
            )?),
        };

        let processor: Box<dyn InvoiceProcessor> = if config.llm.enabled {
            let client = GeminiClient::new(&config.llm)?;
            Box::new(RefiningProcessor::new(
                extractor,
                Refiner::new(Arc::new(client)),
            ))
        } else {
            Box::new(StructuredProcessor::new(extractor))
        };

        let store: Arc<dyn ObjectStore> = if self.dry_run {
            debug!("Archiving to {}", config.storage.local_root.display());
            Arc::new(LocalStore::new(&config.storage.local_root))
        } else {
            Arc::new(GcsStore::new(&config.storage, tokens)?)
        };

        let warehouse: Arc<dyn Warehouse> = match self.warehouse {
            Some(warehouse) => warehouse,
            None if self.dry_run => Arc::new(MemoryWarehouse::new()),
            None => connect_warehouse(config).await?,
        };

        if config.warehouse.ensure_tables && !self.dry_run {
            warehouse.ensure_tables().await?;
        }

        let registry = FileRegistry::new(warehouse.clone())
            .with_refresh_metadata(config.registry.refresh_metadata);

        let pipeline = Pipeline::new(
            store,
            processor,
            warehouse,
            StorageLayout::new(&config.storage),
        )
        .with_registry(registry);

        info!(
            "Pipeline ready (processor: {}, dry run: {})",
            pipeline.processor_name(),
            self.dry_run
        );
        Ok(pipeline)
    }
}

#[cfg(feature = "bigquery")]
async fn connect_warehouse(config: &DocketConfig) -> Result<Arc<dyn Warehouse>> {
    let warehouse =
        crate::warehouse::BigQueryWarehouse::connect(&config.gcp, &config.warehouse).await?;
    Ok(Arc::new(warehouse))
}

#[cfg(not(feature = "bigquery"))]
async fn connect_warehouse(_config: &DocketConfig) -> Result<Arc<dyn Warehouse>> {
    Err(crate::error::DocketError::Config(
        "built without BigQuery support; use --dry-run".to_string(),
    ))
}
