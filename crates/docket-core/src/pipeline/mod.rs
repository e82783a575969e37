//! Pipeline orchestration: register, archive, extract, refine, persist.

mod builder;
mod event;

pub use builder::PipelineBuilder;
pub use event::{EventResponse, EventStatus, StorageEvent, handle_storage_event, parse_event_payload};

use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, instrument};

use crate::error::DocketError;
use crate::invoice::InvoiceProcessor;
use crate::models::invoice::ProcessingResult;
use crate::registry::{FileRegistry, file_metadata, identify, identify_key, normalize_path};
use crate::storage::{ObjectStore, StorageLayout, StorageLocator};
use crate::warehouse::{InvoiceRow, Warehouse};

/// One file to process.
#[derive(Debug, Clone)]
pub struct ProcessRequest {
    /// Local path of the document.
    pub path: PathBuf,

    /// Production invoices are archived in the production bucket.
    pub production: bool,

    /// Optional project label.
    pub project: Option<String>,

    /// Object the local file was downloaded from, for event-triggered runs.
    pub origin: Option<StorageLocator>,
}

impl ProcessRequest {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            production: false,
            project: None,
            origin: None,
        }
    }

    pub fn production(mut self, production: bool) -> Self {
        self.production = production;
        self
    }

    pub fn project(mut self, project: Option<String>) -> Self {
        self.project = project;
        self
    }

    pub fn origin(mut self, origin: StorageLocator) -> Self {
        self.origin = Some(origin);
        self
    }
}

/// Runs one invoice end to end.
pub struct Pipeline {
    registry: FileRegistry,
    store: Arc<dyn ObjectStore>,
    processor: Box<dyn InvoiceProcessor>,
    warehouse: Arc<dyn Warehouse>,
    layout: StorageLayout,
}

impl Pipeline {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        processor: Box<dyn InvoiceProcessor>,
        warehouse: Arc<dyn Warehouse>,
        layout: StorageLayout,
    ) -> Self {
        Self {
            registry: FileRegistry::new(warehouse.clone()),
            store,
            processor,
            warehouse,
            layout,
        }
    }

    /// Replace the registry, e.g. to enable metadata refresh.
    pub fn with_registry(mut self, registry: FileRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Name of the configured processor.
    pub fn processor_name(&self) -> &'static str {
        self.processor.name()
    }

    /// The object store, shared with the event handler.
    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    /// Process one file. Failures are reported in the result, never panics.
    #[instrument(skip(self, request), fields(file = %request.path.display()))]
    pub async fn process(&self, request: ProcessRequest) -> ProcessingResult {
        let normalized = normalize_path(&request.path);
        let file_id = match &request.origin {
            Some(origin) => identify_key(&origin.to_string()),
            None => identify(&request.path),
        };
        let locator = self.layout.locate(
            &file_id,
            &normalized,
            request.production,
            request.origin.as_ref(),
        );

        let metadata = file_metadata(&request.path, locator.to_string()).await;
        let original_filename = match &request.origin {
            Some(origin) => origin.file_name().to_string(),
            None => metadata.original_filename.clone(),
        };
        let file_id = self
            .registry
            .register(
                file_id,
                metadata,
                request.production,
                request.project.as_deref(),
            )
            .await;

        match self
            .run(&request, &file_id.to_string(), &locator, original_filename)
            .await
        {
            Ok(result) => result,
            Err(e) => {
                error!("Processing failed for {}: {}", request.path.display(), e);
                ProcessingResult::failed(Some(file_id.into_string()), Some(locator.to_string()), e)
            }
        }
    }

    async fn run(
        &self,
        request: &ProcessRequest,
        file_id: &str,
        locator: &StorageLocator,
        original_filename: String,
    ) -> Result<ProcessingResult, DocketError> {
        if request.origin.as_ref() == Some(locator) {
            info!("Source object {} is already archived", locator);
        } else {
            self.store.upload(&request.path, locator).await?;
        }

        let processed = self.processor.process_document(&request.path).await?;

        let mut record = processed.record;
        record.invoice_id = file_id.to_string();
        record.storage_locator = locator.to_string();
        record.is_production = request.production;
        record.original_filename = original_filename;
        record.project_name = request.project.clone();
        record.processing_timestamp = Some(Utc::now());

        let row = InvoiceRow::from_record(&record, processed.raw.to_json());
        self.warehouse.insert_invoice(&row).await?;

        info!(
            "Processed {} as {} ({} line items from {}, total {:.2})",
            record.original_filename,
            record.invoice_id,
            record.line_items.len(),
            processed.line_item_source,
            record.total_amount
        );
        Ok(ProcessingResult::succeeded(record))
    }
}

/// Whether `path` looks like a document the extraction service accepts.
pub fn is_supported(path: &Path) -> bool {
    crate::extraction::mime_type_for(path).is_some()
}
