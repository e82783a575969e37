//! Document processors: extraction plus normalization, with optional refinement.

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use super::normalizer::InvoiceNormalizer;
use super::reconcile::LineItemSource;
use crate::error::ExtractionError;
use crate::extraction::{DocumentExtractor, RawExtraction};
use crate::models::invoice::InvoiceRecord;
use crate::refine::Refiner;

/// Output of a processor run.
#[derive(Debug, Clone)]
pub struct ProcessedDocument {
    /// The normalized (and possibly refined) record, not yet stamped.
    pub record: InvoiceRecord,

    /// The unmodified extraction output, kept for auditing.
    pub raw: RawExtraction,

    /// Where the record's line items came from.
    pub line_item_source: LineItemSource,
}

/// Turns a local document into an invoice record.
#[async_trait]
pub trait InvoiceProcessor: Send + Sync {
    /// Short name recorded on each record.
    fn name(&self) -> &'static str;

    /// Process the document. Only extraction failures are errors.
    async fn process_document(&self, path: &Path) -> Result<ProcessedDocument, ExtractionError>;
}

/// Extraction followed by rule-based normalization.
pub struct StructuredProcessor {
    extractor: Arc<dyn DocumentExtractor>,
    normalizer: InvoiceNormalizer,
}

impl StructuredProcessor {
    pub fn new(extractor: Arc<dyn DocumentExtractor>) -> Self {
        Self {
            extractor,
            normalizer: InvoiceNormalizer::new(),
        }
    }

    pub fn with_normalizer(mut self, normalizer: InvoiceNormalizer) -> Self {
        self.normalizer = normalizer;
        self
    }
}

#[async_trait]
impl InvoiceProcessor for StructuredProcessor {
    fn name(&self) -> &'static str {
        "structured"
    }

    async fn process_document(&self, path: &Path) -> Result<ProcessedDocument, ExtractionError> {
        let raw = self.extractor.extract(path).await?;
        let normalized = self.normalizer.normalize(&raw);

        let mut record = normalized.record;
        record.processor = self.name().to_string();

        Ok(ProcessedDocument {
            record,
            raw,
            line_item_source: normalized.line_item_source,
        })
    }
}

/// Structured processing followed by LLM refinement.
///
/// A failed refinement is logged and the unrefined record is returned.
pub struct RefiningProcessor {
    extractor: Arc<dyn DocumentExtractor>,
    normalizer: InvoiceNormalizer,
    refiner: Refiner,
}

impl RefiningProcessor {
    pub fn new(extractor: Arc<dyn DocumentExtractor>, refiner: Refiner) -> Self {
        Self {
            extractor,
            normalizer: InvoiceNormalizer::new(),
            refiner,
        }
    }
}

#[async_trait]
impl InvoiceProcessor for RefiningProcessor {
    fn name(&self) -> &'static str {
        "refined"
    }

    async fn process_document(&self, path: &Path) -> Result<ProcessedDocument, ExtractionError> {
        let raw = self.extractor.extract(path).await?;
        let normalized = self.normalizer.normalize(&raw);

        let refined = self.refiner.refine(&raw, &normalized).await;
        let (mut record, line_item_source) = match refined {
            Ok(fields) => {
                let (record, source) = fields.apply(normalized);
                info!("Refined invoice {:?}, line items from {}", record.invoice_number, source);
                (record, source)
            }
            Err(e) => {
                warn!("Refinement failed, keeping extracted fields: {}", e);
                (normalized.record, normalized.line_item_source)
            }
        };
        record.processor = self.name().to_string();

        Ok(ProcessedDocument {
            record,
            raw,
            line_item_source,
        })
    }
}
