//! Core library for invoice ingestion.
//!
//! This crate provides:
//! - Field normalization for extracted invoice values (dates, amounts, terms)
//! - Line item reconciliation across LLM, table and flat-text sources
//! - An idempotent file registry keyed by normalized path
//! - The processing pipeline: archive, extract, refine, persist
//! - Storage-trigger event handling

pub mod auth;
pub mod error;
pub mod extraction;
pub mod invoice;
pub mod models;
pub mod pipeline;
pub mod refine;
pub mod registry;
pub mod storage;
pub mod warehouse;

pub use error::{DocketError, Result};
pub use extraction::{DocumentExtractor, RawEntity, RawExtraction, RawTable};
pub use invoice::{InvoiceNormalizer, InvoiceProcessor, RefiningProcessor, StructuredProcessor};
pub use models::config::DocketConfig;
pub use models::invoice::{InvoiceRecord, LineItem, ProcessingResult};
pub use models::registry::{FileId, FileRegistryEntry};
pub use pipeline::{
    EventResponse, Pipeline, PipelineBuilder, ProcessRequest, StorageEvent, handle_storage_event,
};
pub use refine::LlmClient;
pub use registry::{FileRegistry, identify};
pub use storage::{ObjectStore, StorageLocator};
pub use warehouse::{MemoryWarehouse, Warehouse};
