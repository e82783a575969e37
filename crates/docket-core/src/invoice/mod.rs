//! Invoice field normalization, line item reconciliation and processors.

mod normalizer;
mod processor;
mod reconcile;
pub mod rules;

pub use normalizer::{InvoiceNormalizer, NormalizedInvoice};
pub use processor::{InvoiceProcessor, ProcessedDocument, RefiningProcessor, StructuredProcessor};
pub use reconcile::{LineItemSource, reconcile, reconcile_with_source};
