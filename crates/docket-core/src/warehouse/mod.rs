//! Analytical warehouse for invoice rows and the file registry.

#[cfg(feature = "bigquery")]
mod bigquery;
mod memory;

#[cfg(feature = "bigquery")]
pub use bigquery::BigQueryWarehouse;
pub use memory::MemoryWarehouse;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

use crate::error::WarehouseError;
use crate::models::invoice::{InvoiceRecord, LineItem};
use crate::models::registry::{FileId, FileMetadata, FileRegistryEntry};

/// Result type for warehouse operations.
pub type Result<T> = std::result::Result<T, WarehouseError>;

/// Persistence for invoices and the file registry.
#[async_trait]
pub trait Warehouse: Send + Sync {
    /// Create the dataset and tables if they are missing.
    async fn ensure_tables(&self) -> Result<()>;

    /// Append one invoice row.
    async fn insert_invoice(&self, row: &InvoiceRow) -> Result<()>;

    /// Look up a registry entry.
    async fn find_file(&self, file_id: &FileId) -> Result<Option<FileRegistryEntry>>;

    /// Insert a new registry entry.
    async fn insert_file(&self, entry: &FileRegistryEntry) -> Result<()>;

    /// Increment the processing count and set the last processing time.
    /// When `metadata` is given, size, type and storage path are replaced too.
    async fn record_processing(
        &self,
        file_id: &FileId,
        at: DateTime<Utc>,
        metadata: Option<&FileMetadata>,
    ) -> Result<()>;
}

/// One row of the invoice table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InvoiceRow {
    pub invoice_id: String,
    pub invoice_number: String,
    pub invoice_date: NaiveDate,
    pub due_date: NaiveDate,
    pub total_amount: f64,
    pub vendor_name: String,
    pub vendor_address: String,
    pub storage_path: String,
    pub is_production: bool,
    pub original_filename: String,
    pub project_name: Option<String>,
    pub line_items: Vec<LineItem>,
    pub payment_terms: String,
    pub notes: String,
    pub processing_timestamp: DateTime<Utc>,

    /// Serialized extraction payload.
    pub raw_data: String,
}

impl InvoiceRow {
    /// Build a row from a stamped record. An unstamped record gets the
    /// current time.
    pub fn from_record(record: &InvoiceRecord, raw_data: String) -> Self {
        Self {
            invoice_id: record.invoice_id.clone(),
            invoice_number: record.invoice_number.clone(),
            invoice_date: record.invoice_date,
            due_date: record.due_date,
            total_amount: record.total_amount,
            vendor_name: record.vendor_name.clone(),
            vendor_address: record.vendor_address.clone(),
            storage_path: record.storage_locator.clone(),
            is_production: record.is_production,
            original_filename: record.original_filename.clone(),
            project_name: record.project_name.clone(),
            line_items: record.line_items.clone(),
            payment_terms: record.payment_terms.clone(),
            notes: record.notes.clone(),
            processing_timestamp: record.processing_timestamp.unwrap_or_else(Utc::now),
            raw_data,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_row_shape() {
        let mut record = InvoiceRecord::new();
        record.invoice_id = "id-1".into();
        record.storage_locator = "gs://prod/a.pdf".into();
        record.line_items = vec![LineItem::new("Widget", 1.0, 2.0, 2.0)];
        record.processing_timestamp = DateTime::parse_from_rfc3339("2024-01-15T10:00:00Z")
            .ok()
            .map(|t| t.with_timezone(&Utc));

        let row = InvoiceRow::from_record(&record, "{}".into());
        let json = serde_json::to_value(&row).unwrap();

        assert_eq!(json["storage_path"], "gs://prod/a.pdf");
        assert_eq!(json["invoice_date"], "1900-01-01");
        assert_eq!(json["processing_timestamp"], "2024-01-15T10:00:00Z");
        assert_eq!(json["line_items"][0]["description"], "Widget");
        assert_eq!(json["project_name"], serde_json::Value::Null);
        assert_eq!(json["raw_data"], "{}");
    }
}
