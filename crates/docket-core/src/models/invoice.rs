//! Invoice record and line-item models.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Placeholder date for values that are unknown or unparseable.
pub fn sentinel_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(1900, 1, 1).expect("1900-01-01 is a valid date")
}

/// Returns true when `date` is the unknown-date placeholder.
pub fn is_sentinel(date: NaiveDate) -> bool {
    date == sentinel_date()
}

/// The canonical output unit of the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceRecord {
    /// Identifier shared with the file registry entry.
    pub invoice_id: String,

    /// Invoice number as printed on the document (may be empty).
    pub invoice_number: String,

    /// Invoice date, or the sentinel.
    pub invoice_date: NaiveDate,

    /// Payment due date, or the sentinel.
    pub due_date: NaiveDate,

    /// Invoice total.
    pub total_amount: f64,

    pub vendor_name: String,

    pub vendor_address: String,

    /// Line items in document order.
    pub line_items: Vec<LineItem>,

    pub payment_terms: String,

    pub notes: String,

    /// Full text returned by the extraction service.
    pub raw_text: String,

    /// URI of the archived source file.
    pub storage_locator: String,

    pub is_production: bool,

    pub original_filename: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_name: Option<String>,

    /// Set when the record is stamped, just before persisting.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processing_timestamp: Option<DateTime<Utc>>,

    /// Name of the processor that produced the record.
    pub processor: String,

    /// Whether an LLM refinement was applied.
    pub refined: bool,
}

impl InvoiceRecord {
    /// Create an empty record with all fields at their defaults.
    pub fn new() -> Self {
        Self {
            invoice_id: String::new(),
            invoice_number: String::new(),
            invoice_date: sentinel_date(),
            due_date: sentinel_date(),
            total_amount: 0.0,
            vendor_name: String::new(),
            vendor_address: String::new(),
            line_items: Vec::new(),
            payment_terms: String::new(),
            notes: String::new(),
            raw_text: String::new(),
            storage_locator: String::new(),
            is_production: false,
            original_filename: String::new(),
            project_name: None,
            processing_timestamp: None,
            processor: String::new(),
            refined: false,
        }
    }

    /// Sum of line amounts.
    pub fn line_total(&self) -> f64 {
        self.line_items.iter().map(|i| i.amount).sum()
    }

    /// Describe fields that could not be extracted.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.invoice_number.is_empty() {
            missing.push("invoice_number");
        }
        if is_sentinel(self.invoice_date) {
            missing.push("invoice_date");
        }
        if is_sentinel(self.due_date) {
            missing.push("due_date");
        }
        if self.total_amount == 0.0 {
            missing.push("total_amount");
        }
        if self.vendor_name.is_empty() {
            missing.push("vendor_name");
        }
        if self.line_items.is_empty() {
            missing.push("line_items");
        }
        missing
    }
}

impl Default for InvoiceRecord {
    fn default() -> Self {
        Self::new()
    }
}

/// A single line item on the invoice.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub quantity: f64,

    #[serde(default)]
    pub unit_price: f64,

    /// Total for this line.
    #[serde(default)]
    pub amount: f64,
}

impl LineItem {
    pub fn new(description: impl Into<String>, quantity: f64, unit_price: f64, amount: f64) -> Self {
        Self {
            description: description.into(),
            quantity,
            unit_price,
            amount,
        }
    }

    /// A row carries data when any field is non-empty or positive.
    pub fn has_data(&self) -> bool {
        !self.description.trim().is_empty()
            || self.quantity > 0.0
            || self.unit_price > 0.0
            || self.amount > 0.0
    }
}

/// Drop all-zero, empty rows.
pub fn retain_meaningful(items: Vec<LineItem>) -> Vec<LineItem> {
    items.into_iter().filter(LineItem::has_data).collect()
}

/// Outcome of one pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingResult {
    pub success: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_locator: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub record: Option<InvoiceRecord>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ProcessingResult {
    pub fn succeeded(record: InvoiceRecord) -> Self {
        Self {
            success: true,
            file_id: Some(record.invoice_id.clone()),
            storage_locator: Some(record.storage_locator.clone()),
            record: Some(record),
            error: None,
        }
    }

    pub fn failed(
        file_id: Option<String>,
        storage_locator: Option<String>,
        error: impl ToString,
    ) -> Self {
        Self {
            success: false,
            file_id,
            storage_locator,
            record: None,
            error: Some(error.to_string()),
        }
    }
}
