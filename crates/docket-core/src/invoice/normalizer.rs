//! Maps raw extraction output onto an [`InvoiceRecord`].

use tracing::debug;

use super::reconcile::{LineItemSource, reconcile_with_source};
use super::rules::{
    derive_due_date, parse_amount, parse_text_line_items, try_parse_amount, try_parse_date,
};
use crate::extraction::{RawEntity, RawExtraction, RawTable};
use crate::models::invoice::{InvoiceRecord, LineItem, is_sentinel, sentinel_date};

const DESCRIPTION: &[&str] = &["line_item/description", "item_description", "description"];
const QUANTITY: &[&str] = &["line_item/quantity", "quantity"];
const UNIT_PRICE: &[&str] = &["line_item/unit_price", "unit_price"];
const AMOUNT: &[&str] = &["line_item/amount", "amount"];

/// Column role of a table header cell.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Column {
    Description,
    Quantity,
    UnitPrice,
    Amount,
    Other,
}

/// A normalized record plus the candidate line item lists it was built from.
#[derive(Debug, Clone)]
pub struct NormalizedInvoice {
    pub record: InvoiceRecord,

    /// Rows from structured sources (line item entities or tables).
    pub table_items: Vec<LineItem>,

    /// Rows recovered from the flat text.
    pub text_items: Vec<LineItem>,

    /// Source of `record.line_items`.
    pub line_item_source: LineItemSource,

    /// The due date was computed from the terms rather than extracted.
    pub due_date_derived: bool,
}

/// Builds typed invoice records from extraction output.
pub struct InvoiceNormalizer {
    /// Entities below this confidence are ignored.
    min_confidence: f32,
}

impl InvoiceNormalizer {
    pub fn new() -> Self {
        Self { min_confidence: 0.0 }
    }

    /// Set the minimum entity confidence.
    pub fn with_min_confidence(mut self, confidence: f32) -> Self {
        self.min_confidence = confidence;
        self
    }

    /// Normalize every field. Never fails; missing values take defaults.
    pub fn normalize(&self, raw: &RawExtraction) -> NormalizedInvoice {
        let mut record = InvoiceRecord::new();

        record.invoice_number = self.text(raw, "invoice_id");
        record.invoice_date = self.date(raw, "invoice_date");
        record.due_date = self.date(raw, "due_date");
        record.total_amount = self.amount(raw, "total_amount");
        record.vendor_name = self.text(raw, "supplier_name");
        record.vendor_address = self.text(raw, "supplier_address");
        record.payment_terms = self.text(raw, "payment_terms");
        record.raw_text = raw.text.clone();

        let due_date_derived = is_sentinel(record.due_date);
        if due_date_derived {
            record.due_date = derive_due_date(record.invoice_date, &record.payment_terms);
        }

        let table_items = self.structured_line_items(raw);
        let text_items = parse_text_line_items(&raw.text);
        let (line_items, source) =
            reconcile_with_source(table_items.clone(), text_items.clone(), None);
        record.line_items = line_items;

        debug!(
            "Normalized invoice {:?}: {} line item(s) from {}",
            record.invoice_number,
            record.line_items.len(),
            source
        );

        NormalizedInvoice {
            record,
            table_items,
            text_items,
            line_item_source: source,
            due_date_derived,
        }
    }

    fn entity<'a>(&self, raw: &'a RawExtraction, kind: &str) -> Option<&'a RawEntity> {
        raw.entities
            .iter()
            .find(|e| e.kind == kind && e.confidence >= self.min_confidence)
    }

    fn text(&self, raw: &RawExtraction, kind: &str) -> String {
        self.entity(raw, kind)
            .map(|e| collapse_whitespace(&e.mention_text))
            .unwrap_or_default()
    }

    /// Mention text first, then the service-normalized value.
    fn date(&self, raw: &RawExtraction, kind: &str) -> chrono::NaiveDate {
        self.entity(raw, kind)
            .and_then(|e| {
                try_parse_date(&e.mention_text)
                    .or_else(|| e.normalized.as_deref().and_then(try_parse_date))
            })
            .unwrap_or_else(sentinel_date)
    }

    fn amount(&self, raw: &RawExtraction, kind: &str) -> f64 {
        self.entity(raw, kind)
            .and_then(|e| {
                try_parse_amount(&e.mention_text)
                    .or_else(|| e.normalized.as_deref().and_then(try_parse_amount))
            })
            .unwrap_or(0.0)
    }

    /// Line item entities if any carry data, otherwise table rows.
    fn structured_line_items(&self, raw: &RawExtraction) -> Vec<LineItem> {
        let from_entities: Vec<LineItem> = raw
            .line_item_entities()
            .filter(|e| e.confidence >= self.min_confidence)
            .map(entity_line_item)
            .filter(LineItem::has_data)
            .collect();

        if !from_entities.is_empty() {
            return from_entities;
        }

        raw.tables.iter().flat_map(table_line_items).collect()
    }
}

impl Default for InvoiceNormalizer {
    fn default() -> Self {
        Self::new()
    }
}

fn entity_line_item(entity: &RawEntity) -> LineItem {
    LineItem::new(
        entity
            .property(DESCRIPTION)
            .map(collapse_whitespace)
            .unwrap_or_default(),
        entity.property(QUANTITY).map(parse_amount).unwrap_or(0.0),
        entity.property(UNIT_PRICE).map(parse_amount).unwrap_or(0.0),
        entity.property(AMOUNT).map(parse_amount).unwrap_or(0.0),
    )
}

/// Map table rows through the last header row. Tables without a
/// recognizable description or amount column are not line item tables.
fn table_line_items(table: &RawTable) -> Vec<LineItem> {
    let Some(header) = table.header_rows.last() else {
        return Vec::new();
    };
    let columns: Vec<Column> = header.iter().map(|cell| classify_header(cell)).collect();

    if !columns
        .iter()
        .any(|c| matches!(c, Column::Description | Column::Amount))
    {
        return Vec::new();
    }

    table
        .body_rows
        .iter()
        .map(|row| {
            let mut item = LineItem::default();
            for (column, cell) in columns.iter().zip(row) {
                match column {
                    Column::Description => item.description = collapse_whitespace(cell),
                    Column::Quantity => item.quantity = parse_amount(cell),
                    Column::UnitPrice => item.unit_price = parse_amount(cell),
                    Column::Amount => item.amount = parse_amount(cell),
                    Column::Other => {}
                }
            }
            item
        })
        .collect()
}

fn classify_header(cell: &str) -> Column {
    let cell = cell.to_lowercase();
    if cell.contains("qty") || cell.contains("quantity") {
        Column::Quantity
    } else if cell.contains("unit") || cell.contains("price") || cell.contains("rate") {
        Column::UnitPrice
    } else if cell.contains("amount") || cell.contains("total") {
        Column::Amount
    } else if cell.contains("desc") || cell.contains("item") || cell.contains("service") {
        Column::Description
    } else {
        Column::Other
    }
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn sample() -> RawExtraction {
        RawExtraction {
            text: "ACME\n1 Consulting 1,200.00 1,200.00\n".into(),
            pages: 1,
            entities: vec![
                RawEntity::new("invoice_id", "INV-1001"),
                RawEntity::new("invoice_date", "01/15/2024"),
                RawEntity::new("total_amount", "$1,200.00"),
                RawEntity::new("supplier_name", "ACME\nCorp"),
                RawEntity::new("supplier_address", "1 Main St"),
                RawEntity::new("payment_terms", "NTO is issued at 30 days"),
            ],
            tables: Vec::new(),
        }
    }

    #[test]
    fn test_normalize_fields() {
        let normalized = InvoiceNormalizer::new().normalize(&sample());
        let record = normalized.record;

        assert_eq!(record.invoice_number, "INV-1001");
        assert_eq!(record.invoice_date, ymd(2024, 1, 15));
        assert_eq!(record.due_date, ymd(2024, 2, 14));
        assert_eq!(record.total_amount, 1200.0);
        assert_eq!(record.vendor_name, "ACME Corp");
        assert_eq!(record.line_items.len(), 1);
        assert_eq!(normalized.line_item_source, LineItemSource::Text);
        assert!(normalized.due_date_derived);
    }

    #[test]
    fn test_explicit_due_date_is_kept() {
        let mut raw = sample();
        raw.entities.push(RawEntity::new("due_date", "2024-03-01"));
        let normalized = InvoiceNormalizer::new().normalize(&raw);
        assert_eq!(normalized.record.due_date, ymd(2024, 3, 1));
        assert!(!normalized.due_date_derived);
    }

    #[test]
    fn test_normalized_value_fallback() {
        let raw = RawExtraction {
            entities: vec![
                RawEntity::new("invoice_date", "January 15, 2024").with_normalized("2024-01-15"),
            ],
            ..Default::default()
        };
        let record = InvoiceNormalizer::new().normalize(&raw).record;
        assert_eq!(record.invoice_date, ymd(2024, 1, 15));
    }

    #[test]
    fn test_empty_extraction_defaults() {
        let normalized = InvoiceNormalizer::new().normalize(&RawExtraction::default());
        assert!(is_sentinel(normalized.record.invoice_date));
        assert!(is_sentinel(normalized.record.due_date));
        assert_eq!(normalized.record.total_amount, 0.0);
        assert!(normalized.record.line_items.is_empty());
        assert_eq!(normalized.line_item_source, LineItemSource::None);
    }

    #[test]
    fn test_line_item_entities_beat_text() {
        let mut raw = sample();
        raw.entities.push(
            RawEntity::new("line_item", "")
                .with_property(RawEntity::new("line_item/description", "Audit"))
                .with_property(RawEntity::new("line_item/quantity", "2"))
                .with_property(RawEntity::new("line_item/unit_price", "$300.00"))
                .with_property(RawEntity::new("line_item/amount", "$600.00")),
        );
        raw.entities.push(
            RawEntity::new("line_item", "")
                .with_property(RawEntity::new("item_description", "Travel"))
                .with_property(RawEntity::new("amount", "50")),
        );

        let normalized = InvoiceNormalizer::new().normalize(&raw);
        assert_eq!(normalized.line_item_source, LineItemSource::Table);
        assert_eq!(
            normalized.record.line_items,
            vec![
                LineItem::new("Audit", 2.0, 300.0, 600.0),
                LineItem::new("Travel", 0.0, 0.0, 50.0),
            ]
        );
    }

    #[test]
    fn test_table_rows() {
        let raw = RawExtraction {
            tables: vec![RawTable {
                header_rows: vec![vec![
                    "Description".into(),
                    "Qty".into(),
                    "Unit Price".into(),
                    "Line Total".into(),
                ]],
                body_rows: vec![
                    vec!["Hosting".into(), "12".into(), "10.00".into(), "120.00".into()],
                    vec!["".into(), "".into(), "".into(), "".into()],
                ],
            }],
            ..Default::default()
        };

        let normalized = InvoiceNormalizer::new().normalize(&raw);
        assert_eq!(
            normalized.record.line_items,
            vec![LineItem::new("Hosting", 12.0, 10.0, 120.0)]
        );
    }

    #[test]
    fn test_min_confidence() {
        let raw = RawExtraction {
            entities: vec![RawEntity {
                confidence: 0.2,
                ..RawEntity::new("invoice_id", "X-1")
            }],
            ..Default::default()
        };
        let record = InvoiceNormalizer::new()
            .with_min_confidence(0.5)
            .normalize(&raw)
            .record;
        assert_eq!(record.invoice_number, "");
    }

    #[test]
    fn test_classify_header() {
        assert_eq!(classify_header("Item Description"), Column::Description);
        assert_eq!(classify_header("QTY"), Column::Quantity);
        assert_eq!(classify_header("Rate"), Column::UnitPrice);
        assert_eq!(classify_header("Amount"), Column::Amount);
        assert_eq!(classify_header("SKU"), Column::Other);
    }
}
