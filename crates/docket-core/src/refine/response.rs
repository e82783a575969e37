use chrono::NaiveDate;
use serde_json::{Map, Value};

use crate::error::RefineError;
use crate::invoice::rules::patterns::CODE_FENCE;
use crate::invoice::rules::{amount_from_json, derive_due_date, try_parse_date};
use crate::invoice::{LineItemSource, NormalizedInvoice, reconcile_with_source};
use crate::models::invoice::{InvoiceRecord, LineItem, is_sentinel};

const EXPECTED_KEYS: &[&str] = &[
    "invoice_number",
    "invoice_date",
    "due_date",
    "total_amount",
    "vendor_name",
    "vendor_address",
    "vendor",
    "line_items",
    "payment_terms",
    "notes",
];

/// Field values recovered from a model answer.
///
/// `None` means the model gave no usable value and the extracted one stays.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RefinedFields {
    pub invoice_number: Option<String>,
    pub invoice_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    pub total_amount: Option<f64>,
    pub vendor_name: Option<String>,
    pub vendor_address: Option<String>,
    pub payment_terms: Option<String>,
    pub notes: Option<String>,
    pub line_items: Option<Vec<LineItem>>,
}

/// Parse a model answer.
///
/// Accepts a JSON object (optionally inside a Markdown code fence) or a
/// bare JSON array, which is read as line items only.
pub fn parse_response(answer: &str) -> Result<RefinedFields, RefineError> {
    let body = match CODE_FENCE.captures(answer) {
        Some(caps) => caps.get(1).map_or("", |m| m.as_str()),
        None => answer.trim(),
    };
    if body.is_empty() {
        return Err(RefineError::Empty);
    }

    let value: Value =
        serde_json::from_str(body).map_err(|e| RefineError::InvalidJson(e.to_string()))?;

    match value {
        Value::Array(items) => Ok(RefinedFields {
            line_items: Some(line_items(&items)),
            ..Default::default()
        }),
        Value::Object(map) => {
            if !EXPECTED_KEYS.iter().any(|k| map.contains_key(*k)) {
                return Err(RefineError::MissingFields);
            }
            Ok(fields(&map))
        }
        other => Err(RefineError::InvalidJson(format!(
            "expected an object or array, got {other}"
        ))),
    }
}

fn fields(map: &Map<String, Value>) -> RefinedFields {
    let vendor = map.get("vendor").and_then(Value::as_object);

    RefinedFields {
        invoice_number: text(map.get("invoice_number")),
        invoice_date: date(map.get("invoice_date")),
        due_date: date(map.get("due_date")),
        total_amount: map
            .get("total_amount")
            .and_then(amount_from_json)
            .filter(|v| *v > 0.0),
        vendor_name: text(map.get("vendor_name")).or_else(|| text(vendor?.get("name"))),
        vendor_address: text(map.get("vendor_address"))
            .or_else(|| text(vendor?.get("address"))),
        payment_terms: text(map.get("payment_terms")),
        notes: text(map.get("notes")),
        line_items: map
            .get("line_items")
            .and_then(Value::as_array)
            .map(|items| line_items(items)),
    }
}

fn text(value: Option<&Value>) -> Option<String> {
    let s = match value? {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    (!s.is_empty()).then_some(s)
}

fn date(value: Option<&Value>) -> Option<NaiveDate> {
    value?
        .as_str()
        .and_then(try_parse_date)
        .filter(|d| !is_sentinel(*d))
}

fn line_items(values: &[Value]) -> Vec<LineItem> {
    values
        .iter()
        .filter_map(Value::as_object)
        .map(|item| LineItem {
            description: text(item.get("description")).unwrap_or_default(),
            quantity: item.get("quantity").and_then(amount_from_json).unwrap_or(0.0),
            unit_price: item
                .get("unit_price")
                .and_then(amount_from_json)
                .unwrap_or(0.0),
            amount: item.get("amount").and_then(amount_from_json).unwrap_or(0.0),
        })
        .collect()
}

impl RefinedFields {
    /// Merge into a normalized invoice and re-run line item reconciliation.
    ///
    /// Returns the merged record and the source of its line items.
    pub fn apply(self, normalized: NormalizedInvoice) -> (InvoiceRecord, LineItemSource) {
        let NormalizedInvoice {
            mut record,
            table_items,
            text_items,
            due_date_derived,
            ..
        } = normalized;

        if let Some(v) = self.invoice_number {
            record.invoice_number = v;
        }
        if let Some(v) = self.invoice_date {
            record.invoice_date = v;
        }
        if let Some(v) = self.total_amount {
            record.total_amount = v;
        }
        if let Some(v) = self.vendor_name {
            record.vendor_name = v;
        }
        if let Some(v) = self.vendor_address {
            record.vendor_address = v;
        }
        if let Some(v) = self.payment_terms {
            record.payment_terms = v;
        }
        if let Some(v) = self.notes {
            record.notes = v;
        }

        // A derived due date follows the refined invoice date and terms.
        match self.due_date {
            Some(v) => record.due_date = v,
            None if due_date_derived || is_sentinel(record.due_date) => {
                record.due_date = derive_due_date(record.invoice_date, &record.payment_terms);
            }
            None => {}
        }

        let (items, source) = reconcile_with_source(table_items, text_items, self.line_items);
        record.line_items = items;
        record.refined = true;
        (record, source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extraction::{RawEntity, RawExtraction};
    use crate::invoice::InvoiceNormalizer;
    use pretty_assertions::assert_eq;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_parse_fenced_object() {
        let answer = "```json\n{\"invoice_number\": \"INV-1\", \"invoice_date\": \"2024-01-15\", \
                      \"total_amount\": \"$1,200.00\", \"line_items\": []}\n```";
        let fields = parse_response(answer).unwrap();
        assert_eq!(fields.invoice_number.as_deref(), Some("INV-1"));
        assert_eq!(fields.invoice_date, Some(ymd(2024, 1, 15)));
        assert_eq!(fields.total_amount, Some(1200.0));
        assert_eq!(fields.line_items, Some(Vec::new()));
        assert_eq!(fields.due_date, None);
    }

    #[test]
    fn test_defaults_are_not_values() {
        let answer = r#"{"invoice_number": "", "invoice_date": "1900-01-01", "total_amount": 0.0}"#;
        let fields = parse_response(answer).unwrap();
        assert_eq!(fields, RefinedFields::default());
    }

    #[test]
    fn test_nested_vendor() {
        let answer = r#"{"vendor": {"name": "ACME", "address": "1 Main St"}}"#;
        let fields = parse_response(answer).unwrap();
        assert_eq!(fields.vendor_name.as_deref(), Some("ACME"));
        assert_eq!(fields.vendor_address.as_deref(), Some("1 Main St"));
    }

    #[test]
    fn test_bare_array_is_line_items() {
        let answer = r#"[{"description": "Widget", "quantity": 2, "unit_price": "5.00", "amount": 10}, "junk"]"#;
        let fields = parse_response(answer).unwrap();
        assert_eq!(fields.line_items, Some(vec![LineItem::new("Widget", 2.0, 5.0, 10.0)]));
        assert_eq!(fields.invoice_number, None);
    }

    #[test]
    fn test_rejects_bad_answers() {
        assert!(matches!(parse_response(""), Err(RefineError::Empty)));
        assert!(matches!(parse_response("```json\n```"), Err(RefineError::Empty)));
        assert!(matches!(
            parse_response("Sorry, I can't help"),
            Err(RefineError::InvalidJson(_))
        ));
        assert!(matches!(parse_response("42"), Err(RefineError::InvalidJson(_))));
        assert!(matches!(
            parse_response(r#"{"answer": "yes"}"#),
            Err(RefineError::MissingFields)
        ));
    }

    #[test]
    fn test_apply_overrides_and_reconciles() {
        let raw = RawExtraction {
            text: "1 Consulting 100.00 100.00".into(),
            entities: vec![
                RawEntity::new("invoice_id", "INV-OLD"),
                RawEntity::new("invoice_date", "01/15/2024"),
                RawEntity::new("total_amount", "100.00"),
            ],
            ..Default::default()
        };
        let normalized = InvoiceNormalizer::new().normalize(&raw);

        let fields = RefinedFields {
            invoice_number: Some("INV-NEW".into()),
            payment_terms: Some("Net 30".into()),
            line_items: Some(vec![LineItem::new("Consulting (Jan)", 1.0, 100.0, 100.0)]),
            ..Default::default()
        };
        let (record, source) = fields.apply(normalized);

        assert_eq!(record.invoice_number, "INV-NEW");
        assert_eq!(record.total_amount, 100.0);
        assert_eq!(record.due_date, ymd(2024, 2, 14));
        assert_eq!(record.line_items[0].description, "Consulting (Jan)");
        assert_eq!(source, LineItemSource::Llm);
        assert!(record.refined);
    }

    fn dated(entities: Vec<RawEntity>) -> NormalizedInvoice {
        InvoiceNormalizer::new().normalize(&RawExtraction {
            entities,
            ..Default::default()
        })
    }

    #[test]
    fn test_apply_rederives_due_date_from_refined_invoice_date() {
        let normalized = dated(vec![
            RawEntity::new("invoice_date", "01/15/2024"),
            RawEntity::new("payment_terms", "Net 30"),
        ]);
        assert_eq!(normalized.record.due_date, ymd(2024, 2, 14));

        let fields = RefinedFields {
            invoice_date: Some(ymd(2024, 3, 1)),
            ..Default::default()
        };
        let (record, _) = fields.apply(normalized);

        assert_eq!(record.invoice_date, ymd(2024, 3, 1));
        assert_eq!(record.due_date, ymd(2024, 3, 31));
    }

    #[test]
    fn test_apply_keeps_extracted_due_date() {
        let normalized = dated(vec![
            RawEntity::new("invoice_date", "01/15/2024"),
            RawEntity::new("due_date", "02/01/2024"),
            RawEntity::new("payment_terms", "Net 30"),
        ]);

        let fields = RefinedFields {
            invoice_date: Some(ymd(2024, 1, 20)),
            ..Default::default()
        };
        let (record, _) = fields.apply(normalized);
        assert_eq!(record.due_date, ymd(2024, 2, 1));

        let normalized = dated(vec![
            RawEntity::new("invoice_date", "01/15/2024"),
            RawEntity::new("payment_terms", "Net 30"),
        ]);
        let fields = RefinedFields {
            due_date: Some(ymd(2024, 4, 1)),
            invoice_date: Some(ymd(2024, 3, 1)),
            ..Default::default()
        };
        let (record, _) = fields.apply(normalized);
        assert_eq!(record.due_date, ymd(2024, 4, 1));
    }

    #[test]
    fn test_apply_keeps_items_when_llm_items_empty() {
        let raw = RawExtraction {
            text: "1 Consulting 100.00 100.00".into(),
            ..Default::default()
        };
        let normalized = InvoiceNormalizer::new().normalize(&raw);
        let fields = RefinedFields {
            line_items: Some(vec![LineItem::default()]),
            ..Default::default()
        };
        let (record, source) = fields.apply(normalized);
        assert_eq!(source, LineItemSource::Text);
        assert_eq!(record.line_items.len(), 1);
    }
}
