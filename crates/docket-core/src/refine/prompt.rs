use std::fmt::Write;

use crate::extraction::RawExtraction;
use crate::invoice::NormalizedInvoice;

/// Build the refinement prompt from the extraction and the provisional record.
pub fn build_prompt(raw: &RawExtraction, normalized: &NormalizedInvoice) -> String {
    let mut entities = String::new();
    for entity in raw.entities.iter().filter(|e| e.kind != "line_item") {
        let _ = writeln!(entities, "- {}: {}", entity.kind, entity.mention_text.trim());
    }
    if entities.is_empty() {
        entities.push_str("(none)\n");
    }

    let line_items = serde_json::to_string_pretty(&normalized.record.line_items)
        .unwrap_or_else(|_| "[]".to_string());

    format!(
        "Analyze the following invoice text and extracted entities and return a corrected, \
structured version of the invoice.

Invoice text:
{text}

Extracted entities:
{entities}
Line items found so far:
{line_items}

Return a single JSON object with exactly these keys:
- \"invoice_number\": string
- \"invoice_date\": string, YYYY-MM-DD
- \"due_date\": string, YYYY-MM-DD
- \"total_amount\": number
- \"vendor_name\": string
- \"vendor_address\": string
- \"line_items\": array of objects with \"description\" (string), \"quantity\", \"unit_price\" and \"amount\" (numbers)
- \"payment_terms\": string
- \"notes\": string, any special notes or conditions

Use an empty string or 0 for anything missing or unclear. Return only the JSON, with no explanation.",
        text = raw.text.trim(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extraction::RawEntity;
    use crate::invoice::InvoiceNormalizer;

    #[test]
    fn test_prompt_contents() {
        let raw = RawExtraction {
            text: "ACME Corp\n1 Consulting 100.00 100.00".into(),
            entities: vec![
                RawEntity::new("invoice_id", "INV-9"),
                RawEntity::new("line_item", "1 Consulting 100.00 100.00"),
            ],
            ..Default::default()
        };
        let normalized = InvoiceNormalizer::new().normalize(&raw);
        let prompt = build_prompt(&raw, &normalized);

        assert!(prompt.contains("ACME Corp"));
        assert!(prompt.contains("- invoice_id: INV-9"));
        assert!(!prompt.contains("- line_item:"));
        assert!(prompt.contains("\"description\": \"Consulting\""));
        assert!(prompt.contains("\"due_date\": string, YYYY-MM-DD"));
    }

    #[test]
    fn test_prompt_without_entities() {
        let raw = RawExtraction::default();
        let normalized = InvoiceNormalizer::new().normalize(&raw);
        let prompt = build_prompt(&raw, &normalized);
        assert!(prompt.contains("(none)"));
        assert!(prompt.contains("Line items found so far:\n[]"));
    }
}
