//! Flat-text line item heuristics.

use super::amounts::try_parse_amount;
use super::patterns::NUMERIC_TOKEN;
use crate::models::invoice::LineItem;

/// Parse line items from plain text, one candidate row per line.
///
/// A row is `<quantity> <description...> <unit price> <amount>`. Lines
/// whose first and last two tokens are not clean numbers are skipped.
pub fn parse_text_line_items(text: &str) -> Vec<LineItem> {
    text.lines().filter_map(parse_text_line).collect()
}

/// Parse one row, see [`parse_text_line_items`].
pub fn parse_text_line(line: &str) -> Option<LineItem> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    if tokens.len() < 4 {
        return None;
    }

    let n = tokens.len();
    let quantity = numeric_token(tokens[0])?;
    let unit_price = numeric_token(tokens[n - 2])?;
    let amount = numeric_token(tokens[n - 1])?;
    let description = tokens[1..n - 2].join(" ");

    let item = LineItem::new(description, quantity, unit_price, amount);
    item.has_data().then_some(item)
}

fn numeric_token(token: &str) -> Option<f64> {
    if NUMERIC_TOKEN.is_match(token) {
        try_parse_amount(token)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_text_line() {
        let item = parse_text_line("2 Steel bracket, large 45.00 90.00").unwrap();
        assert_eq!(item.description, "Steel bracket, large");
        assert_eq!(item.quantity, 2.0);
        assert_eq!(item.unit_price, 45.0);
        assert_eq!(item.amount, 90.0);
    }

    #[test]
    fn test_currency_tokens() {
        let item = parse_text_line("1 Annual support $1,200.00 $1,200.00").unwrap();
        assert_eq!(item.unit_price, 1200.0);
        assert_eq!(item.amount, 1200.0);
    }

    #[test]
    fn test_rejects_non_rows() {
        assert!(parse_text_line("Invoice 12345").is_none());
        assert!(parse_text_line("Date: 01/15/2024 Total 100.00").is_none());
        assert!(parse_text_line("Total due 1,200.00 USD").is_none());
        assert!(parse_text_line("12 boxes shipped").is_none());
        assert!(parse_text_line("").is_none());
    }

    #[test]
    fn test_parse_block() {
        let text = "ACME Corp\n\
                    Qty Description Price Amount\n\
                    3 Widget 10.00 30.00\n\
                    1 Setup fee 50 50\n\
                    Subtotal 80.00";

        let items = parse_text_line_items(text);
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].description, "Widget");
        assert_eq!(items[1].description, "Setup fee");
        assert_eq!(items[1].amount, 50.0);
    }
}
