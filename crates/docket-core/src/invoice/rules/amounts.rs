//! Amount normalization for extracted invoice fields.

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use std::str::FromStr;

/// Parse a currency string such as `"$1,234.56"` into a float.
///
/// Currency symbols, thousands separators and any other non-digit
/// characters are dropped; the last `.` is kept as the decimal point.
/// Returns `0.0` for empty or unparseable input. The result is always
/// finite and non-negative.
pub fn parse_amount(raw: &str) -> f64 {
    try_parse_amount(raw).unwrap_or(0.0)
}

/// Like [`parse_amount`], but reports failure instead of defaulting.
pub fn try_parse_amount(raw: &str) -> Option<f64> {
    let cleaned = clean_amount(raw)?;
    let value = Decimal::from_str(&cleaned).ok()?.to_f64()?;
    (value.is_finite() && value >= 0.0).then_some(value)
}

/// Reduce `raw` to digits with at most one decimal point.
fn clean_amount(raw: &str) -> Option<String> {
    let digits_and_dots: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();

    let decimal_at = digits_and_dots.rfind('.');
    let cleaned: String = digits_and_dots
        .char_indices()
        .filter(|(i, c)| *c != '.' || Some(*i) == decimal_at)
        .map(|(_, c)| c)
        .collect();

    if !cleaned.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }

    // Decimal rejects a trailing point ("12.") and leading one (".5")
    let cleaned = match (cleaned.starts_with('.'), cleaned.ends_with('.')) {
        (true, _) => format!("0{}", cleaned),
        (_, true) => cleaned.trim_end_matches('.').to_string(),
        _ => cleaned,
    };
    Some(cleaned)
}

/// Convert a JSON value from an LLM response into an amount.
///
/// Numbers are taken as-is (negative and non-finite values become `0.0`),
/// strings go through [`parse_amount`].
pub fn amount_from_json(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::Number(n) => n
            .as_f64()
            .map(|v| if v.is_finite() && v >= 0.0 { v } else { 0.0 }),
        serde_json::Value::String(s) => Some(parse_amount(s)),
        _ => None,
    }
}
