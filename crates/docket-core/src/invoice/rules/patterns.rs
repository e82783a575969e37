//! Common regex patterns for invoice field normalization.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    // Date layouts, tried in this order by `parse_date`.
    pub static ref DATE_MDY_SLASH: Regex = Regex::new(
        r"^(\d{1,2})/(\d{1,2})/(\d{4})$"
    ).unwrap();

    pub static ref DATE_MDY_SLASH_SHORT: Regex = Regex::new(
        r"^(\d{1,2})/(\d{1,2})/(\d{2})$"
    ).unwrap();

    pub static ref DATE_MDY_DASH: Regex = Regex::new(
        r"^(\d{1,2})-(\d{1,2})-(\d{4})$"
    ).unwrap();

    pub static ref DATE_ISO: Regex = Regex::new(
        r"^(\d{4})-(\d{1,2})-(\d{1,2})$"
    ).unwrap();

    // Net-days clause in payment terms: "Net 30", "issued at 30 days", "due within 45 days".
    pub static ref NET_DAYS: Regex = Regex::new(
        r"(?i)\b(?:net|issued\s+at|due\s+in|due\s+within|payable\s+within)\s*(\d{1,3})\b(?:\s*days?\b)?"
    ).unwrap();

    // A numeric cell in a flat-text line item row: "3", "1,200.00", "$45.5".
    pub static ref NUMERIC_TOKEN: Regex = Regex::new(
        r"^[$€£]?(?:\d{1,3}(?:,\d{3})+|\d+)(?:\.\d+)?$"
    ).unwrap();

    // Markdown code fence around a JSON payload.
    pub static ref CODE_FENCE: Regex = Regex::new(
        r"(?s)^\s*```(?:json|JSON)?\s*(.*?)\s*```\s*$"
    ).unwrap();
}
