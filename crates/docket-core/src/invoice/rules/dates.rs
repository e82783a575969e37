//! Date normalization for extracted invoice fields.

use chrono::{Duration, NaiveDate};
use regex::Regex;

use super::patterns::{DATE_ISO, DATE_MDY_DASH, DATE_MDY_SLASH, DATE_MDY_SLASH_SHORT, NET_DAYS};
use crate::models::invoice::{is_sentinel, sentinel_date};

/// Field order of a date layout.
#[derive(Debug, Clone, Copy)]
enum Order {
    MonthDayYear,
    YearMonthDay,
    DayMonthYear,
}

/// Known layouts in precedence order. Day-first layouts reuse the
/// month-first expressions and only apply when the month-first reading
/// is not a valid date.
fn layouts() -> [(&'static Regex, Order); 6] {
    [
        (&*DATE_MDY_SLASH, Order::MonthDayYear),
        (&*DATE_MDY_SLASH_SHORT, Order::MonthDayYear),
        (&*DATE_MDY_DASH, Order::MonthDayYear),
        (&*DATE_ISO, Order::YearMonthDay),
        (&*DATE_MDY_SLASH, Order::DayMonthYear),
        (&*DATE_MDY_DASH, Order::DayMonthYear),
    ]
}

/// Parse a raw date string into a calendar date.
///
/// Accepts `MM/DD/YYYY`, `MM/DD/YY`, `MM-DD-YYYY`, `YYYY-MM-DD`,
/// `DD/MM/YYYY` and `DD-MM-YYYY`, first match wins. Empty or unrecognised
/// input yields the sentinel date.
pub fn parse_date(raw: &str) -> NaiveDate {
    try_parse_date(raw).unwrap_or_else(sentinel_date)
}

/// Like [`parse_date`], but reports failure instead of defaulting.
pub fn try_parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    layouts().into_iter().find_map(|(pattern, order)| {
        let caps = pattern.captures(raw)?;
        let (a, b, c) = (&caps[1], &caps[2], &caps[3]);
        let (year, month, day) = match order {
            Order::MonthDayYear => (parse_year(c), a.parse().ok()?, b.parse().ok()?),
            Order::DayMonthYear => (parse_year(c), b.parse().ok()?, a.parse().ok()?),
            Order::YearMonthDay => (a.parse().ok()?, b.parse().ok()?, c.parse().ok()?),
        };
        NaiveDate::from_ymd_opt(year, month, day)
    })
}

/// Derive a due date from a net-days clause in the payment terms.
///
/// Best-effort: only the phrases matched by `NET_DAYS` are understood.
/// Returns the sentinel when the invoice date is unknown or no clause is
/// found.
pub fn derive_due_date(invoice_date: NaiveDate, payment_terms: &str) -> NaiveDate {
    if is_sentinel(invoice_date) {
        return sentinel_date();
    }

    NET_DAYS
        .captures(payment_terms)
        .and_then(|caps| caps[1].parse::<i64>().ok())
        .and_then(|days| invoice_date.checked_add_signed(Duration::days(days)))
        .unwrap_or_else(sentinel_date)
}

fn parse_year(s: &str) -> i32 {
    let year: i32 = s.parse().unwrap_or(0);
    if s.len() == 2 {
        // POSIX %y pivot: 69-99 map to 1900s, 00-68 to 2000s
        if year >= 69 { 1900 + year } else { 2000 + year }
    } else {
        year
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_parse_date_layouts() {
        assert_eq!(parse_date("01/15/2024"), ymd(2024, 1, 15));
        assert_eq!(parse_date("04/30/23"), ymd(2023, 4, 30));
        assert_eq!(parse_date("01-15-2024"), ymd(2024, 1, 15));
        assert_eq!(parse_date("2024-01-15"), ymd(2024, 1, 15));
    }

    #[test]
    fn test_parse_date_day_first_fallback() {
        // 25 cannot be a month, so the day-first reading applies
        assert_eq!(parse_date("25/12/2023"), ymd(2023, 12, 25));
        assert_eq!(parse_date("31-01-2024"), ymd(2024, 1, 31));
    }

    #[test]
    fn test_month_first_wins_when_ambiguous() {
        assert_eq!(parse_date("03/04/2024"), ymd(2024, 3, 4));
    }

    #[test]
    fn test_parse_date_is_total() {
        assert_eq!(parse_date("").to_string(), "1900-01-01");
        assert_eq!(parse_date("not a date").to_string(), "1900-01-01");
        assert_eq!(parse_date("13/13/2024").to_string(), "1900-01-01");
        assert_eq!(parse_date("2024-02-30").to_string(), "1900-01-01");
        assert_eq!(parse_date("1/2/345").to_string(), "1900-01-01");
        assert_eq!(parse_date("  04/30/23 ").to_string(), "2023-04-30");
    }

    #[test]
    fn test_two_digit_year_pivot() {
        assert_eq!(parse_date("01/01/68"), ymd(2068, 1, 1));
        assert_eq!(parse_date("01/01/69"), ymd(1969, 1, 1));
    }

    #[test]
    fn test_derive_due_date_from_terms() {
        let issued = ymd(2024, 1, 15);
        assert_eq!(derive_due_date(issued, "NTO is issued at 30 days"), ymd(2024, 2, 14));
        assert_eq!(derive_due_date(issued, "Net 45"), ymd(2024, 2, 29));
        assert_eq!(derive_due_date(issued, "Payment due within 10 days"), ymd(2024, 1, 25));
    }

    #[test]
    fn test_derive_due_date_without_clause() {
        let issued = ymd(2024, 1, 15);
        assert!(is_sentinel(derive_due_date(issued, "")));
        assert!(is_sentinel(derive_due_date(issued, "Due on receipt")));
        assert!(is_sentinel(derive_due_date(sentinel_date(), "Net 30")));
    }
}
