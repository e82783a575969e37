//! Rule-based normalizers for extracted invoice fields.
//!
//! Every function here is total: bad input produces a well-typed default
//! (the sentinel date, `0.0`, an empty list) instead of an error.

pub mod amounts;
pub mod dates;
pub mod line_items;
pub mod patterns;

pub use amounts::{amount_from_json, parse_amount, try_parse_amount};
pub use dates::{derive_due_date, parse_date, try_parse_date};
pub use line_items::{parse_text_line, parse_text_line_items};
