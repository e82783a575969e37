//! Line item reconciliation across extraction sources.

use serde::Serialize;
use std::fmt;

use crate::models::invoice::{LineItem, retain_meaningful};

/// Which source the final line items came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LineItemSource {
    Llm,
    Table,
    Text,
    None,
}

impl fmt::Display for LineItemSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Llm => "llm",
            Self::Table => "table",
            Self::Text => "text",
            Self::None => "none",
        };
        f.write_str(name)
    }
}

/// Choose the authoritative line items.
///
/// Precedence is LLM, then structured table rows, then flat-text rows.
/// Each candidate list is filtered of empty rows first, so a source that
/// yields only empty rows does not shadow the next one.
pub fn reconcile(
    table_items: Vec<LineItem>,
    text_items: Vec<LineItem>,
    llm_items: Option<Vec<LineItem>>,
) -> Vec<LineItem> {
    reconcile_with_source(table_items, text_items, llm_items).0
}

/// Like [`reconcile`], also reporting the winning source.
pub fn reconcile_with_source(
    table_items: Vec<LineItem>,
    text_items: Vec<LineItem>,
    llm_items: Option<Vec<LineItem>>,
) -> (Vec<LineItem>, LineItemSource) {
    let candidates = [
        (llm_items.unwrap_or_default(), LineItemSource::Llm),
        (table_items, LineItemSource::Table),
        (text_items, LineItemSource::Text),
    ];

    candidates
        .into_iter()
        .map(|(items, source)| (retain_meaningful(items), source))
        .find(|(items, _)| !items.is_empty())
        .unwrap_or((Vec::new(), LineItemSource::None))
}
