//! Document extraction service interface and raw output model.

mod document_ai;

pub use document_ai::DocumentAiExtractor;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::ExtractionError;

/// Result type for extraction operations.
pub type Result<T> = std::result::Result<T, ExtractionError>;

/// A service that turns a document into typed entities and text.
#[async_trait]
pub trait DocumentExtractor: Send + Sync {
    /// Extract entities, tables and text from the document at `path`.
    async fn extract(&self, path: &Path) -> Result<RawExtraction>;
}

/// Everything the extraction service returned, before normalization.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawExtraction {
    /// Full document text.
    pub text: String,

    /// Number of pages.
    pub pages: u32,

    /// Top-level entities in document order.
    pub entities: Vec<RawEntity>,

    /// Tables detected on any page.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tables: Vec<RawTable>,
}

/// A typed span of text, possibly with child properties.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawEntity {
    /// Entity type, e.g. `invoice_date` or `line_item/amount`.
    pub kind: String,

    /// Text as it appears in the document.
    pub mention_text: String,

    /// Service-normalized value, when provided.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub normalized: Option<String>,

    pub confidence: f32,

    /// Nested properties (line item fields).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub properties: Vec<RawEntity>,
}

impl RawEntity {
    pub fn new(kind: impl Into<String>, mention_text: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            mention_text: mention_text.into(),
            normalized: None,
            confidence: 1.0,
            properties: Vec::new(),
        }
    }

    pub fn with_normalized(mut self, value: impl Into<String>) -> Self {
        self.normalized = Some(value.into());
        self
    }

    pub fn with_property(mut self, property: RawEntity) -> Self {
        self.properties.push(property);
        self
    }

    /// Mention text of the first property whose type is one of `kinds`.
    pub fn property(&self, kinds: &[&str]) -> Option<&str> {
        kinds.iter().find_map(|kind| {
            self.properties
                .iter()
                .find(|p| p.kind == *kind)
                .map(|p| p.mention_text.as_str())
        })
    }
}

/// A detected table as rows of cell text.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawTable {
    pub header_rows: Vec<Vec<String>>,
    pub body_rows: Vec<Vec<String>>,
}

impl RawExtraction {
    /// First entity of the given type.
    pub fn entity(&self, kind: &str) -> Option<&RawEntity> {
        self.entities.iter().find(|e| e.kind == kind)
    }

    /// Mention text of the first entity of the given type, or `""`.
    pub fn entity_text(&self, kind: &str) -> &str {
        self.entity(kind)
            .map(|e| e.mention_text.trim())
            .unwrap_or("")
    }

    /// All `line_item` entities.
    pub fn line_item_entities(&self) -> impl Iterator<Item = &RawEntity> {
        self.entities.iter().filter(|e| e.kind == "line_item")
    }

    /// Serialize for audit storage.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// MIME type accepted by the extraction service for a file extension.
pub fn mime_type_for(path: &Path) -> Option<&'static str> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();

    match ext.as_str() {
        "pdf" => Some("application/pdf"),
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "tif" | "tiff" => Some("image/tiff"),
        "gif" => Some("image/gif"),
        "bmp" => Some("image/bmp"),
        "webp" => Some("image/webp"),
        _ => None,
    }
}
