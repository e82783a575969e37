//! Document AI invoice parser client.

use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use serde::{Deserialize, Deserializer, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

use super::{DocumentExtractor, RawEntity, RawExtraction, RawTable, Result, mime_type_for};
use crate::auth::TokenSource;
use crate::error::ExtractionError;
use crate::models::config::{ExtractionConfig, GcpConfig};

/// Calls the `:process` method of a Document AI processor.
pub struct DocumentAiExtractor {
    client: reqwest::Client,
    tokens: TokenSource,
    base_url: String,
    processor_name: String,
}

impl DocumentAiExtractor {
    /// Create a client for `projects/{project}/locations/{location}/processors/{id}`.
    pub fn new(gcp: &GcpConfig, config: &ExtractionConfig, tokens: TokenSource) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            tokens,
            base_url: config.base_url().trim_end_matches('/').to_string(),
            processor_name: format!(
                "projects/{}/locations/{}/processors/{}",
                gcp.project_id, config.location, config.processor_id
            ),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/v1/{}:process", self.base_url, self.processor_name)
    }
}

#[async_trait]
impl DocumentExtractor for DocumentAiExtractor {
    async fn extract(&self, path: &Path) -> Result<RawExtraction> {
        let mime_type = mime_type_for(path)
            .ok_or_else(|| ExtractionError::UnsupportedType(path.display().to_string()))?;
        let bytes = tokio::fs::read(path).await?;
        let token = self.tokens.token().await?;

        let request = ProcessRequest {
            raw_document: RawDocument {
                content: BASE64.encode(&bytes),
                mime_type: mime_type.to_string(),
            },
            skip_human_review: true,
        };

        debug!(
            "Sending {} ({} bytes) to {}",
            path.display(),
            bytes.len(),
            self.processor_name
        );

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(token)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ExtractionError::Api { status, body });
        }

        let body: ProcessResponse = response
            .json()
            .await
            .map_err(|e| ExtractionError::Malformed(e.to_string()))?;

        let raw = body.document.into_raw();
        info!(
            "Extracted {} entities and {} chars from {} page(s)",
            raw.entities.len(),
            raw.text.len(),
            raw.pages
        );
        Ok(raw)
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ProcessRequest {
    raw_document: RawDocument,
    skip_human_review: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RawDocument {
    content: String,
    mime_type: String,
}

#[derive(Deserialize)]
struct ProcessResponse {
    document: Document,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct Document {
    text: String,
    pages: Vec<Page>,
    entities: Vec<Entity>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct Page {
    tables: Vec<Table>,
}

#[derive(Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
struct Table {
    header_rows: Vec<TableRow>,
    body_rows: Vec<TableRow>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct TableRow {
    cells: Vec<TableCell>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct TableCell {
    layout: Layout,
}

#[derive(Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
struct Layout {
    text_anchor: TextAnchor,
}

#[derive(Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
struct TextAnchor {
    text_segments: Vec<TextSegment>,
}

// int64 fields arrive as JSON strings
#[derive(Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
struct TextSegment {
    #[serde(deserialize_with = "int64")]
    start_index: usize,
    #[serde(deserialize_with = "int64")]
    end_index: usize,
}

#[derive(Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
struct Entity {
    #[serde(rename = "type")]
    kind: String,
    mention_text: String,
    confidence: f32,
    normalized_value: Option<NormalizedValue>,
    properties: Vec<Entity>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct NormalizedValue {
    text: Option<String>,
}

fn int64<'de, D>(deserializer: D) -> std::result::Result<usize, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Int64 {
        Number(u64),
        Text(String),
    }

    match Int64::deserialize(deserializer)? {
        Int64::Number(n) => Ok(n as usize),
        Int64::Text(s) => s.parse().map_err(serde::de::Error::custom),
    }
}

impl Document {
    fn into_raw(self) -> RawExtraction {
        let anchored = AnchoredText::new(&self.text);
        let tables = self
            .pages
            .iter()
            .flat_map(|page| page.tables.iter())
            .map(|table| RawTable {
                header_rows: rows_text(&table.header_rows, &anchored),
                body_rows: rows_text(&table.body_rows, &anchored),
            })
            .collect();

        RawExtraction {
            pages: self.pages.len() as u32,
            entities: self.entities.into_iter().map(Entity::into_raw).collect(),
            tables,
            text: self.text,
        }
    }
}

impl Entity {
    fn into_raw(self) -> RawEntity {
        RawEntity {
            kind: self.kind,
            mention_text: self.mention_text,
            normalized: self.normalized_value.and_then(|v| v.text),
            confidence: self.confidence,
            properties: self.properties.into_iter().map(Entity::into_raw).collect(),
        }
    }
}

/// Document text indexed by character for anchor lookups.
struct AnchoredText<'a> {
    text: &'a str,
    /// Byte offset of every character, plus the text length.
    offsets: Vec<usize>,
}

impl<'a> AnchoredText<'a> {
    fn new(text: &'a str) -> Self {
        let offsets = text
            .char_indices()
            .map(|(i, _)| i)
            .chain(std::iter::once(text.len()))
            .collect();
        Self { text, offsets }
    }

    fn char_len(&self) -> usize {
        self.offsets.len() - 1
    }

    /// Characters `start..end`, clamped to the text.
    fn slice(&self, start: usize, end: usize) -> &'a str {
        let end = end.min(self.char_len());
        if start >= end {
            return "";
        }
        &self.text[self.offsets[start]..self.offsets[end]]
    }

    /// Resolve a text anchor. Indices count characters; out-of-range
    /// segments are skipped.
    fn resolve(&self, anchor: &TextAnchor) -> String {
        let text: String = anchor
            .text_segments
            .iter()
            .map(|segment| self.slice(segment.start_index, segment.end_index))
            .collect();
        text.trim().to_string()
    }
}

fn rows_text(rows: &[TableRow], text: &AnchoredText<'_>) -> Vec<Vec<String>> {
    rows.iter()
        .map(|row| {
            row.cells
                .iter()
                .map(|cell| text.resolve(&cell.layout.text_anchor))
                .collect()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::io::Write;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn extractor(base_url: &str) -> DocumentAiExtractor {
        let gcp = GcpConfig {
            project_id: "acme".into(),
            ..Default::default()
        };
        let config = ExtractionConfig {
            processor_id: "proc1".into(),
            endpoint: Some(base_url.to_string()),
            ..Default::default()
        };
        DocumentAiExtractor::new(&gcp, &config, TokenSource::Static("tok".into())).unwrap()
    }

    fn pdf_file() -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".pdf").tempfile().unwrap();
        file.write_all(b"%PDF-1.4 test").unwrap();
        file
    }

    #[test]
    fn test_endpoint() {
        let ex = extractor("https://us-documentai.googleapis.com/");
        assert_eq!(
            ex.endpoint(),
            "https://us-documentai.googleapis.com/v1/projects/acme/locations/us/processors/proc1:process"
        );
    }

    #[tokio::test]
    async fn test_extract_entities_and_tables() {
        let server = MockServer::start().await;
        let text = "Qty Item\n2 Widget\n";
        Mock::given(method("POST"))
            .and(path("/v1/projects/acme/locations/us/processors/proc1:process"))
            .and(header("authorization", "Bearer tok"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "document": {
                    "text": text,
                    "pages": [{
                        "pageNumber": 1,
                        "tables": [{
                            "headerRows": [{"cells": [
                                {"layout": {"textAnchor": {"textSegments": [{"endIndex": "3"}]}}},
                                {"layout": {"textAnchor": {"textSegments": [{"startIndex": "4", "endIndex": "8"}]}}}
                            ]}],
                            "bodyRows": [{"cells": [
                                {"layout": {"textAnchor": {"textSegments": [{"startIndex": 9, "endIndex": 10}]}}},
                                {"layout": {"textAnchor": {"textSegments": [{"startIndex": "11", "endIndex": "17"}]}}}
                            ]}]
                        }]
                    }],
                    "entities": [
                        {"type": "invoice_id", "mentionText": "INV-7", "confidence": 0.98},
                        {
                            "type": "invoice_date",
                            "mentionText": "Jan 15, 2024",
                            "normalizedValue": {"text": "2024-01-15"}
                        },
                        {
                            "type": "line_item",
                            "mentionText": "2 Widget",
                            "properties": [
                                {"type": "line_item/quantity", "mentionText": "2"}
                            ]
                        }
                    ]
                }
            })))
            .mount(&server)
            .await;

        let file = pdf_file();
        let raw = extractor(&server.uri()).extract(file.path()).await.unwrap();

        assert_eq!(raw.pages, 1);
        assert_eq!(raw.entity_text("invoice_id"), "INV-7");
        assert_eq!(
            raw.entity("invoice_date").unwrap().normalized.as_deref(),
            Some("2024-01-15")
        );
        assert_eq!(raw.line_item_entities().count(), 1);
        assert_eq!(raw.tables[0].header_rows, vec![vec!["Qty", "Item"]]);
        assert_eq!(raw.tables[0].body_rows, vec![vec!["2", "Widget"]]);
    }

    #[tokio::test]
    async fn test_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(403).set_body_string("permission denied"))
            .mount(&server)
            .await;

        let file = pdf_file();
        let err = extractor(&server.uri()).extract(file.path()).await.unwrap_err();
        match err {
            ExtractionError::Api { status, body } => {
                assert_eq!(status, 403);
                assert_eq!(body, "permission denied");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_unsupported_type() {
        let file = tempfile::Builder::new().suffix(".txt").tempfile().unwrap();
        let err = extractor("http://127.0.0.1:9").extract(file.path()).await.unwrap_err();
        assert!(matches!(err, ExtractionError::UnsupportedType(_)));
    }

    #[tokio::test]
    async fn test_missing_file() {
        let err = extractor("http://127.0.0.1:9")
            .extract(Path::new("/nonexistent/invoice.pdf"))
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractionError::Io(_)));
    }

    #[test]
    fn test_anchor_indices_count_characters() {
        let text = AnchoredText::new("Größe 12,50 €\nMenge 3");
        let anchor = |segments: &[(usize, usize)]| TextAnchor {
            text_segments: segments
                .iter()
                .map(|&(start_index, end_index)| TextSegment { start_index, end_index })
                .collect(),
        };

        assert_eq!(text.resolve(&anchor(&[(0, 5)])), "Größe");
        assert_eq!(text.resolve(&anchor(&[(6, 13)])), "12,50 €");
        assert_eq!(text.resolve(&anchor(&[(0, 5), (13, 21)])), "Größe\nMenge 3");
        assert_eq!(text.resolve(&anchor(&[(14, 99)])), "Menge 3");
        assert_eq!(text.resolve(&anchor(&[(50, 60), (3, 3)])), "");
    }
}
