use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::LlmClient;
use crate::error::RefineError;
use crate::models::config::LlmConfig;

// --- Gemini request and response structures ---

#[derive(Serialize)]
struct GeminiRequest {
    contents: Vec<Content>,
}

#[derive(Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Serialize)]
struct Part {
    text: String,
}

#[derive(Deserialize, Debug, Default)]
#[serde(default)]
struct GeminiResponse {
    candidates: Vec<Candidate>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(default)]
struct Candidate {
    content: ContentResponse,
}

#[derive(Deserialize, Debug, Default)]
#[serde(default)]
struct ContentResponse {
    parts: Vec<PartResponse>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(default)]
struct PartResponse {
    text: String,
}

/// Client for the Gemini `generateContent` API.
#[derive(Clone, Debug)]
pub struct GeminiClient {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    model: String,
}

impl GeminiClient {
    /// Create a client from configuration. Requires an API key.
    pub fn new(config: &LlmConfig) -> Result<Self, RefineError> {
        let api_key = config.api_key.clone().unwrap_or_default();
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            api_url: format!(
                "{}/models/{}:generateContent",
                config.endpoint.trim_end_matches('/'),
                config.model
            ),
            api_key,
            model: config.model.clone(),
        })
    }
}

#[async_trait]
impl LlmClient for GeminiClient {
    fn model(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<String, RefineError> {
        let request_body = GeminiRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: prompt.to_string(),
                }],
            }],
        };

        let response = self
            .client
            .post(&self.api_url)
            .query(&[("key", &self.api_key)])
            .json(&request_body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(RefineError::Api { status, body });
        }

        let gemini_response: GeminiResponse = response.json().await?;

        let text = gemini_response
            .candidates
            .first()
            .and_then(|c| c.content.parts.first())
            .map(|p| p.text.clone())
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(RefineError::Empty);
        }
        Ok(text)
    }
}
