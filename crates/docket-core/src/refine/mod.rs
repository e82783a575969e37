//! Optional LLM refinement of normalized invoices.
//!
//! The refiner sends the extracted text, entities and provisional line
//! items to a generative model and merges the JSON it returns back into
//! the record. Any failure leaves the caller with the unrefined record.

mod gemini;
mod prompt;
mod response;

pub use gemini::GeminiClient;
pub use prompt::build_prompt;
pub use response::{RefinedFields, parse_response};

use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use crate::error::RefineError;
use crate::extraction::RawExtraction;
use crate::invoice::NormalizedInvoice;

/// A text generation service.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Model identifier, for logs.
    fn model(&self) -> &str;

    /// Return the model's text completion for `prompt`.
    async fn generate(&self, prompt: &str) -> Result<String, RefineError>;
}

/// Asks an [`LlmClient`] to correct a normalized invoice.
#[derive(Clone)]
pub struct Refiner {
    client: Arc<dyn LlmClient>,
}

impl Refiner {
    pub fn new(client: Arc<dyn LlmClient>) -> Self {
        Self { client }
    }

    /// Query the model and parse its answer.
    pub async fn refine(
        &self,
        raw: &RawExtraction,
        normalized: &NormalizedInvoice,
    ) -> Result<RefinedFields, RefineError> {
        let prompt = build_prompt(raw, normalized);
        debug!(
            "Requesting refinement from {} ({} prompt chars)",
            self.client.model(),
            prompt.len()
        );

        let answer = self.client.generate(&prompt).await?;
        parse_response(&answer)
    }
}
