//! Bearer tokens for Google Cloud REST calls.

use serde::Deserialize;
use tracing::debug;

use crate::error::AuthError;
use crate::models::config::GcpConfig;

/// Where access tokens come from.
///
/// Tokens are fetched per call and never cached in process.
#[derive(Debug, Clone)]
pub enum TokenSource {
    /// A fixed token, e.g. from `gcloud auth print-access-token`.
    Static(String),

    /// The compute metadata server of the current instance.
    Metadata {
        client: reqwest::Client,
        url: String,
    },

    /// No credentials available; every request fails with [`AuthError::Missing`].
    None,
}

#[derive(Deserialize)]
struct MetadataToken {
    access_token: String,
}

impl TokenSource {
    /// Pick a source from configuration: a configured token wins, then the
    /// metadata server when enabled.
    pub fn from_config(config: &GcpConfig) -> Self {
        match &config.access_token {
            Some(token) if !token.trim().is_empty() => Self::Static(token.trim().to_string()),
            _ if config.use_metadata_server => Self::Metadata {
                client: reqwest::Client::new(),
                url: config.metadata_token_url.clone(),
            },
            _ => Self::None,
        }
    }

    /// Obtain a bearer token.
    pub async fn token(&self) -> Result<String, AuthError> {
        match self {
            Self::Static(token) => Ok(token.clone()),
            Self::Metadata { client, url } => {
                debug!("Requesting access token from metadata server");
                let response = client
                    .get(url)
                    .header("Metadata-Flavor", "Google")
                    .send()
                    .await?;

                if !response.status().is_success() {
                    return Err(AuthError::Status(response.status().as_u16()));
                }

                let token: MetadataToken = response.json().await?;
                Ok(token.access_token)
            }
            Self::None => Err(AuthError::Missing),
        }
    }
}
