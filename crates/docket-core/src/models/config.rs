//! Configuration structures for the ingestion pipeline.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::DocketError;

/// Main configuration for the docket pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DocketConfig {
    /// Google Cloud project and credentials.
    pub gcp: GcpConfig,

    /// Object storage configuration.
    pub storage: StorageConfig,

    /// Document extraction service configuration.
    pub extraction: ExtractionConfig,

    /// LLM refinement configuration.
    pub llm: LlmConfig,

    /// Warehouse configuration.
    pub warehouse: WarehouseConfig,

    /// File registry behaviour.
    pub registry: RegistryConfig,
}

/// Project and authentication settings shared by all collaborators.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GcpConfig {
    /// Project id.
    pub project_id: String,

    /// Default region.
    pub location: String,

    /// Static OAuth access token. Takes precedence over the metadata server.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,

    /// Fetch tokens from the metadata server when no static token is set.
    pub use_metadata_server: bool,

    /// Metadata server token endpoint.
    pub metadata_token_url: String,
}

impl Default for GcpConfig {
    fn default() -> Self {
        Self {
            project_id: String::new(),
            location: "us-east4".to_string(),
            access_token: None,
            use_metadata_server: true,
            metadata_token_url: "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token".to_string(),
        }
    }
}

/// Object storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Bucket receiving production invoices.
    pub production_bucket: String,

    /// Bucket receiving ad-hoc invoices.
    pub adhoc_bucket: String,

    /// Object prefix for ad-hoc uploads.
    pub adhoc_prefix: String,

    /// Object prefix for production uploads (empty keeps the path as-is).
    pub production_prefix: String,

    /// JSON API base URL.
    pub endpoint: String,

    /// Request timeout in seconds.
    pub timeout_secs: u64,

    /// Local directory used in place of the bucket for dry runs.
    pub local_root: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            production_bucket: String::new(),
            adhoc_bucket: String::new(),
            adhoc_prefix: "adhoc".to_string(),
            production_prefix: String::new(),
            endpoint: "https://storage.googleapis.com".to_string(),
            timeout_secs: 120,
            local_root: PathBuf::from("docket-archive"),
        }
    }
}

/// Document extraction configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Processor id of the invoice parser.
    pub processor_id: String,

    /// Processor location (`us`, `eu`).
    pub location: String,

    /// Base URL override. Defaults to the regional endpoint.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            processor_id: String::new(),
            location: "us".to_string(),
            endpoint: None,
            timeout_secs: 300,
        }
    }
}

impl ExtractionConfig {
    /// Base URL of the extraction API.
    pub fn base_url(&self) -> String {
        self.endpoint
            .clone()
            .unwrap_or_else(|| format!("https://{}-documentai.googleapis.com", self.location))
    }
}

/// LLM refinement configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Run the refinement step.
    pub enabled: bool,

    /// Model name.
    pub model: String,

    /// API key.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// API base URL.
    pub endpoint: String,

    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            model: "gemini-1.5-pro".to_string(),
            api_key: None,
            endpoint: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            timeout_secs: 120,
        }
    }
}

/// Warehouse configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WarehouseConfig {
    /// Dataset holding both tables.
    pub dataset: String,

    /// Invoice table name.
    pub invoices_table: String,

    /// File registry table name.
    pub registry_table: String,

    /// Service account key file. Application default credentials when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credentials_path: Option<PathBuf>,

    /// Create the dataset and tables on startup.
    pub ensure_tables: bool,
}

impl Default for WarehouseConfig {
    fn default() -> Self {
        Self {
            dataset: "invoices".to_string(),
            invoices_table: "processed_invoices".to_string(),
            registry_table: "file_inventory".to_string(),
            credentials_path: None,
            ensure_tables: true,
        }
    }
}

/// File registry behaviour.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Refresh size, type and storage path on every re-encounter.
    pub refresh_metadata: bool,
}

impl DocketConfig {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, std::io::Error> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))
    }

    /// Save configuration to a JSON file.
    pub fn save(&self, path: &Path) -> Result<(), std::io::Error> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))?;
        std::fs::write(path, content)
    }

    /// Override settings from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_env_with(|key| std::env::var(key).ok());
    }

    /// Override settings from `lookup`, which maps variable names to values.
    pub fn apply_env_with<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("GCP_PROJECT_ID") {
            self.gcp.project_id = v;
        }
        if let Some(v) = get("GCP_LOCATION") {
            self.gcp.location = v;
        }
        if let Some(v) = get("GCP_ACCESS_TOKEN") {
            self.gcp.access_token = Some(v);
        }
        if let Some(v) = get("GCS_PRODUCTION_BUCKET_NAME") {
            self.storage.production_bucket = v;
        }
        if let Some(v) = get("GCS_ADHOC_BUCKET_NAME") {
            self.storage.adhoc_bucket = v;
        }
        if let Some(v) = get("DOCUMENT_AI_PROCESSOR_ID") {
            self.extraction.processor_id = v;
        }
        if let Some(v) = get("DOCUMENT_AI_LOCATION") {
            self.extraction.location = v;
        }
        if let Some(v) = get("PROCESSING_TIMEOUT").and_then(|v| v.parse().ok()) {
            self.extraction.timeout_secs = v;
        }
        if let Some(v) = get("USE_GEMINI").and_then(|v| parse_bool(&v)) {
            self.llm.enabled = v;
        }
        if let Some(v) = get("GEMINI_MODEL") {
            self.llm.model = v;
        }
        if let Some(v) = get("GEMINI_API_KEY") {
            self.llm.api_key = Some(v);
        }
        if let Some(v) = get("BIGQUERY_DATASET") {
            self.warehouse.dataset = v;
        }
        if let Some(v) = get("BIGQUERY_TABLE") {
            self.warehouse.invoices_table = v;
        }
        if let Some(v) = get("GOOGLE_APPLICATION_CREDENTIALS") {
            self.warehouse.credentials_path = Some(PathBuf::from(v));
        }
    }

    /// Check that the settings needed for a run are present.
    ///
    /// A dry run skips the storage and warehouse requirements.
    pub fn validate(&self, dry_run: bool) -> Result<(), DocketError> {
        let mut missing = Vec::new();

        if self.extraction.processor_id.is_empty() {
            missing.push("extraction.processor_id (DOCUMENT_AI_PROCESSOR_ID)");
        }
        if self.gcp.project_id.is_empty() {
            missing.push("gcp.project_id (GCP_PROJECT_ID)");
        }
        if !dry_run {
            if self.storage.production_bucket.is_empty() {
                missing.push("storage.production_bucket (GCS_PRODUCTION_BUCKET_NAME)");
            }
            if self.storage.adhoc_bucket.is_empty() {
                missing.push("storage.adhoc_bucket (GCS_ADHOC_BUCKET_NAME)");
            }
            if self.warehouse.dataset.is_empty() {
                missing.push("warehouse.dataset (BIGQUERY_DATASET)");
            }
        }
        if self.llm.enabled && self.llm.api_key.is_none() {
            missing.push("llm.api_key (GEMINI_API_KEY)");
        }

        if missing.is_empty() {
            Ok(())
        } else {
            Err(DocketError::Config(format!(
                "missing settings: {}",
                missing.join(", ")
            )))
        }
    }
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_env_overrides() {
        let vars = env(&[
            ("GCP_PROJECT_ID", "acme-prod"),
            ("GCS_PRODUCTION_BUCKET_NAME", "acme-invoices"),
            ("GCS_ADHOC_BUCKET_NAME", "acme-adhoc"),
            ("DOCUMENT_AI_PROCESSOR_ID", "abc123"),
            ("USE_GEMINI", "false"),
            ("BIGQUERY_TABLE", "invoices_v2"),
        ]);

        let mut config = DocketConfig::default();
        config.apply_env_with(|k| vars.get(k).cloned());

        assert_eq!(config.gcp.project_id, "acme-prod");
        assert_eq!(config.storage.production_bucket, "acme-invoices");
        assert_eq!(config.extraction.processor_id, "abc123");
        assert!(!config.llm.enabled);
        assert_eq!(config.warehouse.invoices_table, "invoices_v2");
        assert!(config.validate(false).is_ok());
    }

    #[test]
    fn test_blank_env_is_ignored() {
        let vars = env(&[("GEMINI_MODEL", "  ")]);
        let mut config = DocketConfig::default();
        config.apply_env_with(|k| vars.get(k).cloned());
        assert_eq!(config.llm.model, "gemini-1.5-pro");
    }

    #[test]
    fn test_validate_lists_missing() {
        let config = DocketConfig::default();
        let err = config.validate(false).unwrap_err().to_string();
        assert!(err.contains("DOCUMENT_AI_PROCESSOR_ID"));
        assert!(err.contains("GEMINI_API_KEY"));
        assert!(err.contains("GCS_PRODUCTION_BUCKET_NAME"));
    }

    #[test]
    fn test_dry_run_skips_storage_requirements() {
        let mut config = DocketConfig::default();
        config.gcp.project_id = "p".into();
        config.extraction.processor_id = "x".into();
        config.llm.enabled = false;
        assert!(config.validate(true).is_ok());
        assert!(config.validate(false).is_err());
    }

    #[test]
    fn test_round_trip_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let mut config = DocketConfig::default();
        config.storage.adhoc_bucket = "scratch".into();
        config.save(&path).unwrap();

        let loaded = DocketConfig::from_file(&path).unwrap();
        assert_eq!(loaded.storage.adhoc_bucket, "scratch");
        assert_eq!(loaded.warehouse.registry_table, "file_inventory");
    }

    #[test]
    fn test_extraction_base_url() {
        let mut config = ExtractionConfig::default();
        assert_eq!(config.base_url(), "https://us-documentai.googleapis.com");
        config.endpoint = Some("http://localhost:9000".into());
        assert_eq!(config.base_url(), "http://localhost:9000");
    }
}
