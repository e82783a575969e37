//! File registry models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a registered file, UUID-shaped.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileId(String);

impl FileId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One row of the file inventory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRegistryEntry {
    pub file_id: FileId,

    pub original_filename: String,

    /// Where the archived copy lives.
    pub storage_path: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_name: Option<String>,

    /// Size in bytes.
    pub file_size: u64,

    /// Lower-case extension, e.g. `pdf`.
    pub file_type: String,

    /// First time the path was seen.
    pub upload_timestamp: DateTime<Utc>,

    /// Number of times the path has been processed.
    pub processing_count: u64,

    pub last_processing_timestamp: DateTime<Utc>,

    pub is_production: bool,
}

/// File facts gathered at processing time.
#[derive(Debug, Clone, PartialEq)]
pub struct FileMetadata {
    pub original_filename: String,
    pub storage_path: String,
    pub file_size: u64,
    pub file_type: String,
}
