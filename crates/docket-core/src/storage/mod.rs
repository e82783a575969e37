//! Archival object storage.

mod gcs;
mod local;

pub use gcs::GcsStore;
pub use local::LocalStore;

use async_trait::async_trait;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use crate::error::StorageError;
use crate::models::config::StorageConfig;
use crate::models::registry::FileId;

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// A `gs://bucket/object` address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StorageLocator {
    pub bucket: String,
    pub object: String,
}

impl StorageLocator {
    pub fn new(bucket: impl Into<String>, object: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            object: object.into(),
        }
    }

    /// Last path segment of the object name.
    pub fn file_name(&self) -> &str {
        self.object.rsplit('/').next().unwrap_or(&self.object)
    }
}

impl fmt::Display for StorageLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "gs://{}/{}", self.bucket, self.object)
    }
}

impl FromStr for StorageLocator {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self> {
        let rest = s
            .strip_prefix("gs://")
            .ok_or_else(|| StorageError::InvalidLocator(s.to_string()))?;
        match rest.split_once('/') {
            Some((bucket, object)) if !bucket.is_empty() && !object.is_empty() => {
                Ok(Self::new(bucket, object))
            }
            _ => Err(StorageError::InvalidLocator(s.to_string())),
        }
    }
}

/// Uploads and downloads whole files.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Copy a local file to `locator`, replacing any existing object.
    async fn upload(&self, local: &Path, locator: &StorageLocator) -> Result<()>;

    /// Copy the object at `locator` to a local file.
    async fn download(&self, locator: &StorageLocator, dest: &Path) -> Result<()>;

    /// Objects in `bucket` whose names start with `prefix`, sorted by name.
    async fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<StorageLocator>>;

    /// Remove the object at `locator`.
    async fn delete(&self, locator: &StorageLocator) -> Result<()>;
}

/// Decides where a file is archived.
#[derive(Debug, Clone)]
pub struct StorageLayout {
    production_bucket: String,
    production_prefix: String,
    adhoc_bucket: String,
    adhoc_prefix: String,
}

impl StorageLayout {
    pub fn new(config: &StorageConfig) -> Self {
        Self {
            production_bucket: config.production_bucket.clone(),
            production_prefix: config.production_prefix.trim_matches('/').to_string(),
            adhoc_bucket: config.adhoc_bucket.clone(),
            adhoc_prefix: config.adhoc_prefix.trim_matches('/').to_string(),
        }
    }

    /// Locator for a file.
    ///
    /// Files downloaded from the bucket they would be archived in keep their
    /// object. Otherwise production files mirror their normalized path under
    /// the production prefix, and ad-hoc files are namespaced by identifier
    /// so equal basenames never collide.
    pub fn locate(
        &self,
        file_id: &FileId,
        normalized_path: &Path,
        production: bool,
        origin: Option<&StorageLocator>,
    ) -> StorageLocator {
        let target = if production {
            &self.production_bucket
        } else {
            &self.adhoc_bucket
        };
        if let Some(origin) = origin.filter(|o| &o.bucket == target) {
            return origin.clone();
        }

        if production {
            let relative = path_object(normalized_path);
            let object = join_object(&self.production_prefix, &relative);
            StorageLocator::new(&self.production_bucket, object)
        } else {
            let file_name = origin
                .map(|o| o.file_name().to_string())
                .or_else(|| {
                    normalized_path
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                })
                .unwrap_or_else(|| file_id.to_string());
            let object = join_object(
                &self.adhoc_prefix,
                &format!("{}/{}", file_id, file_name),
            );
            StorageLocator::new(&self.adhoc_bucket, object)
        }
    }
}

/// Content type for an upload.
pub(crate) fn mime_type(path: &Path) -> &'static str {
    crate::extraction::mime_type_for(path).unwrap_or("application/octet-stream")
}

/// Path components joined with `/`, without any root or drive prefix.
fn path_object(path: &Path) -> String {
    use std::path::Component;

    path.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

fn join_object(prefix: &str, rest: &str) -> String {
    if prefix.is_empty() {
        rest.to_string()
    } else {
        format!("{}/{}", prefix, rest)
    }
}
