//! Idempotent file registry.
//!
//! A file's identity is derived from its normalized absolute path, so the
//! same file maps to the same identifier across runs and processes. The
//! registry row counts how often the file was processed. Registry failures
//! never block processing: they are logged and the computed identifier is
//! returned regardless.

use chrono::Utc;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::models::registry::{FileId, FileMetadata, FileRegistryEntry};
use crate::warehouse::Warehouse;

/// Normalize a path to an absolute form.
///
/// Existing files are canonicalized (symlinks resolved). Otherwise the path
/// is made absolute against the working directory and `.`/`..` components
/// are removed lexically.
pub fn normalize_path(path: &Path) -> PathBuf {
    if let Ok(canonical) = path.canonicalize() {
        return canonical;
    }

    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    };

    let mut normalized = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}

/// Identifier for a local file, stable for equivalent paths.
pub fn identify(path: &Path) -> FileId {
    let normalized = normalize_path(path);
    identify_key(&format!("file://{}", normalized.to_string_lossy()))
}

/// Identifier for an arbitrary identity key such as `gs://bucket/object`.
pub fn identify_key(key: &str) -> FileId {
    FileId::new(Uuid::new_v5(&Uuid::NAMESPACE_URL, key.as_bytes()).to_string())
}

/// Gather size and type for a local file.
pub async fn file_metadata(path: &Path, storage_path: impl Into<String>) -> FileMetadata {
    let file_size = tokio::fs::metadata(path)
        .await
        .map(|m| m.len())
        .unwrap_or(0);
    let original_filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let file_type = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    FileMetadata {
        original_filename,
        storage_path: storage_path.into(),
        file_size,
        file_type,
    }
}

/// Get-or-create bookkeeping over the warehouse registry table.
///
/// Lookup and insert are not atomic: two first-time calls for the same
/// path racing each other can both insert.
#[derive(Clone)]
pub struct FileRegistry {
    warehouse: Arc<dyn Warehouse>,
    refresh_metadata: bool,
}

impl FileRegistry {
    pub fn new(warehouse: Arc<dyn Warehouse>) -> Self {
        Self {
            warehouse,
            refresh_metadata: false,
        }
    }

    /// Replace size, type and storage path on every repeat registration.
    pub fn with_refresh_metadata(mut self, refresh: bool) -> Self {
        self.refresh_metadata = refresh;
        self
    }

    /// Register a local file by path. The storage path recorded is the
    /// normalized `file://` URI until the file is archived.
    pub async fn get_or_create(
        &self,
        path: &Path,
        production: bool,
        project: Option<&str>,
    ) -> FileId {
        let file_id = identify(path);
        let storage_path = format!("file://{}", normalize_path(path).to_string_lossy());
        let metadata = file_metadata(path, storage_path).await;
        self.register(file_id, metadata, production, project).await
    }

    /// Register a file under a precomputed identifier.
    pub async fn register(
        &self,
        file_id: FileId,
        metadata: FileMetadata,
        production: bool,
        project: Option<&str>,
    ) -> FileId {
        let now = Utc::now();

        match self.warehouse.find_file(&file_id).await {
            Ok(Some(existing)) => {
                let refresh = self.refresh_metadata.then_some(&metadata);
                match self.warehouse.record_processing(&file_id, now, refresh).await {
                    Ok(()) => debug!(
                        "File {} seen before, processing count now {}",
                        file_id,
                        existing.processing_count + 1
                    ),
                    Err(e) => warn!("Failed to update registry entry {}: {}", file_id, e),
                }
            }
            Ok(None) => {
                let entry = FileRegistryEntry {
                    file_id: file_id.clone(),
                    original_filename: metadata.original_filename,
                    storage_path: metadata.storage_path,
                    project_name: project.map(str::to_string),
                    file_size: metadata.file_size,
                    file_type: metadata.file_type,
                    upload_timestamp: now,
                    processing_count: 1,
                    last_processing_timestamp: now,
                    is_production: production,
                };
                match self.warehouse.insert_file(&entry).await {
                    Ok(()) => info!("Registered new file {} as {}", entry.original_filename, file_id),
                    Err(e) => warn!("Failed to register file {}: {}", file_id, e),
                }
            }
            Err(e) => warn!("Registry lookup for {} failed: {}", file_id, e),
        }

        file_id
    }
}
