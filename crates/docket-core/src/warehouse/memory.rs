use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::{Mutex, MutexGuard};

use super::{InvoiceRow, Result, Warehouse};
use crate::models::registry::{FileId, FileMetadata, FileRegistryEntry};

#[derive(Debug, Default)]
struct Tables {
    invoices: Vec<InvoiceRow>,
    files: Vec<FileRegistryEntry>,
}

/// In-memory warehouse for dry runs and tests.
#[derive(Debug, Default)]
pub struct MemoryWarehouse {
    tables: Mutex<Tables>,
}

impl MemoryWarehouse {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// All invoice rows in insertion order.
    pub fn invoices(&self) -> Vec<InvoiceRow> {
        self.tables().invoices.clone()
    }

    /// All registry rows in insertion order.
    pub fn files(&self) -> Vec<FileRegistryEntry> {
        self.tables().files.clone()
    }
}

#[async_trait]
impl Warehouse for MemoryWarehouse {
    async fn ensure_tables(&self) -> Result<()> {
        Ok(())
    }

    async fn insert_invoice(&self, row: &InvoiceRow) -> Result<()> {
        self.tables().invoices.push(row.clone());
        Ok(())
    }

    async fn find_file(&self, file_id: &FileId) -> Result<Option<FileRegistryEntry>> {
        Ok(self
            .tables()
            .files
            .iter()
            .find(|f| &f.file_id == file_id)
            .cloned())
    }

    async fn insert_file(&self, entry: &FileRegistryEntry) -> Result<()> {
        self.tables().files.push(entry.clone());
        Ok(())
    }

    async fn record_processing(
        &self,
        file_id: &FileId,
        at: DateTime<Utc>,
        metadata: Option<&FileMetadata>,
    ) -> Result<()> {
        let mut tables = self.tables();
        for entry in tables.files.iter_mut().filter(|f| &f.file_id == file_id) {
            entry.processing_count += 1;
            entry.last_processing_timestamp = at;
            if let Some(meta) = metadata {
                entry.file_size = meta.file_size;
                entry.file_type = meta.file_type.clone();
                entry.storage_path = meta.storage_path.clone();
            }
        }
        Ok(())
    }
}
