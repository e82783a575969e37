use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gcp_bigquery_client::Client;
use gcp_bigquery_client::model::query_parameter::QueryParameter;
use gcp_bigquery_client::model::query_parameter_type::QueryParameterType;
use gcp_bigquery_client::model::query_parameter_value::QueryParameterValue;
use gcp_bigquery_client::model::query_request::QueryRequest;
use gcp_bigquery_client::model::query_response::ResultSet;
use gcp_bigquery_client::model::table_data_insert_all_request::TableDataInsertAllRequest;
use serde_json::Value;
use std::fmt;
use tracing::{debug, info};

use super::{InvoiceRow, Result, Warehouse};
use crate::error::WarehouseError;
use crate::models::config::{GcpConfig, WarehouseConfig};
use crate::models::registry::{FileId, FileMetadata, FileRegistryEntry};

/// BigQuery-backed warehouse.
///
/// Invoices are appended with streaming inserts. Registry rows are written
/// with DML so the processing counter can be updated right after creation.
pub struct BigQueryWarehouse {
    client: Client,
    project_id: String,
    dataset: String,
    invoices_table: String,
    registry_table: String,
    location: String,
}

impl BigQueryWarehouse {
    /// Connect with the configured service-account key, or application
    /// default credentials when none is set.
    pub async fn connect(gcp: &GcpConfig, config: &WarehouseConfig) -> Result<Self> {
        let client = match &config.credentials_path {
            Some(path) => Client::from_service_account_key_file(&path.to_string_lossy()).await,
            None => Client::from_application_default_credentials().await,
        }
        .map_err(|e| WarehouseError::Setup(e.to_string()))?;

        Ok(Self {
            client,
            project_id: gcp.project_id.clone(),
            dataset: config.dataset.clone(),
            invoices_table: config.invoices_table.clone(),
            registry_table: config.registry_table.clone(),
            location: gcp.location.clone(),
        })
    }

    fn table_ref(&self, table: &str) -> String {
        format!("`{}.{}.{}`", self.project_id, self.dataset, table)
    }

    async fn run(&self, sql: String, params: Vec<QueryParameter>) -> Result<ResultSet> {
        debug!("Executing BigQuery SQL: {}", sql);
        let request = QueryRequest {
            query: sql,
            query_parameters: (!params.is_empty()).then_some(params),
            parameter_mode: Some("NAMED".to_string()),
            use_legacy_sql: false,
            ..Default::default()
        };

        let response = self
            .client
            .job()
            .query(&self.project_id, request)
            .await
            .map_err(|e| WarehouseError::Query(e.to_string()))?;

        Ok(ResultSet::new_from_query_response(response))
    }

    /// Replace `{invoices}` and `{registry}` with the configured table
    /// references.
    pub fn expand_tables(&self, sql: &str) -> String {
        expand_table_refs(
            sql,
            &self.table_ref(&self.invoices_table),
            &self.table_ref(&self.registry_table),
        )
    }

    /// Run an ad-hoc query and return each row as a JSON object keyed by
    /// column name.
    pub async fn query(&self, sql: &str) -> Result<Vec<Value>> {
        let mut rows = self.run(self.expand_tables(sql), Vec::new()).await?;
        let column_names = rows.column_names();

        let mut results = Vec::new();
        while rows.next_row() {
            let mut row = serde_json::Map::new();
            for name in &column_names {
                let value = rows
                    .get_json_value_by_name(name)
                    .ok()
                    .flatten()
                    .unwrap_or(Value::Null);
                row.insert(name.clone(), value);
            }
            results.push(Value::Object(row));
        }

        info!("Query returned {} row(s)", results.len());
        Ok(results)
    }

    fn invoices_ddl(&self) -> String {
        format!(
            "CREATE TABLE IF NOT EXISTS {} (
  invoice_id STRING NOT NULL,
  invoice_number STRING,
  invoice_date DATE,
  due_date DATE,
  total_amount FLOAT64,
  vendor_name STRING,
  vendor_address STRING,
  storage_path STRING NOT NULL,
  is_production BOOL NOT NULL,
  original_filename STRING NOT NULL,
  project_name STRING,
  line_items ARRAY<STRUCT<description STRING, quantity FLOAT64, unit_price FLOAT64, amount FLOAT64>>,
  payment_terms STRING,
  notes STRING,
  processing_timestamp TIMESTAMP NOT NULL,
  raw_data STRING
)",
            self.table_ref(&self.invoices_table)
        )
    }

    fn registry_ddl(&self) -> String {
        format!(
            "CREATE TABLE IF NOT EXISTS {} (
  file_id STRING NOT NULL,
  original_filename STRING NOT NULL,
  storage_path STRING NOT NULL,
  project_name STRING,
  file_size INT64,
  file_type STRING,
  upload_timestamp TIMESTAMP NOT NULL,
  processing_count INT64 NOT NULL,
  last_processing_timestamp TIMESTAMP NOT NULL,
  is_production BOOL
)",
            self.table_ref(&self.registry_table)
        )
    }
}

impl fmt::Debug for BigQueryWarehouse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BigQueryWarehouse")
            .field("project_id", &self.project_id)
            .field("dataset", &self.dataset)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Warehouse for BigQueryWarehouse {
    async fn ensure_tables(&self) -> Result<()> {
        let schema = format!(
            "CREATE SCHEMA IF NOT EXISTS `{}.{}` OPTIONS (location = '{}')",
            self.project_id, self.dataset, self.location
        );
        for sql in [schema, self.invoices_ddl(), self.registry_ddl()] {
            self.run(sql, Vec::new())
                .await
                .map_err(|e| WarehouseError::Setup(e.to_string()))?;
        }
        info!("Warehouse tables ready in {}.{}", self.project_id, self.dataset);
        Ok(())
    }

    async fn insert_invoice(&self, row: &InvoiceRow) -> Result<()> {
        let mut request = TableDataInsertAllRequest::new();
        request
            .add_row(Some(row.invoice_id.clone()), row)
            .map_err(|e| WarehouseError::Query(e.to_string()))?;

        let response = self
            .client
            .tabledata()
            .insert_all(&self.project_id, &self.dataset, &self.invoices_table, request)
            .await
            .map_err(|e| WarehouseError::Query(e.to_string()))?;

        match response.insert_errors {
            Some(errors) if !errors.is_empty() => Err(WarehouseError::InsertRejected {
                table: self.invoices_table.clone(),
                details: format!("{:?}", errors),
            }),
            _ => {
                debug!("Inserted invoice row {}", row.invoice_id);
                Ok(())
            }
        }
    }

    async fn find_file(&self, file_id: &FileId) -> Result<Option<FileRegistryEntry>> {
        let sql = format!(
            "SELECT file_id, original_filename, storage_path, project_name, file_size, file_type, \
             upload_timestamp, processing_count, last_processing_timestamp, is_production \
             FROM {} WHERE file_id = @file_id LIMIT 1",
            self.table_ref(&self.registry_table)
        );
        let mut rows = self
            .run(sql, vec![param("file_id", "STRING", Some(file_id.to_string()))])
            .await?;

        if !rows.next_row() {
            return Ok(None);
        }

        let column = |name: &str| -> Value {
            rows.get_json_value_by_name(name)
                .ok()
                .flatten()
                .unwrap_or(Value::Null)
        };

        Ok(Some(FileRegistryEntry {
            file_id: file_id.clone(),
            original_filename: value_string(&column("original_filename")).unwrap_or_default(),
            storage_path: value_string(&column("storage_path")).unwrap_or_default(),
            project_name: value_string(&column("project_name")),
            file_size: value_u64(&column("file_size")),
            file_type: value_string(&column("file_type")).unwrap_or_default(),
            upload_timestamp: value_timestamp(&column("upload_timestamp")),
            processing_count: value_u64(&column("processing_count")),
            last_processing_timestamp: value_timestamp(&column("last_processing_timestamp")),
            is_production: value_bool(&column("is_production")),
        }))
    }

    async fn insert_file(&self, entry: &FileRegistryEntry) -> Result<()> {
        let sql = format!(
            "INSERT INTO {} (file_id, original_filename, storage_path, project_name, file_size, \
             file_type, upload_timestamp, processing_count, last_processing_timestamp, is_production) \
             VALUES (@file_id, @original_filename, @storage_path, @project_name, @file_size, \
             @file_type, @upload_timestamp, @processing_count, @last_processing_timestamp, @is_production)",
            self.table_ref(&self.registry_table)
        );
        let params = vec![
            param("file_id", "STRING", Some(entry.file_id.to_string())),
            param("original_filename", "STRING", Some(entry.original_filename.clone())),
            param("storage_path", "STRING", Some(entry.storage_path.clone())),
            param("project_name", "STRING", entry.project_name.clone()),
            param("file_size", "INT64", Some(entry.file_size.to_string())),
            param("file_type", "STRING", Some(entry.file_type.clone())),
            param("upload_timestamp", "TIMESTAMP", Some(timestamp(entry.upload_timestamp))),
            param("processing_count", "INT64", Some(entry.processing_count.to_string())),
            param(
                "last_processing_timestamp",
                "TIMESTAMP",
                Some(timestamp(entry.last_processing_timestamp)),
            ),
            param("is_production", "BOOL", Some(entry.is_production.to_string())),
        ];
        self.run(sql, params).await?;
        Ok(())
    }

    async fn record_processing(
        &self,
        file_id: &FileId,
        at: DateTime<Utc>,
        metadata: Option<&FileMetadata>,
    ) -> Result<()> {
        let mut params = vec![
            param("file_id", "STRING", Some(file_id.to_string())),
            param("timestamp", "TIMESTAMP", Some(timestamp(at))),
        ];
        let mut assignments = String::from(
            "processing_count = processing_count + 1, last_processing_timestamp = @timestamp",
        );

        if let Some(meta) = metadata {
            assignments.push_str(
                ", file_size = @file_size, file_type = @file_type, storage_path = @storage_path",
            );
            params.push(param("file_size", "INT64", Some(meta.file_size.to_string())));
            params.push(param("file_type", "STRING", Some(meta.file_type.clone())));
            params.push(param("storage_path", "STRING", Some(meta.storage_path.clone())));
        }

        let sql = format!(
            "UPDATE {} SET {} WHERE file_id = @file_id",
            self.table_ref(&self.registry_table),
            assignments
        );
        self.run(sql, params).await?;
        Ok(())
    }
}

/// A named scalar parameter. `None` binds SQL NULL.
fn expand_table_refs(sql: &str, invoices: &str, registry: &str) -> String {
    sql.replace("{invoices}", invoices).replace("{registry}", registry)
}

fn param(name: &str, kind: &str, value: Option<String>) -> QueryParameter {
    QueryParameter {
        name: Some(name.to_string()),
        parameter_type: Some(QueryParameterType {
            r#type: kind.to_string(),
            array_type: None,
            struct_types: None,
        }),
        parameter_value: Some(QueryParameterValue {
            value,
            array_values: None,
            struct_values: None,
        }),
    }
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M:%S%.6f+00:00").to_string()
}

fn value_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn value_u64(value: &Value) -> u64 {
    match value {
        Value::String(s) => s.parse().unwrap_or(0),
        Value::Number(n) => n.as_u64().unwrap_or(0),
        _ => 0,
    }
}

fn value_bool(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::String(s) => s.eq_ignore_ascii_case("true"),
        _ => false,
    }
}

/// Query results encode timestamps as epoch seconds, e.g. `"1.7053056E9"`.
fn value_timestamp(value: &Value) -> DateTime<Utc> {
    let seconds = match value {
        Value::String(s) => {
            if let Ok(t) = DateTime::parse_from_rfc3339(s) {
                return t.with_timezone(&Utc);
            }
            s.parse::<f64>().ok()
        }
        Value::Number(n) => n.as_f64(),
        _ => None,
    };

    seconds
        .and_then(|s| {
            let whole = s.trunc() as i64;
            let nanos = ((s - s.trunc()) * 1e9).round() as u32;
            DateTime::<Utc>::from_timestamp(whole, nanos.min(999_999_999))
        })
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_param_shape() {
        let p = param("file_id", "STRING", Some("abc".into()));
        let json = serde_json::to_value(&p).unwrap();
        assert_eq!(json["name"], "file_id");
        assert_eq!(json["parameterType"]["type"], "STRING");
        assert_eq!(json["parameterValue"]["value"], "abc");
    }

    #[test]
    fn test_timestamp_format() {
        let at = DateTime::<Utc>::from_timestamp(1_705_312_800, 0).unwrap();
        assert_eq!(timestamp(at), "2024-01-15 10:00:00.000000+00:00");
    }

    #[test]
    fn test_value_timestamp() {
        let expected = DateTime::<Utc>::from_timestamp(1_705_312_800, 0).unwrap();
        assert_eq!(value_timestamp(&json!("1.7053128E9")), expected);
        assert_eq!(value_timestamp(&json!("2024-01-15T10:00:00Z")), expected);
        assert_eq!(value_timestamp(&Value::Null), DateTime::<Utc>::UNIX_EPOCH);
    }

    #[test]
    fn test_value_conversions() {
        assert_eq!(value_u64(&json!("3")), 3);
        assert_eq!(value_u64(&json!(4)), 4);
        assert_eq!(value_u64(&Value::Null), 0);
        assert!(value_bool(&json!("true")));
        assert!(value_bool(&json!(true)));
        assert!(!value_bool(&Value::Null));
        assert_eq!(value_string(&Value::Null), None);
    }

    #[test]
    fn test_expand_table_refs() {
        let sql = expand_table_refs(
            "SELECT i.invoice_number FROM {invoices} i JOIN {registry} f ON i.invoice_id = f.file_id",
            "`p.d.processed_invoices`",
            "`p.d.file_inventory`",
        );
        assert_eq!(
            sql,
            "SELECT i.invoice_number FROM `p.d.processed_invoices` i JOIN `p.d.file_inventory` f ON i.invoice_id = f.file_id"
        );
        assert_eq!(expand_table_refs("SELECT 1", "a", "b"), "SELECT 1");
    }
}
