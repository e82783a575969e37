//! Storage-trigger event handling.

use serde::{Deserialize, Serialize};
use tracing::{error, info};

use super::{Pipeline, ProcessRequest};
use crate::error::DocketError;
use crate::models::invoice::ProcessingResult;
use crate::storage::StorageLocator;

/// Object metadata delivered by a storage trigger. Only the bucket and
/// object name are used; other fields are ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageEvent {
    pub bucket: String,
    pub name: String,
}

impl StorageEvent {
    pub fn locator(&self) -> StorageLocator {
        StorageLocator::new(&self.bucket, &self.name)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum EventPayload {
    Envelope { data: StorageEvent },
    Direct(StorageEvent),
}

/// Parse either raw object metadata or a CloudEvent whose `data` is the
/// object metadata.
pub fn parse_event_payload(body: &[u8]) -> Result<StorageEvent, serde_json::Error> {
    let payload: EventPayload = serde_json::from_slice(body)?;
    Ok(match payload {
        EventPayload::Envelope { data } => data,
        EventPayload::Direct(event) => event,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    Success,
    Error,
}

/// Reply to a storage event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventResponse {
    pub status: EventStatus,

    /// Object name from the event.
    pub file: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<ProcessingResult>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl EventResponse {
    fn success(file: String, result: ProcessingResult) -> Self {
        Self {
            status: EventStatus::Success,
            file,
            result: Some(result),
            error: None,
        }
    }

    fn error(file: String, error: impl ToString) -> Self {
        Self {
            status: EventStatus::Error,
            file,
            result: None,
            error: Some(error.to_string()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == EventStatus::Success
    }
}

/// Download the event's object to a scratch directory, process it and
/// remove the scratch copy.
///
/// Objects in `production_bucket` are processed as production invoices.
/// Identity comes from the `gs://` URI, so repeated events for the same
/// object map to the same registry entry.
pub async fn handle_storage_event(
    pipeline: &Pipeline,
    event: &StorageEvent,
    production_bucket: &str,
) -> EventResponse {
    info!("Received storage event for gs://{}/{}", event.bucket, event.name);

    let result = match process_event(pipeline, event, production_bucket).await {
        Ok(result) => result,
        Err(e) => {
            error!("Failed to handle event for {}: {}", event.name, e);
            return EventResponse::error(event.name.clone(), e);
        }
    };

    if result.success {
        EventResponse::success(event.name.clone(), result)
    } else {
        let message = result.error.clone().unwrap_or_default();
        EventResponse {
            result: Some(result),
            ..EventResponse::error(event.name.clone(), message)
        }
    }
}

async fn process_event(
    pipeline: &Pipeline,
    event: &StorageEvent,
    production_bucket: &str,
) -> Result<ProcessingResult, DocketError> {
    if event.bucket.is_empty() || event.name.is_empty() {
        return Err(DocketError::Config(
            "storage event needs both bucket and name".to_string(),
        ));
    }

    let origin = event.locator();
    let scratch = tempfile::tempdir()?;
    let local = scratch.path().join(origin.file_name());

    pipeline.store().download(&origin, &local).await?;

    let request = ProcessRequest::new(&local)
        .production(!production_bucket.is_empty() && event.bucket == production_bucket)
        .origin(origin);
    let result = pipeline.process(request).await;

    scratch.close()?;
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_direct_payload() {
        let event = parse_event_payload(
            br#"{"bucket": "prod", "name": "in/a.pdf", "size": "1024", "contentType": "application/pdf"}"#,
        )
        .unwrap();
        assert_eq!(event, StorageEvent { bucket: "prod".into(), name: "in/a.pdf".into() });
    }

    #[test]
    fn test_parse_cloud_event() {
        let event = parse_event_payload(
            br#"{"specversion": "1.0", "type": "google.cloud.storage.object.v1.finalized",
                "data": {"bucket": "prod", "name": "a.pdf"}}"#,
        )
        .unwrap();
        assert_eq!(event.locator().to_string(), "gs://prod/a.pdf");
    }

    #[test]
    fn test_parse_invalid_payload() {
        assert!(parse_event_payload(br#"{"bucket": "prod"}"#).is_err());
        assert!(parse_event_payload(b"not json").is_err());
    }

    #[test]
    fn test_response_shape() {
        let response = EventResponse::error("a.pdf".into(), "boom");
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["status"], "error");
        assert_eq!(json["file"], "a.pdf");
        assert_eq!(json["error"], "boom");
        assert!(json.get("result").is_none());
    }
}
