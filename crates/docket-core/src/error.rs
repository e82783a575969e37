//! Error types for the docket-core library.

use thiserror::Error;

/// Main error type for the docket library.
#[derive(Error, Debug)]
pub enum DocketError {
    /// Document extraction service error.
    #[error("extraction error: {0}")]
    Extraction(#[from] ExtractionError),

    /// Object storage error.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Warehouse error.
    #[error("warehouse error: {0}")]
    Warehouse(#[from] WarehouseError),

    /// LLM refinement error.
    #[error("refinement error: {0}")]
    Refine(#[from] RefineError),

    /// Authentication error.
    #[error("auth error: {0}")]
    Auth(#[from] AuthError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

/// Errors from the document extraction service.
#[derive(Error, Debug)]
pub enum ExtractionError {
    /// The request could not be sent or the connection failed.
    #[error("extraction request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The service answered with a non-success status.
    #[error("extraction service returned {status}: {body}")]
    Api { status: u16, body: String },

    /// The response body did not have the expected shape.
    #[error("malformed extraction response: {0}")]
    Malformed(String),

    /// The document type is not accepted by the extraction service.
    #[error("unsupported document type: {0}")]
    UnsupportedType(String),

    /// Failed to read the local document.
    #[error("failed to read document: {0}")]
    Io(#[from] std::io::Error),

    /// Authorization failed before the request could be made.
    #[error(transparent)]
    Auth(#[from] AuthError),
}

/// Errors from the object store.
#[derive(Error, Debug)]
pub enum StorageError {
    /// The request could not be sent or the connection failed.
    #[error("storage request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The service answered with a non-success status.
    #[error("storage service returned {status}: {body}")]
    Api { status: u16, body: String },

    /// The locator is not a valid `gs://bucket/object` URI.
    #[error("invalid storage locator: {0}")]
    InvalidLocator(String),

    /// Local file I/O failed.
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Authorization failed before the request could be made.
    #[error(transparent)]
    Auth(#[from] AuthError),
}

/// Errors from the warehouse.
#[derive(Error, Debug)]
pub enum WarehouseError {
    /// Query or insert failed at the service.
    #[error("warehouse query failed: {0}")]
    Query(String),

    /// Rows were rejected by a streaming insert.
    #[error("rows rejected by {table}: {details}")]
    InsertRejected { table: String, details: String },

    /// A row could not be encoded.
    #[error("failed to encode row: {0}")]
    Encode(#[from] serde_json::Error),

    /// Client could not be created.
    #[error("warehouse client setup failed: {0}")]
    Setup(String),
}

/// Errors from the LLM refinement step.
///
/// These never fail a pipeline run; the processor falls back to the
/// unrefined record.
#[derive(Error, Debug)]
pub enum RefineError {
    /// The request could not be sent or the connection failed.
    #[error("LLM request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The service answered with a non-success status.
    #[error("LLM service returned {status}: {body}")]
    Api { status: u16, body: String },

    /// The service returned no candidate text.
    #[error("LLM response was empty")]
    Empty,

    /// The candidate text was not a JSON object or array.
    #[error("LLM response is not valid JSON: {0}")]
    InvalidJson(String),

    /// The JSON carried none of the expected invoice keys.
    #[error("LLM response has none of the expected fields")]
    MissingFields,
}

/// Errors obtaining a bearer token.
#[derive(Error, Debug)]
pub enum AuthError {
    /// Token endpoint could not be reached.
    #[error("token request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Token endpoint answered with a non-success status.
    #[error("token endpoint returned {0}")]
    Status(u16),

    /// No static token configured and metadata server disabled.
    #[error("no access token configured")]
    Missing,
}

/// Result type for the docket library.
pub type Result<T> = std::result::Result<T, DocketError>;
