//! Error types for the sync server.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use drivesync_core::CoreError;
use drivesync_storage::StorageError;
use drivesync_sync_protocol::ProtocolError;
use serde_json::{json, Map, Value};
use thiserror::Error;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that can occur in the sync server.
#[derive(Error, Debug)]
pub enum ServerError {
    /// Invalid request format.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// No usable sync key was presented.
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// A share credential was missing, invalid or out of scope.
    #[error("not authorized: {0}")]
    NotAuthorized(String),

    /// Unknown share token.
    #[error("unknown share")]
    UnknownShare,

    /// The share has passed its expiry.
    #[error("share expired")]
    ShareExpired,

    /// Engine error.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Download range outside the file.
    #[error("range not satisfiable for {size} bytes")]
    RangeNotSatisfiable {
        /// File size.
        size: u64,
    },

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),

    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<StorageError> for ServerError {
    fn from(err: StorageError) -> Self {
        Self::Core(err.into())
    }
}

impl From<ProtocolError> for ServerError {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::RangeNotSatisfiable { size } => Self::RangeNotSatisfiable { size },
            other => Self::InvalidRequest(other.to_string()),
        }
    }
}

impl From<JsonRejection> for ServerError {
    fn from(rejection: JsonRejection) -> Self {
        Self::InvalidRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ServerError {
    fn from(rejection: QueryRejection) -> Self {
        Self::InvalidRequest(rejection.body_text())
    }
}

impl ServerError {
    /// Returns true if this is a client error (4xx).
    pub fn is_client_error(&self) -> bool {
        self.status_code().is_client_error()
    }

    /// Returns true if this is a server error (5xx).
    pub fn is_server_error(&self) -> bool {
        self.status_code().is_server_error()
    }

    /// Machine readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            ServerError::InvalidRequest(_) => "invalid_request",
            ServerError::AuthenticationFailed(_) => "unauthenticated",
            ServerError::NotAuthorized(_) => "forbidden",
            ServerError::UnknownShare => "unknown_share",
            ServerError::ShareExpired => "share_expired",
            ServerError::RangeNotSatisfiable { .. } => "range_not_satisfiable",
            ServerError::Internal(_) | ServerError::Io(_) => "internal",
            ServerError::Core(err) => match err {
                CoreError::InvalidPath { .. } => "invalid_path",
                CoreError::InvalidMetadata { .. } => "invalid_metadata",
                CoreError::UnknownUpload { .. } => "unknown_upload",
                CoreError::OffsetAhead { .. } => "offset_ahead",
                CoreError::EmptyChunk => "empty_chunk",
                CoreError::ChunkOverflow { .. } => "chunk_overflow",
                CoreError::IncompleteUpload { .. } => "incomplete_upload",
                CoreError::ChecksumMismatch { .. } => "checksum_mismatch",
                CoreError::ConcurrentChunk { .. } => "concurrent_chunk",
                CoreError::NotFound { .. } => "not_found",
                CoreError::BrokenSession { .. }
                | CoreError::Journal { .. }
                | CoreError::Storage(_)
                | CoreError::Io(_) => "internal",
            },
        }
    }

    /// HTTP status for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ServerError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ServerError::AuthenticationFailed(_) => StatusCode::UNAUTHORIZED,
            ServerError::NotAuthorized(_) => StatusCode::FORBIDDEN,
            ServerError::UnknownShare => StatusCode::NOT_FOUND,
            ServerError::ShareExpired => StatusCode::GONE,
            ServerError::RangeNotSatisfiable { .. } => StatusCode::RANGE_NOT_SATISFIABLE,
            ServerError::Internal(_) | ServerError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ServerError::Core(err) => match err {
                CoreError::InvalidPath { .. }
                | CoreError::InvalidMetadata { .. }
                | CoreError::EmptyChunk
                | CoreError::ChunkOverflow { .. }
                | CoreError::ChecksumMismatch { .. } => StatusCode::BAD_REQUEST,
                CoreError::UnknownUpload { .. } | CoreError::NotFound { .. } => {
                    StatusCode::NOT_FOUND
                }
                CoreError::OffsetAhead { .. }
                | CoreError::IncompleteUpload { .. }
                | CoreError::ConcurrentChunk { .. } => StatusCode::CONFLICT,
                CoreError::BrokenSession { .. }
                | CoreError::Journal { .. }
                | CoreError::Storage(_)
                | CoreError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    /// Extra fields merged into the JSON body.
    fn details(&self) -> Map<String, Value> {
        let value = match self {
            ServerError::Core(CoreError::OffsetAhead { expected, .. }) => {
                json!({ "expected_offset": expected })
            }
            ServerError::Core(CoreError::IncompleteUpload { received, expected }) => {
                json!({ "received_bytes": received, "expected_bytes": expected })
            }
            ServerError::Core(CoreError::ChecksumMismatch { expected, actual }) => {
                json!({ "expected": expected.to_string(), "actual": actual.to_string() })
            }
            _ => return Map::new(),
        };
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }

        let mut body = self.details();
        body.insert("code".into(), Value::from(self.code()));
        body.insert("message".into(), Value::from(self.to_string()));

        let mut response = (status, Json(Value::Object(body))).into_response();
        if let ServerError::RangeNotSatisfiable { size } = self {
            let range = drivesync_sync_protocol::unsatisfied_content_range(size);
            if let Ok(value) = HeaderValue::from_str(&range) {
                response.headers_mut().insert(header::CONTENT_RANGE, value);
            }
        }
        response
    }
}
