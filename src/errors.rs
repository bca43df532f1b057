use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use sea_orm::error::{DbErr, SqlErr};
use serde::{Deserialize, Serialize};

fn current_request_id() -> Option<String> {
    crate::tracing::current_request_id().map(|rid| rid.as_str().to_string())
}

/// Error body returned by every failing endpoint
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// HTTP status category (e.g., "Not Found", "Unprocessable Entity")
    pub error: String,
    /// Human-readable error description
    pub message: String,
    /// Whether the caller may safely retry the same request
    pub retryable: bool,
    /// Unique request identifier for support and debugging
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    /// RFC 3339 timestamp when the error occurred
    pub timestamp: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] DbErr),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Insufficient stock for product {product_id}: available {available}, requested {requested}")]
    InsufficientStock {
        product_id: i32,
        available: i32,
        requested: i32,
    },

    #[error("Transient store error: {0}")]
    TransientStore(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Alert queue is closed")]
    QueueClosed,

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

/// Message fragments emitted by Postgres and SQLite when a lock could not be
/// obtained in time or a transaction lost a serialization race.
const TRANSIENT_MARKERS: [&str; 7] = [
    "lock timeout",
    "could not obtain lock",
    "canceling statement due to lock timeout",
    "deadlock detected",
    "could not serialize access",
    "database is locked",
    "database table is locked",
];

impl ServiceError {
    /// Classifies a sea-orm error into the service taxonomy.
    ///
    /// Pool exhaustion, lost connections and lock-wait failures are transient;
    /// unique constraint violations surface as conflicts.
    pub fn from_db(err: DbErr) -> Self {
        if let Some(SqlErr::UniqueConstraintViolation(detail)) = err.sql_err() {
            return ServiceError::Conflict(detail);
        }

        match &err {
            DbErr::ConnectionAcquire(_) | DbErr::Conn(_) => {
                ServiceError::TransientStore(err.to_string())
            }
            _ => {
                let message = err.to_string().to_ascii_lowercase();
                if TRANSIENT_MARKERS.iter().any(|m| message.contains(m)) {
                    ServiceError::TransientStore(err.to_string())
                } else {
                    ServiceError::DatabaseError(err)
                }
            }
        }
    }

    /// True when the failure came from infrastructure and the same call may
    /// succeed if repeated.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TransientStore(_) | Self::QueueClosed)
    }

    /// Returns the HTTP status code for this error.
    /// This is the single source of truth for error-to-status mapping.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::InsufficientStock { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            Self::ValidationError(_) | Self::InvalidInput(_) => StatusCode::BAD_REQUEST,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::TransientStore(_) | Self::QueueClosed => StatusCode::SERVICE_UNAVAILABLE,
            Self::DatabaseError(_) | Self::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns the error message suitable for HTTP responses.
    /// Internal errors return generic messages to avoid leaking implementation details.
    pub fn response_message(&self) -> String {
        match self {
            Self::DatabaseError(_) => "Database error".to_string(),
            Self::InternalError(_) => "Internal server error".to_string(),
            Self::TransientStore(_) => {
                "Storage temporarily unavailable, retry the request".to_string()
            }
            _ => self.to_string(),
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }

        let err = ErrorResponse {
            error: status.canonical_reason().unwrap_or("Error").to_string(),
            message: self.response_message(),
            retryable: self.is_retryable(),
            request_id: current_request_id(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        };

        (status, Json(err)).into_response()
    }
}
