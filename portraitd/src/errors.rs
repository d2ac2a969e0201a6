use crate::db::errors::DbError;
use crate::portrait::PortraitError;
use crate::storage::StorageError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use thiserror::Error as ThisError;
use utoipa::ToSchema;

#[derive(ThisError, Debug)]
pub enum Error {
    /// Upload rejected: bad content type, name, email, size or empty file
    #[error("{message}")]
    Validation { message: String },

    /// The upload decoded fine but contains no detectable face
    #[error("No face detected in the photo")]
    NoFaceDetected,

    /// A required multipart field was not sent
    #[error("Missing required field '{field}'")]
    MissingField { field: String },

    /// Storage sink is not configured or the write failed
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(#[from] StorageError),

    /// Decoding, cropping, rendering or encoding failed
    #[error("Processing failed: {0}")]
    ProcessingFailure(PortraitError),

    /// Generic internal service error
    #[error("Failed to {operation}")]
    Internal { operation: String },

    /// Database operation error
    #[error(transparent)]
    Database(#[from] DbError),
}

/// JSON body returned for every error response.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    /// Always `false`
    pub success: bool,
    /// Human readable description
    pub error: String,
    /// Stable machine readable code, e.g. `NO_FACE_DETECTED`
    pub code: String,
}

impl Error {
    pub fn validation(message: impl Into<String>) -> Self {
        Error::Validation { message: message.into() }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::Validation { .. } | Error::NoFaceDetected => StatusCode::BAD_REQUEST,
            Error::MissingField { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            Error::StorageUnavailable(StorageError::NotFound | StorageError::InvalidName(_)) => StatusCode::NOT_FOUND,
            Error::StorageUnavailable(_)
            | Error::ProcessingFailure(_)
            | Error::Internal { .. }
            | Error::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable error code sent to clients alongside the message
    pub fn code(&self) -> &'static str {
        match self {
            Error::Validation { .. } => "VALIDATION_ERROR",
            Error::NoFaceDetected => "NO_FACE_DETECTED",
            Error::MissingField { .. } => "MISSING_FIELD",
            Error::StorageUnavailable(StorageError::NotFound | StorageError::InvalidName(_)) => "NOT_FOUND",
            Error::StorageUnavailable(_) => "STORAGE_UNAVAILABLE",
            Error::ProcessingFailure(_) => "PROCESSING_FAILED",
            Error::Database(_) => "DATABASE_ERROR",
            Error::Internal { .. } => "INTERNAL_ERROR",
        }
    }

    /// Returns a user-safe error message, without leaking internal implementation details
    pub fn user_message(&self) -> String {
        match self {
            Error::Validation { message } => message.clone(),
            Error::NoFaceDetected => "No face detected in the photo. Please upload a clear, frontal face photo.".to_string(),
            Error::MissingField { field } => format!("Missing required field '{field}'"),
            Error::StorageUnavailable(StorageError::NotFound | StorageError::InvalidName(_)) => "File not found".to_string(),
            Error::StorageUnavailable(StorageError::NotConfigured(_)) => {
                "Remote storage is not configured. Please contact the administrator.".to_string()
            }
            Error::StorageUnavailable(_) => "Failed to store the processed photo".to_string(),
            Error::ProcessingFailure(_) => "Image processing failed".to_string(),
            Error::Database(_) => "Database error occurred".to_string(),
            Error::Internal { .. } => "Internal server error".to_string(),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Log full error details for debugging - different log levels based on severity
        if status.is_server_error() {
            tracing::error!("Internal service error: {:#}", self);
        } else if matches!(self, Error::NoFaceDetected | Error::Validation { .. } | Error::MissingField { .. }) {
            tracing::info!("Rejected upload: {}", self);
        } else {
            tracing::debug!("Client error: {}", self);
        }

        let body = ErrorResponse {
            success: false,
            error: self.user_message(),
            code: self.code().to_string(),
        };

        (status, Json(body)).into_response()
    }
}

impl From<PortraitError> for Error {
    fn from(err: PortraitError) -> Self {
        match err {
            PortraitError::NoFaceDetected => Error::NoFaceDetected,
            other => Error::ProcessingFailure(other),
        }
    }
}

/// Type alias for service operation results
pub type Result<T> = std::result::Result<T, Error>;
