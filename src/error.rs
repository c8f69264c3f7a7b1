use axum::Json;
use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

use crate::media::MediaError;
use crate::store::StoreError;

/// Error contract of the API layer.
///
/// Validation problems keep their specific message and map to 400,
/// missing records to 404. Upstream failures collapse to a generic 500
/// body; the original error is only logged server-side.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("File too large: {name} exceeds the 10 MB limit")]
    FileTooLarge { name: String },
    #[error("Only image files are allowed (jpeg, jpg, png, gif, webp): {name}")]
    UnsupportedFileType { name: String },
    #[error("No files were uploaded")]
    EmptyUpload,
    #[error("Too many files: at most 10 per upload")]
    TooManyFiles,
    #[error("Image not found")]
    NotFound,
    #[error("Invalid upload request: {0}")]
    Multipart(#[from] MultipartError),
    #[error("media host failure: {0}")]
    Media(#[from] MediaError),
    #[error("metadata store failure: {0}")]
    Store(#[from] StoreError),
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            Self::FileTooLarge { .. }
            | Self::UnsupportedFileType { .. }
            | Self::EmptyUpload
            | Self::TooManyFiles
            | Self::Multipart(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            Self::NotFound => (StatusCode::NOT_FOUND, self.to_string()),
            Self::Media(err) => {
                tracing::error!(error = %err, "media host error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Failed to store image".to_string(),
                )
            }
            Self::Store(err) => {
                tracing::error!(error = %err, "metadata store error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };
        (status, Json(ErrorBody { error: message })).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_errors_are_bad_requests() {
        assert_eq!(
            ApiError::EmptyUpload.into_response().status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::TooManyFiles.into_response().status(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn oversize_message_identifies_the_violation() {
        let err = ApiError::FileTooLarge {
            name: "huge.png".to_string(),
        };
        assert!(err.to_string().contains("too large"));
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn missing_records_are_not_found() {
        assert_eq!(
            ApiError::NotFound.into_response().status(),
            StatusCode::NOT_FOUND
        );
    }
}
