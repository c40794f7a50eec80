use axum::{Json, http::StatusCode, response::IntoResponse};
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};

use super::models::{ErrorResponse, PayloadError};
use crate::fetch::FetchError;
use crate::imaging::TransformError;
use crate::signature::SignatureError;
use crate::source::SourceError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("unauthorized")]
    Unauthorized,
    #[error("resource not found: {0}")]
    NotFound(String),
    #[error("{0}")]
    Unprocessable(String),
    #[error("download failed: {0}")]
    Upstream(#[from] FetchError),
    #[error("transform failed: {0}")]
    Transform(#[from] TransformError),
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Unprocessable(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Transform(err) if err.is_client_error() => StatusCode::BAD_REQUEST,
            ApiError::Upstream(_) | ApiError::Transform(_) | ApiError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "BAD_REQUEST",
            ApiError::Unauthorized => "UNAUTHORIZED",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::Unprocessable(_) => "UNSUPPORTED_MEDIA",
            ApiError::Upstream(_) => "UPSTREAM_ERROR",
            ApiError::Transform(err) if err.is_client_error() => "INVALID_OPERATION",
            ApiError::Transform(_) => "TRANSFORM_ERROR",
            ApiError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// What the client gets to see. Upstream and internal detail stays in the logs.
    pub fn client_message(&self) -> String {
        match self {
            ApiError::BadRequest(message) | ApiError::Unprocessable(message) => message.clone(),
            ApiError::Unauthorized => "Unauthorized".to_string(),
            ApiError::NotFound(_) => "not found".to_string(),
            ApiError::Upstream(_) => "Error when downloading the file".to_string(),
            ApiError::Transform(err) if err.is_client_error() => err.to_string(),
            ApiError::Transform(_) => "Error when transforming the image".to_string(),
            ApiError::Internal(_) => "Internal server error".to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!(status = status.as_u16(), error = %self, "Request failed");
        } else {
            warn!(status = status.as_u16(), error = %self, "Request rejected");
        }

        let body = ErrorResponse {
            code: self.code(),
            message: self.client_message(),
        };

        (status, Json(json!(body))).into_response()
    }
}

impl From<SourceError> for ApiError {
    fn from(value: SourceError) -> Self {
        match value {
            SourceError::UnknownSource(_) | SourceError::UnknownRenderer(_) => {
                ApiError::BadRequest(value.to_string())
            }
            SourceError::InvalidUrl { .. } => ApiError::Internal(value.to_string()),
        }
    }
}

impl From<SignatureError> for ApiError {
    fn from(value: SignatureError) -> Self {
        ApiError::BadRequest(value.to_string())
    }
}

impl From<PayloadError> for ApiError {
    fn from(value: PayloadError) -> Self {
        ApiError::BadRequest(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (ApiError::BadRequest("x".into()), StatusCode::BAD_REQUEST),
            (ApiError::Unauthorized, StatusCode::UNAUTHORIZED),
            (ApiError::NotFound("/x".into()), StatusCode::NOT_FOUND),
            (ApiError::Unprocessable("x".into()), StatusCode::UNPROCESSABLE_ENTITY),
            (ApiError::Upstream(FetchError::Timeout), StatusCode::INTERNAL_SERVER_ERROR),
            (
                ApiError::Transform(TransformError::Decode("eof".into())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                ApiError::Transform(TransformError::UnknownOperation("blur".into())),
                StatusCode::BAD_REQUEST,
            ),
        ];

        for (error, status) in cases {
            assert_eq!(error.status_code(), status, "{error:?}");
        }
    }

    #[test]
    fn test_upstream_detail_is_hidden() {
        let error = ApiError::Upstream(FetchError::Status(StatusCode::NOT_FOUND));
        assert_eq!(error.client_message(), "Error when downloading the file");
        assert!(error.to_string().contains("404"));
    }

    #[test]
    fn test_client_transform_errors_are_echoed() {
        let error = ApiError::Transform(TransformError::UnknownOperation("blur".into()));
        assert_eq!(error.client_message(), "operation not supported: blur");
    }

    #[test]
    fn test_source_errors() {
        assert_eq!(
            ApiError::from(SourceError::UnknownSource("x".into())).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(SourceError::InvalidUrl {
                url: "x".into(),
                reason: "y".into()
            })
            .status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_signature_errors_are_bad_requests() {
        let error = ApiError::from(SignatureError::Invalid);
        assert_eq!(error.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(error.client_message(), "Invalid signature");
    }
}
