use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use tunecrawl_core::error::AppError;

use crate::dto::ErrorResponse;

/// Wrapper so we can implement `IntoResponse` for `AppError`.
pub struct ApiError(pub AppError);

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        Self(err)
    }
}

impl ApiError {
    fn classify(&self) -> (StatusCode, &'static str) {
        match &self.0 {
            AppError::ValidationError(_) => (StatusCode::BAD_REQUEST, "validation_error"),
            AppError::SerializationError(_) => (StatusCode::BAD_REQUEST, "serialization_error"),
            AppError::JobConflict(_) | AppError::JobDraining(_) => {
                (StatusCode::CONFLICT, "job_conflict")
            }
            AppError::QuotaExceeded { .. } => (StatusCode::TOO_MANY_REQUESTS, "quota_exceeded"),
            AppError::Timeout(_) => (StatusCode::GATEWAY_TIMEOUT, "timeout"),
            AppError::HttpStatus { .. } | AppError::HttpError(_) | AppError::NetworkError(_) => {
                (StatusCode::BAD_GATEWAY, "upstream_error")
            }
            AppError::DatabaseError(_) => (StatusCode::INTERNAL_SERVER_ERROR, "database_error"),
            AppError::ConfigError(_) => (StatusCode::INTERNAL_SERVER_ERROR, "config_error"),
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        }
    }
}

impl ApiError {
    fn render(self, success: Option<bool>) -> Response {
        let (status, error_type) = self.classify();
        if status.is_server_error() {
            tracing::error!(error = %self.0, "Request failed");
        }

        let body = ErrorResponse {
            error: error_type.to_string(),
            message: self.0.to_string(),
            success,
        };

        (status, axum::Json(body)).into_response()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        self.render(None)
    }
}

/// Error for `/crawler/start`, whose body mirrors `StartCrawlResponse`
/// with `success: false`.
pub struct StartError(pub ApiError);

impl From<AppError> for StartError {
    fn from(err: AppError) -> Self {
        Self(ApiError(err))
    }
}

impl IntoResponse for StartError {
    fn into_response(self) -> Response {
        self.0.render(Some(false))
    }
}
