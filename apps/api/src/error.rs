use axum::Json;
use axum::http::{HeaderName, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use leadflow_core::AppError;
use serde::Serialize;

/// Non-standard retry header mirroring `Retry-After` for API clients.
pub const RETRY_AFTER_HEADER: HeaderName = HeaderName::from_static("x-ratelimit-retry-after");
/// Advisory bucket reset timestamp header.
pub const RESET_HEADER: HeaderName = HeaderName::from_static("x-ratelimit-reset");

/// API error payload.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    retry_after_seconds: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reset_time: Option<String>,
}

/// HTTP API error wrapper around core application errors.
#[derive(Debug)]
pub struct ApiError(pub AppError);

impl From<AppError> for ApiError {
    fn from(value: AppError) -> Self {
        Self(value)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let AppError::RateLimited {
            retry_after_seconds,
            reset_time,
        } = &self.0
        {
            let retry_after_seconds = *retry_after_seconds;
            let reset_time_text = reset_time.map(|value| value.to_rfc3339());

            let payload = Json(ErrorResponse {
                message: self.0.to_string(),
                retry_after_seconds: Some(retry_after_seconds),
                reset_time: reset_time_text.clone(),
            });

            let mut response = (StatusCode::TOO_MANY_REQUESTS, payload).into_response();
            let headers = response.headers_mut();
            if let Ok(value) = HeaderValue::from_str(&retry_after_seconds.to_string()) {
                headers.insert(header::RETRY_AFTER, value.clone());
                headers.insert(RETRY_AFTER_HEADER, value);
            }
            if let Some(value) = reset_time_text.and_then(|text| HeaderValue::from_str(&text).ok())
            {
                headers.insert(RESET_HEADER, value);
            }

            return response;
        }

        let status = match self.0 {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let payload = Json(ErrorResponse {
            message: self.0.to_string(),
            retry_after_seconds: None,
            reset_time: None,
        });

        (status, payload).into_response()
    }
}

/// Standard API result type.
pub type ApiResult<T> = Result<T, ApiError>;
