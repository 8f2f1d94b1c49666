use axum::extract::{Request, State};
use axum::http::{HeaderName, HeaderValue};
use axum::middleware::Next;
use axum::response::Response;
use leadflow_application::{ALGORITHM_NAME, AdmissionOutcome, InboundRequest};

use crate::error::ApiResult;
use crate::state::AppState;

/// Request header carrying the resolved tenant.
pub const TENANT_HEADER: HeaderName = HeaderName::from_static("x-tenant-id");

const REMAINING_HEADER: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
const POLICY_HEADER: HeaderName = HeaderName::from_static("x-ratelimit-policy");

/// Admission-control middleware, run once per request before the handler.
///
/// Denials surface as `ApiError` and become 429 responses with retry
/// headers; admitted requests get quota headers on the outbound response.
/// Bypassed requests (excluded routes, disabled limiter) carry no quota
/// headers at all.
pub async fn rate_limit(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> ApiResult<Response> {
    let tenant_id = request
        .headers()
        .get(TENANT_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned);
    let method = request.method().as_str().to_owned();
    let path = request.uri().path().to_owned();

    let outcome = state
        .admission_service
        .check(InboundRequest {
            tenant_id: tenant_id.as_deref(),
            method: &method,
            path: &path,
        })
        .await?;

    let mut response = next.run(request).await;

    if let AdmissionOutcome::Admitted { remaining } = outcome {
        let headers = response.headers_mut();
        if let Ok(value) = HeaderValue::from_str(&remaining.to_string()) {
            headers.insert(REMAINING_HEADER, value);
        }
        headers.insert(POLICY_HEADER, HeaderValue::from_static(ALGORITHM_NAME));
    }

    Ok(response)
}
