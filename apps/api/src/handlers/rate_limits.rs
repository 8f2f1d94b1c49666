//! Administrative inspect/reset/stats surface for the rate limiter.

use std::str::FromStr;

use axum::Json;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use leadflow_core::{AppError, TenantId};
use leadflow_domain::{RateLimitKey, RateScope};

use crate::dto::{BucketQuery, BucketStateResponse, StoreStatsResponse};
use crate::error::ApiResult;
use crate::state::AppState;

/// Returns the current bucket state for a key, 404 when no bucket exists.
pub async fn bucket_state_handler(
    State(state): State<AppState>,
    Query(query): Query<BucketQuery>,
) -> ApiResult<Json<BucketStateResponse>> {
    let key = parse_key(query)?;

    state
        .bucket_store
        .get_state(&key)
        .await
        .map(|bucket| Json(BucketStateResponse::from(bucket)))
        .ok_or_else(|| {
            AppError::NotFound(format!("no bucket for key '{}'", key.storage_key())).into()
        })
}

/// Deletes the bucket for a key. Best-effort administrative convenience.
pub async fn reset_bucket_handler(
    State(state): State<AppState>,
    Query(query): Query<BucketQuery>,
) -> ApiResult<StatusCode> {
    let key = parse_key(query)?;
    state.bucket_store.reset(&key).await;
    Ok(StatusCode::NO_CONTENT)
}

/// Reports store health and capacity diagnostics.
pub async fn store_stats_handler(State(state): State<AppState>) -> Json<StoreStatsResponse> {
    Json(StoreStatsResponse::from(state.bucket_store.stats().await))
}

fn parse_key(query: BucketQuery) -> Result<RateLimitKey, AppError> {
    let tenant_id = TenantId::new(query.tenant_id)?;
    let scope = RateScope::from_str(&query.scope)?;
    RateLimitKey::new(
        tenant_id,
        scope,
        query.route_key,
        query.method,
        query.provider_id,
    )
}
