use chrono::{DateTime, Utc};
use leadflow_application::BucketStoreStats;
use leadflow_domain::TokenBucketState;
use serde::{Deserialize, Serialize};

/// Health probe payload.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Probe verdict, `ok` or `degraded`.
    pub status: &'static str,
}

/// Query parameters identifying one logical bucket.
#[derive(Debug, Deserialize)]
pub struct BucketQuery {
    /// Owning tenant.
    pub tenant_id: String,
    /// Traffic scope (`api`, `webhook`, `admin`).
    pub scope: String,
    /// Normalized route pattern.
    pub route_key: String,
    /// HTTP verb.
    pub method: String,
    /// Upstream webhook provider, webhook scope only.
    pub provider_id: Option<String>,
}

/// Bucket state snapshot returned by the inspection endpoint.
#[derive(Debug, Serialize)]
pub struct BucketStateResponse {
    /// Currently available tokens.
    pub tokens: i64,
    /// Last time tokens were topped up.
    pub last_refill: DateTime<Utc>,
    /// Advisory window reset time.
    pub reset_time: DateTime<Utc>,
}

impl From<TokenBucketState> for BucketStateResponse {
    fn from(value: TokenBucketState) -> Self {
        Self {
            tokens: value.tokens,
            last_refill: value.last_refill,
            reset_time: value.reset_time,
        }
    }
}

/// Store diagnostics returned by the stats endpoint.
#[derive(Debug, Serialize)]
pub struct StoreStatsResponse {
    /// Whether the backing store answered the probe.
    pub connected: bool,
    /// Number of keys held by the store.
    pub total_keys: u64,
    /// Human-readable memory usage, when reported.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_usage: Option<String>,
}

impl From<BucketStoreStats> for StoreStatsResponse {
    fn from(value: BucketStoreStats) -> Self {
        Self {
            connected: value.connected,
            total_keys: value.total_keys,
            memory_usage: value.memory_usage,
        }
    }
}
