use async_trait::async_trait;
use chrono::{DateTime, Utc};

use leadflow_core::{AppResult, TenantId};
use leadflow_domain::{RateLimitDecision, RateLimitKey, RateLimitPolicy, RateScope, TokenBucketState};

/// Store port holding per-key token-bucket state.
///
/// Bucket records are the only shared mutable state in the limiter and are
/// owned exclusively by implementations of this trait. No method returns an
/// error: store-level failures are absorbed into fail-closed decisions or
/// degraded values, never surfaced as exceptions to the guard.
#[async_trait]
pub trait BucketStore: Send + Sync {
    /// Performs one atomic read-refill-debit cycle for the key.
    ///
    /// A bucket is created lazily at full capacity on first use. Concurrent
    /// callers against the same key are totally ordered; callers on distinct
    /// keys proceed independently. Communication failures yield the
    /// fail-closed `store_unavailable` decision.
    async fn consume(
        &self,
        policy: &RateLimitPolicy,
        key: &RateLimitKey,
        now: DateTime<Utc>,
    ) -> RateLimitDecision;

    /// Read-only snapshot of the bucket; `None` when missing or on store
    /// error. Observability path, never fails.
    async fn get_state(&self, key: &RateLimitKey) -> Option<TokenBucketState>;

    /// Deletes the bucket record. Best-effort administrative operation;
    /// failures are logged and swallowed.
    async fn reset(&self, key: &RateLimitKey);

    /// Removes idle bucket records where the store has no native expiry.
    async fn cleanup(&self);

    /// Health and capacity introspection; degrades instead of failing.
    async fn stats(&self) -> BucketStoreStats;

    /// Lightweight liveness probe.
    async fn is_healthy(&self) -> bool;
}

/// Diagnostic snapshot reported by a bucket store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketStoreStats {
    /// Whether the backing store answered the probe.
    pub connected: bool,
    /// Number of keys held by the store.
    pub total_keys: u64,
    /// Human-readable memory usage, when the store reports one.
    pub memory_usage: Option<String>,
}

impl BucketStoreStats {
    /// Snapshot reported when the store cannot be reached.
    #[must_use]
    pub fn disconnected() -> Self {
        Self {
            connected: false,
            total_keys: 0,
            memory_usage: None,
        }
    }
}

/// Guard-facing limiter configuration supplied by the policy resolver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GuardConfig {
    /// When false the guard admits everything without touching the store.
    pub enabled: bool,
}

/// Resolver port supplying per-(tenant, scope) limits.
///
/// Backed by the entitlement/billing tier system, which is outside the
/// limiter. The resolver must hand the sentinel `"unknown"` tenant a
/// conservative fail-closed policy; the guard relies on that contract but
/// does not enforce it.
#[async_trait]
pub trait PolicyResolver: Send + Sync {
    /// Resolves the active policy for a tenant and traffic scope.
    async fn policy_for_tenant(
        &self,
        tenant_id: &TenantId,
        scope: RateScope,
    ) -> AppResult<RateLimitPolicy>;

    /// Whether the path is categorically exempt from rate limiting
    /// (health/readiness/liveness probes).
    fn is_route_excluded(&self, path: &str) -> bool;

    /// Returns the current limiter configuration.
    fn config(&self) -> GuardConfig;
}
