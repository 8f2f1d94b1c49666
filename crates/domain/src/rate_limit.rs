use std::fmt::{Display, Formatter};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use leadflow_core::{AppError, AppResult, TenantId};
use serde::{Deserialize, Serialize};

/// Prefix shared by every bucket record in the coordination store.
pub const STORAGE_KEY_PREFIX: &str = "ratelimit";

/// Retry hint returned when the coordination store is unreachable.
pub const STORE_UNAVAILABLE_RETRY_SECONDS: u64 = 60;

/// Traffic-class partition for admission control.
///
/// Scopes isolate unrelated traffic so one class can never consume another
/// class's quota.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateScope {
    /// Regular tenant API traffic.
    Api,
    /// Inbound webhook deliveries, partitioned further by provider.
    Webhook,
    /// Administrative endpoints.
    Admin,
}

impl RateScope {
    /// Returns the stable storage value for this scope.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Api => "api",
            Self::Webhook => "webhook",
            Self::Admin => "admin",
        }
    }
}

impl Display for RateScope {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl FromStr for RateScope {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "api" => Ok(Self::Api),
            "webhook" => Ok(Self::Webhook),
            "admin" => Ok(Self::Admin),
            _ => Err(AppError::Validation(format!(
                "unknown rate scope '{value}'"
            ))),
        }
    }
}

/// Identity of one logical token bucket.
///
/// The key doubles as the storage address: identical field tuples always
/// serialize to the identical address string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RateLimitKey {
    tenant_id: TenantId,
    scope: RateScope,
    route_key: String,
    method: String,
    provider_id: Option<String>,
}

impl RateLimitKey {
    /// Creates a validated bucket identity.
    ///
    /// `provider_id` is only meaningful for webhook traffic; supplying one
    /// for another scope is a caller bug and is rejected.
    pub fn new(
        tenant_id: TenantId,
        scope: RateScope,
        route_key: impl Into<String>,
        method: impl Into<String>,
        provider_id: Option<String>,
    ) -> AppResult<Self> {
        let route_key = route_key.into();
        if route_key.trim().is_empty() {
            return Err(AppError::Validation(
                "route key must not be empty".to_owned(),
            ));
        }

        let method = method.into();
        if method.trim().is_empty() {
            return Err(AppError::Validation(
                "http method must not be empty".to_owned(),
            ));
        }

        if provider_id.is_some() && scope != RateScope::Webhook {
            return Err(AppError::Validation(format!(
                "provider id is only valid for webhook scope, got '{scope}'"
            )));
        }

        Ok(Self {
            tenant_id,
            scope,
            route_key,
            method,
            provider_id,
        })
    }

    /// Returns the owning tenant.
    #[must_use]
    pub fn tenant_id(&self) -> &TenantId {
        &self.tenant_id
    }

    /// Returns the traffic scope.
    #[must_use]
    pub fn scope(&self) -> RateScope {
        self.scope
    }

    /// Returns the normalized route pattern.
    #[must_use]
    pub fn route_key(&self) -> &str {
        &self.route_key
    }

    /// Returns the HTTP verb.
    #[must_use]
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Returns the upstream webhook provider, if any.
    #[must_use]
    pub fn provider_id(&self) -> Option<&str> {
        self.provider_id.as_deref()
    }

    /// Serializes this key to its storage address.
    ///
    /// Format: `ratelimit:<tenant>:<scope>:<routeKey>:<method>` with a
    /// trailing `:<providerId>` segment for webhook traffic.
    #[must_use]
    pub fn storage_key(&self) -> String {
        let mut address = format!(
            "{STORAGE_KEY_PREFIX}:{}:{}:{}:{}",
            self.tenant_id, self.scope, self.route_key, self.method
        );
        if let Some(provider_id) = &self.provider_id {
            address.push(':');
            address.push_str(provider_id);
        }

        address
    }
}

/// Behavior of the limiter when its backing store is unreachable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnforcementMode {
    /// Deny traffic when the store cannot answer. The only supported mode:
    /// an unreachable store must never silently admit unlimited traffic.
    FailClosed,
}

/// Immutable limit description for one (tenant, scope) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateLimitPolicy {
    limit_per_minute: u32,
    burst: u32,
    window_seconds: u32,
    mode: EnforcementMode,
}

impl RateLimitPolicy {
    /// Creates a validated policy.
    pub fn new(
        limit_per_minute: u32,
        burst: u32,
        window_seconds: u32,
        mode: EnforcementMode,
    ) -> AppResult<Self> {
        if limit_per_minute == 0 {
            return Err(AppError::Validation(
                "limit_per_minute must be greater than zero".to_owned(),
            ));
        }

        if window_seconds == 0 {
            return Err(AppError::Validation(
                "window_seconds must be greater than zero".to_owned(),
            ));
        }

        Ok(Self {
            limit_per_minute,
            burst,
            window_seconds,
            mode,
        })
    }

    /// Steady-state admissions per minute.
    #[must_use]
    pub fn limit_per_minute(&self) -> u32 {
        self.limit_per_minute
    }

    /// Extra tokens available above the steady-state rate for short spikes.
    #[must_use]
    pub fn burst(&self) -> u32 {
        self.burst
    }

    /// Normalization window used to derive the refill rate.
    #[must_use]
    pub fn window_seconds(&self) -> u32 {
        self.window_seconds
    }

    /// Failure posture when the store is unreachable.
    #[must_use]
    pub fn mode(&self) -> EnforcementMode {
        self.mode
    }

    /// Maximum tokens the bucket can hold.
    #[must_use]
    pub fn capacity(&self) -> u32 {
        self.limit_per_minute + self.burst
    }

    /// Tokens added back per elapsed second.
    #[must_use]
    pub fn refill_rate_per_second(&self) -> f64 {
        f64::from(self.limit_per_minute) / f64::from(self.window_seconds)
    }

    /// Seconds a denied caller should wait before one token is available.
    ///
    /// `ceil(window_seconds / (limit_per_minute / 60))`.
    #[must_use]
    pub fn retry_after_seconds(&self) -> u64 {
        (u64::from(self.window_seconds) * 60).div_ceil(u64::from(self.limit_per_minute))
    }
}

/// Mutable bucket state, one instance per key, owned by the store.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TokenBucketState {
    /// Currently available tokens, `0 ≤ tokens ≤ capacity`.
    pub tokens: i64,
    /// Last time tokens were topped up.
    pub last_refill: DateTime<Utc>,
    /// Advisory time at which the window is considered fully reset.
    pub reset_time: DateTime<Utc>,
}

/// Why a consume call produced its verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionReason {
    /// Admitted; the bucket had at least one token.
    WithinLimit,
    /// Denied; the bucket is exhausted.
    RateLimitExceeded,
    /// Denied; the coordination store could not answer (fail-closed).
    #[serde(rename = "redis_error")]
    StoreUnavailable,
}

impl DecisionReason {
    /// Returns the stable wire value for this reason.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WithinLimit => "within_limit",
            Self::RateLimitExceeded => "rate_limit_exceeded",
            Self::StoreUnavailable => "redis_error",
        }
    }
}

/// Outcome of one admission check. Pure value, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateLimitDecision {
    /// Whether the request may proceed.
    pub allowed: bool,
    /// Tokens left after this call.
    pub remaining: u32,
    /// Verdict classification.
    pub reason: DecisionReason,
    /// Seconds to wait before retrying; present when denied.
    pub retry_after_seconds: Option<u64>,
    /// Advisory window reset time; present when denied.
    pub reset_time: Option<DateTime<Utc>>,
}

impl RateLimitDecision {
    /// Builds the admitted verdict.
    #[must_use]
    pub fn allowed(remaining: u32) -> Self {
        Self {
            allowed: true,
            remaining,
            reason: DecisionReason::WithinLimit,
            retry_after_seconds: None,
            reset_time: None,
        }
    }

    /// Builds the bucket-exhausted verdict.
    #[must_use]
    pub fn exceeded(retry_after_seconds: u64, reset_time: DateTime<Utc>) -> Self {
        Self {
            allowed: false,
            remaining: 0,
            reason: DecisionReason::RateLimitExceeded,
            retry_after_seconds: Some(retry_after_seconds),
            reset_time: Some(reset_time),
        }
    }

    /// Builds the fail-closed verdict used when the store cannot answer.
    #[must_use]
    pub fn store_unavailable() -> Self {
        Self {
            allowed: false,
            remaining: 0,
            reason: DecisionReason::StoreUnavailable,
            retry_after_seconds: Some(STORE_UNAVAILABLE_RETRY_SECONDS),
            reset_time: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use leadflow_core::TenantId;

    use super::{
        DecisionReason, EnforcementMode, RateLimitDecision, RateLimitKey, RateLimitPolicy,
        RateScope,
    };

    fn tenant(value: &str) -> TenantId {
        TenantId::new(value).unwrap_or_else(|_| TenantId::unknown())
    }

    #[test]
    fn storage_key_is_deterministic() {
        let first = RateLimitKey::new(tenant("t1"), RateScope::Api, "api/leads/{id}", "GET", None);
        let second = RateLimitKey::new(tenant("t1"), RateScope::Api, "api/leads/{id}", "GET", None);

        let first = first.map(|key| key.storage_key());
        let second = second.map(|key| key.storage_key());
        assert!(first.is_ok());
        assert_eq!(first.ok(), second.ok());
    }

    #[test]
    fn storage_key_joins_fields_in_fixed_order() {
        let key = RateLimitKey::new(tenant("t1"), RateScope::Api, "api/leads/{id}", "GET", None);
        assert_eq!(
            key.map(|key| key.storage_key()).ok(),
            Some("ratelimit:t1:api:api/leads/{id}:GET".to_owned())
        );
    }

    #[test]
    fn webhook_key_appends_provider_segment() {
        let key = RateLimitKey::new(
            tenant("t1"),
            RateScope::Webhook,
            "webhooks/crm/{id}",
            "POST",
            Some("salesforce".to_owned()),
        );
        assert_eq!(
            key.map(|key| key.storage_key()).ok(),
            Some("ratelimit:t1:webhook:webhooks/crm/{id}:POST:salesforce".to_owned())
        );
    }

    #[test]
    fn webhook_keys_differ_per_provider() {
        let build = |provider: &str| {
            RateLimitKey::new(
                tenant("t1"),
                RateScope::Webhook,
                "webhooks/crm",
                "POST",
                Some(provider.to_owned()),
            )
            .map(|key| key.storage_key())
            .ok()
        };

        assert_ne!(build("salesforce"), build("hubspot"));
    }

    #[test]
    fn provider_is_rejected_outside_webhook_scope() {
        let key = RateLimitKey::new(
            tenant("t1"),
            RateScope::Api,
            "api/leads",
            "GET",
            Some("salesforce".to_owned()),
        );
        assert!(key.is_err());
    }

    #[test]
    fn scope_isolation_produces_distinct_addresses() {
        let api = RateLimitKey::new(tenant("t1"), RateScope::Api, "leads", "GET", None);
        let admin = RateLimitKey::new(tenant("t1"), RateScope::Admin, "leads", "GET", None);

        assert_ne!(
            api.map(|key| key.storage_key()).ok(),
            admin.map(|key| key.storage_key()).ok()
        );
    }

    #[test]
    fn policy_rejects_zero_limit_and_window() {
        assert!(RateLimitPolicy::new(0, 5, 60, EnforcementMode::FailClosed).is_err());
        assert!(RateLimitPolicy::new(100, 5, 0, EnforcementMode::FailClosed).is_err());
    }

    #[test]
    fn policy_capacity_includes_burst() {
        let policy = RateLimitPolicy::new(100, 20, 60, EnforcementMode::FailClosed);
        assert_eq!(policy.map(|policy| policy.capacity()).ok(), Some(120));
    }

    #[test]
    fn retry_after_rounds_up() {
        // 100 per minute over a 60s window: ceil(60 / (100/60)) = 36.
        let steady = RateLimitPolicy::new(100, 0, 60, EnforcementMode::FailClosed);
        assert_eq!(steady.map(|policy| policy.retry_after_seconds()).ok(), Some(36));

        // 7 per minute: 60*60/7 = 514.28..., ceil to 515.
        let sparse = RateLimitPolicy::new(7, 0, 60, EnforcementMode::FailClosed);
        assert_eq!(sparse.map(|policy| policy.retry_after_seconds()).ok(), Some(515));
    }

    #[test]
    fn store_unavailable_decision_matches_fail_closed_contract() {
        let decision = RateLimitDecision::store_unavailable();
        assert!(!decision.allowed);
        assert_eq!(decision.remaining, 0);
        assert_eq!(decision.reason, DecisionReason::StoreUnavailable);
        assert_eq!(decision.retry_after_seconds, Some(60));
    }
}
