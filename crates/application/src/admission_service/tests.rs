use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use leadflow_core::{AppError, AppResult, TenantId};
use leadflow_domain::{
    EnforcementMode, RateLimitDecision, RateLimitKey, RateLimitPolicy, RateScope, TokenBucketState,
};
use tokio::sync::Mutex;

use crate::admission_ports::{BucketStore, BucketStoreStats, GuardConfig, PolicyResolver};

use super::{AdmissionOutcome, AdmissionService, InboundRequest};

struct FakeBucketStore {
    decision: RateLimitDecision,
    consumed_keys: Mutex<Vec<String>>,
}

impl FakeBucketStore {
    fn allowing(remaining: u32) -> Self {
        Self {
            decision: RateLimitDecision::allowed(remaining),
            consumed_keys: Mutex::new(Vec::new()),
        }
    }

    fn returning(decision: RateLimitDecision) -> Self {
        Self {
            decision,
            consumed_keys: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl BucketStore for FakeBucketStore {
    async fn consume(
        &self,
        _policy: &RateLimitPolicy,
        key: &RateLimitKey,
        _now: DateTime<Utc>,
    ) -> RateLimitDecision {
        self.consumed_keys.lock().await.push(key.storage_key());
        self.decision.clone()
    }

    async fn get_state(&self, _key: &RateLimitKey) -> Option<TokenBucketState> {
        None
    }

    async fn reset(&self, _key: &RateLimitKey) {}

    async fn cleanup(&self) {}

    async fn stats(&self) -> BucketStoreStats {
        BucketStoreStats::disconnected()
    }

    async fn is_healthy(&self) -> bool {
        true
    }
}

struct FakeResolver {
    enabled: bool,
    excluded: Vec<String>,
    fail_resolution: bool,
}

impl FakeResolver {
    fn permissive() -> Self {
        Self {
            enabled: true,
            excluded: vec!["/health".to_owned()],
            fail_resolution: false,
        }
    }
}

#[async_trait]
impl PolicyResolver for FakeResolver {
    async fn policy_for_tenant(
        &self,
        _tenant_id: &TenantId,
        _scope: RateScope,
    ) -> AppResult<RateLimitPolicy> {
        if self.fail_resolution {
            return Err(AppError::Internal("tier lookup unavailable".to_owned()));
        }

        RateLimitPolicy::new(100, 20, 60, EnforcementMode::FailClosed)
    }

    fn is_route_excluded(&self, path: &str) -> bool {
        self.excluded.iter().any(|route| route == path)
    }

    fn config(&self) -> GuardConfig {
        GuardConfig {
            enabled: self.enabled,
        }
    }
}

fn guard(store: Arc<FakeBucketStore>, resolver: FakeResolver) -> AdmissionService {
    AdmissionService::new(store, Arc::new(resolver))
}

fn api_request<'a>(tenant_id: Option<&'a str>, path: &'a str) -> InboundRequest<'a> {
    InboundRequest {
        tenant_id,
        method: "GET",
        path,
    }
}

#[tokio::test]
async fn excluded_route_bypasses_store() {
    let store = Arc::new(FakeBucketStore::allowing(10));
    let service = guard(store.clone(), FakeResolver::permissive());

    let outcome = service.check(api_request(Some("t1"), "/health")).await;

    assert!(matches!(outcome, Ok(AdmissionOutcome::Bypassed)));
    assert!(store.consumed_keys.lock().await.is_empty());
}

#[tokio::test]
async fn disabled_limiter_bypasses_store() {
    let store = Arc::new(FakeBucketStore::allowing(10));
    let resolver = FakeResolver {
        enabled: false,
        ..FakeResolver::permissive()
    };
    let service = guard(store.clone(), resolver);

    let outcome = service.check(api_request(Some("t1"), "/api/leads")).await;

    assert!(matches!(outcome, Ok(AdmissionOutcome::Bypassed)));
    assert!(store.consumed_keys.lock().await.is_empty());
}

#[tokio::test]
async fn admitted_request_reports_remaining_quota() {
    let store = Arc::new(FakeBucketStore::allowing(42));
    let service = guard(store.clone(), FakeResolver::permissive());

    let outcome = service.check(api_request(Some("t1"), "/api/leads/123")).await;

    assert!(matches!(
        outcome,
        Ok(AdmissionOutcome::Admitted { remaining: 42 })
    ));
    let keys = store.consumed_keys.lock().await;
    assert_eq!(keys.as_slice(), ["ratelimit:t1:api:api/leads/{id}:GET"]);
}

#[tokio::test]
async fn missing_tenant_resolves_to_unknown_sentinel() {
    let store = Arc::new(FakeBucketStore::allowing(1));
    let service = guard(store.clone(), FakeResolver::permissive());

    let outcome = service.check(api_request(None, "/api/leads")).await;
    assert!(outcome.is_ok());

    let keys = store.consumed_keys.lock().await;
    assert_eq!(keys.as_slice(), ["ratelimit:unknown:api:api/leads:GET"]);
}

#[tokio::test]
async fn blank_tenant_resolves_to_unknown_sentinel() {
    let store = Arc::new(FakeBucketStore::allowing(1));
    let service = guard(store.clone(), FakeResolver::permissive());

    let outcome = service.check(api_request(Some("   "), "/api/leads")).await;
    assert!(outcome.is_ok());

    let keys = store.consumed_keys.lock().await;
    assert_eq!(keys.as_slice(), ["ratelimit:unknown:api:api/leads:GET"]);
}

#[tokio::test]
async fn tenants_consume_distinct_buckets() {
    let store = Arc::new(FakeBucketStore::allowing(1));
    let service = guard(store.clone(), FakeResolver::permissive());

    let first = service.check(api_request(Some("t1"), "/api/leads")).await;
    let second = service.check(api_request(Some("t2"), "/api/leads")).await;
    assert!(first.is_ok());
    assert!(second.is_ok());

    let keys = store.consumed_keys.lock().await;
    assert_eq!(keys.len(), 2);
    assert_ne!(keys[0], keys[1]);
}

#[tokio::test]
async fn webhook_requests_carry_provider_in_bucket_identity() {
    let store = Arc::new(FakeBucketStore::allowing(1));
    let service = guard(store.clone(), FakeResolver::permissive());

    let request = InboundRequest {
        tenant_id: Some("t1"),
        method: "POST",
        path: "/webhooks/salesforce/leads",
    };
    let outcome = service.check(request).await;
    assert!(outcome.is_ok());

    let keys = store.consumed_keys.lock().await;
    assert_eq!(
        keys.as_slice(),
        ["ratelimit:t1:webhook:webhooks/salesforce/leads:POST:salesforce"]
    );
}

#[tokio::test]
async fn exhausted_bucket_maps_to_rate_limited_error() {
    let reset_time = Utc::now();
    let store = Arc::new(FakeBucketStore::returning(RateLimitDecision::exceeded(
        36, reset_time,
    )));
    let service = guard(store, FakeResolver::permissive());

    let outcome = service.check(api_request(Some("t1"), "/api/leads")).await;

    assert!(matches!(
        outcome,
        Err(AppError::RateLimited {
            retry_after_seconds: 36,
            reset_time: Some(reset),
        }) if reset == reset_time
    ));
}

#[tokio::test]
async fn store_outage_fails_closed() {
    let store = Arc::new(FakeBucketStore::returning(
        RateLimitDecision::store_unavailable(),
    ));
    let service = guard(store, FakeResolver::permissive());

    let outcome = service.check(api_request(Some("t1"), "/api/leads")).await;

    assert!(matches!(
        outcome,
        Err(AppError::RateLimited {
            retry_after_seconds: 60,
            reset_time: None,
        })
    ));
}

#[tokio::test]
async fn resolver_failure_fails_closed_without_store_call() {
    let store = Arc::new(FakeBucketStore::allowing(10));
    let resolver = FakeResolver {
        fail_resolution: true,
        ..FakeResolver::permissive()
    };
    let service = guard(store.clone(), resolver);

    let outcome = service.check(api_request(Some("t1"), "/api/leads")).await;

    assert!(matches!(
        outcome,
        Err(AppError::RateLimited {
            retry_after_seconds: 60,
            ..
        })
    ));
    assert!(store.consumed_keys.lock().await.is_empty());
}

#[tokio::test]
async fn excluded_route_bypasses_even_when_resolver_is_broken() {
    let store = Arc::new(FakeBucketStore::allowing(10));
    let resolver = FakeResolver {
        fail_resolution: true,
        ..FakeResolver::permissive()
    };
    let service = guard(store.clone(), resolver);

    let outcome = service.check(api_request(None, "/health")).await;

    assert!(matches!(outcome, Ok(AdmissionOutcome::Bypassed)));
    assert!(store.consumed_keys.lock().await.is_empty());
}
