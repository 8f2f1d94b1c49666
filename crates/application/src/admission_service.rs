use std::sync::Arc;

use chrono::Utc;
use leadflow_core::{AppError, AppResult, TenantId};
use leadflow_domain::{RateLimitKey, STORE_UNAVAILABLE_RETRY_SECONDS};
use tracing::{debug, error};

use crate::admission_ports::{BucketStore, PolicyResolver};

mod routes;
#[cfg(test)]
mod tests;

pub use routes::{classify_scope, normalize_route_key};

/// Name of the admission algorithm, advertised in response headers.
pub const ALGORITHM_NAME: &str = "token-bucket";

/// Minimal view of an inbound request, as seen by the guard.
#[derive(Debug, Clone, Copy)]
pub struct InboundRequest<'a> {
    /// Raw tenant identifier from request context, if any.
    pub tenant_id: Option<&'a str>,
    /// HTTP verb.
    pub method: &'a str,
    /// Request path, before normalization.
    pub path: &'a str,
}

/// Verdict handed back to the HTTP layer when a request is admitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionOutcome {
    /// Excluded route or globally disabled limiter; the store was never
    /// consulted and no quota headers apply.
    Bypassed,
    /// One token was debited from the bucket.
    Admitted {
        /// Tokens left in the bucket after this request.
        remaining: u32,
    },
}

/// Per-request admission guard.
///
/// Derives the bucket identity and policy for an inbound request, performs
/// the store consume, and translates the decision into an allow outcome or a
/// single `AppError::RateLimited` error. API and webhook traffic fail closed
/// on any internal fault; excluded health routes are admitted unconditionally
/// regardless of limiter state.
#[derive(Clone)]
pub struct AdmissionService {
    store: Arc<dyn BucketStore>,
    resolver: Arc<dyn PolicyResolver>,
}

impl AdmissionService {
    /// Creates a guard from a bucket store and a policy resolver.
    #[must_use]
    pub fn new(store: Arc<dyn BucketStore>, resolver: Arc<dyn PolicyResolver>) -> Self {
        Self { store, resolver }
    }

    /// Decides whether the request may proceed.
    ///
    /// Returns `Err(AppError::RateLimited)` both when the bucket is exhausted
    /// and when rate limiting is temporarily unavailable (resolver or store
    /// fault); the two cases carry the retry metadata the HTTP layer needs
    /// for its 429 response.
    pub async fn check(&self, request: InboundRequest<'_>) -> AppResult<AdmissionOutcome> {
        if self.resolver.is_route_excluded(request.path) {
            return Ok(AdmissionOutcome::Bypassed);
        }

        if !self.resolver.config().enabled {
            return Ok(AdmissionOutcome::Bypassed);
        }

        let tenant_id = resolve_tenant(request.tenant_id);
        let (scope, provider_id) = classify_scope(request.path);
        let route_key = normalize_route_key(request.path);

        let policy = self
            .resolver
            .policy_for_tenant(&tenant_id, scope)
            .await
            .map_err(|cause| {
                error!(%tenant_id, %scope, %cause, "policy resolution failed, denying request");
                rate_limiting_unavailable()
            })?;

        let key = RateLimitKey::new(tenant_id, scope, route_key, request.method, provider_id)
            .map_err(|cause| {
                error!(%cause, "bucket key derivation failed, denying request");
                rate_limiting_unavailable()
            })?;

        let decision = self.store.consume(&policy, &key, Utc::now()).await;
        if decision.allowed {
            debug!(
                storage_key = %key.storage_key(),
                remaining = decision.remaining,
                "request admitted"
            );
            return Ok(AdmissionOutcome::Admitted {
                remaining: decision.remaining,
            });
        }

        Err(AppError::RateLimited {
            retry_after_seconds: decision
                .retry_after_seconds
                .unwrap_or(STORE_UNAVAILABLE_RETRY_SECONDS),
            reset_time: decision.reset_time,
        })
    }
}

fn resolve_tenant(raw: Option<&str>) -> TenantId {
    raw.and_then(|value| TenantId::new(value).ok())
        .unwrap_or_else(TenantId::unknown)
}

fn rate_limiting_unavailable() -> AppError {
    AppError::RateLimited {
        retry_after_seconds: STORE_UNAVAILABLE_RETRY_SECONDS,
        reset_time: None,
    }
}
