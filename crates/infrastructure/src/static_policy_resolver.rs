//! Configuration-driven policy resolver.
//!
//! Stands in for the entitlement/billing tier resolver: per-scope defaults,
//! optional per-tenant overrides, a deliberately conservative policy for the
//! sentinel `"unknown"` tenant, and the route exclusion list for health
//! probes. Real deployments can swap in a resolver backed by the billing
//! system; the guard only sees the `PolicyResolver` port.

use std::collections::HashMap;

use async_trait::async_trait;
use leadflow_application::{GuardConfig, PolicyResolver};
use leadflow_core::{AppError, AppResult, TenantId};
use leadflow_domain::{EnforcementMode, RateLimitPolicy, RateScope};

/// Static implementation of the policy resolver port.
pub struct StaticPolicyResolver {
    enabled: bool,
    excluded_routes: Vec<String>,
    defaults: HashMap<RateScope, RateLimitPolicy>,
    overrides: HashMap<(String, RateScope), RateLimitPolicy>,
    unknown_tenant_policy: RateLimitPolicy,
}

impl StaticPolicyResolver {
    /// Creates a resolver with baseline per-scope policies and the standard
    /// health-probe exclusions.
    pub fn new(enabled: bool) -> AppResult<Self> {
        let mode = EnforcementMode::FailClosed;
        let defaults = HashMap::from([
            (RateScope::Api, RateLimitPolicy::new(120, 30, 60, mode)?),
            (RateScope::Webhook, RateLimitPolicy::new(60, 20, 60, mode)?),
            (RateScope::Admin, RateLimitPolicy::new(30, 10, 60, mode)?),
        ]);

        Ok(Self {
            enabled,
            excluded_routes: vec![
                "/health".to_owned(),
                "/health/live".to_owned(),
                "/health/ready".to_owned(),
            ],
            defaults,
            overrides: HashMap::new(),
            unknown_tenant_policy: RateLimitPolicy::new(10, 0, 60, mode)?,
        })
    }

    /// Replaces the baseline policy for one scope.
    #[must_use]
    pub fn with_default(mut self, scope: RateScope, policy: RateLimitPolicy) -> Self {
        self.defaults.insert(scope, policy);
        self
    }

    /// Registers a tenant-specific policy taking precedence over the scope
    /// default.
    #[must_use]
    pub fn with_tenant_override(
        mut self,
        tenant_id: &TenantId,
        scope: RateScope,
        policy: RateLimitPolicy,
    ) -> Self {
        self.overrides
            .insert((tenant_id.as_str().to_owned(), scope), policy);
        self
    }

    /// Adds a path to the limiter exclusion list.
    #[must_use]
    pub fn with_excluded_route(mut self, path: impl Into<String>) -> Self {
        self.excluded_routes.push(path.into());
        self
    }
}

#[async_trait]
impl PolicyResolver for StaticPolicyResolver {
    async fn policy_for_tenant(
        &self,
        tenant_id: &TenantId,
        scope: RateScope,
    ) -> AppResult<RateLimitPolicy> {
        if tenant_id.is_unknown() {
            return Ok(self.unknown_tenant_policy.clone());
        }

        if let Some(policy) = self
            .overrides
            .get(&(tenant_id.as_str().to_owned(), scope))
        {
            return Ok(policy.clone());
        }

        self.defaults.get(&scope).cloned().ok_or_else(|| {
            AppError::Internal(format!("no default rate limit policy for scope '{scope}'"))
        })
    }

    fn is_route_excluded(&self, path: &str) -> bool {
        let normalized = normalize_path(path);
        self.excluded_routes
            .iter()
            .any(|route| normalize_path(route) == normalized)
    }

    fn config(&self) -> GuardConfig {
        GuardConfig {
            enabled: self.enabled,
        }
    }
}

fn normalize_path(path: &str) -> &str {
    let without_query = path.split('?').next().unwrap_or_default();
    without_query.trim_end_matches('/')
}
