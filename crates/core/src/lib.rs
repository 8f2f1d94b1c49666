//! Shared primitives for all Rust crates in Leadflow.

#![forbid(unsafe_code)]

use std::fmt::{Display, Formatter};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type used across Leadflow crates.
pub type AppResult<T> = Result<T, AppError>;

/// Sentinel tenant used when a request carries no resolvable tenant.
///
/// The policy resolver is contractually required to hand this tenant a
/// conservative, fail-closed policy.
pub const UNKNOWN_TENANT: &str = "unknown";

/// Tenant identifier used as the partition key for every rate-limit bucket.
///
/// Tenants are opaque non-empty strings issued by the account system; the
/// limiter never interprets them beyond equality.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TenantId(String);

impl TenantId {
    /// Creates a validated tenant identifier.
    pub fn new(value: impl Into<String>) -> AppResult<Self> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(AppError::Validation(
                "tenant id must not be empty or whitespace".to_owned(),
            ));
        }

        Ok(Self(value))
    }

    /// Returns the sentinel tenant for requests without a resolvable tenant.
    #[must_use]
    pub fn unknown() -> Self {
        Self(UNKNOWN_TENANT.to_owned())
    }

    /// Returns true when this is the sentinel tenant.
    #[must_use]
    pub fn is_unknown(&self) -> bool {
        self.0 == UNKNOWN_TENANT
    }

    /// Returns the underlying string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl Display for TenantId {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

/// Common application error categories.
#[derive(Debug, Error)]
pub enum AppError {
    /// Invalid input or violated invariant.
    #[error("validation error: {0}")]
    Validation(String),

    /// Requested resource does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Request was denied by admission control.
    ///
    /// Raised both when a bucket is exhausted and when rate limiting is
    /// temporarily unavailable; the limiter is fail-closed in either case.
    #[error("rate limited: retry after {retry_after_seconds}s")]
    RateLimited {
        /// Seconds the caller should wait before retrying.
        retry_after_seconds: u64,
        /// Advisory time at which the bucket window fully resets.
        reset_time: Option<DateTime<Utc>>,
    },

    /// Internal unexpected error.
    #[error("internal error: {0}")]
    Internal(String),
}

#[cfg(test)]
mod tests {
    use super::TenantId;

    #[test]
    fn tenant_id_rejects_whitespace() {
        let result = TenantId::new("   ");
        assert!(result.is_err());
    }

    #[test]
    fn tenant_id_preserves_value() {
        let tenant_id = TenantId::new("acme-west");
        assert!(tenant_id.is_ok_and(|tenant| tenant.as_str() == "acme-west" && !tenant.is_unknown()));
    }

    #[test]
    fn unknown_tenant_is_sentinel() {
        assert!(TenantId::unknown().is_unknown());
        assert_eq!(TenantId::unknown().to_string(), "unknown");
    }
}
