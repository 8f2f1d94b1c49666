//! Domain value types and invariants.

#![forbid(unsafe_code)]

mod rate_limit;

pub use rate_limit::{
    DecisionReason, EnforcementMode, RateLimitDecision, RateLimitKey, RateLimitPolicy, RateScope,
    STORAGE_KEY_PREFIX, STORE_UNAVAILABLE_RETRY_SECONDS, TokenBucketState,
};
