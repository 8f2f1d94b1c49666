//! Single-process bucket store.
//!
//! Implements the same contract as the Redis-backed store behind one
//! process-local mutex: the lock is the critical section that makes the
//! read-refill-debit cycle atomic. Suitable for single-instance deployments
//! and deterministic tests. Idle entries are swept on `cleanup()` and treated
//! as absent when read, since there is no external TTL mechanism.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use leadflow_application::{BucketStore, BucketStoreStats};
use leadflow_domain::{RateLimitDecision, RateLimitKey, RateLimitPolicy, TokenBucketState};
use tokio::sync::Mutex;

#[derive(Debug, Clone, Copy)]
struct BucketEntry {
    state: TokenBucketState,
    last_access: DateTime<Utc>,
}

/// In-memory implementation of the bucket store port.
pub struct InMemoryBucketStore {
    buckets: Mutex<HashMap<String, BucketEntry>>,
    idle_ttl: Duration,
}

impl InMemoryBucketStore {
    /// Creates a store whose buckets expire after the given idle TTL.
    #[must_use]
    pub fn new(idle_ttl_seconds: u32) -> Self {
        Self {
            buckets: Mutex::new(HashMap::new()),
            idle_ttl: Duration::seconds(i64::from(idle_ttl_seconds)),
        }
    }

    fn is_expired(&self, entry: &BucketEntry, now: DateTime<Utc>) -> bool {
        now - entry.last_access > self.idle_ttl
    }
}

#[async_trait]
impl BucketStore for InMemoryBucketStore {
    async fn consume(
        &self,
        policy: &RateLimitPolicy,
        key: &RateLimitKey,
        now: DateTime<Utc>,
    ) -> RateLimitDecision {
        let capacity = i64::from(policy.capacity());
        let window = Duration::seconds(i64::from(policy.window_seconds()));
        let address = key.storage_key();

        let mut buckets = self.buckets.lock().await;
        let mut state = buckets
            .get(&address)
            .filter(|entry| !self.is_expired(entry, now))
            .map(|entry| entry.state)
            .unwrap_or_else(|| TokenBucketState {
                tokens: capacity,
                last_refill: now,
                reset_time: now + window,
            });

        let elapsed_seconds = (now - state.last_refill).num_milliseconds() as f64 / 1000.0;
        if elapsed_seconds > 0.0 {
            let added = (elapsed_seconds * policy.refill_rate_per_second()).floor() as i64;
            // Only advance last_refill when whole tokens were credited, so
            // fractional progress is not discarded call after call.
            if added > 0 {
                state.tokens = (state.tokens + added).min(capacity);
                state.last_refill = now;
                state.reset_time = now + window;
            }
        }

        let allowed = state.tokens >= 1;
        if allowed {
            state.tokens -= 1;
        }

        buckets.insert(
            address,
            BucketEntry {
                state,
                last_access: now,
            },
        );

        if allowed {
            RateLimitDecision::allowed(u32::try_from(state.tokens).unwrap_or(0))
        } else {
            RateLimitDecision::exceeded(policy.retry_after_seconds(), state.reset_time)
        }
    }

    async fn get_state(&self, key: &RateLimitKey) -> Option<TokenBucketState> {
        let now = Utc::now();
        let buckets = self.buckets.lock().await;
        buckets
            .get(&key.storage_key())
            .filter(|entry| !self.is_expired(entry, now))
            .map(|entry| entry.state)
    }

    async fn reset(&self, key: &RateLimitKey) {
        self.buckets.lock().await.remove(&key.storage_key());
    }

    async fn cleanup(&self) {
        let now = Utc::now();
        let mut buckets = self.buckets.lock().await;
        let before = buckets.len();
        buckets.retain(|_, entry| !self.is_expired(entry, now));
        tracing::debug!(
            swept = before - buckets.len(),
            remaining = buckets.len(),
            "swept idle rate limit buckets"
        );
    }

    async fn stats(&self) -> BucketStoreStats {
        let buckets = self.buckets.lock().await;
        BucketStoreStats {
            connected: true,
            total_keys: buckets.len() as u64,
            memory_usage: None,
        }
    }

    async fn is_healthy(&self) -> bool {
        true
    }
}
