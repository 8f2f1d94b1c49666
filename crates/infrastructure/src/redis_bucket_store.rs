//! Redis-backed bucket store for multi-instance deployments.
//!
//! The read-refill-debit cycle runs as a single server-side Lua script, so
//! concurrent callers from any number of service processes cannot interleave
//! the read of current tokens with the write of debited tokens. Every write
//! refreshes the record's idle TTL; abandoned buckets expire inside Redis
//! without any sweeper. All round-trips run under a bounded timeout, and a
//! timeout is treated exactly like any other communication failure:
//! fail-closed.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use leadflow_application::{BucketStore, BucketStoreStats};
use leadflow_domain::{RateLimitDecision, RateLimitKey, RateLimitPolicy, TokenBucketState};
use redis::Script;
use tokio::time::timeout;
use tracing::{debug, error, warn};

const CONSUME_SCRIPT: &str = r#"
local key = KEYS[1]
local capacity = tonumber(ARGV[1])
local refill_rate = tonumber(ARGV[2])
local now_ms = tonumber(ARGV[3])
local window_ms = tonumber(ARGV[4])
local ttl_seconds = tonumber(ARGV[5])

local state = redis.call('HMGET', key, 'tokens', 'lastRefill', 'resetTime')
local tokens = tonumber(state[1])
local last_refill = tonumber(state[2])
local reset_time = tonumber(state[3])

if tokens == nil or last_refill == nil or reset_time == nil then
  tokens = capacity
  last_refill = now_ms
  reset_time = now_ms + window_ms
end

local elapsed_seconds = (now_ms - last_refill) / 1000
if elapsed_seconds > 0 then
  local added = math.floor(elapsed_seconds * refill_rate)
  if added > 0 then
    tokens = math.min(tokens + added, capacity)
    last_refill = now_ms
    reset_time = now_ms + window_ms
  end
end

local allowed = 0
if tokens >= 1 then
  allowed = 1
  tokens = tokens - 1
end

redis.call('HSET', key, 'tokens', tokens, 'lastRefill', last_refill, 'resetTime', reset_time)
redis.call('EXPIRE', key, ttl_seconds)

return {allowed, tokens, reset_time}
"#;

/// Redis implementation of the bucket store port.
#[derive(Clone)]
pub struct RedisBucketStore {
    client: redis::Client,
    idle_ttl_seconds: u32,
    round_trip_timeout: Duration,
}

impl RedisBucketStore {
    /// Creates a store with a configured Redis client.
    ///
    /// `round_trip_timeout` bounds every Redis call so the limiter cannot
    /// become a latency amplifier when the store is slow.
    #[must_use]
    pub fn new(client: redis::Client, idle_ttl_seconds: u32, round_trip_timeout: Duration) -> Self {
        Self {
            client,
            idle_ttl_seconds,
            round_trip_timeout,
        }
    }
}

#[async_trait]
impl BucketStore for RedisBucketStore {
    async fn consume(
        &self,
        policy: &RateLimitPolicy,
        key: &RateLimitKey,
        now: DateTime<Utc>,
    ) -> RateLimitDecision {
        let address = key.storage_key();
        let window_ms = i64::from(policy.window_seconds()) * 1000;

        let invocation = async {
            let mut connection = self.client.get_multiplexed_async_connection().await?;
            let script = Script::new(CONSUME_SCRIPT);
            let reply: (i64, i64, i64) = script
                .key(&address)
                .arg(i64::from(policy.capacity()))
                .arg(policy.refill_rate_per_second())
                .arg(now.timestamp_millis())
                .arg(window_ms)
                .arg(i64::from(self.idle_ttl_seconds))
                .invoke_async(&mut connection)
                .await?;
            Ok::<_, redis::RedisError>(reply)
        };

        let (allowed, tokens, reset_time_ms) = match timeout(self.round_trip_timeout, invocation)
            .await
        {
            Ok(Ok(reply)) => reply,
            Ok(Err(cause)) => {
                error!(storage_key = %address, %cause, "redis consume failed, denying request");
                return RateLimitDecision::store_unavailable();
            }
            Err(_elapsed) => {
                error!(storage_key = %address, "redis consume timed out, denying request");
                return RateLimitDecision::store_unavailable();
            }
        };

        if allowed == 1 {
            RateLimitDecision::allowed(u32::try_from(tokens).unwrap_or(0))
        } else {
            let reset_time = millis_to_datetime(reset_time_ms)
                .unwrap_or_else(|| now + chrono::Duration::milliseconds(window_ms));
            RateLimitDecision::exceeded(policy.retry_after_seconds(), reset_time)
        }
    }

    async fn get_state(&self, key: &RateLimitKey) -> Option<TokenBucketState> {
        let address = key.storage_key();

        let read = async {
            let mut connection = self.client.get_multiplexed_async_connection().await?;
            let reply: (Option<String>, Option<String>, Option<String>) = redis::cmd("HMGET")
                .arg(&address)
                .arg("tokens")
                .arg("lastRefill")
                .arg("resetTime")
                .query_async(&mut connection)
                .await?;
            Ok::<_, redis::RedisError>(reply)
        };

        let fields = match timeout(self.round_trip_timeout, read).await {
            Ok(Ok(fields)) => fields,
            Ok(Err(cause)) => {
                warn!(storage_key = %address, %cause, "redis state read failed");
                return None;
            }
            Err(_elapsed) => {
                warn!(storage_key = %address, "redis state read timed out");
                return None;
            }
        };

        parse_bucket_state(fields)
    }

    async fn reset(&self, key: &RateLimitKey) {
        let address = key.storage_key();

        let delete = async {
            let mut connection = self.client.get_multiplexed_async_connection().await?;
            let _removed: i64 = redis::cmd("DEL")
                .arg(&address)
                .query_async(&mut connection)
                .await?;
            Ok::<_, redis::RedisError>(())
        };

        match timeout(self.round_trip_timeout, delete).await {
            Ok(Ok(())) => {}
            Ok(Err(cause)) => warn!(storage_key = %address, %cause, "redis bucket reset failed"),
            Err(_elapsed) => warn!(storage_key = %address, "redis bucket reset timed out"),
        }
    }

    async fn cleanup(&self) {
        // Idle expiry is delegated to Redis key TTLs; nothing to sweep.
        let stats = self.stats().await;
        debug!(
            connected = stats.connected,
            total_keys = stats.total_keys,
            "rate limit store cleanup pass"
        );
    }

    async fn stats(&self) -> BucketStoreStats {
        let probe = async {
            let mut connection = self.client.get_multiplexed_async_connection().await?;
            let total_keys: i64 = redis::cmd("DBSIZE").query_async(&mut connection).await?;
            let memory_info: String = redis::cmd("INFO")
                .arg("memory")
                .query_async(&mut connection)
                .await?;
            Ok::<_, redis::RedisError>((total_keys, memory_info))
        };

        match timeout(self.round_trip_timeout, probe).await {
            Ok(Ok((total_keys, memory_info))) => BucketStoreStats {
                connected: true,
                total_keys: u64::try_from(total_keys).unwrap_or(0),
                memory_usage: parse_used_memory(&memory_info),
            },
            Ok(Err(cause)) => {
                warn!(%cause, "redis stats probe failed");
                BucketStoreStats::disconnected()
            }
            Err(_elapsed) => {
                warn!("redis stats probe timed out");
                BucketStoreStats::disconnected()
            }
        }
    }

    async fn is_healthy(&self) -> bool {
        let ping = async {
            let mut connection = self.client.get_multiplexed_async_connection().await?;
            let reply: String = redis::cmd("PING").query_async(&mut connection).await?;
            Ok::<_, redis::RedisError>(reply)
        };

        matches!(
            timeout(self.round_trip_timeout, ping).await,
            Ok(Ok(reply)) if reply == "PONG"
        )
    }
}

fn parse_bucket_state(
    fields: (Option<String>, Option<String>, Option<String>),
) -> Option<TokenBucketState> {
    let (tokens, last_refill, reset_time) = fields;

    let tokens = tokens?.parse::<i64>().ok()?;
    let last_refill = millis_to_datetime(last_refill?.parse::<i64>().ok()?)?;
    let reset_time = millis_to_datetime(reset_time?.parse::<i64>().ok()?)?;

    Some(TokenBucketState {
        tokens,
        last_refill,
        reset_time,
    })
}

fn millis_to_datetime(millis: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(millis).single()
}

fn parse_used_memory(memory_info: &str) -> Option<String> {
    memory_info
        .lines()
        .find_map(|line| line.strip_prefix("used_memory_human:"))
        .map(|value| value.trim().to_owned())
}

#[cfg(test)]
mod tests {
    use super::{parse_bucket_state, parse_used_memory};

    #[test]
    fn bucket_state_parses_stringified_record() {
        let state = parse_bucket_state((
            Some("42".to_owned()),
            Some("1700000000000".to_owned()),
            Some("1700000060000".to_owned()),
        ));

        assert!(state.is_some_and(|state| {
            state.tokens == 42
                && state.last_refill.timestamp_millis() == 1_700_000_000_000
                && state.reset_time.timestamp_millis() == 1_700_000_060_000
        }));
    }

    #[test]
    fn missing_fields_yield_no_state() {
        assert!(parse_bucket_state((None, None, None)).is_none());
        assert!(
            parse_bucket_state((Some("42".to_owned()), None, Some("0".to_owned()))).is_none()
        );
    }

    #[test]
    fn malformed_fields_yield_no_state() {
        let state = parse_bucket_state((
            Some("not-a-number".to_owned()),
            Some("0".to_owned()),
            Some("0".to_owned()),
        ));
        assert!(state.is_none());
    }

    #[test]
    fn used_memory_is_extracted_from_info_section() {
        let info = "# Memory\r\nused_memory:1024\r\nused_memory_human:1.00K\r\n";
        assert_eq!(parse_used_memory(info), Some("1.00K".to_owned()));
        assert_eq!(parse_used_memory("# Memory\r\n"), None);
    }
}
