//! Infrastructure adapters for application ports.

#![forbid(unsafe_code)]

mod in_memory_bucket_store;
mod redis_bucket_store;
mod static_policy_resolver;

pub use in_memory_bucket_store::InMemoryBucketStore;
pub use redis_bucket_store::RedisBucketStore;
pub use static_policy_resolver::StaticPolicyResolver;
