//! HTTP handlers.

pub mod health;
pub mod rate_limits;
