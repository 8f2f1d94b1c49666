//! Leadflow API composition root.

#![forbid(unsafe_code)]

mod api_config;
mod dto;
mod error;
mod handlers;
mod middleware;
mod state;

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderValue, Method};
use axum::middleware::from_fn_with_state;
use axum::routing::get;
use leadflow_application::{AdmissionService, BucketStore};
use leadflow_core::AppError;
use leadflow_infrastructure::{InMemoryBucketStore, RedisBucketStore, StaticPolicyResolver};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::api_config::{ApiConfig, StoreBackend};
use crate::state::AppState;

/// Interval between idle-bucket sweeps of the process-local store.
const CLEANUP_INTERVAL: Duration = Duration::from_secs(300);

#[tokio::main]
async fn main() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    api_config::init_tracing();

    let config = ApiConfig::load()?;

    let bucket_store: Arc<dyn BucketStore> = match config.store_backend {
        StoreBackend::Redis => {
            let client = redis::Client::open(config.redis_url.as_str())
                .map_err(|error| AppError::Validation(format!("invalid REDIS_URL: {error}")))?;
            Arc::new(RedisBucketStore::new(
                client,
                config.idle_ttl_seconds,
                config.store_timeout,
            ))
        }
        StoreBackend::Memory => Arc::new(InMemoryBucketStore::new(config.idle_ttl_seconds)),
    };

    let policy_resolver = Arc::new(StaticPolicyResolver::new(config.limiter_enabled)?);
    let admission_service = AdmissionService::new(bucket_store.clone(), policy_resolver);

    let app_state = AppState {
        admission_service,
        bucket_store: bucket_store.clone(),
    };

    // The Redis store expires idle records natively; the sweep only matters
    // for the in-memory store, but is harmless either way.
    let sweeper_store = bucket_store.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(CLEANUP_INTERVAL);
        loop {
            ticker.tick().await;
            sweeper_store.cleanup().await;
        }
    });

    let cors_layer = CorsLayer::new()
        .allow_origin(
            HeaderValue::from_str(&config.frontend_url)
                .map_err(|error| AppError::Internal(format!("invalid FRONTEND_URL: {error}")))?,
        )
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE, middleware::TENANT_HEADER]);

    let admin_routes = Router::new()
        .route(
            "/admin/rate-limits/state",
            get(handlers::rate_limits::bucket_state_handler)
                .delete(handlers::rate_limits::reset_bucket_handler),
        )
        .route(
            "/admin/rate-limits/stats",
            get(handlers::rate_limits::store_stats_handler),
        );

    let app = Router::new()
        .route("/health", get(handlers::health::health_handler))
        .route("/health/live", get(handlers::health::live_handler))
        .route("/health/ready", get(handlers::health::ready_handler))
        .merge(admin_routes)
        .layer(from_fn_with_state(app_state.clone(), middleware::rate_limit))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer)
        .with_state(app_state);

    let address = config.socket_address()?;
    let listener = tokio::net::TcpListener::bind(address)
        .await
        .map_err(|error| AppError::Internal(format!("failed to bind listener: {error}")))?;

    info!(%address, "leadflow-api listening");

    axum::serve(listener, app)
        .await
        .map_err(|error| AppError::Internal(format!("api server error: {error}")))
}
