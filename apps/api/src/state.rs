use std::sync::Arc;

use leadflow_application::{AdmissionService, BucketStore};

/// Shared state injected into handlers and middleware.
#[derive(Clone)]
pub struct AppState {
    /// Per-request admission guard.
    pub admission_service: AdmissionService,
    /// Bucket store, exposed for the admin inspect/reset/stats surface.
    pub bucket_store: Arc<dyn BucketStore>,
}
