use std::future::Future;
use std::sync::Arc;

use domains::{BlobStore, DomainError, SessionVerifier};
use services::Services;

use crate::error::ApiError;
use crate::metrics::{ApiMetrics, Outcome};

/// State shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub services: Services,
    pub sessions: Arc<dyn SessionVerifier>,
    pub blobs: Arc<dyn BlobStore>,
    pub metrics: Arc<ApiMetrics>,
}

impl AppState {
    pub fn new(services: Services, sessions: Arc<dyn SessionVerifier>, blobs: Arc<dyn BlobStore>) -> Self {
        Self { services, sessions, blobs, metrics: Arc::new(ApiMetrics::new()) }
    }

    /// Runs one service call and counts its outcome under `operation`.
    pub async fn observe<T>(
        &self,
        operation: &str,
        call: impl Future<Output = domains::Result<T>>,
    ) -> Result<T, ApiError> {
        let result = call.await;
        let outcome = match &result {
            Ok(_) => Outcome::Ok,
            Err(DomainError::Store(_)) => Outcome::Failed,
            Err(_) => Outcome::Rejected,
        };
        self.metrics.record(operation, outcome);
        result.map_err(ApiError::from)
    }
}
