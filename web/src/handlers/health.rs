//! Liveness and readiness endpoints.

use axum::{Json, extract::State, http::StatusCode};
use std::sync::Arc;
use vidly_core::store::Database;
use vidly_runtime::health::{HealthReport, check_store};

/// Liveness check.
///
/// Returns 200 while the process is serving requests. Dependencies are not
/// checked.
///
/// ```text
/// GET /health
/// ```
#[allow(clippy::unused_async)]
pub async fn health_check() -> (StatusCode, &'static str) {
    (StatusCode::OK, "ok")
}

/// Readiness check.
///
/// Pings the store. 200 when healthy or degraded, 503 when the store is
/// unreachable.
///
/// ```text
/// GET /ready
/// ```
///
/// ```json
/// {
///   "status": "healthy",
///   "checks": [{ "component": "store", "status": "healthy", "latency_ms": 2 }],
///   "timestamp": "2025-01-01T00:00:00Z"
/// }
/// ```
pub async fn readiness(
    State(store): State<Arc<dyn Database>>,
) -> (StatusCode, Json<HealthReport>) {
    let report = HealthReport::new(vec![check_store(store.as_ref()).await]);

    let status = if report.is_ready() {
        StatusCode::OK
    } else {
        tracing::warn!(status = %report.status, "Readiness check failed");
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status, Json(report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use vidly_core::error::StoreError;
    use vidly_runtime::HealthStatus;
    use vidly_testing::{InMemoryStore, StoreOp};

    #[tokio::test]
    async fn test_simple_health_check() {
        let (status, body) = health_check().await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "ok");
    }

    #[tokio::test]
    async fn test_ready_when_store_answers() {
        let store: Arc<dyn Database> = Arc::new(InMemoryStore::new());

        let (status, Json(report)) = readiness(State(store)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(report.status, HealthStatus::Healthy);
    }

    #[tokio::test]
    async fn test_not_ready_when_ping_fails() {
        let memory = InMemoryStore::new();
        memory.fail(StoreOp::Ping, StoreError::Backend("connection refused".to_string()));
        let store: Arc<dyn Database> = Arc::new(memory);

        let (status, Json(report)) = readiness(State(store)).await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(report.status, HealthStatus::Unhealthy);
    }
}
