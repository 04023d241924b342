//! Health check and metrics endpoints.

use axum::{Json, extract::State, response::IntoResponse};
use http::StatusCode;
use serde::Serialize;

use crate::AppState;
#[cfg(feature = "prometheus")]
use crate::observability::metrics::get_prometheus_handle;

/// Detailed health status response.
#[derive(Debug, Serialize)]
pub struct HealthStatus {
    /// Overall status: "healthy" or "unhealthy"
    pub status: String,
    pub version: String,
    pub subsystems: SubsystemStatus,
}

#[derive(Debug, Serialize)]
pub struct SubsystemStatus {
    /// Absent when no database is configured.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<ComponentStatus>,
    pub deferred_insert: QueueStatus,
}

#[derive(Debug, Serialize)]
pub struct ComponentStatus {
    pub healthy: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
}

/// Backlog of the deferred insert queue.
#[derive(Debug, Serialize)]
pub struct QueueStatus {
    pub pending: usize,
    pub dropped: u64,
}

/// Full health check with subsystem status.
///
/// A failing database makes the service unhealthy; a backed-up queue does not.
#[tracing::instrument(name = "health.check", skip(state))]
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let mut overall_healthy = true;

    let database = match &state.db {
        Some(db) => {
            let start = std::time::Instant::now();
            let db_healthy = db.health_check().await.is_ok();
            let latency_ms = start.elapsed().as_millis() as u64;

            if !db_healthy {
                overall_healthy = false;
            }

            Some(ComponentStatus {
                healthy: db_healthy,
                message: if db_healthy {
                    None
                } else {
                    Some("Database connection failed".to_string())
                },
                latency_ms: Some(latency_ms),
            })
        }
        None => None,
    };

    let subsystems = SubsystemStatus {
        database,
        deferred_insert: QueueStatus {
            pending: state.deferred_inserts.len(),
            dropped: state.deferred_inserts.dropped_count(),
        },
    };

    let health = HealthStatus {
        status: if overall_healthy { "healthy" } else { "unhealthy" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        subsystems,
    };

    let status_code = if overall_healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(health))
}

/// Liveness probe: always 200 while the process serves requests.
#[tracing::instrument(name = "health.liveness")]
pub async fn liveness() -> impl IntoResponse {
    StatusCode::OK
}

/// Prometheus metrics endpoint.
///
/// Returns metrics in Prometheus text format.
#[tracing::instrument(name = "health.metrics")]
pub async fn metrics() -> impl IntoResponse {
    #[cfg(feature = "prometheus")]
    {
        return match get_prometheus_handle() {
            Some(handle) => (
                StatusCode::OK,
                [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
                handle.render(),
            ),
            None => (
                StatusCode::SERVICE_UNAVAILABLE,
                [("content-type", "text/plain")],
                "Metrics not initialized".to_string(),
            ),
        };
    }
    #[cfg(not(feature = "prometheus"))]
    (
        StatusCode::NOT_FOUND,
        [("content-type", "text/plain")],
        "Prometheus metrics not enabled".to_string(),
    )
}

#[cfg(test)]
mod tests {
    use axum::{Router, body::Body};
    use http::Request;
    use serde_json::Value;
    use tower::ServiceExt;

    use super::*;
    use crate::config::AppConfig;

    fn test_app_no_db() -> Router {
        let state = AppState::from_parts(AppConfig::default(), None, Default::default());
        let config = state.config.clone();
        crate::build_app(&config, state)
    }

    #[cfg(feature = "database-sqlite")]
    async fn test_app_with_db() -> Router {
        let pool = crate::db::tests::harness::migrated_sqlite_pool().await;
        let db = std::sync::Arc::new(crate::db::DbPool::from_sqlite(pool));
        let state = AppState::from_parts(AppConfig::default(), Some(db), Default::default());
        let config = state.config.clone();
        crate::build_app(&config, state)
    }

    async fn get(app: &Router, uri: &str) -> (StatusCode, String) {
        let request = Request::builder()
            .method("GET")
            .uri(uri)
            .body(Body::empty())
            .unwrap();

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, String::from_utf8_lossy(&body).to_string())
    }

    async fn get_json(app: &Router, uri: &str) -> (StatusCode, Value) {
        let (status, body) = get(app, uri).await;
        (status, serde_json::from_str(&body).unwrap_or(Value::Null))
    }

    #[tokio::test]
    async fn test_health_check_no_db() {
        let app = test_app_no_db();

        let (status, body) = get_json(&app, "/health").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert!(body["version"].as_str().unwrap().contains('.'));
        assert!(body["subsystems"]["database"].is_null());
        assert_eq!(body["subsystems"]["deferred_insert"]["pending"], 0);
    }

    #[cfg(feature = "database-sqlite")]
    #[tokio::test]
    async fn test_health_check_with_db() {
        let app = test_app_with_db().await;

        let (status, body) = get_json(&app, "/health").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["subsystems"]["database"]["healthy"], true);
        assert!(body["subsystems"]["database"]["latency_ms"].is_number());
    }

    #[tokio::test]
    async fn test_liveness_always_ok() {
        let app = test_app_no_db();
        let (status, _) = get(&app, "/health/live").await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_metrics_route_absent_when_disabled() {
        let app = test_app_no_db();
        let (status, _) = get(&app, "/metrics").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
