//! Route history capture endpoint.

use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use serde::Deserialize;

use super::ApiError;
use crate::{
    AppState,
    route_history::{RoutesInput, deferred_insert_route_history},
};

#[derive(Debug, Deserialize)]
pub struct RouteHistoryRequest {
    pub routes: RoutesInput,
}

/// Queue the visited routes of the current user.
///
/// The user comes from the configured identity header, falling back to the
/// guest user. Writes happen later in the deferred insert worker, so the
/// response is an empty `202 Accepted`.
#[tracing::instrument(name = "route_history.capture", skip_all)]
pub async fn capture_route_history(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<RouteHistoryRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(request) = payload?;
    let user = request_user(&state, &headers);

    let queued = deferred_insert_route_history(&state.deferred_inserts, &user, request.routes)?;
    tracing::debug!(user = %user, queued, "Route history queued");

    Ok(StatusCode::ACCEPTED)
}

fn request_user(state: &AppState, headers: &HeaderMap) -> String {
    headers
        .get(state.config.server.identity_header.as_str())
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|user| !user.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| state.config.server.guest_user.clone())
}

#[cfg(test)]
mod tests {
    use axum::{Router, body::Body};
    use http::Request;
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use super::*;
    use crate::{config::AppConfig, deferred_insert::decode_payload};

    fn test_app() -> (Router, AppState) {
        let state = AppState::from_parts(AppConfig::default(), None, Default::default());
        (crate::build_app(&state.config, state.clone()), state)
    }

    async fn post(app: &Router, body: Value, user: Option<&str>) -> (StatusCode, Vec<u8>) {
        let mut builder = Request::builder()
            .method("POST")
            .uri("/api/route-history")
            .header("content-type", "application/json");
        if let Some(user) = user {
            builder = builder.header("X-Forwarded-User", user);
        }
        let request = builder.body(Body::from(body.to_string())).unwrap();

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, body.to_vec())
    }

    fn json_body(body: &[u8]) -> Value {
        serde_json::from_slice(body).unwrap_or(Value::Null)
    }

    fn queued_records(state: &AppState) -> Vec<Value> {
        state
            .deferred_inserts
            .drain_pending()
            .into_iter()
            .flat_map(|entry| decode_payload(&entry.payload).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_routes_queued_for_identified_user() {
        let (app, state) = test_app();

        let (status, body) = post(
            &app,
            json!({"routes": [{"route": "app/todo", "creation": "2024-01-01 10:00:00"}]}),
            Some("alice@example.com"),
        )
        .await;

        assert_eq!(status, StatusCode::ACCEPTED);
        assert!(body.is_empty());

        let records = queued_records(&state);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["user"], "alice@example.com");
        assert_eq!(records[0]["route"], "app/todo");
    }

    #[tokio::test]
    async fn test_encoded_routes_accepted() {
        let (app, state) = test_app();

        let (status, _) = post(
            &app,
            json!({"routes": "[{\"route\": \"app/user\"}, {\"route\": \"app/role\"}]"}),
            Some("bob"),
        )
        .await;

        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(queued_records(&state).len(), 2);
    }

    #[tokio::test]
    async fn test_anonymous_request_uses_guest() {
        let (app, state) = test_app();

        let (status, _) = post(&app, json!({"routes": [{"route": "login"}]}), None).await;

        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(queued_records(&state)[0]["user"], "Guest");
    }

    #[tokio::test]
    async fn test_invalid_routes_rejected() {
        let (app, state) = test_app();

        let (status, body) = post(&app, json!({"routes": "not json"}), Some("bob")).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json_body(&body)["error"]["type"], "invalid_request_error");
        assert!(state.deferred_inserts.is_empty());
    }

    #[tokio::test]
    async fn test_missing_routes_field_rejected() {
        let (app, _) = test_app();

        let (status, body) = post(&app, json!({"paths": []}), Some("bob")).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json_body(&body)["error"]["code"], "invalid_request");
    }

    #[tokio::test]
    async fn test_empty_routes_queue_nothing() {
        let (app, state) = test_app();

        let (status, body) = post(&app, json!({"routes": []}), Some("bob")).await;

        assert_eq!(status, StatusCode::ACCEPTED);
        assert!(body.is_empty());
        assert!(state.deferred_inserts.is_empty());
    }
}
