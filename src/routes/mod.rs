mod error;
pub mod health;
pub mod route_history;

use axum::{Router, routing::post};
pub use error::{ApiError, ErrorInfo, ErrorResponse};

use crate::AppState;

/// Routes mounted under `/api`.
pub fn get_api_routes() -> Router<AppState> {
    Router::new().route(
        "/route-history",
        post(route_history::capture_route_history),
    )
}
