//! Route history capture and retention, a deferred insert queue, and a
//! handlebars template layer with app-scoped loading and components.

use std::sync::Arc;

use axum::{Router, routing::get};
use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};

pub mod config;
pub mod db;
pub mod deferred_insert;
pub mod deferred_sink;
pub mod middleware;
pub mod models;
pub mod observability;
pub mod retention;
pub mod route_history;
pub mod routes;
pub mod templates;

use deferred_insert::{DeferredInsertQueue, DeferredInsertQueueConfig};
use templates::{TemplateEnvironment, TemplateExtensions};

/// Shared state handed to every request handler.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<config::AppConfig>,
    /// Absent when no database is configured.
    pub db: Option<Arc<db::DbPool>>,
    pub deferred_inserts: Arc<DeferredInsertQueue>,
    pub templates: Arc<TemplateEnvironment>,
}

impl AppState {
    /// Connect to the configured database (running migrations if enabled)
    /// and build the template environment.
    pub async fn new(
        config: config::AppConfig,
        extensions: TemplateExtensions,
    ) -> Result<Self, db::DbError> {
        let db = if config.database.is_none() {
            tracing::info!("No database configured, route history will not be persisted");
            None
        } else {
            let pool = db::DbPool::from_config(&config.database).await?;
            if config.database.run_migrations() {
                pool.run_migrations().await?;
            }
            Some(Arc::new(pool))
        };

        Ok(Self::from_parts(config, db, extensions))
    }

    /// Assemble state from an already connected pool.
    pub fn from_parts(
        config: config::AppConfig,
        db: Option<Arc<db::DbPool>>,
        extensions: TemplateExtensions,
    ) -> Self {
        let deferred_inserts = Arc::new(DeferredInsertQueue::new(
            DeferredInsertQueueConfig::from(&config.deferred_insert),
        ));
        let templates = Arc::new(TemplateEnvironment::new(&config.templates, extensions));

        Self {
            config: Arc::new(config),
            db,
            deferred_inserts,
            templates,
        }
    }
}

/// Build the HTTP router.
pub fn build_app(config: &config::AppConfig, state: AppState) -> Router {
    let mut app = Router::new()
        .route("/health", get(routes::health::health_check))
        .route("/health/live", get(routes::health::liveness));

    if config.observability.metrics.enabled {
        app = app.route("/metrics", get(routes::health::metrics));
    }

    app.nest("/api", routes::get_api_routes())
        .layer(axum::middleware::from_fn(middleware::request_id_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(RequestBodyLimitLayer::new(config.server.body_limit_bytes))
        .with_state(state)
}
