//! Route history storage on SQLite or PostgreSQL.

mod error;
#[cfg(feature = "database-postgres")]
pub mod postgres;
pub mod repos;
#[cfg(feature = "database-sqlite")]
pub mod sqlite;

#[cfg(all(test, any(feature = "database-sqlite", feature = "database-postgres")))]
pub mod tests;

use std::{sync::Arc, time::Duration};

pub use error::{DbError, DbResult};
pub use repos::*;

use crate::config::DatabaseConfig;

enum Backend {
    #[cfg(feature = "database-sqlite")]
    Sqlite(sqlx::SqlitePool),
    #[cfg(feature = "database-postgres")]
    Postgres(sqlx::PgPool),
    #[cfg(not(any(feature = "database-sqlite", feature = "database-postgres")))]
    _None(std::convert::Infallible),
}

/// Connection pool plus the route history repository built on top of it.
pub struct DbPool {
    backend: Backend,
    route_history: Arc<dyn RouteHistoryRepo>,
}

impl DbPool {
    /// Wrap an existing SQLite pool.
    #[cfg(feature = "database-sqlite")]
    pub fn from_sqlite(pool: sqlx::SqlitePool) -> Self {
        Self {
            route_history: Arc::new(sqlite::SqliteRouteHistoryRepo::new(pool.clone())),
            backend: Backend::Sqlite(pool),
        }
    }

    /// Wrap an existing PostgreSQL pool.
    #[cfg(feature = "database-postgres")]
    pub fn from_postgres(pool: sqlx::PgPool) -> Self {
        Self {
            route_history: Arc::new(postgres::PostgresRouteHistoryRepo::new(pool.clone())),
            backend: Backend::Postgres(pool),
        }
    }

    /// Connect using the `[database]` section.
    pub async fn from_config(config: &DatabaseConfig) -> DbResult<Self> {
        match config {
            DatabaseConfig::None => Err(DbError::NotConfigured),
            #[cfg(feature = "database-sqlite")]
            DatabaseConfig::Sqlite(cfg) => {
                let journal_mode = if cfg.wal_mode {
                    sqlx::sqlite::SqliteJournalMode::Wal
                } else {
                    sqlx::sqlite::SqliteJournalMode::Delete
                };
                let options = sqlx::sqlite::SqliteConnectOptions::new()
                    .filename(&cfg.path)
                    .create_if_missing(cfg.create_if_missing)
                    .journal_mode(journal_mode)
                    .busy_timeout(Duration::from_millis(cfg.busy_timeout_ms));

                let pool = sqlx::sqlite::SqlitePoolOptions::new()
                    .max_connections(cfg.max_connections)
                    .connect_with(options)
                    .await?;
                tracing::debug!(path = %cfg.path, "Connected to SQLite");

                Ok(Self::from_sqlite(pool))
            }
            #[cfg(feature = "database-postgres")]
            DatabaseConfig::Postgres(cfg) => {
                let pool = sqlx::postgres::PgPoolOptions::new()
                    .min_connections(cfg.min_connections)
                    .max_connections(cfg.max_connections)
                    .acquire_timeout(Duration::from_secs(cfg.connect_timeout_secs))
                    .connect(&cfg.url)
                    .await?;
                tracing::debug!("Connected to PostgreSQL");

                Ok(Self::from_postgres(pool))
            }
        }
    }

    /// Apply the embedded migrations for the active backend.
    pub async fn run_migrations(&self) -> DbResult<()> {
        match &self.backend {
            #[cfg(feature = "database-sqlite")]
            Backend::Sqlite(pool) => {
                sqlx::migrate!("./migrations_sqlx/sqlite").run(pool).await?;
            }
            #[cfg(feature = "database-postgres")]
            Backend::Postgres(pool) => {
                sqlx::migrate!("./migrations_sqlx/postgres").run(pool).await?;
            }
            #[cfg(not(any(feature = "database-sqlite", feature = "database-postgres")))]
            Backend::_None(infallible) => match *infallible {},
        }
        tracing::info!("Route history migrations applied");
        Ok(())
    }

    pub fn route_history(&self) -> Arc<dyn RouteHistoryRepo> {
        Arc::clone(&self.route_history)
    }

    /// Round-trip a trivial query.
    pub async fn health_check(&self) -> DbResult<()> {
        match &self.backend {
            #[cfg(feature = "database-sqlite")]
            Backend::Sqlite(pool) => {
                sqlx::query("SELECT 1").execute(pool).await?;
            }
            #[cfg(feature = "database-postgres")]
            Backend::Postgres(pool) => {
                sqlx::query("SELECT 1").execute(pool).await?;
            }
            #[cfg(not(any(feature = "database-sqlite", feature = "database-postgres")))]
            Backend::_None(infallible) => match *infallible {},
        }
        Ok(())
    }
}
