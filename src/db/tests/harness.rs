//! Databases for repository tests, migrated with the real migration files.

/// Fresh in-memory SQLite database with the schema applied.
///
/// A single connection, since every connection to `sqlite::memory:` opens
/// its own empty database.
#[cfg(feature = "database-sqlite")]
pub async fn migrated_sqlite_pool() -> sqlx::SqlitePool {
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to create in-memory SQLite pool");

    sqlx::migrate!("./migrations_sqlx/sqlite")
        .run(&pool)
        .await
        .expect("Failed to run SQLite migrations");

    pool
}

/// PostgreSQL in a testcontainers container, one per test run.
#[cfg(feature = "database-postgres")]
pub mod postgres {
    use sqlx::PgPool;
    use testcontainers_modules::{
        postgres::Postgres,
        testcontainers::{ContainerAsync, ImageExt, runners::AsyncRunner},
    };
    use tokio::sync::OnceCell;

    struct Container {
        _handle: ContainerAsync<Postgres>,
        url: String,
    }

    static CONTAINER: OnceCell<Container> = OnceCell::const_new();

    async fn container() -> &'static Container {
        CONTAINER
            .get_or_init(|| async {
                let handle = Postgres::default()
                    .with_tag("16-alpine")
                    .start()
                    .await
                    .expect("Failed to start PostgreSQL container");
                let host = handle.get_host().await.expect("Failed to get host");
                let port = handle
                    .get_host_port_ipv4(5432)
                    .await
                    .expect("Failed to get port");

                Container {
                    url: format!("postgres://postgres:postgres@{host}:{port}/postgres"),
                    _handle: handle,
                }
            })
            .await
    }

    /// Pool bound to its own schema, with the route history schema applied.
    pub async fn migrated_postgres_pool() -> PgPool {
        let container = container().await;
        let schema = format!("test_{}", uuid::Uuid::new_v4().simple());

        let admin = sqlx::postgres::PgPoolOptions::new()
            .max_connections(1)
            .connect(&container.url)
            .await
            .expect("Failed to connect to PostgreSQL");
        sqlx::query(&format!("CREATE SCHEMA \"{schema}\""))
            .execute(&admin)
            .await
            .expect("Failed to create test schema");

        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(5)
            .connect(&format!("{}?options=-c search_path={schema}", container.url))
            .await
            .expect("Failed to connect to test schema");

        sqlx::migrate!("./migrations_sqlx/postgres")
            .run(&pool)
            .await
            .expect("Failed to run PostgreSQL migrations");

        pool
    }
}
