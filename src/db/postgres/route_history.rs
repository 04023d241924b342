use async_trait::async_trait;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::{
    db::{
        error::DbResult,
        repos::{RouteHistoryRepo, batch_timestamps, truncate_to_micros},
    },
    models::{CreateRouteHistory, RouteHistory},
};

pub struct PostgresRouteHistoryRepo {
    pool: PgPool,
}

impl PostgresRouteHistoryRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RouteHistoryRepo for PostgresRouteHistoryRepo {
    async fn insert_batch(&self, records: Vec<CreateRouteHistory>) -> DbResult<u64> {
        if records.is_empty() {
            return Ok(0);
        }

        let modifieds = batch_timestamps(chrono::Utc::now(), records.len());
        let mut ids = Vec::with_capacity(records.len());
        let mut users = Vec::with_capacity(records.len());
        let mut routes = Vec::with_capacity(records.len());
        let mut creations = Vec::with_capacity(records.len());

        for (record, modified) in records.into_iter().zip(&modifieds) {
            ids.push(Uuid::new_v4());
            users.push(record.user);
            routes.push(record.route);
            creations.push(record.creation.map(truncate_to_micros).unwrap_or(*modified));
        }

        let result = sqlx::query(
            r#"
            INSERT INTO route_history (id, user_id, route, creation, modified)
            SELECT id, user_id, route, creation, modified
            FROM UNNEST(
                $1::uuid[], $2::text[], $3::text[], $4::timestamptz[], $5::timestamptz[]
            ) AS t(id, user_id, route, creation, modified)
            "#,
        )
        .bind(&ids)
        .bind(&users)
        .bind(&routes)
        .bind(&creations)
        .bind(&modifieds)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn list_for_user(&self, user: &str, limit: i64) -> DbResult<Vec<RouteHistory>> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, route, creation, modified
            FROM route_history
            WHERE user_id = $1
            ORDER BY modified DESC, creation DESC
            LIMIT $2
            "#,
        )
        .bind(user)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| RouteHistory {
                id: row.get("id"),
                user: row.get("user_id"),
                route: row.get("route"),
                creation: row.get("creation"),
                modified: row.get("modified"),
            })
            .collect())
    }

    async fn count_for_user(&self, user: &str) -> DbResult<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM route_history WHERE user_id = $1")
            .bind(user)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get::<i64, _>("count"))
    }

    // ==================== Retention Operations ====================

    async fn users_exceeding(&self, limit: u32) -> DbResult<Vec<String>> {
        let rows = sqlx::query(
            r#"
            SELECT user_id
            FROM route_history
            GROUP BY user_id
            HAVING COUNT(*) > $1
            ORDER BY user_id
            "#,
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|row| row.get("user_id")).collect())
    }

    async fn delete_beyond_newest(&self, user: &str, keep: u32) -> DbResult<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM route_history
            WHERE user_id = $1
              AND modified <= (
                  SELECT modified FROM route_history
                  WHERE user_id = $1
                  ORDER BY modified DESC
                  LIMIT 1 OFFSET $2
              )
            "#,
        )
        .bind(user)
        .bind(i64::from(keep))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn count_beyond_newest(&self, user: &str, keep: u32) -> DbResult<i64> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS count
            FROM route_history
            WHERE user_id = $1
              AND modified <= (
                  SELECT modified FROM route_history
                  WHERE user_id = $1
                  ORDER BY modified DESC
                  LIMIT 1 OFFSET $2
              )
            "#,
        )
        .bind(user)
        .bind(i64::from(keep))
        .fetch_one(&self.pool)
        .await?;

        Ok(row.get::<i64, _>("count"))
    }
}
