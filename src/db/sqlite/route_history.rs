use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::{
    db::{
        error::{DbError, DbResult},
        repos::{RouteHistoryRepo, batch_timestamps, truncate_to_micros},
    },
    models::{CreateRouteHistory, RouteHistory},
};

pub struct SqliteRouteHistoryRepo {
    pool: SqlitePool,
}

impl SqliteRouteHistoryRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn parse_uuid(s: &str) -> DbResult<Uuid> {
    Uuid::parse_str(s).map_err(|e| DbError::CorruptRow {
        column: "id",
        detail: e.to_string(),
    })
}

#[async_trait]
impl RouteHistoryRepo for SqliteRouteHistoryRepo {
    async fn insert_batch(&self, records: Vec<CreateRouteHistory>) -> DbResult<u64> {
        if records.is_empty() {
            return Ok(0);
        }

        let stamps = batch_timestamps(chrono::Utc::now(), records.len());
        let mut tx = self.pool.begin().await?;
        let mut inserted: u64 = 0;

        for (record, modified) in records.into_iter().zip(stamps) {
            let creation = record.creation.map(truncate_to_micros).unwrap_or(modified);
            let result = sqlx::query(
                r#"
                INSERT INTO route_history (id, user_id, route, creation, modified)
                VALUES (?, ?, ?, ?, ?)
                "#,
            )
            .bind(Uuid::new_v4().to_string())
            .bind(&record.user)
            .bind(&record.route)
            .bind(creation)
            .bind(modified)
            .execute(&mut *tx)
            .await?;
            inserted += result.rows_affected();
        }

        tx.commit().await?;
        Ok(inserted)
    }

    async fn list_for_user(&self, user: &str, limit: i64) -> DbResult<Vec<RouteHistory>> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, route, creation, modified
            FROM route_history
            WHERE user_id = ?
            ORDER BY modified DESC, creation DESC
            LIMIT ?
            "#,
        )
        .bind(user)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(RouteHistory {
                    id: parse_uuid(&row.get::<String, _>("id"))?,
                    user: row.get("user_id"),
                    route: row.get("route"),
                    creation: row.get("creation"),
                    modified: row.get("modified"),
                })
            })
            .collect()
    }

    async fn count_for_user(&self, user: &str) -> DbResult<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM route_history WHERE user_id = ?")
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
            HAVING COUNT(*) > ?
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
            WHERE user_id = ?
              AND modified <= (
                  SELECT modified FROM route_history
                  WHERE user_id = ?
                  ORDER BY modified DESC
                  LIMIT 1 OFFSET ?
              )
            "#,
        )
        .bind(user)
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
            WHERE user_id = ?
              AND modified <= (
                  SELECT modified FROM route_history
                  WHERE user_id = ?
                  ORDER BY modified DESC
                  LIMIT 1 OFFSET ?
              )
            "#,
        )
        .bind(user)
        .bind(user)
        .bind(i64::from(keep))
        .fetch_one(&self.pool)
        .await?;

        Ok(row.get::<i64, _>("count"))
    }
}
