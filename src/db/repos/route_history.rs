use async_trait::async_trait;

use crate::{
    db::error::DbResult,
    models::{CreateRouteHistory, RouteHistory},
};

#[async_trait]
pub trait RouteHistoryRepo: Send + Sync {
    /// Insert a batch of route history records in one transaction.
    ///
    /// `modified` is the insert time, spaced one microsecond apart per record
    /// (see [`batch_timestamps`](super::batch_timestamps)); `creation` falls
    /// back to it when absent. Returns the number of rows written.
    async fn insert_batch(&self, records: Vec<CreateRouteHistory>) -> DbResult<u64>;

    /// List a user's records, newest first.
    async fn list_for_user(&self, user: &str, limit: i64) -> DbResult<Vec<RouteHistory>>;

    /// Count a user's records.
    async fn count_for_user(&self, user: &str) -> DbResult<i64>;

    // ==================== Retention Operations ====================

    /// Users having more than `limit` records.
    async fn users_exceeding(&self, limit: u32) -> DbResult<Vec<String>>;

    /// Delete a user's records at or before the `modified` timestamp of the
    /// record at offset `keep` in newest-first order.
    ///
    /// Records sharing that boundary timestamp are deleted too, so slightly
    /// more than the excess may go. Returns the number of rows deleted.
    async fn delete_beyond_newest(&self, user: &str, keep: u32) -> DbResult<u64>;

    /// Number of rows [`delete_beyond_newest`](Self::delete_beyond_newest)
    /// would delete. Used for dry runs.
    async fn count_beyond_newest(&self, user: &str, keep: u32) -> DbResult<i64>;
}
