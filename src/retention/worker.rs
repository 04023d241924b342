//! Background worker that trims route history to the newest records per user.

use std::sync::Arc;

use crate::{
    config::RetentionConfig,
    db::{DbPool, DbResult, RouteHistoryRepo},
    observability::metrics,
};

/// Results from a single retention run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RetentionRunResult {
    /// Number of users that had records beyond the kept window.
    pub users_pruned: u64,
    /// Number of route history records deleted (or, in a dry run, that
    /// would have been deleted).
    pub records_deleted: u64,
}

impl RetentionRunResult {
    /// Check if any records were deleted.
    pub fn has_deletions(&self) -> bool {
        self.records_deleted > 0
    }
}

/// Starts the retention worker as a background task.
///
/// The worker runs in a loop, pruning route history at the configured
/// interval. It will run indefinitely until the task is cancelled.
pub async fn start_retention_worker(db: Arc<DbPool>, config: RetentionConfig) {
    if !config.enabled {
        tracing::info!("Retention worker disabled by configuration");
        return;
    }

    let dry_run_msg = if config.dry_run { " (DRY RUN)" } else { "" };

    tracing::info!(
        interval_hours = config.interval_hours,
        keep_per_user = config.keep_per_user,
        dry_run = config.dry_run,
        "Starting retention worker{}",
        dry_run_msg
    );

    let interval = config.interval();

    loop {
        match run_retention(&db, &config).await {
            Ok(result) => {
                if result.has_deletions() {
                    tracing::info!(
                        users = result.users_pruned,
                        records = result.records_deleted,
                        dry_run = config.dry_run,
                        "Retention run complete{}",
                        dry_run_msg
                    );
                } else {
                    tracing::debug!("Retention run complete, no records to delete");
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "Error running retention");
            }
        }

        tokio::time::sleep(interval).await;
    }
}

/// Run a single retention pass over the route history table.
pub async fn run_retention(db: &DbPool, config: &RetentionConfig) -> DbResult<RetentionRunResult> {
    let repo = db.route_history();
    prune_route_history(repo.as_ref(), config.keep_per_user, config.dry_run).await
}

/// Keep only the newest `keep_per_user` records for every user.
///
/// Users at or under the limit are not touched. Errors abort the pass; rows
/// already deleted stay deleted and a re-run picks up where it stopped.
pub async fn prune_route_history(
    repo: &dyn RouteHistoryRepo,
    keep_per_user: u32,
    dry_run: bool,
) -> DbResult<RetentionRunResult> {
    let mut result = RetentionRunResult::default();

    for user in repo.users_exceeding(keep_per_user).await? {
        let deleted = if dry_run {
            let count = repo.count_beyond_newest(&user, keep_per_user).await?;
            tracing::info!(
                user = %user,
                count,
                "DRY RUN: Would delete route history records"
            );
            count.max(0) as u64
        } else {
            repo.delete_beyond_newest(&user, keep_per_user).await?
        };

        if deleted > 0 {
            tracing::debug!(user = %user, deleted, "Pruned route history");
            result.users_pruned += 1;
            result.records_deleted += deleted;
        }
    }

    if !dry_run && result.records_deleted > 0 {
        metrics::record_retention_deletion("route_history", result.records_deleted);
    }

    Ok(result)
}
