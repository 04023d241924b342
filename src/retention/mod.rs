//! Route history retention.
//!
//! A background worker periodically trims every user's route history to the
//! newest `keep_per_user` records. Users at or under the limit are left
//! alone, and dry-run mode reports what would be deleted without deleting.

mod worker;

pub use worker::{RetentionRunResult, prune_route_history, run_retention, start_retention_worker};
