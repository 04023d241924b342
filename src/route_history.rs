//! Route history capture.
//!
//! The browser periodically posts the routes a user visited. They are tagged
//! with the user and queued for a deferred insert into `route_history`;
//! contents are only checked when the queue is flushed.

use serde::{Deserialize, Serialize};

use crate::{
    deferred_insert::DeferredInsertQueue, deferred_sink::ROUTE_HISTORY_TABLE, models::RouteEntry,
};

/// Routes as the client sends them: either a JSON-encoded string of an
/// array, or the array itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RoutesInput {
    Encoded(String),
    Entries(Vec<RouteEntry>),
}

#[derive(Debug, thiserror::Error)]
pub enum RouteHistoryError {
    #[error("routes is not a JSON array of objects: {0}")]
    InvalidRoutes(#[from] serde_json::Error),
}

/// Attach `user` to each entry and queue the batch for insertion.
///
/// Returns the number of entries queued. An empty batch queues nothing.
pub fn deferred_insert_route_history(
    queue: &DeferredInsertQueue,
    user: &str,
    routes: RoutesInput,
) -> Result<usize, RouteHistoryError> {
    let entries = match routes {
        RoutesInput::Encoded(raw) => serde_json::from_str::<Vec<RouteEntry>>(&raw)?,
        RoutesInput::Entries(entries) => entries,
    };

    if entries.is_empty() {
        return Ok(0);
    }

    let records: Vec<serde_json::Value> = entries
        .into_iter()
        .map(|entry| {
            serde_json::json!({
                "user": user,
                "route": entry.route,
                "creation": entry.creation,
            })
        })
        .collect();

    let count = records.len();
    let payload = serde_json::to_string(&records)?;
    queue.push(ROUTE_HISTORY_TABLE, payload);

    tracing::debug!(user, count, "Queued route history");
    Ok(count)
}
