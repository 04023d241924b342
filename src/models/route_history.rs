use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single page visit recorded for a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteHistory {
    pub id: Uuid,
    /// Identity of the user (or the guest identity) that visited the route
    pub user: String,
    /// Client-side route, e.g. `app/todo/view/list`
    pub route: String,
    /// When the client says the visit happened
    pub creation: DateTime<Utc>,
    /// When the record was written; retention orders by this column
    pub modified: DateTime<Utc>,
}

/// Input for inserting a route history record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateRouteHistory {
    pub user: String,
    pub route: String,
    /// Defaults to the insert time when the client sent none
    pub creation: Option<DateTime<Utc>>,
}

/// A route visit as sent by the browser, before the user is attached.
///
/// Fields are kept as raw JSON so malformed entries are carried through to
/// the flush stage rather than rejected at enqueue time. Any other keys the
/// client sends are ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RouteEntry {
    #[serde(default)]
    pub route: serde_json::Value,
    #[serde(default)]
    pub creation: serde_json::Value,
}
