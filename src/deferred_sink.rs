//! Destinations for deferred inserts.
//!
//! Each sink owns one table. The flush worker in
//! [`deferred_insert`](crate::deferred_insert) decodes queued payloads into
//! JSON records and hands them to the sink registered for the payload's
//! table. Sinks validate records individually: a bad record is logged and
//! skipped, the rest of the batch is still written.
//!
//! ## Available Sinks
//!
//! - **RouteHistorySink**: writes `route_history` records through the
//!   [`RouteHistoryRepo`]

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::Value;

use crate::{db::RouteHistoryRepo, models::CreateRouteHistory, observability::metrics};

/// Trait for deferred insert sinks.
#[async_trait]
pub trait DeferredInsertSink: Send + Sync {
    /// Table this sink writes, used as the queue key.
    fn table(&self) -> &'static str;

    /// Write a batch of decoded records.
    ///
    /// Returns the number of records successfully written. Invalid records
    /// are skipped and do not fail the batch.
    async fn write_batch(&self, records: &[Value]) -> Result<usize, DeferredSinkError>;
}

/// Errors from deferred insert sinks.
#[derive(Debug, thiserror::Error)]
pub enum DeferredSinkError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Invalid record: {0}")]
    InvalidRecord(String),
}

// ─────────────────────────────────────────────────────────────────────────────
// Route History Sink
// ─────────────────────────────────────────────────────────────────────────────

/// Table name route history payloads are queued under.
pub const ROUTE_HISTORY_TABLE: &str = "route_history";

/// Sink that writes route history records to SQLite/PostgreSQL.
pub struct RouteHistorySink {
    repo: Arc<dyn RouteHistoryRepo>,
}

impl RouteHistorySink {
    pub fn new(repo: Arc<dyn RouteHistoryRepo>) -> Self {
        Self { repo }
    }
}

#[async_trait]
impl DeferredInsertSink for RouteHistorySink {
    fn table(&self) -> &'static str {
        ROUTE_HISTORY_TABLE
    }

    async fn write_batch(&self, records: &[Value]) -> Result<usize, DeferredSinkError> {
        let mut valid = Vec::with_capacity(records.len());
        for record in records {
            match route_history_from_record(record) {
                Ok(create) => valid.push(create),
                Err(e) => {
                    tracing::warn!(error = %e, record = %record, "Skipping route history record");
                }
            }
        }

        if valid.is_empty() {
            return Ok(0);
        }

        let start = std::time::Instant::now();
        let count = valid.len();
        match self.repo.insert_batch(valid).await {
            Ok(inserted) => {
                let duration = start.elapsed().as_secs_f64();
                metrics::record_db_operation("batch_insert", ROUTE_HISTORY_TABLE, duration, true);
                tracing::debug!(
                    inserted,
                    total = records.len(),
                    duration_ms = duration * 1000.0,
                    "Route history batch insert successful"
                );
                Ok(inserted as usize)
            }
            Err(e) => {
                let duration = start.elapsed().as_secs_f64();
                metrics::record_db_operation("batch_insert", ROUTE_HISTORY_TABLE, duration, false);
                tracing::error!(error = %e, count, "Failed to batch insert route history");
                Err(DeferredSinkError::Database(e.to_string()))
            }
        }
    }
}

/// Convert one queued JSON record into an insert.
///
/// `user` and `route` must be strings; `creation` may be missing, null, an
/// empty string, or a timestamp in one of the accepted formats.
pub fn route_history_from_record(record: &Value) -> Result<CreateRouteHistory, DeferredSinkError> {
    let obj = record
        .as_object()
        .ok_or_else(|| DeferredSinkError::InvalidRecord("record is not an object".into()))?;

    let user = match obj.get("user") {
        Some(Value::String(user)) if !user.is_empty() => user.clone(),
        _ => {
            return Err(DeferredSinkError::InvalidRecord(
                "missing or invalid 'user'".into(),
            ));
        }
    };

    let route = match obj.get("route") {
        Some(Value::String(route)) => route.clone(),
        _ => {
            return Err(DeferredSinkError::InvalidRecord(
                "missing or invalid 'route'".into(),
            ));
        }
    };

    let creation = match obj.get("creation") {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) if s.is_empty() => None,
        Some(Value::String(s)) => Some(parse_timestamp(s).ok_or_else(|| {
            DeferredSinkError::InvalidRecord(format!("unrecognised creation timestamp '{s}'"))
        })?),
        Some(_) => {
            return Err(DeferredSinkError::InvalidRecord(
                "'creation' must be a string".into(),
            ));
        }
    };

    Ok(CreateRouteHistory {
        user,
        route,
        creation,
    })
}

/// Parse the timestamp formats browsers and the server send.
///
/// Naive values are taken as UTC.
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return Some(naive.and_utc());
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(naive.and_utc());
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}
