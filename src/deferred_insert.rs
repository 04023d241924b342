//! Deferred (batched) inserts.
//!
//! Request handlers push serialized records keyed by table name and return
//! immediately. A background worker drains the queue on an interval, decodes
//! the payloads and writes them through the sink registered for each table.
//!
//! - **Lock-free push**: a bounded crossbeam channel, never blocks the caller
//! - Entries beyond `max_pending_entries` are dropped and counted
//! - Graceful shutdown drains and flushes whatever is left

use std::{
    collections::{HashMap, VecDeque},
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::Duration,
};

use crossbeam_channel::{Receiver, Sender, TrySendError};
use serde_json::Value;
use tokio::sync::Notify;

use crate::{deferred_sink::DeferredInsertSink, observability::metrics};

/// Runtime settings for the deferred insert queue.
#[derive(Debug, Clone)]
pub struct DeferredInsertQueueConfig {
    /// Maximum records written per flush pass.
    pub max_batch_records: usize,
    /// Time between flush passes.
    pub flush_interval: Duration,
    /// Maximum pending payloads before new ones are dropped.
    pub max_pending_entries: usize,
}

impl Default for DeferredInsertQueueConfig {
    fn default() -> Self {
        Self {
            max_batch_records: 500,
            flush_interval: Duration::from_secs(5),
            max_pending_entries: 10_000,
        }
    }
}

impl From<&crate::config::DeferredInsertConfig> for DeferredInsertQueueConfig {
    fn from(config: &crate::config::DeferredInsertConfig) -> Self {
        Self {
            max_batch_records: config.max_batch_records,
            flush_interval: Duration::from_millis(config.flush_interval_ms),
            max_pending_entries: config.max_pending_entries,
        }
    }
}

/// A decoded record waiting to be written to its table.
type PendingRecord = (String, Value);

/// A queued write: a JSON array (or single object) of records for `table`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeferredInsert {
    pub table: String,
    pub payload: String,
}

/// Queue of deferred inserts, shared between request handlers and the
/// flush worker.
pub struct DeferredInsertQueue {
    sender: Sender<DeferredInsert>,
    receiver: Receiver<DeferredInsert>,
    config: DeferredInsertQueueConfig,
    shutdown: AtomicBool,
    wake: Notify,
    dropped_count: AtomicU64,
}

impl DeferredInsertQueue {
    pub fn new(config: DeferredInsertQueueConfig) -> Self {
        let capacity = if config.max_pending_entries > 0 {
            config.max_pending_entries
        } else {
            1_000_000
        };
        let (sender, receiver) = crossbeam_channel::bounded(capacity);

        Self {
            sender,
            receiver,
            config,
            shutdown: AtomicBool::new(false),
            wake: Notify::new(),
            dropped_count: AtomicU64::new(0),
        }
    }

    /// Queue a serialized payload for `table`.
    ///
    /// Never blocks. When the queue is full the payload is dropped.
    pub fn push(&self, table: impl Into<String>, payload: String) {
        let entry = DeferredInsert {
            table: table.into(),
            payload,
        };
        match self.sender.try_send(entry) {
            Ok(()) => {}
            Err(TrySendError::Full(entry)) => {
                metrics::record_deferred_insert_dropped(&entry.table);
                let count = self.dropped_count.fetch_add(1, Ordering::Relaxed);
                // Every 100th drop, to keep the log readable
                if count.is_multiple_of(100) {
                    tracing::warn!(
                        dropped_count = count + 1,
                        max_pending = self.config.max_pending_entries,
                        table = %entry.table,
                        "Deferred insert queue full: dropping payloads"
                    );
                }
            }
            Err(TrySendError::Disconnected(_)) => {}
        }
    }

    /// Number of payloads dropped because the queue was full.
    pub fn dropped_count(&self) -> u64 {
        self.dropped_count.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }

    /// Start the background flush worker.
    ///
    /// Each sink is registered under its [`table`](DeferredInsertSink::table).
    /// The worker runs until [`shutdown`](Self::shutdown) is called, then
    /// flushes everything still queued and exits.
    pub fn start_worker(
        self: &Arc<Self>,
        sinks: Vec<Arc<dyn DeferredInsertSink>>,
    ) -> tokio::task::JoinHandle<()> {
        let queue = Arc::clone(self);
        let sinks: HashMap<&'static str, Arc<dyn DeferredInsertSink>> =
            sinks.into_iter().map(|s| (s.table(), s)).collect();

        tokio::spawn(async move {
            let max_batch = queue.config.max_batch_records.max(1);
            // Decoded records carried over when a payload overshoots a pass
            let mut pending = VecDeque::with_capacity(max_batch);

            loop {
                queue.fill_pending(&mut pending, max_batch);
                if !pending.is_empty() {
                    queue.flush_pending(&sinks, &mut pending, max_batch).await;
                }

                if queue.shutdown.load(Ordering::Acquire) {
                    queue.fill_pending(&mut pending, usize::MAX);
                    while !pending.is_empty() {
                        queue.flush_pending(&sinks, &mut pending, max_batch).await;
                    }
                    tracing::info!("Deferred insert worker shutting down");
                    break;
                }

                tokio::select! {
                    _ = tokio::time::sleep(queue.config.flush_interval) => {}
                    _ = queue.wake.notified() => {}
                }
            }
        })
    }

    /// Signal the worker to flush what is left and stop.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
        self.wake.notify_one();
    }

    /// Decode queued payloads into `pending` until it holds `max_records`
    /// records or the queue is empty. Payloads are taken whole.
    fn fill_pending(&self, pending: &mut VecDeque<PendingRecord>, max_records: usize) {
        while pending.len() < max_records {
            let Ok(entry) = self.receiver.try_recv() else {
                break;
            };
            match decode_payload(&entry.payload) {
                Ok(records) => {
                    pending.extend(records.into_iter().map(|r| (entry.table.clone(), r)));
                }
                Err(e) => {
                    tracing::warn!(
                        table = %entry.table,
                        error = %e,
                        "Skipping undecodable deferred insert payload"
                    );
                }
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn drain_pending(&self) -> Vec<DeferredInsert> {
        self.receiver.try_iter().collect()
    }

    /// Write the oldest `max_records` pending records, one sink call per
    /// table.
    async fn flush_pending(
        &self,
        sinks: &HashMap<&'static str, Arc<dyn DeferredInsertSink>>,
        pending: &mut VecDeque<PendingRecord>,
        max_records: usize,
    ) {
        let take = pending.len().min(max_records);
        let mut by_table: HashMap<String, Vec<Value>> = HashMap::new();
        for (table, record) in pending.drain(..take) {
            by_table.entry(table).or_default().push(record);
        }
        tracing::debug!(
            count = take,
            remaining = pending.len(),
            "Flushing deferred inserts"
        );

        for (table, records) in by_table {
            let Some(sink) = sinks.get(table.as_str()) else {
                tracing::warn!(
                    table = %table,
                    count = records.len(),
                    "No sink registered for deferred insert table, dropping records"
                );
                continue;
            };

            match sink.write_batch(&records).await {
                Ok(written) => {
                    metrics::record_deferred_insert_flush(&table, written as u64, true);
                    tracing::debug!(
                        table = %table,
                        written,
                        total = records.len(),
                        "Deferred insert flush successful"
                    );
                }
                Err(e) => {
                    metrics::record_deferred_insert_flush(&table, 0, false);
                    tracing::error!(
                        table = %table,
                        error = %e,
                        count = records.len(),
                        "Deferred insert flush failed"
                    );
                }
            }
        }
    }
}

/// Decode a payload into records. A single object is one record.
pub fn decode_payload(payload: &str) -> Result<Vec<Value>, serde_json::Error> {
    Ok(match serde_json::from_str(payload)? {
        Value::Array(records) => records,
        record => vec![record],
    })
}
