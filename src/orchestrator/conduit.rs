//! Bounded result conduit between a collector and the scheduler.
//!
//! The collector side ([`RecordSink`]) blocks while the conduit is full and
//! is released as soon as the unit is cancelled. The scheduler side drains
//! records into batches of at most `max_batch_size` and submits each batch to
//! the downstream [`ResultSink`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::constants::SUBMIT_RETRY_STEP_MS;
use crate::error::CollectError;
use crate::orchestrator::context::{CollectContext, UnitLabels};
use crate::platform::{Dimension, FieldPaths};
use crate::sink::ResultSink;
use crate::{unit_debug, unit_error, unit_warn};

/// Type-erased record as it travels through the conduit.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ResourceRecord {
    pub resource_type: String,
    pub payload: Value,
}

/// Static description of the batches a unit produces.
#[derive(Debug, Clone)]
pub struct BatchMeta {
    pub platform: String,
    pub resource_type_name: String,
    pub group: String,
    pub dimension: Dimension,
    pub field_paths: FieldPaths,
}

/// A bounded group of records flushed downstream together.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ResultBatch {
    pub platform: String,
    pub labels: UnitLabels,
    pub resource_type_name: String,
    pub group: String,
    pub dimension: Dimension,
    pub field_paths: FieldPaths,
    pub records: Vec<ResourceRecord>,
}

impl ResultBatch {
    pub fn new(meta: &BatchMeta, labels: &UnitLabels, records: Vec<ResourceRecord>) -> Self {
        Self {
            platform: meta.platform.clone(),
            labels: labels.clone(),
            resource_type_name: meta.resource_type_name.clone(),
            group: meta.group.clone(),
            dimension: meta.dimension,
            field_paths: meta.field_paths.clone(),
            records,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Producer half of the conduit, handed to collectors.
#[derive(Clone)]
pub struct RecordSink {
    tx: mpsc::Sender<ResourceRecord>,
    ctx: CollectContext,
    emitted: Arc<AtomicU64>,
}

impl RecordSink {
    /// Push one record, waiting while the conduit is full.
    ///
    /// Fails with [`CollectError::SinkClosed`] once the unit is cancelled;
    /// records pushed after that point are never delivered.
    pub async fn push<T: Serialize>(&self, record: &T) -> Result<(), CollectError> {
        let payload = serde_json::to_value(record)?;
        self.push_value(payload).await
    }

    pub async fn push_value(&self, payload: Value) -> Result<(), CollectError> {
        if self.ctx.is_cancelled() {
            return Err(CollectError::SinkClosed);
        }

        let record = ResourceRecord {
            resource_type: self.ctx.labels().resource_type.clone(),
            payload,
        };

        tokio::select! {
            biased;
            _ = self.ctx.cancelled() => Err(CollectError::SinkClosed),
            sent = self.tx.send(record) => match sent {
                Ok(()) => {
                    self.emitted.fetch_add(1, Ordering::Relaxed);
                    Ok(())
                }
                Err(_) => Err(CollectError::SinkClosed),
            },
        }
    }

    pub fn context(&self) -> &CollectContext {
        &self.ctx
    }

    /// Records accepted so far.
    pub fn emitted(&self) -> u64 {
        self.emitted.load(Ordering::Relaxed)
    }
}

/// Consumer half of the conduit.
pub struct RecordStream {
    rx: mpsc::Receiver<ResourceRecord>,
    emitted: Arc<AtomicU64>,
}

impl RecordStream {
    pub fn emitted(&self) -> u64 {
        self.emitted.load(Ordering::Relaxed)
    }

    /// Shared counter of accepted records, readable after the drain ends.
    pub(crate) fn emitted_counter(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.emitted)
    }
}

/// Create a conduit bound to the unit's context.
pub fn conduit(ctx: &CollectContext, capacity: usize) -> (RecordSink, RecordStream) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let emitted = Arc::new(AtomicU64::new(0));
    (
        RecordSink {
            tx,
            ctx: ctx.clone(),
            emitted: Arc::clone(&emitted),
        },
        RecordStream { rx, emitted },
    )
}

/// Accumulates records into batches that never exceed `max`.
#[derive(Debug)]
pub struct BatchAccumulator {
    max: usize,
    pending: Vec<ResourceRecord>,
}

impl BatchAccumulator {
    pub fn new(max: usize) -> Self {
        let max = max.max(1);
        Self {
            max,
            pending: Vec::with_capacity(max),
        }
    }

    /// Add a record; returns a full batch when the cap is reached.
    pub fn push(&mut self, record: ResourceRecord) -> Option<Vec<ResourceRecord>> {
        self.pending.push(record);
        if self.pending.len() >= self.max {
            Some(std::mem::replace(&mut self.pending, Vec::with_capacity(self.max)))
        } else {
            None
        }
    }

    /// Remaining records, if any.
    pub fn finish(&mut self) -> Option<Vec<ResourceRecord>> {
        if self.pending.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.pending))
        }
    }
}

/// Counters reported by a finished drain.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DrainStats {
    pub delivered: u64,
    pub batches: u64,
    pub dropped: u64,
}

/// Settings for draining one unit's conduit.
pub(crate) struct DrainPlan<'a> {
    pub meta: &'a BatchMeta,
    pub sink: &'a dyn ResultSink,
    pub max_batch_size: usize,
    /// Retries after a failed submission.
    pub submit_retries: usize,
    /// Fired once the collector task has joined or been aborted.
    pub collector_done: &'a CancellationToken,
}

/// Drain the conduit until every producer handle is gone, the unit is
/// cancelled, or the collector task has ended. In the last two cases the
/// conduit is closed and only records already queued are flushed, so a
/// sink handle leaked into a detached task cannot hold the unit open.
pub(crate) async fn drain(ctx: &CollectContext, mut stream: RecordStream, plan: DrainPlan<'_>) -> DrainStats {
    let mut stats = DrainStats::default();
    let mut acc = BatchAccumulator::new(plan.max_batch_size);

    loop {
        tokio::select! {
            biased;
            _ = ctx.cancelled() => {
                sweep(ctx, &plan, &mut stream, &mut acc, &mut stats).await;
                unit_debug!(ctx, "conduit closed after cancellation");
                break;
            }
            _ = plan.collector_done.cancelled() => {
                sweep(ctx, &plan, &mut stream, &mut acc, &mut stats).await;
                unit_debug!(ctx, "conduit closed after collector ended");
                break;
            }
            received = stream.rx.recv() => match received {
                Some(record) => {
                    if let Some(full) = acc.push(record) {
                        flush(ctx, &plan, full, &mut stats).await;
                    }
                }
                None => break,
            },
        }
    }

    if let Some(rest) = acc.finish() {
        flush(ctx, &plan, rest, &mut stats).await;
    }
    stats
}

/// Close the conduit and batch whatever is still queued.
async fn sweep(
    ctx: &CollectContext,
    plan: &DrainPlan<'_>,
    stream: &mut RecordStream,
    acc: &mut BatchAccumulator,
    stats: &mut DrainStats,
) {
    stream.rx.close();
    while let Ok(record) = stream.rx.try_recv() {
        if let Some(full) = acc.push(record) {
            flush(ctx, plan, full, stats).await;
        }
    }
}

async fn flush(ctx: &CollectContext, plan: &DrainPlan<'_>, records: Vec<ResourceRecord>, stats: &mut DrainStats) {
    let batch = ResultBatch::new(plan.meta, ctx.labels(), records);
    let count = batch.len() as u64;
    let attempts = plan.submit_retries.saturating_add(1);

    for attempt in 0..attempts {
        match plan.sink.submit(&batch).await {
            Ok(()) => {
                stats.delivered += count;
                stats.batches += 1;
                return;
            }
            Err(e) => {
                unit_warn!(
                    ctx,
                    "batch submit failed (attempt {}/{}): {:#}",
                    attempt + 1,
                    attempts,
                    e
                );
                if attempt + 1 < attempts {
                    let backoff = SUBMIT_RETRY_STEP_MS * (attempt as u64 + 1);
                    tokio::time::sleep(Duration::from_millis(backoff)).await;
                }
            }
        }
    }

    unit_error!(ctx, "dropping batch of {} records after {} attempts", count, attempts);
    stats.dropped += count;
}
