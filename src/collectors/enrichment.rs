//! Fixed-size worker pool for per-item detail calls.
//!
//! A dispatcher feeds every item into a bounded task queue; `workers`
//! consumers take items off the queue, run the enrichment and push the
//! aggregate into the unit's sink. The dispatcher closes the queue once every
//! item is enqueued and the pool returns when all workers have drained it.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::Result;
use futures::future;
use serde::Serialize;
use tokio::sync::{mpsc, Mutex};

use crate::error::CollectError;
use crate::orchestrator::{CollectContext, RecordSink};
use crate::unit_warn;

/// Enrich every item with up to `workers` concurrent calls and push one
/// record per item. Returns the number of records pushed.
///
/// `enrich` must produce a record even when some of its detail calls fail;
/// a missing detail is an absent field, not an error.
pub async fn enrich_with_pool<T, R, F, Fut>(
    ctx: &CollectContext,
    sink: &RecordSink,
    items: Vec<T>,
    workers: usize,
    enrich: F,
) -> Result<u64>
where
    T: Send,
    R: Serialize + Send,
    F: Fn(T) -> Fut + Sync,
    Fut: Future<Output = R> + Send,
{
    let workers = workers.max(1);
    let (tx, rx) = mpsc::channel::<T>(workers);
    let queue = Mutex::new(rx);
    let pushed = AtomicU64::new(0);

    let dispatcher = async move {
        for item in items {
            tokio::select! {
                biased;
                _ = ctx.cancelled() => break,
                sent = tx.send(item) => if sent.is_err() { break },
            }
        }
        // tx dropped here closes the queue
    };

    let worker = |_id: usize| {
        let queue = &queue;
        let pushed = &pushed;
        let enrich = &enrich;
        async move {
            loop {
                let next = queue.lock().await.recv().await;
                let Some(item) = next else { break };
                if ctx.is_cancelled() {
                    break;
                }

                let record = enrich(item).await;
                match sink.push(&record).await {
                    Ok(()) => {
                        pushed.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(CollectError::SinkClosed) => break,
                    Err(e) => unit_warn!(ctx, "dropping enriched record: {}", e),
                }
            }
        }
    };

    let pool = future::join_all((0..workers).map(worker));
    future::join(dispatcher, pool).await;

    ctx.check()?;
    Ok(pushed.load(Ordering::Relaxed))
}
