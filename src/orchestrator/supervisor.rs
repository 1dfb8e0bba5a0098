//! Supervision of a single collection unit.
//!
//! Runs the bundle initialization and the collector under the unit's
//! deadline, drains the conduit concurrently, and turns whatever happened
//! (success, error, deadline, cancellation or panic) into a [`UnitOutcome`].

use std::any::Any;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

use anyhow::Result;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;

use crate::collectors::Collector;
use crate::config::{CloudAccount, SchedulerConfig};
use crate::constants::{CODE_COLLECTOR_ERROR, CODE_SDK_ERROR, CODE_UNKNOWN_ERROR};
use crate::error::is_cancellation;
use crate::models::{UnitOutcome, UnitState};
use crate::orchestrator::conduit::{conduit, drain, BatchMeta, DrainPlan, DrainStats};
use crate::orchestrator::context::{CancelCause, CancelHandle, CollectContext, UnitLabels};
use crate::orchestrator::units::CollectionUnit;
use crate::platform::{ClientBundle, CloudAccountParam, PlatformConfig};
use crate::sink::ResultSink;
use crate::{unit_debug, unit_error, unit_info, unit_warn};

/// Shared, read-only environment every unit of a run is supervised with.
pub(crate) struct UnitRunner<'a, B: ClientBundle> {
    pub platform: &'a PlatformConfig<B>,
    pub config: &'a SchedulerConfig,
    pub sink: &'a dyn ResultSink,
    pub shutdown: &'a CancellationToken,
}

struct Verdict {
    state: UnitState,
    error: Option<String>,
}

impl Verdict {
    fn new(state: UnitState, error: Option<String>) -> Self {
        Self { state, error }
    }
}

impl<'a, B: ClientBundle> UnitRunner<'a, B> {
    pub async fn run(&self, account: &CloudAccount, unit: &CollectionUnit) -> UnitOutcome {
        let started = Instant::now();
        let definition = &self.platform.resources[unit.definition];
        let labels = UnitLabels::new(&account.account_id, &unit.region, &definition.resource_type);
        let ctx = CollectContext::new(labels, self.shutdown, self.config.unit_timeout())
            .with_tuning(self.config.page_size, self.config.enrichment_workers);

        if ctx.is_cancelled() {
            unit_debug!(ctx, "run shut down before unit started");
            return outcome(&ctx, Verdict::new(UnitState::Cancelled, None), DrainStats::default(), 0, started);
        }

        unit_debug!(ctx, "initializing clients");
        let param = CloudAccountParam::for_unit(
            account,
            &self.platform.name,
            &unit.region,
            &definition.resource_type,
        );
        let mut bundle = self.platform.prototype.fresh();
        let init = tokio::time::timeout_at(ctx.deadline(), ctx.run(bundle.init_services(&param))).await;

        let early = match init {
            Ok(Ok(Ok(()))) => None,
            Ok(Ok(Err(e))) => {
                unit_error!(ctx, "[{}] client initialization failed: {:#}", CODE_SDK_ERROR, e);
                Some(Verdict::new(
                    UnitState::Failed,
                    Some(format!("client initialization failed: {:#}", e)),
                ))
            }
            Ok(Err(_)) => Some(Verdict::new(UnitState::Cancelled, None)),
            Err(_) => {
                ctx.cancel_with(CancelCause::Deadline);
                unit_warn!(ctx, "client initialization exceeded the unit deadline");
                Some(Verdict::new(
                    UnitState::TimedOut,
                    Some("client initialization exceeded deadline".to_string()),
                ))
            }
        };
        if let Some(verdict) = early {
            return outcome(&ctx, verdict, DrainStats::default(), 0, started);
        }

        let (tx, stream) = conduit(&ctx, self.config.conduit_capacity);
        let emitted = stream.emitted_counter();
        let collector = definition.collector.clone();
        let task_ctx = ctx.clone();

        unit_debug!(ctx, "collector launched");
        let handle: JoinHandle<Result<()>> = tokio::spawn(async move {
            match collector {
                Collector::Plain(c) => c.collect(&task_ctx, &bundle, &tx).await,
                Collector::CancelAware(c) => {
                    let cancel = CancelHandle::new(&task_ctx);
                    let result = c.collect(&task_ctx, cancel, &bundle, &tx).await;
                    drop(tx);
                    if result.is_ok() {
                        // Unit stays open until cancel() or the deadline
                        task_ctx.cancelled().await;
                    }
                    result
                }
            }
        });

        let meta = BatchMeta {
            platform: self.platform.name.clone(),
            resource_type_name: definition.resource_type_name.clone(),
            group: definition.group.clone(),
            dimension: definition.dimension,
            field_paths: definition.field_paths.clone(),
        };
        let collector_done = CancellationToken::new();
        let plan = DrainPlan {
            meta: &meta,
            sink: self.sink,
            max_batch_size: self.config.max_batch_size,
            submit_retries: self.config.submit_retries,
            collector_done: &collector_done,
        };
        let watched = async {
            let joined = self.watch(&ctx, handle).await;
            collector_done.cancel();
            joined
        };

        let (stats, joined) = tokio::join!(drain(&ctx, stream, plan), watched);
        let verdict = classify(&ctx, joined);
        outcome(&ctx, verdict, stats, emitted.load(Ordering::Relaxed), started)
    }

    /// Wait for the collector, enforcing the deadline and the grace period.
    async fn watch(
        &self,
        ctx: &CollectContext,
        mut handle: JoinHandle<Result<()>>,
    ) -> std::result::Result<Result<()>, JoinError> {
        tokio::select! {
            biased;
            joined = &mut handle => joined,
            _ = ctx.cancelled() => self.grace(ctx, handle).await,
            _ = tokio::time::sleep_until(ctx.deadline()) => {
                ctx.cancel_with(CancelCause::Deadline);
                unit_warn!(ctx, "deadline of {}s exceeded, cancelling", self.config.unit_timeout_secs);
                self.grace(ctx, handle).await
            }
        }
    }

    async fn grace(
        &self,
        ctx: &CollectContext,
        mut handle: JoinHandle<Result<()>>,
    ) -> std::result::Result<Result<()>, JoinError> {
        let grace = self.config.cancel_grace();
        match tokio::time::timeout(grace, &mut handle).await {
            Ok(joined) => joined,
            Err(_) => {
                unit_warn!(ctx, "collector ignored cancellation for {:?}, aborting", grace);
                handle.abort();
                handle.await
            }
        }
    }
}

fn classify(ctx: &CollectContext, joined: std::result::Result<Result<()>, JoinError>) -> Verdict {
    let cause = ctx.cancel_cause();
    match joined {
        Err(e) if e.is_panic() => {
            let message = panic_message(e.into_panic());
            unit_error!(ctx, "[{}] collector panicked: {}", CODE_UNKNOWN_ERROR, message);
            Verdict::new(UnitState::Failed, Some(format!("panic: {}", message)))
        }
        Err(_) => Verdict::new(
            cancelled_state(cause),
            Some("collector aborted after grace period".to_string()),
        ),
        Ok(result) => match (cause, result) {
            (Some(cause), result) => {
                let error = match result {
                    Err(e) if !is_cancellation(&e) => Some(format!("{:#}", e)),
                    _ => None,
                };
                Verdict::new(cancelled_state(Some(cause)), error)
            }
            (None, Ok(())) => Verdict::new(UnitState::Succeeded, None),
            (None, Err(e)) => {
                unit_error!(ctx, "[{}] collector failed: {:#}", CODE_COLLECTOR_ERROR, e);
                Verdict::new(UnitState::Failed, Some(format!("{:#}", e)))
            }
        },
    }
}

fn cancelled_state(cause: Option<CancelCause>) -> UnitState {
    match cause {
        Some(CancelCause::Deadline) => UnitState::TimedOut,
        _ => UnitState::Cancelled,
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

fn outcome(ctx: &CollectContext, verdict: Verdict, stats: DrainStats, emitted: u64, started: Instant) -> UnitOutcome {
    let duration = started.elapsed();
    unit_info!(
        ctx,
        "{} in {}ms ({} records delivered in {} batches)",
        verdict.state,
        duration.as_millis(),
        stats.delivered,
        stats.batches
    );
    UnitOutcome {
        labels: ctx.labels().clone(),
        state: verdict.state,
        records_emitted: emitted,
        records_delivered: stats.delivered,
        batches_flushed: stats.batches,
        duration_ms: duration_ms(duration),
        error: verdict.error,
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_panic_message_payloads() {
        assert_eq!(panic_message(Box::new("static")), "static");
        assert_eq!(panic_message(Box::new(String::from("owned"))), "owned");
        assert_eq!(panic_message(Box::new(42u8)), "unknown panic payload");
    }

    #[test]
    fn test_cancelled_state_mapping() {
        assert_eq!(cancelled_state(Some(CancelCause::Deadline)), UnitState::TimedOut);
        assert_eq!(cancelled_state(Some(CancelCause::Collector)), UnitState::Cancelled);
        assert_eq!(cancelled_state(Some(CancelCause::Shutdown)), UnitState::Cancelled);
        assert_eq!(cancelled_state(None), UnitState::Cancelled);
    }
}
