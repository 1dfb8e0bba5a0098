//! Per-unit context: attribution labels, deadline and cancellation.
//!
//! Every collection unit owns exactly one [`CollectContext`]. Its token is a
//! child of the scheduler's shutdown token, so shutting the run down cancels
//! every unit while cancelling one unit never touches its siblings.

use std::fmt;
use std::future::Future;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::constants::{DEFAULT_ENRICHMENT_WORKERS, DEFAULT_PAGE_SIZE};
use crate::error::CollectError;

/// Attribution carried by every log line and outcome of a unit.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
pub struct UnitLabels {
    pub account_id: String,
    pub region: String,
    pub resource_type: String,
    pub trace_id: String,
}

impl UnitLabels {
    /// Labels with a freshly generated trace id.
    pub fn new(account_id: &str, region: &str, resource_type: &str) -> Self {
        Self {
            account_id: account_id.to_string(),
            region: region.to_string(),
            resource_type: resource_type.to_string(),
            trace_id: Uuid::new_v4().to_string(),
        }
    }
}

impl fmt::Display for UnitLabels {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[account={} region={} type={} trace={}]",
            self.account_id, self.region, self.resource_type, self.trace_id
        )
    }
}

/// Why a unit's context was cancelled. Only the first cause is kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelCause {
    Deadline,
    /// A cancel-aware collector signalled it has no more work.
    Collector,
    Shutdown,
}

/// Cap for deadlines that would otherwise overflow (about 30 years).
pub const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// Cancellable, deadline-bearing context handed to a collector.
#[derive(Clone)]
pub struct CollectContext {
    labels: Arc<UnitLabels>,
    token: CancellationToken,
    deadline: Instant,
    cause: Arc<OnceLock<CancelCause>>,
    page_size: u32,
    enrichment_workers: usize,
}

impl CollectContext {
    /// Create a context whose token is a child of `parent`.
    ///
    /// A timeout too large to represent is capped at [`FAR_FUTURE`].
    pub fn new(labels: UnitLabels, parent: &CancellationToken, timeout: Duration) -> Self {
        let now = Instant::now();
        let deadline = now
            .checked_add(timeout)
            .or_else(|| now.checked_add(FAR_FUTURE))
            .unwrap_or(now);
        Self {
            labels: Arc::new(labels),
            token: parent.child_token(),
            deadline,
            cause: Arc::new(OnceLock::new()),
            page_size: DEFAULT_PAGE_SIZE,
            enrichment_workers: DEFAULT_ENRICHMENT_WORKERS,
        }
    }

    /// Override the list page size and enrichment pool size.
    pub fn with_tuning(mut self, page_size: u32, enrichment_workers: usize) -> Self {
        self.page_size = page_size.max(1);
        self.enrichment_workers = enrichment_workers.max(1);
        self
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    pub fn enrichment_workers(&self) -> usize {
        self.enrichment_workers
    }

    pub fn labels(&self) -> &UnitLabels {
        &self.labels
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once the context is cancelled for any reason.
    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    /// Loop-boundary check for collectors.
    pub fn check(&self) -> Result<(), CollectError> {
        if self.is_cancelled() {
            Err(CollectError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Run a future, abandoning it if the context is cancelled first.
    pub async fn run<F, T>(&self, fut: F) -> Result<T, CollectError>
    where
        F: Future<Output = T>,
    {
        tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(CollectError::Cancelled),
            value = fut => Ok(value),
        }
    }

    pub(crate) fn cancel_with(&self, cause: CancelCause) {
        let _ = self.cause.set(cause);
        self.token.cancel();
    }

    /// The recorded cause, or `Shutdown` when the parent token fired.
    pub fn cancel_cause(&self) -> Option<CancelCause> {
        match self.cause.get() {
            Some(cause) => Some(*cause),
            None if self.token.is_cancelled() => Some(CancelCause::Shutdown),
            None => None,
        }
    }
}

impl fmt::Display for CollectContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.labels.fmt(f)
    }
}

impl fmt::Debug for CollectContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollectContext")
            .field("labels", &self.labels)
            .field("cancelled", &self.is_cancelled())
            .field("remaining", &self.remaining())
            .finish()
    }
}

/// Handed to cancel-aware collectors to end their unit early.
#[derive(Clone, Debug)]
pub struct CancelHandle {
    ctx: CollectContext,
}

impl CancelHandle {
    pub(crate) fn new(ctx: &CollectContext) -> Self {
        Self { ctx: ctx.clone() }
    }

    pub fn cancel(&self) {
        self.ctx.cancel_with(CancelCause::Collector);
    }
}

/// Log at info level with the unit's labels as prefix.
#[macro_export]
macro_rules! unit_info {
    ($ctx:expr, $($arg:tt)+) => {
        $crate::__log::info!("{} {}", $ctx, format_args!($($arg)+))
    };
}

/// Log at warn level with the unit's labels as prefix.
#[macro_export]
macro_rules! unit_warn {
    ($ctx:expr, $($arg:tt)+) => {
        $crate::__log::warn!("{} {}", $ctx, format_args!($($arg)+))
    };
}

/// Log at error level with the unit's labels as prefix.
#[macro_export]
macro_rules! unit_error {
    ($ctx:expr, $($arg:tt)+) => {
        $crate::__log::error!("{} {}", $ctx, format_args!($($arg)+))
    };
}

/// Log at debug level with the unit's labels as prefix.
#[macro_export]
macro_rules! unit_debug {
    ($ctx:expr, $($arg:tt)+) => {
        $crate::__log::debug!("{} {}", $ctx, format_args!($($arg)+))
    };
}
