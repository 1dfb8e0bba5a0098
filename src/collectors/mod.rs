//! Collector contract and the helpers collectors are built from.
//!
//! ## Contract
//!
//! A collector lists one resource type for one account and region and pushes
//! one record per resource into its [`RecordSink`]. It checks its
//! [`CollectContext`] at loop boundaries and returns promptly once cancelled.
//!
//! ```text
//! list page ──► running count / token ──► next page ...
//!     │
//!     └─► per item: detail calls (serial or worker pool) ──► sink.push(record)
//! ```
//!
//! ## Helpers
//!
//! - [`pagination`]: page-number, offset and continuation-token loops
//! - [`enrichment`]: fixed-size worker pool for secondary detail calls
//! - [`retry`]: bounded corrective retry and sub-facet error classification

pub mod enrichment;
pub mod pagination;
pub mod retry;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use crate::orchestrator::{CancelHandle, CollectContext, RecordSink};
use crate::platform::ClientBundle;

pub use enrichment::enrich_with_pool;
pub use pagination::{paginate, Page, PageRequest, PageStyle};
pub use retry::{corrective_retry, is_absent_error, optional_facet};

/// A collector that runs until it has listed everything or is cancelled.
#[async_trait]
pub trait ResourceCollector<B: ClientBundle>: Send + Sync {
    async fn collect(&self, ctx: &CollectContext, bundle: &B, sink: &RecordSink) -> Result<()>;
}

/// A collector that can end its own unit early through a [`CancelHandle`].
///
/// After it returns, the unit stays open until either `cancel()` is called
/// or the deadline fires.
#[async_trait]
pub trait CancelAwareCollector<B: ClientBundle>: Send + Sync {
    async fn collect(
        &self,
        ctx: &CollectContext,
        cancel: CancelHandle,
        bundle: &B,
        sink: &RecordSink,
    ) -> Result<()>;
}

/// Reference to the collector of a resource definition.
pub enum Collector<B: ClientBundle> {
    Plain(Arc<dyn ResourceCollector<B>>),
    CancelAware(Arc<dyn CancelAwareCollector<B>>),
}

impl<B: ClientBundle> Collector<B> {
    pub fn is_cancel_aware(&self) -> bool {
        matches!(self, Collector::CancelAware(_))
    }
}

impl<B: ClientBundle> Clone for Collector<B> {
    fn clone(&self) -> Self {
        match self {
            Collector::Plain(c) => Collector::Plain(Arc::clone(c)),
            Collector::CancelAware(c) => Collector::CancelAware(Arc::clone(c)),
        }
    }
}
