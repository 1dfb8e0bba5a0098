//! Downstream result sinks.
//!
//! A sink receives every flushed [`ResultBatch`] and the per-account
//! [`CollectRecordInfo`] bookkeeping. Field extraction happens here, not in
//! the collectors.

mod console;
pub mod extract;
mod file;
mod memory;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{AccountStatus, CollectRecordInfo};
use crate::orchestrator::ResultBatch;

pub use console::LogSink;
pub use extract::{is_supported_path, json_path_value, resolve_batch, ResourceInstance};
pub use file::JsonLinesSink;
pub use memory::MemorySink;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ResultSink: Send + Sync {
    /// Accept one batch. An error makes the scheduler retry the batch.
    async fn submit(&self, batch: &ResultBatch) -> Result<()>;

    /// Persist the bookkeeping record of one account's run.
    async fn record_run(&self, record: &CollectRecordInfo, status: AccountStatus) -> Result<()>;

    /// Flush buffered output at the end of a run.
    async fn finish(&self) -> Result<()> {
        Ok(())
    }
}
