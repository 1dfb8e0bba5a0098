use anyhow::{Context, Result};
use async_trait::async_trait;
use log::info;

use crate::models::{AccountStatus, CollectRecordInfo};
use crate::orchestrator::ResultBatch;
use crate::sink::extract::resolve_batch;
use crate::sink::ResultSink;

/// Writes resolved resources to the log instead of persisting them.
///
/// Used when no output directory is configured.
#[derive(Debug, Default, Clone)]
pub struct LogSink {
    /// Print the full payload instead of only the identity fields.
    pub verbose: bool,
}

impl LogSink {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }
}

#[async_trait]
impl ResultSink for LogSink {
    async fn submit(&self, batch: &ResultBatch) -> Result<()> {
        for instance in resolve_batch(batch) {
            if self.verbose {
                let pretty = serde_json::to_string_pretty(&instance.payload)
                    .context("Failed to render resource payload")?;
                info!(
                    "{} {} {} ({})\n{}",
                    batch.labels, instance.resource_type, instance.resource_id, instance.resource_name, pretty
                );
            } else {
                info!(
                    "{} {} {} ({})",
                    batch.labels, instance.resource_type, instance.resource_id, instance.resource_name
                );
            }
        }
        Ok(())
    }

    async fn record_run(&self, record: &CollectRecordInfo, status: AccountStatus) -> Result<()> {
        let rendered = serde_json::to_string(record).context("Failed to serialize collect record")?;
        info!("Account {} run {:?}: {}", record.account_id, status, rendered);
        Ok(())
    }
}
