use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::models::{AccountStatus, CollectRecordInfo};
use crate::orchestrator::{ResourceRecord, ResultBatch};
use crate::sink::extract::{resolve_batch, ResourceInstance};
use crate::sink::ResultSink;

/// Keeps everything in memory. Used by tests and embedders.
#[derive(Debug, Default)]
pub struct MemorySink {
    batches: Mutex<Vec<ResultBatch>>,
    runs: Mutex<Vec<(CollectRecordInfo, AccountStatus)>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn batches(&self) -> Vec<ResultBatch> {
        self.batches.lock().await.clone()
    }

    pub async fn records(&self) -> Vec<ResourceRecord> {
        self.batches
            .lock()
            .await
            .iter()
            .flat_map(|b| b.records.iter().cloned())
            .collect()
    }

    pub async fn record_count(&self) -> usize {
        self.batches.lock().await.iter().map(|b| b.len()).sum()
    }

    /// Records of one resource type.
    pub async fn records_of(&self, resource_type: &str) -> Vec<ResourceRecord> {
        self.records()
            .await
            .into_iter()
            .filter(|r| r.resource_type == resource_type)
            .collect()
    }

    pub async fn instances(&self) -> Vec<ResourceInstance> {
        self.batches.lock().await.iter().flat_map(resolve_batch).collect()
    }

    pub async fn runs(&self) -> Vec<(CollectRecordInfo, AccountStatus)> {
        self.runs.lock().await.clone()
    }
}

#[async_trait]
impl ResultSink for MemorySink {
    async fn submit(&self, batch: &ResultBatch) -> Result<()> {
        self.batches.lock().await.push(batch.clone());
        Ok(())
    }

    async fn record_run(&self, record: &CollectRecordInfo, status: AccountStatus) -> Result<()> {
        self.runs.lock().await.push((record.clone(), status));
        Ok(())
    }
}
