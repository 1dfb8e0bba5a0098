use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::constants::COLLECT_RECORDS_FILE;
use crate::models::{AccountStatus, CollectRecordInfo};
use crate::orchestrator::ResultBatch;
use crate::sink::extract::resolve_batch;
use crate::sink::ResultSink;

#[derive(Serialize)]
struct RunLine<'a> {
    status: AccountStatus,
    #[serde(flatten)]
    record: &'a CollectRecordInfo,
}

#[derive(Deserialize)]
struct StoredRun {
    status: AccountStatus,
    #[serde(flatten)]
    record: CollectRecordInfo,
}

/// Appends resolved resources as JSON lines, one file per resource type,
/// plus one file of per-account run records.
#[derive(Debug)]
pub struct JsonLinesSink {
    dir: PathBuf,
    files: Mutex<HashMap<String, File>>,
}

impl JsonLinesSink {
    pub async fn create(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir)
            .await
            .context(format!("Failed to create output directory {}", dir.display()))?;
        info!("Writing results to {}", dir.display());
        Ok(Self {
            dir: dir.to_path_buf(),
            files: Mutex::new(HashMap::new()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File name used for a resource type.
    pub fn file_name(resource_type: &str) -> String {
        let stem: String = resource_type
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
            .collect();
        format!("{}.jsonl", stem)
    }

    /// Latest finished collection per account, read back from the run
    /// records of a previous run in `dir`. Skipped runs and unreadable lines
    /// are ignored; a missing file yields an empty map.
    pub async fn last_collects(dir: &Path) -> Result<HashMap<String, CollectRecordInfo>> {
        let path = dir.join(COLLECT_RECORDS_FILE);
        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(HashMap::new()),
            Err(e) => return Err(e).context(format!("Failed to read {}", path.display())),
        };

        let mut latest: HashMap<String, CollectRecordInfo> = HashMap::new();
        for (number, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let stored: StoredRun = match serde_json::from_str(line) {
                Ok(stored) => stored,
                Err(e) => {
                    warn!("Ignoring line {} of {}: {}", number + 1, path.display(), e);
                    continue;
                }
            };
            if stored.status != AccountStatus::Collected || stored.record.end_time.is_none() {
                continue;
            }
            let newer = latest
                .get(&stored.record.account_id)
                .map_or(true, |known| known.end_time < stored.record.end_time);
            if newer {
                latest.insert(stored.record.account_id.clone(), stored.record);
            }
        }
        debug!("Loaded previous collections of {} account(s) from {}", latest.len(), path.display());
        Ok(latest)
    }

    async fn append(&self, name: String, body: &[u8]) -> Result<()> {
        let mut files = self.files.lock().await;
        if !files.contains_key(&name) {
            let path = self.dir.join(&name);
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .await
                .context(format!("Failed to open {}", path.display()))?;
            debug!("Opened output file {}", path.display());
            files.insert(name.clone(), file);
        }
        if let Some(file) = files.get_mut(&name) {
            file.write_all(body)
                .await
                .context(format!("Failed to write {}", name))?;
        }
        Ok(())
    }
}

#[async_trait]
impl ResultSink for JsonLinesSink {
    async fn submit(&self, batch: &ResultBatch) -> Result<()> {
        let mut body = Vec::new();
        for instance in resolve_batch(batch) {
            serde_json::to_writer(&mut body, &instance).context("Failed to serialize resource")?;
            body.push(b'\n');
        }
        if body.is_empty() {
            return Ok(());
        }
        let name = batch
            .records
            .first()
            .map(|r| Self::file_name(&r.resource_type))
            .unwrap_or_else(|| Self::file_name(&batch.labels.resource_type));
        self.append(name, &body).await
    }

    async fn record_run(&self, record: &CollectRecordInfo, status: AccountStatus) -> Result<()> {
        let mut body = serde_json::to_vec(&RunLine { status, record })
            .context("Failed to serialize collect record")?;
        body.push(b'\n');
        self.append(COLLECT_RECORDS_FILE.to_string(), &body).await
    }

    async fn finish(&self) -> Result<()> {
        let mut files = self.files.lock().await;
        for (name, file) in files.iter_mut() {
            file.flush().await.context(format!("Failed to flush {}", name))?;
            file.sync_all().await.context(format!("Failed to sync {}", name))?;
        }
        Ok(())
    }
}
