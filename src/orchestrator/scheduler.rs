//! The collection unit scheduler.
//!
//! For every account the scheduler first asks the platform's client bundle
//! whether collection is enabled, then plans that account's units and runs
//! them concurrently. At most `max_concurrent_accounts` accounts are in
//! flight at once, and unit concurrency is bounded twice: a global ceiling on
//! running units and a per-region limiter. Each unit is supervised in
//! isolation, so the run always completes with one outcome per unit.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use futures::future::{self, FutureExt};
use log::{debug, info, warn};
use tokio::sync::{Mutex, Semaphore};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::{CloudAccount, SchedulerConfig};
use crate::constants::TRIGGER_TIMEOUT_SECS;
use crate::models::{AccountStatus, CollectRecordInfo, UnitOutcome};
use crate::orchestrator::summary::{AccountReport, RunSummary};
use crate::orchestrator::supervisor::UnitRunner;
use crate::orchestrator::units::plan_units;
use crate::platform::{ClientBundle, CloudAccountParam, PlatformConfig};
use crate::sink::ResultSink;

pub struct Scheduler<B: ClientBundle> {
    platform: Arc<PlatformConfig<B>>,
    config: SchedulerConfig,
    sink: Arc<dyn ResultSink>,
    shutdown: CancellationToken,
    accounts: Semaphore,
    units: Semaphore,
    regions: Mutex<HashMap<String, Arc<Semaphore>>>,
}

impl<B: ClientBundle> Scheduler<B> {
    pub fn new(platform: PlatformConfig<B>, config: SchedulerConfig, sink: Arc<dyn ResultSink>) -> Result<Self> {
        config.validate().context("Invalid scheduler configuration")?;
        info!(
            "Scheduler for {}: {} resource types, {} regions, {} concurrent accounts, {} concurrent units, {}s unit deadline",
            platform.name,
            platform.resources.len(),
            platform.default_regions.len(),
            config.max_concurrent_accounts,
            config.max_concurrent_units,
            config.unit_timeout_secs
        );

        Ok(Self {
            accounts: Semaphore::new(config.max_concurrent_accounts),
            units: Semaphore::new(config.max_concurrent_units),
            platform: Arc::new(platform),
            config,
            sink,
            shutdown: CancellationToken::new(),
            regions: Mutex::new(HashMap::new()),
        })
    }

    /// Token that cancels every unit of the run when triggered.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn platform(&self) -> &PlatformConfig<B> {
        &self.platform
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Collect every account. An empty list falls back to the platform's
    /// default accounts.
    pub async fn run(&self, accounts: Vec<CloudAccount>) -> RunSummary {
        let accounts = if accounts.is_empty() {
            self.platform.default_accounts.clone()
        } else {
            accounts
        };
        let run_id = Uuid::new_v4().to_string();
        let started_at = Utc::now();
        info!("Starting run {} over {} account(s)", run_id, accounts.len());

        let futures = accounts.iter().map(|account| {
            async move {
                let _slot = self.accounts.acquire().await.ok();
                self.run_account(account).await
            }
            .boxed()
        });
        let results = future::join_all(futures).await;

        if let Err(e) = self.sink.finish().await {
            warn!("Failed to finish result sink: {:#}", e);
        }

        let mut units = Vec::new();
        let mut reports = Vec::new();
        for (report, outcomes) in results {
            reports.push(report);
            units.extend(outcomes);
        }

        RunSummary {
            run_id,
            platform: self.platform.name.clone(),
            hostname: local_hostname(),
            started_at,
            finished_at: Utc::now(),
            units,
            accounts: reports,
        }
    }

    async fn run_account(&self, account: &CloudAccount) -> (AccountReport, Vec<UnitOutcome>) {
        let mut record = self.assess(account).await;

        if !record.enable_collection {
            info!(
                "Skipping account {}: {}",
                account.account_id,
                record.message.as_deref().unwrap_or("collection disabled")
            );
            record.finish();
            self.persist(&record, AccountStatus::Skipped).await;
            let report = AccountReport {
                record,
                status: AccountStatus::Skipped,
                units: 0,
            };
            return (report, Vec::new());
        }

        record.start_time = Some(Utc::now());
        let units = plan_units(&self.platform, account);
        debug!("Account {}: {} units planned", account.account_id, units.len());

        let runner = UnitRunner {
            platform: &self.platform,
            config: &self.config,
            sink: self.sink.as_ref(),
            shutdown: &self.shutdown,
        };
        let runner = &runner;

        let futures = units.iter().map(|unit| {
            async move {
                let limiter = self.region_limiter(&unit.region).await;
                let _region = limiter.acquire().await.ok();
                let _global = self.units.acquire().await.ok();
                runner.run(account, unit).await
            }
            .boxed()
        });
        let outcomes = future::join_all(futures).await;

        record.finish();
        self.persist(&record, AccountStatus::Collected).await;
        let report = AccountReport {
            record,
            status: AccountStatus::Collected,
            units: outcomes.len(),
        };
        (report, outcomes)
    }

    /// Decide whether an account is collected in this run.
    async fn assess(&self, account: &CloudAccount) -> CollectRecordInfo {
        let platform = &self.platform.name;
        let region = account
            .pinned_region
            .clone()
            .or_else(|| self.platform.default_regions.first().cloned())
            .unwrap_or_default();
        let param = CloudAccountParam::for_unit(account, platform, &region, "");

        if self.shutdown.is_cancelled() {
            return CollectRecordInfo::skipped(&account.account_id, platform, "run shut down");
        }

        let min_interval = self.config.min_collect_interval_secs;
        if min_interval > 0 {
            if let Some(elapsed) = param.secs_since_last_collect() {
                if elapsed >= 0 && (elapsed as u64) < min_interval {
                    return CollectRecordInfo::skipped(
                        &account.account_id,
                        platform,
                        format!("last collection ended {}s ago (minimum interval {}s)", elapsed, min_interval),
                    );
                }
            }
        }

        let assessor = self.platform.prototype.fresh();
        let timeout = Duration::from_secs(TRIGGER_TIMEOUT_SECS);
        match tokio::time::timeout(timeout, assessor.assess_collection_trigger(&param)).await {
            Ok(record) => record,
            Err(_) => {
                warn!(
                    "Collection trigger for account {} timed out after {:?}, collecting anyway",
                    account.account_id, timeout
                );
                let mut record = CollectRecordInfo::enabled(&account.account_id, platform);
                record.message = Some("collection trigger timed out".to_string());
                record
            }
        }
    }

    async fn persist(&self, record: &CollectRecordInfo, status: AccountStatus) {
        if let Err(e) = self.sink.record_run(record, status).await {
            warn!("Failed to persist run record for {}: {:#}", record.account_id, e);
        }
    }

    async fn region_limiter(&self, region: &str) -> Arc<Semaphore> {
        let mut regions = self.regions.lock().await;
        Arc::clone(
            regions
                .entry(region.to_string())
                .or_insert_with(|| Arc::new(Semaphore::new(self.config.per_region_concurrency))),
        )
    }
}

fn local_hostname() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string())
}
