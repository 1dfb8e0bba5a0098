//! Shared fixtures for the integration tests: a client bundle without real
//! clients and a set of collectors with known behavior.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::json;

use cloud_collector::collectors::{CancelAwareCollector, ResourceCollector};
use cloud_collector::config::{CloudAccount, Credentials, SchedulerConfig};
use cloud_collector::models::CollectRecordInfo;
use cloud_collector::orchestrator::{CancelHandle, CollectContext, RecordSink};
use cloud_collector::platform::{ClientBundle, CloudAccountParam, FieldPaths, PlatformConfig, ResourceDefinition};

pub const PLATFORM: &str = "stub";

#[derive(Debug, Clone, Default)]
pub struct TestBundle {
    pub fail_init: bool,
    pub disabled: Option<String>,
}

#[async_trait]
impl ClientBundle for TestBundle {
    async fn init_services(&mut self, param: &CloudAccountParam) -> Result<()> {
        if self.fail_init {
            return Err(anyhow!("endpoint unreachable for {}", param.resource_type));
        }
        Ok(())
    }

    fn fresh(&self) -> Self {
        self.clone()
    }

    async fn assess_collection_trigger(&self, param: &CloudAccountParam) -> CollectRecordInfo {
        match &self.disabled {
            Some(reason) => CollectRecordInfo::skipped(&param.account_id, &param.platform, reason.clone()),
            None => CollectRecordInfo::enabled(&param.account_id, &param.platform),
        }
    }
}

/// Pushes `count` records and returns.
pub struct EmitCollector {
    pub count: u32,
    pub calls: Arc<AtomicUsize>,
}

impl EmitCollector {
    pub fn new(count: u32) -> Self {
        Self {
            count,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }
}

#[async_trait]
impl ResourceCollector<TestBundle> for EmitCollector {
    async fn collect(&self, ctx: &CollectContext, _bundle: &TestBundle, sink: &RecordSink) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let labels = ctx.labels();
        for i in 0..self.count {
            sink.push(&json!({
                "id": format!("{}-{}-{}", labels.account_id, labels.region, i),
                "name": format!("item-{}", i),
            }))
            .await?;
        }
        Ok(())
    }
}

/// Never looks at its context; only an abort stops it.
pub struct HangingCollector;

#[async_trait]
impl ResourceCollector<TestBundle> for HangingCollector {
    async fn collect(&self, _ctx: &CollectContext, _bundle: &TestBundle, sink: &RecordSink) -> Result<()> {
        sink.push(&json!({ "id": "before-hang" })).await?;
        tokio::time::sleep(Duration::from_secs(24 * 60 * 60)).await;
        Ok(())
    }
}

/// Pushes a record every `interval` until its sink refuses.
pub struct TrickleCollector {
    pub interval: Duration,
}

#[async_trait]
impl ResourceCollector<TestBundle> for TrickleCollector {
    async fn collect(&self, _ctx: &CollectContext, _bundle: &TestBundle, sink: &RecordSink) -> Result<()> {
        let mut i = 0u64;
        loop {
            sink.push(&json!({ "id": format!("tick-{}", i) })).await?;
            i += 1;
            tokio::time::sleep(self.interval).await;
        }
    }
}

/// Pushes `count` records, hands a sink clone to a detached task that
/// outlives the unit, and returns.
pub struct LeakingCollector {
    pub count: u32,
}

#[async_trait]
impl ResourceCollector<TestBundle> for LeakingCollector {
    async fn collect(&self, _ctx: &CollectContext, _bundle: &TestBundle, sink: &RecordSink) -> Result<()> {
        for i in 0..self.count {
            sink.push(&json!({ "id": format!("kept-{}", i) })).await?;
        }
        let leaked = sink.clone();
        tokio::spawn(async move {
            let _held = leaked;
            tokio::time::sleep(Duration::from_secs(60 * 60)).await;
        });
        Ok(())
    }
}

pub struct PanicCollector;

#[async_trait]
impl ResourceCollector<TestBundle> for PanicCollector {
    async fn collect(&self, _ctx: &CollectContext, _bundle: &TestBundle, sink: &RecordSink) -> Result<()> {
        sink.push(&json!({ "id": "partial" })).await?;
        panic!("index out of range in page parser");
    }
}

pub struct FailCollector;

#[async_trait]
impl ResourceCollector<TestBundle> for FailCollector {
    async fn collect(&self, _ctx: &CollectContext, _bundle: &TestBundle, _sink: &RecordSink) -> Result<()> {
        Err(anyhow!("ListThings failed: Throttling"))
    }
}

/// Pushes `count` records, then optionally signals the end of its work.
pub struct StopEarlyCollector {
    pub count: u32,
    pub call_cancel: bool,
}

#[async_trait]
impl CancelAwareCollector<TestBundle> for StopEarlyCollector {
    async fn collect(
        &self,
        _ctx: &CollectContext,
        cancel: CancelHandle,
        _bundle: &TestBundle,
        sink: &RecordSink,
    ) -> Result<()> {
        for i in 0..self.count {
            sink.push(&json!({ "id": format!("event-{}", i) })).await?;
        }
        if self.call_cancel {
            cancel.cancel();
        }
        Ok(())
    }
}

/// Tracks how many instances run at the same time.
#[derive(Clone, Default)]
pub struct Gauge {
    in_flight: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

impl Gauge {
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

pub struct GaugeCollector {
    pub gauge: Gauge,
    pub hold: Duration,
}

#[async_trait]
impl ResourceCollector<TestBundle> for GaugeCollector {
    async fn collect(&self, _ctx: &CollectContext, _bundle: &TestBundle, _sink: &RecordSink) -> Result<()> {
        let now = self.gauge.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.gauge.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.hold).await;
        self.gauge.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }
}

pub fn definition<C>(resource_type: &str, collector: C) -> ResourceDefinition<TestBundle>
where
    C: ResourceCollector<TestBundle> + 'static,
{
    ResourceDefinition::new(resource_type, "test", collector).field_paths(FieldPaths::new("$.id", "$.name"))
}

pub fn regions(n: usize) -> Vec<String> {
    (1..=n).map(|i| format!("region-{}", i)).collect()
}

pub fn platform(defs: Vec<ResourceDefinition<TestBundle>>, region_count: usize) -> PlatformConfig<TestBundle> {
    platform_with(defs, region_count, TestBundle::default())
}

pub fn platform_with(
    defs: Vec<ResourceDefinition<TestBundle>>,
    region_count: usize,
    prototype: TestBundle,
) -> PlatformConfig<TestBundle> {
    PlatformConfig::new(PLATFORM, defs, prototype, regions(region_count), Vec::new())
        .expect("valid test platform")
}

pub fn accounts(n: usize) -> Vec<CloudAccount> {
    (1..=n)
        .map(|i| CloudAccount::new(&format!("acct-{}", i), PLATFORM, Credentials::Ambient))
        .collect()
}

/// Short deadlines so timeout scenarios finish quickly.
pub fn fast_config() -> SchedulerConfig {
    SchedulerConfig {
        unit_timeout_secs: 1,
        cancel_grace_ms: 50,
        max_concurrent_units: 16,
        ..SchedulerConfig::default()
    }
}
