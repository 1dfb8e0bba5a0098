use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::Serialize;

use super::api::{AccessKey, AuditEvent, Bucket, Disk, Instance, SimulatedError, User};
use super::SimulatedBundle;
use crate::collectors::{
    corrective_retry, enrich_with_pool, optional_facet, paginate, CancelAwareCollector, PageRequest,
    PageStyle, ResourceCollector,
};
use crate::constants::CORRECTIVE_RETRY_ATTEMPTS;
use crate::orchestrator::{CancelHandle, CollectContext, RecordSink};
use crate::{unit_debug, unit_info};

#[derive(Serialize)]
struct InstanceRecord {
    instance: Instance,
    #[serde(skip_serializing_if = "Option::is_none")]
    disks: Option<Vec<Disk>>,
}

/// Page-number listing with serial per-item enrichment.
pub struct InstanceCollector;

#[async_trait]
impl ResourceCollector<SimulatedBundle> for InstanceCollector {
    async fn collect(&self, ctx: &CollectContext, bundle: &SimulatedBundle, sink: &RecordSink) -> Result<()> {
        let api = bundle.api()?;
        let instances = paginate(ctx, PageStyle::Number, ctx.page_size(), |req| async move {
            match req {
                PageRequest::Number { page, size } => Ok(api.list_instances(page, size).await?),
                other => Err(anyhow!("unexpected page request {:?}", other)),
            }
        })
        .await
        .context("ListInstances failed")?;

        for instance in instances {
            ctx.check()?;
            let disks = optional_facet(ctx, "disks", api.describe_disks(&instance).await);
            sink.push(&InstanceRecord { instance, disks }).await?;
        }
        Ok(())
    }
}

#[derive(Serialize)]
struct BucketRecord {
    bucket: Bucket,
    #[serde(skip_serializing_if = "Option::is_none")]
    policy: Option<String>,
}

/// Unpaged listing with pooled enrichment and an endpoint-correcting retry.
pub struct BucketCollector;

#[async_trait]
impl ResourceCollector<SimulatedBundle> for BucketCollector {
    async fn collect(&self, ctx: &CollectContext, bundle: &SimulatedBundle, sink: &RecordSink) -> Result<()> {
        let api = bundle.api()?;
        let buckets = api.list_buckets().await.context("ListBuckets failed")?;
        unit_debug!(ctx, "{} buckets listed", buckets.len());

        enrich_with_pool(ctx, sink, buckets, ctx.enrichment_workers(), |bucket| async move {
            let target = &bucket;
            let policy = corrective_retry(
                api.region().to_string(),
                CORRECTIVE_RETRY_ATTEMPTS,
                |e: &SimulatedError| e.redirect_endpoint(),
                move |endpoint: String| async move { api.get_bucket_policy(&endpoint, target).await },
            )
            .await;
            let policy = optional_facet(ctx, "bucket policy", policy);
            BucketRecord { bucket, policy }
        })
        .await?;
        Ok(())
    }
}

#[derive(Serialize)]
struct UserRecord {
    user: User,
    #[serde(skip_serializing_if = "Option::is_none")]
    access_keys: Option<Vec<AccessKey>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    mfa_device: Option<String>,
}

/// Marker pagination followed by pooled enrichment.
pub struct UserCollector;

#[async_trait]
impl ResourceCollector<SimulatedBundle> for UserCollector {
    async fn collect(&self, ctx: &CollectContext, bundle: &SimulatedBundle, sink: &RecordSink) -> Result<()> {
        let api = bundle.api()?;
        let users = paginate(ctx, PageStyle::Token, ctx.page_size(), |req| async move {
            match req {
                PageRequest::Token { token, size } => Ok(api.list_users(token.as_deref(), size).await?),
                other => Err(anyhow!("unexpected page request {:?}", other)),
            }
        })
        .await
        .context("ListUsers failed")?;

        enrich_with_pool(ctx, sink, users, ctx.enrichment_workers(), |user| async move {
            let access_keys = optional_facet(ctx, "access keys", api.list_access_keys(&user).await);
            let mfa_device = optional_facet(ctx, "mfa device", api.get_mfa_device(&user).await);
            UserRecord {
                user,
                access_keys,
                mfa_device,
            }
        })
        .await?;
        Ok(())
    }
}

/// Emits every audit event, then signals that the unit has no more work.
pub struct AuditEventCollector;

#[async_trait]
impl CancelAwareCollector<SimulatedBundle> for AuditEventCollector {
    async fn collect(
        &self,
        ctx: &CollectContext,
        cancel: CancelHandle,
        bundle: &SimulatedBundle,
        sink: &RecordSink,
    ) -> Result<()> {
        let api = bundle.api()?;
        let events: Vec<AuditEvent> = paginate(ctx, PageStyle::Offset, ctx.page_size(), |req| async move {
            match req {
                PageRequest::Offset { offset, limit } => Ok(api.list_events(offset, limit).await?),
                other => Err(anyhow!("unexpected page request {:?}", other)),
            }
        })
        .await
        .context("ListEvents failed")?;

        for event in &events {
            sink.push(event).await?;
        }
        unit_info!(ctx, "{} events emitted, ending unit", events.len());
        cancel.cancel();
        Ok(())
    }
}

/// Keeps emitting heartbeats until cancelled; always runs into its deadline.
pub struct SlowCollector {
    pub interval: Duration,
}

#[async_trait]
impl ResourceCollector<SimulatedBundle> for SlowCollector {
    async fn collect(&self, ctx: &CollectContext, _bundle: &SimulatedBundle, sink: &RecordSink) -> Result<()> {
        let mut beat: u64 = 0;
        loop {
            ctx.check()?;
            sink.push(&serde_json::json!({ "id": format!("beat-{}", beat) })).await?;
            beat += 1;
            ctx.run(tokio::time::sleep(self.interval)).await?;
        }
    }
}

/// Ignores cancellation entirely; only an abort stops it.
pub struct HungCollector;

#[async_trait]
impl ResourceCollector<SimulatedBundle> for HungCollector {
    async fn collect(&self, _ctx: &CollectContext, _bundle: &SimulatedBundle, _sink: &RecordSink) -> Result<()> {
        tokio::time::sleep(Duration::from_secs(24 * 60 * 60)).await;
        Ok(())
    }
}

/// Pushes a few records, then panics.
pub struct PanickingCollector {
    pub after: u32,
}

#[async_trait]
impl ResourceCollector<SimulatedBundle> for PanickingCollector {
    async fn collect(&self, _ctx: &CollectContext, _bundle: &SimulatedBundle, sink: &RecordSink) -> Result<()> {
        for i in 0..self.after {
            sink.push(&serde_json::json!({ "id": format!("queue-{}", i) })).await?;
        }
        panic!("queue attributes missing after {} messages", self.after);
    }
}

/// Primary listing always fails.
pub struct FailingCollector;

#[async_trait]
impl ResourceCollector<SimulatedBundle> for FailingCollector {
    async fn collect(&self, _ctx: &CollectContext, bundle: &SimulatedBundle, _sink: &RecordSink) -> Result<()> {
        bundle.api()?;
        Err(anyhow!("Throttling: Rate exceeded")).context("DescribeNetworks failed")
    }
}
