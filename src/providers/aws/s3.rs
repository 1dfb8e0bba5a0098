use std::future::Future;

use anyhow::{Context, Result};
use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use rusoto_core::RusotoError;
use rusoto_s3::{
    GetBucketEncryptionRequest, GetBucketLocationRequest, GetBucketPolicyRequest, GetBucketVersioningRequest,
    S3Client, S3,
};
use serde::Serialize;
use serde_json::Value;

use super::AwsServices;
use crate::collectors::{corrective_retry, enrich_with_pool, optional_facet, ResourceCollector};
use crate::constants::{AWS_GLOBAL_REGION, CORRECTIVE_RETRY_ATTEMPTS};
use crate::orchestrator::{CollectContext, RecordSink};
use crate::unit_info;

lazy_static! {
    static ref REGION_IN_BODY: Regex =
        Regex::new(r"<Region>([a-z0-9-]+)</Region>").expect("Invalid region regex pattern");
    static ref ENDPOINT_IN_BODY: Regex =
        Regex::new(r"<Endpoint>[^<]*?s3[.-]([a-z]{2}-[a-z]+-\d)\.amazonaws\.com</Endpoint>")
            .expect("Invalid endpoint regex pattern");
}

/// Region a redirect or wrong-region error points at, if any.
pub fn redirect_region<E>(err: &RusotoError<E>) -> Option<String> {
    let RusotoError::Unknown(response) = err else {
        return None;
    };
    if let Some(region) = response.headers.get("x-amz-bucket-region") {
        return Some(region.clone());
    }
    let body = response.body_as_str();
    REGION_IN_BODY
        .captures(body)
        .or_else(|| ENDPOINT_IN_BODY.captures(body))
        .map(|caps| caps[1].to_string())
}

/// Normalize a GetBucketLocation constraint to a region name.
fn location_to_region(constraint: Option<String>) -> String {
    match constraint.as_deref() {
        None | Some("") => AWS_GLOBAL_REGION.to_string(),
        Some("EU") => "eu-west-1".to_string(),
        Some(region) => region.to_string(),
    }
}

/// Run an S3 call against `region`, following at most one redirect to the
/// bucket's real region. Clients come from the unit's per-region cache.
async fn in_bucket_region<T, E, F, Fut>(services: &AwsServices, region: String, call: F) -> Result<T>
where
    E: std::error::Error + Send + Sync + 'static,
    F: Fn(S3Client) -> Fut,
    Fut: Future<Output = Result<T, RusotoError<E>>>,
{
    let call = &call;
    corrective_retry(
        region,
        CORRECTIVE_RETRY_ATTEMPTS,
        |e: &anyhow::Error| e.downcast_ref::<RusotoError<E>>().and_then(redirect_region),
        move |region: String| async move {
            let client = services.s3_for(&region)?;
            call(client).await.map_err(anyhow::Error::from)
        },
    )
    .await
}

#[derive(Serialize)]
struct BucketSummary {
    name: String,
    creation_date: Option<String>,
    region: String,
}

#[derive(Serialize)]
struct Versioning {
    status: Option<String>,
    mfa_delete: Option<String>,
}

#[derive(Serialize)]
struct BucketDetail {
    bucket: BucketSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    policy: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    versioning: Option<Versioning>,
    #[serde(skip_serializing_if = "Option::is_none")]
    encryption: Option<Vec<String>>,
}

pub struct BucketCollector;

#[async_trait]
impl ResourceCollector<AwsServices> for BucketCollector {
    async fn collect(&self, ctx: &CollectContext, services: &AwsServices, sink: &RecordSink) -> Result<()> {
        let client = services.s3()?;
        let output = ctx
            .run(client.list_buckets())
            .await?
            .context("ListBuckets failed")?;
        let buckets: Vec<(String, Option<String>)> = output
            .buckets
            .unwrap_or_default()
            .into_iter()
            .filter_map(|b| b.name.map(|name| (name, b.creation_date)))
            .collect();
        unit_info!(ctx, "{} buckets listed", buckets.len());

        enrich_with_pool(ctx, sink, buckets, ctx.enrichment_workers(), |(name, creation_date)| async move {
            let location = client
                .get_bucket_location(GetBucketLocationRequest {
                    bucket: name.clone(),
                    ..Default::default()
                })
                .await
                .map(|out| location_to_region(out.location_constraint));
            let region = optional_facet(ctx, "bucket location", location)
                .unwrap_or_else(|| services.region_name().to_string());

            let bucket = name.as_str();
            let policy = in_bucket_region(services, region.clone(), |c| async move {
                c.get_bucket_policy(GetBucketPolicyRequest {
                    bucket: bucket.to_string(),
                    ..Default::default()
                })
                .await
            })
            .await
            .map(|out| {
                out.policy
                    .and_then(|raw| serde_json::from_str::<Value>(&raw).ok())
            });

            let versioning = in_bucket_region(services, region.clone(), |c| async move {
                c.get_bucket_versioning(GetBucketVersioningRequest {
                    bucket: bucket.to_string(),
                    ..Default::default()
                })
                .await
            })
            .await
            .map(|out| Versioning {
                status: out.status,
                mfa_delete: out.mfa_delete,
            });

            let encryption = in_bucket_region(services, region.clone(), |c| async move {
                c.get_bucket_encryption(GetBucketEncryptionRequest {
                    bucket: bucket.to_string(),
                    ..Default::default()
                })
                .await
            })
            .await
            .map(|out| {
                out.server_side_encryption_configuration
                    .map(|config| {
                        config
                            .rules
                            .into_iter()
                            .filter_map(|rule| rule.apply_server_side_encryption_by_default)
                            .map(|default| default.sse_algorithm)
                            .collect()
                    })
                    .unwrap_or_default()
            });

            BucketDetail {
                policy: optional_facet(ctx, "bucket policy", policy).flatten(),
                versioning: optional_facet(ctx, "bucket versioning", versioning),
                encryption: optional_facet(ctx, "bucket encryption", encryption),
                bucket: BucketSummary {
                    name: name.clone(),
                    creation_date,
                    region,
                },
            }
        })
        .await?;
        Ok(())
    }
}
