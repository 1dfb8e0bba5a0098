use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use rusoto_iam::{
    Iam, ListAccessKeysRequest, ListAttachedUserPoliciesRequest, ListMFADevicesRequest, ListUsersRequest,
};
use serde::Serialize;

use super::AwsServices;
use crate::collectors::{enrich_with_pool, optional_facet, paginate, Page, PageRequest, PageStyle, ResourceCollector};
use crate::orchestrator::{CollectContext, RecordSink};
use crate::unit_info;

#[derive(Serialize)]
struct UserSummary {
    user_id: String,
    user_name: String,
    arn: String,
    path: String,
    create_date: String,
    password_last_used: Option<String>,
}

#[derive(Serialize)]
struct AccessKeySummary {
    access_key_id: Option<String>,
    status: Option<String>,
    create_date: Option<String>,
}

#[derive(Serialize)]
struct AttachedPolicy {
    policy_name: Option<String>,
    policy_arn: Option<String>,
}

#[derive(Serialize)]
struct UserDetail {
    user: UserSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    attached_policies: Option<Vec<AttachedPolicy>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    access_keys: Option<Vec<AccessKeySummary>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    mfa_devices: Option<Vec<String>>,
}

pub struct UserCollector;

#[async_trait]
impl ResourceCollector<AwsServices> for UserCollector {
    async fn collect(&self, ctx: &CollectContext, services: &AwsServices, sink: &RecordSink) -> Result<()> {
        let client = services.iam()?;

        let users = paginate(ctx, PageStyle::Token, ctx.page_size(), |req| async move {
            let (marker, size) = match req {
                PageRequest::Token { token, size } => (token, size),
                other => return Err(anyhow!("unexpected page request {:?}", other)),
            };
            let response = client
                .list_users(ListUsersRequest {
                    marker,
                    max_items: Some(size as i64),
                    ..Default::default()
                })
                .await?;
            let truncated = response.is_truncated.unwrap_or(false);
            Ok(Page::new(response.users)
                .with_next_token(response.marker)
                .with_truncated(truncated))
        })
        .await
        .context("ListUsers failed")?;
        unit_info!(ctx, "{} users listed", users.len());

        enrich_with_pool(ctx, sink, users, ctx.enrichment_workers(), |user| async move {
            let user_name = user.user_name.clone();

            let policies = client
                .list_attached_user_policies(ListAttachedUserPoliciesRequest {
                    user_name: user_name.clone(),
                    ..Default::default()
                })
                .await
                .map(|out| {
                    out.attached_policies
                        .unwrap_or_default()
                        .into_iter()
                        .map(|p| AttachedPolicy {
                            policy_name: p.policy_name,
                            policy_arn: p.policy_arn,
                        })
                        .collect()
                });

            let keys = client
                .list_access_keys(ListAccessKeysRequest {
                    user_name: Some(user_name.clone()),
                    ..Default::default()
                })
                .await
                .map(|out| {
                    out.access_key_metadata
                        .into_iter()
                        .map(|k| AccessKeySummary {
                            access_key_id: k.access_key_id,
                            status: k.status,
                            create_date: k.create_date,
                        })
                        .collect()
                });

            let mfa = client
                .list_mfa_devices(ListMFADevicesRequest {
                    user_name: Some(user_name),
                    ..Default::default()
                })
                .await
                .map(|out| out.mfa_devices.into_iter().map(|d| d.serial_number).collect());

            UserDetail {
                user: UserSummary {
                    user_id: user.user_id,
                    user_name: user.user_name,
                    arn: user.arn,
                    path: user.path,
                    create_date: user.create_date,
                    password_last_used: user.password_last_used,
                },
                attached_policies: optional_facet(ctx, "attached policies", policies),
                access_keys: optional_facet(ctx, "access keys", keys),
                mfa_devices: optional_facet(ctx, "mfa devices", mfa),
            }
        })
        .await?;
        Ok(())
    }
}
