use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use rusoto_ec2::{DescribeInstancesRequest, Ec2, Instance};
use serde::Serialize;

use super::AwsServices;
use crate::collectors::{paginate, Page, PageRequest, PageStyle, ResourceCollector};
use crate::orchestrator::{CollectContext, RecordSink};
use crate::unit_debug;

// DescribeInstances rejects MaxResults outside this range
const MIN_PAGE: u32 = 5;
const MAX_PAGE: u32 = 1000;

#[derive(Serialize)]
struct InstanceDetail {
    instance_id: Option<String>,
    name: Option<String>,
    instance_type: Option<String>,
    state: Option<String>,
    image_id: Option<String>,
    vpc_id: Option<String>,
    subnet_id: Option<String>,
    private_ip_address: Option<String>,
    public_ip_address: Option<String>,
    launch_time: Option<String>,
    security_groups: Vec<String>,
    tags: Vec<(String, String)>,
}

impl From<Instance> for InstanceDetail {
    fn from(instance: Instance) -> Self {
        let tags: Vec<(String, String)> = instance
            .tags
            .unwrap_or_default()
            .into_iter()
            .filter_map(|t| Some((t.key?, t.value.unwrap_or_default())))
            .collect();
        let name = tags.iter().find(|(k, _)| k == "Name").map(|(_, v)| v.clone());
        InstanceDetail {
            name: name.or_else(|| instance.instance_id.clone()),
            instance_id: instance.instance_id,
            instance_type: instance.instance_type,
            state: instance.state.and_then(|s| s.name),
            image_id: instance.image_id,
            vpc_id: instance.vpc_id,
            subnet_id: instance.subnet_id,
            private_ip_address: instance.private_ip_address,
            public_ip_address: instance.public_ip_address,
            launch_time: instance.launch_time,
            security_groups: instance
                .security_groups
                .unwrap_or_default()
                .into_iter()
                .filter_map(|g| g.group_id)
                .collect(),
            tags,
        }
    }
}

pub struct InstanceCollector;

#[async_trait]
impl ResourceCollector<AwsServices> for InstanceCollector {
    async fn collect(&self, ctx: &CollectContext, services: &AwsServices, sink: &RecordSink) -> Result<()> {
        let client = services.ec2()?;
        let page_size = ctx.page_size().clamp(MIN_PAGE, MAX_PAGE);

        let instances = paginate(ctx, PageStyle::Token, page_size, |req| async move {
            let (next_token, size) = match req {
                PageRequest::Token { token, size } => (token, size),
                other => return Err(anyhow!("unexpected page request {:?}", other)),
            };
            let result = client
                .describe_instances(DescribeInstancesRequest {
                    next_token,
                    max_results: Some(size as i64),
                    ..Default::default()
                })
                .await?;
            let instances: Vec<Instance> = result
                .reservations
                .unwrap_or_default()
                .into_iter()
                .flat_map(|r| r.instances.unwrap_or_default())
                .collect();
            // Reservations group instances, so a short page says nothing.
            let truncated = result.next_token.is_some();
            Ok(Page::new(instances)
                .with_next_token(result.next_token)
                .with_truncated(truncated))
        })
        .await
        .context("DescribeInstances failed")?;

        unit_debug!(ctx, "{} instances described", instances.len());
        for instance in instances {
            sink.push(&InstanceDetail::from(instance)).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusoto_ec2::{InstanceState, Tag};

    #[test]
    fn test_instance_detail_uses_name_tag() {
        let instance = Instance {
            instance_id: Some("i-0abc".to_string()),
            private_ip_address: Some("10.0.0.4".to_string()),
            state: Some(InstanceState {
                name: Some("running".to_string()),
                ..Default::default()
            }),
            tags: Some(vec![Tag {
                key: Some("Name".to_string()),
                value: Some("bastion".to_string()),
            }]),
            ..Default::default()
        };
        let detail = serde_json::to_value(InstanceDetail::from(instance)).unwrap();
        assert_eq!(detail["name"], "bastion");
        assert_eq!(detail["state"], "running");
        assert_eq!(detail["private_ip_address"], "10.0.0.4");
    }

    #[test]
    fn test_instance_detail_falls_back_to_id() {
        let instance = Instance {
            instance_id: Some("i-0def".to_string()),
            ..Default::default()
        };
        let detail = serde_json::to_value(InstanceDetail::from(instance)).unwrap();
        assert_eq!(detail["name"], "i-0def");
    }
}
