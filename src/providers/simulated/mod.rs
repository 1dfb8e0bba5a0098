//! Deterministic simulated provider.
//!
//! Backs the CLI demo mode and the test suite. [`platform`] registers
//! well-behaved collectors covering every pagination style; [`chaos_platform`]
//! adds collectors that stall, hang, panic or fail.

pub mod api;
mod collectors;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::config::{CloudAccount, Credentials};
use crate::constants::PLATFORM_SIMULATED;
use crate::error::CollectError;
use crate::models::CollectRecordInfo;
use crate::platform::{ClientBundle, CloudAccountParam, FieldPaths, PlatformConfig, ResourceDefinition};

pub use api::{SimulatedApi, SimulatedError, SimulatedProfile};
pub use collectors::{
    AuditEventCollector, BucketCollector, FailingCollector, HungCollector, InstanceCollector,
    PanickingCollector, SlowCollector, UserCollector,
};

pub const VM: &str = "VM";
pub const BUCKET: &str = "Bucket";
pub const USER: &str = "User";
pub const AUDIT_EVENT: &str = "Audit Event";
pub const SLOW_VOLUME: &str = "Slow Volume";
pub const HUNG_SNAPSHOT: &str = "Hung Snapshot";
pub const PANICKING_QUEUE: &str = "Panicking Queue";
pub const BROKEN_NETWORK: &str = "Broken Network";

/// Client bundle of the simulated provider.
#[derive(Debug, Clone, Default)]
pub struct SimulatedBundle {
    profile: Arc<SimulatedProfile>,
    api: Option<SimulatedApi>,
}

impl SimulatedBundle {
    pub fn new(profile: SimulatedProfile) -> Self {
        Self {
            profile: Arc::new(profile),
            api: None,
        }
    }

    pub fn api(&self) -> Result<&SimulatedApi> {
        self.api
            .as_ref()
            .ok_or_else(|| anyhow!("simulated client not initialized"))
    }
}

#[async_trait]
impl ClientBundle for SimulatedBundle {
    async fn init_services(&mut self, param: &CloudAccountParam) -> Result<()> {
        tokio::time::sleep(self.profile.latency).await;
        if self.profile.fail_init_for.contains(&param.resource_type) {
            return Err(CollectError::InitFailed {
                resource_type: param.resource_type.clone(),
                reason: "endpoint unreachable".to_string(),
            }
            .into());
        }
        self.api = Some(SimulatedApi::new(
            &param.account_id,
            &param.region,
            Arc::clone(&self.profile),
        ));
        Ok(())
    }

    fn fresh(&self) -> Self {
        Self {
            profile: Arc::clone(&self.profile),
            api: None,
        }
    }

    async fn assess_collection_trigger(&self, param: &CloudAccountParam) -> CollectRecordInfo {
        match &param.credentials {
            Credentials::AccessKey { secret_access_key, .. } if *secret_access_key == self.profile.reject_secret => {
                let mut record = CollectRecordInfo::skipped(
                    &param.account_id,
                    &param.platform,
                    "InvalidAccessKeyId: the access key is not valid",
                );
                record.error_message = Some("credential check failed".to_string());
                record
            }
            _ => CollectRecordInfo::enabled(&param.account_id, &param.platform),
        }
    }
}

fn standard_resources() -> Vec<ResourceDefinition<SimulatedBundle>> {
    vec![
        ResourceDefinition::new(VM, "compute", InstanceCollector)
            .display_name("Virtual Machine")
            .description("Instances with attached disk details")
            .field_paths(
                FieldPaths::new("$.instance.id", "$.instance.name").with_address("$.instance.private_ip"),
            ),
        ResourceDefinition::new(BUCKET, "storage", BucketCollector)
            .display_name("Object Storage Bucket")
            .description("Buckets with their access policy")
            .field_paths(FieldPaths::new("$.bucket.name", "$.bucket.name"))
            .global(),
        ResourceDefinition::new(USER, "identity", UserCollector)
            .display_name("Identity User")
            .description("Users with access keys and MFA devices")
            .field_paths(FieldPaths::new("$.user.user_id", "$.user.user_name"))
            .global(),
        ResourceDefinition::cancel_aware(AUDIT_EVENT, "audit", AuditEventCollector)
            .display_name("Audit Event")
            .field_paths(FieldPaths::new("$.event_id", "$.event_name").with_address("$.source_ip"))
            .regions(&["sim-east-1"]),
    ]
}

fn chaos_resources() -> Vec<ResourceDefinition<SimulatedBundle>> {
    vec![
        ResourceDefinition::new(
            SLOW_VOLUME,
            "storage",
            SlowCollector {
                interval: Duration::from_millis(100),
            },
        )
        .field_paths(FieldPaths::new("$.id", "$.id"))
        .regions(&["sim-east-1"]),
        ResourceDefinition::new(HUNG_SNAPSHOT, "storage", HungCollector)
            .field_paths(FieldPaths::new("$.id", "$.id"))
            .regions(&["sim-west-1"]),
        ResourceDefinition::new(PANICKING_QUEUE, "messaging", PanickingCollector { after: 3 })
            .field_paths(FieldPaths::new("$.id", "$.id"))
            .regions(&["sim-east-1"]),
        ResourceDefinition::new(BROKEN_NETWORK, "network", FailingCollector)
            .field_paths(FieldPaths::new("$.id", "$.id"))
            .regions(&["sim-central-1"]),
    ]
}

fn build(resources: Vec<ResourceDefinition<SimulatedBundle>>, profile: SimulatedProfile) -> Result<PlatformConfig<SimulatedBundle>, CollectError> {
    let regions = profile.regions.clone();
    let accounts = vec![CloudAccount::new("000000000001", PLATFORM_SIMULATED, Credentials::Ambient)];
    PlatformConfig::new(PLATFORM_SIMULATED, resources, SimulatedBundle::new(profile), regions, accounts)
}

/// The well-behaved simulated platform with the default profile.
pub fn platform() -> Result<PlatformConfig<SimulatedBundle>, CollectError> {
    platform_with(SimulatedProfile::default())
}

pub fn platform_with(profile: SimulatedProfile) -> Result<PlatformConfig<SimulatedBundle>, CollectError> {
    build(standard_resources(), profile)
}

/// Standard resources plus collectors that misbehave on purpose.
pub fn chaos_platform(profile: SimulatedProfile) -> Result<PlatformConfig<SimulatedBundle>, CollectError> {
    let mut resources = standard_resources();
    resources.extend(chaos_resources());
    build(resources, profile)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platforms_validate() {
        let standard = platform().unwrap();
        assert_eq!(standard.resources.len(), 4);
        assert_eq!(standard.default_regions.len(), 3);

        let chaos = chaos_platform(SimulatedProfile::default()).unwrap();
        assert_eq!(chaos.resources.len(), 8);
        assert!(chaos.definition(AUDIT_EVENT).unwrap().collector.is_cancel_aware());
    }

    #[tokio::test]
    async fn test_init_failure_knob() {
        let profile = SimulatedProfile {
            fail_init_for: vec![VM.to_string()],
            latency: Duration::ZERO,
            ..Default::default()
        };
        let prototype = SimulatedBundle::new(profile);
        let account = CloudAccount::new("1", PLATFORM_SIMULATED, Credentials::Ambient);

        let mut bundle = prototype.fresh();
        let err = bundle
            .init_services(&CloudAccountParam::for_unit(&account, PLATFORM_SIMULATED, "sim-east-1", VM))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("client initialization failed for VM"));
        assert!(bundle.api().is_err());

        let mut bundle = prototype.fresh();
        bundle
            .init_services(&CloudAccountParam::for_unit(&account, PLATFORM_SIMULATED, "sim-east-1", USER))
            .await
            .unwrap();
        assert_eq!(bundle.api().unwrap().region(), "sim-east-1");
    }

    #[tokio::test]
    async fn test_trigger_rejects_invalid_secret() {
        let bundle = SimulatedBundle::default();
        let account = CloudAccount::new(
            "1",
            PLATFORM_SIMULATED,
            Credentials::AccessKey {
                access_key_id: "AKIA".to_string(),
                secret_access_key: "invalid".to_string(),
                session_token: None,
            },
        );
        let record = bundle
            .assess_collection_trigger(&CloudAccountParam::for_unit(&account, PLATFORM_SIMULATED, "r", ""))
            .await;
        assert!(!record.enable_collection);
        assert!(record.message.unwrap().contains("InvalidAccessKeyId"));
    }
}
