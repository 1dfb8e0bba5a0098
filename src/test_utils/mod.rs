//! Test utilities shared by the unit test modules.

#![cfg(test)]

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::collectors::ResourceCollector;
use crate::models::CollectRecordInfo;
use crate::orchestrator::{CollectContext, RecordSink};
use crate::platform::{ClientBundle, CloudAccountParam, FieldPaths, ResourceDefinition};

/// Client bundle with no real clients and a couple of failure knobs.
#[derive(Debug, Clone, Default)]
pub struct StubBundle {
    /// `init_services` fails for every unit.
    pub fail_init: bool,
    /// The collection trigger skips the account with this reason.
    pub disabled: Option<String>,
    pub initialized_for: Option<String>,
}

#[async_trait]
impl ClientBundle for StubBundle {
    async fn init_services(&mut self, param: &CloudAccountParam) -> Result<()> {
        if self.fail_init {
            return Err(anyhow!("stub init failure for {}", param.resource_type));
        }
        self.initialized_for = Some(format!("{}/{}", param.region, param.resource_type));
        Ok(())
    }

    fn fresh(&self) -> Self {
        Self {
            fail_init: self.fail_init,
            disabled: self.disabled.clone(),
            initialized_for: None,
        }
    }

    async fn assess_collection_trigger(&self, param: &CloudAccountParam) -> CollectRecordInfo {
        match &self.disabled {
            Some(reason) => CollectRecordInfo::skipped(&param.account_id, &param.platform, reason.clone()),
            None => CollectRecordInfo::enabled(&param.account_id, &param.platform),
        }
    }
}

/// Collector that emits nothing.
pub struct NoopCollector;

#[async_trait]
impl ResourceCollector<StubBundle> for NoopCollector {
    async fn collect(&self, _ctx: &CollectContext, _bundle: &StubBundle, _sink: &RecordSink) -> Result<()> {
        Ok(())
    }
}

/// Minimal regional definition for `resource_type`.
pub fn noop_definition(resource_type: &str) -> ResourceDefinition<StubBundle> {
    ResourceDefinition::new(resource_type, "test", NoopCollector).field_paths(FieldPaths::new("$.id", "$.name"))
}
