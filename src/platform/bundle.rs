use std::fmt;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;

use crate::config::{CloudAccount, Credentials};
use crate::models::CollectRecordInfo;

/// Everything a client bundle needs to initialize itself for one unit.
#[derive(Debug, Clone)]
pub struct CloudAccountParam {
    pub account_id: String,
    pub platform: String,
    pub region: String,
    /// Resource type the bundle is being initialized for.
    pub resource_type: String,
    pub credentials: Credentials,
    pub proxy: Option<String>,
    pub last_collect: Option<CollectRecordInfo>,
}

impl CloudAccountParam {
    pub fn for_unit(account: &CloudAccount, platform: &str, region: &str, resource_type: &str) -> Self {
        Self {
            account_id: account.account_id.clone(),
            platform: platform.to_string(),
            region: region.to_string(),
            resource_type: resource_type.to_string(),
            credentials: account.credentials.clone(),
            proxy: account.proxy.clone(),
            last_collect: account.last_collect.clone(),
        }
    }

    /// Seconds since the previous collection ended, if one is known.
    pub fn secs_since_last_collect(&self) -> Option<i64> {
        self.last_collect
            .as_ref()
            .and_then(|r| r.end_time)
            .map(|end| (Utc::now() - end).num_seconds())
    }
}

/// Same bracketed form as a unit's log prefix, without the trace id.
impl fmt::Display for CloudAccountParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[account={} region={}", self.account_id, self.region)?;
        if !self.resource_type.is_empty() {
            write!(f, " type={}", self.resource_type)?;
        }
        write!(f, "]")
    }
}

/// Provider SDK handles scoped to one account and region.
///
/// The scheduler holds a prototype and calls [`ClientBundle::fresh`] once per
/// unit, so no handle is ever shared between units.
#[async_trait]
pub trait ClientBundle: Send + Sync + 'static {
    /// Build the handles the resource type in `param` requires. Failing to
    /// build an optional handle should be logged and ignored.
    async fn init_services(&mut self, param: &CloudAccountParam) -> Result<()>;

    /// An empty bundle of the same provider.
    fn fresh(&self) -> Self
    where
        Self: Sized;

    /// Decide whether the account should be collected at all.
    async fn assess_collection_trigger(&self, param: &CloudAccountParam) -> CollectRecordInfo {
        CollectRecordInfo::enabled(&param.account_id, &param.platform)
    }
}
