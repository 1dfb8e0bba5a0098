//! Platform configuration and resource definitions.
//!
//! A [`PlatformConfig`] is the whole registration of one provider: its name,
//! the resource types it can collect, the client bundle prototype units clone
//! from, and the default regions and accounts to sweep.

mod bundle;

pub use bundle::{ClientBundle, CloudAccountParam};

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::collectors::{CancelAwareCollector, Collector, ResourceCollector};
use crate::config::CloudAccount;
use crate::error::CollectError;
use crate::sink::is_supported_path;

/// How a resource type maps onto regions.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    /// One unit per account; the resource is not scoped to a region.
    Global,
    #[default]
    Regional,
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dimension::Global => f.write_str("global"),
            Dimension::Regional => f.write_str("regional"),
        }
    }
}

/// Property paths the sink evaluates against each record.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct FieldPaths {
    pub resource_id: String,
    pub resource_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

impl FieldPaths {
    pub fn new(resource_id: &str, resource_name: &str) -> Self {
        Self {
            resource_id: resource_id.to_string(),
            resource_name: resource_name.to_string(),
            address: None,
        }
    }

    pub fn with_address(mut self, address: &str) -> Self {
        self.address = Some(address.to_string());
        self
    }
}

/// Registration of one collectable resource type.
pub struct ResourceDefinition<B: ClientBundle> {
    pub resource_type: String,
    pub resource_type_name: String,
    pub group: String,
    pub description: String,
    pub collector: Collector<B>,
    pub field_paths: FieldPaths,
    pub dimension: Dimension,
    /// Replaces the platform's region list when non-empty.
    pub regions: Vec<String>,
    pub excluded_regions: Vec<String>,
}

impl<B: ClientBundle> ResourceDefinition<B> {
    fn with_collector(resource_type: &str, group: &str, collector: Collector<B>) -> Self {
        Self {
            resource_type: resource_type.to_string(),
            resource_type_name: resource_type.to_string(),
            group: group.to_string(),
            description: String::new(),
            collector,
            field_paths: FieldPaths::default(),
            dimension: Dimension::Regional,
            regions: Vec::new(),
            excluded_regions: Vec::new(),
        }
    }

    /// A definition backed by a plain collector.
    pub fn new<C>(resource_type: &str, group: &str, collector: C) -> Self
    where
        C: ResourceCollector<B> + 'static,
    {
        Self::with_collector(resource_type, group, Collector::Plain(Arc::new(collector)))
    }

    /// A definition backed by a collector that can end its unit early.
    pub fn cancel_aware<C>(resource_type: &str, group: &str, collector: C) -> Self
    where
        C: CancelAwareCollector<B> + 'static,
    {
        Self::with_collector(resource_type, group, Collector::CancelAware(Arc::new(collector)))
    }

    pub fn display_name(mut self, name: &str) -> Self {
        self.resource_type_name = name.to_string();
        self
    }

    pub fn description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    pub fn field_paths(mut self, paths: FieldPaths) -> Self {
        self.field_paths = paths;
        self
    }

    pub fn global(mut self) -> Self {
        self.dimension = Dimension::Global;
        self
    }

    pub fn regions(mut self, regions: &[&str]) -> Self {
        self.regions = regions.iter().map(|r| r.to_string()).collect();
        self
    }

    pub fn excluded_regions(mut self, regions: &[&str]) -> Self {
        self.excluded_regions = regions.iter().map(|r| r.to_string()).collect();
        self
    }
}

impl<B: ClientBundle> fmt::Debug for ResourceDefinition<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceDefinition")
            .field("resource_type", &self.resource_type)
            .field("group", &self.group)
            .field("dimension", &self.dimension)
            .field("cancel_aware", &self.collector.is_cancel_aware())
            .field("regions", &self.regions)
            .field("excluded_regions", &self.excluded_regions)
            .finish()
    }
}

/// Complete registration of one provider.
pub struct PlatformConfig<B: ClientBundle> {
    pub name: String,
    pub resources: Vec<ResourceDefinition<B>>,
    pub prototype: B,
    pub default_regions: Vec<String>,
    pub default_accounts: Vec<CloudAccount>,
}

impl<B: ClientBundle> PlatformConfig<B> {
    /// Validate and normalize a platform registration.
    ///
    /// Rejects an empty name, an empty resource list, an empty region list or
    /// a field path outside the supported subset, and removes duplicate
    /// regions while preserving their order.
    pub fn new(
        name: &str,
        resources: Vec<ResourceDefinition<B>>,
        prototype: B,
        default_regions: Vec<String>,
        default_accounts: Vec<CloudAccount>,
    ) -> Result<Self, CollectError> {
        if name.trim().is_empty() {
            return Err(CollectError::InvalidPlatform("platform name is empty".to_string()));
        }
        if resources.is_empty() {
            return Err(CollectError::InvalidPlatform(format!(
                "platform {} registers no resources",
                name
            )));
        }

        let default_regions = dedup_regions(default_regions);
        if default_regions.is_empty() {
            return Err(CollectError::InvalidPlatform(format!(
                "platform {} has no default regions",
                name
            )));
        }

        let mut seen = HashSet::new();
        if let Some(dup) = resources.iter().find(|r| !seen.insert(r.resource_type.as_str())) {
            return Err(CollectError::InvalidPlatform(format!(
                "resource type {} registered twice",
                dup.resource_type
            )));
        }

        for resource in &resources {
            let paths = &resource.field_paths;
            let unsupported = [Some(&paths.resource_id), Some(&paths.resource_name), paths.address.as_ref()]
                .into_iter()
                .flatten()
                .find(|path| !is_supported_path(path));
            if let Some(path) = unsupported {
                return Err(CollectError::InvalidPlatform(format!(
                    "resource type {} uses unsupported field path {}",
                    resource.resource_type, path
                )));
            }
        }

        Ok(Self {
            name: name.to_string(),
            resources,
            prototype,
            default_regions,
            default_accounts,
        })
    }

    /// Replace the default region list, keeping validation rules.
    pub fn with_regions(mut self, regions: Vec<String>) -> Result<Self, CollectError> {
        let regions = dedup_regions(regions);
        if regions.is_empty() {
            return Err(CollectError::InvalidPlatform("region override is empty".to_string()));
        }
        self.default_regions = regions;
        Ok(self)
    }

    pub fn with_accounts(mut self, accounts: Vec<CloudAccount>) -> Self {
        self.default_accounts = accounts;
        self
    }

    /// Keep only the named resource types. Unknown names are an error.
    pub fn retain_resources(mut self, types: &[String]) -> Result<Self, CollectError> {
        if types.is_empty() {
            return Ok(self);
        }
        if let Some(unknown) = types
            .iter()
            .find(|t| !self.resources.iter().any(|r| &r.resource_type == *t))
        {
            return Err(CollectError::Config(format!("unknown resource type {}", unknown)));
        }
        self.resources.retain(|r| types.contains(&r.resource_type));
        Ok(self)
    }

    pub fn definition(&self, resource_type: &str) -> Option<&ResourceDefinition<B>> {
        self.resources.iter().find(|r| r.resource_type == resource_type)
    }
}

fn dedup_regions(regions: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    regions
        .into_iter()
        .map(|r| r.trim().to_string())
        .filter(|r| !r.is_empty() && seen.insert(r.clone()))
        .collect()
}
