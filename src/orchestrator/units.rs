//! Expansion of accounts × regions × resource definitions into units.

use log::warn;

use crate::config::CloudAccount;
use crate::platform::{ClientBundle, Dimension, PlatformConfig, ResourceDefinition};

/// One (account, region, resource definition) triple to collect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionUnit {
    pub account_id: String,
    pub region: String,
    /// Index into the platform's resource list.
    pub definition: usize,
}

/// Regions a definition is collected in for one account.
///
/// The definition's own region list replaces the platform defaults when
/// present, excluded regions are removed next, and an account-pinned region
/// finally replaces the whole list.
pub fn loop_regions<B: ClientBundle>(
    defaults: &[String],
    definition: &ResourceDefinition<B>,
    pinned: Option<&str>,
) -> Vec<String> {
    if let Some(region) = pinned.filter(|r| !r.is_empty()) {
        return vec![region.to_string()];
    }

    let base = if definition.regions.is_empty() {
        defaults
    } else {
        &definition.regions[..]
    };

    base.iter()
        .filter(|r| !definition.excluded_regions.contains(r))
        .cloned()
        .collect()
}

/// Plan every unit of one account.
///
/// Global definitions yield one unit in the first loop region; regional ones
/// yield one unit per loop region. Definitions the account is not configured
/// for are skipped.
pub fn plan_units<B: ClientBundle>(platform: &PlatformConfig<B>, account: &CloudAccount) -> Vec<CollectionUnit> {
    let mut units = Vec::new();

    for (index, definition) in platform.resources.iter().enumerate() {
        if !account.accepts(&definition.resource_type) {
            warn!(
                "Account {} is not configured for {}, skipping",
                account.account_id, definition.resource_type
            );
            continue;
        }

        let regions = loop_regions(
            &platform.default_regions,
            definition,
            account.pinned_region.as_deref(),
        );
        if regions.is_empty() {
            warn!(
                "No regions left for {} in account {}",
                definition.resource_type, account.account_id
            );
            continue;
        }

        let selected = match definition.dimension {
            Dimension::Global => &regions[..1],
            Dimension::Regional => &regions[..],
        };
        units.extend(selected.iter().map(|region| CollectionUnit {
            account_id: account.account_id.clone(),
            region: region.clone(),
            definition: index,
        }));
    }

    units
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Credentials;
    use crate::test_utils::{noop_definition, StubBundle};

    fn platform(defs: Vec<ResourceDefinition<StubBundle>>, regions: &[&str]) -> PlatformConfig<StubBundle> {
        PlatformConfig::new(
            "stub",
            defs,
            StubBundle::default(),
            regions.iter().map(|r| r.to_string()).collect(),
            Vec::new(),
        )
        .unwrap()
    }

    fn account(id: &str) -> CloudAccount {
        CloudAccount::new(id, "stub", Credentials::Ambient)
    }

    #[test]
    fn test_global_collapses_to_one_unit() {
        let p = platform(vec![noop_definition("IAM").global()], &["r1", "r2", "r3", "r4", "r5"]);
        let units = plan_units(&p, &account("a"));
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].region, "r1");
    }

    #[test]
    fn test_regional_explodes_per_region() {
        let p = platform(vec![noop_definition("VM")], &["r1", "r2", "r3", "r4"]);
        let units = plan_units(&p, &account("a"));
        let regions: Vec<_> = units.iter().map(|u| u.region.as_str()).collect();
        assert_eq!(regions, vec!["r1", "r2", "r3", "r4"]);
    }

    #[test]
    fn test_override_and_exclusion() {
        let p = platform(
            vec![
                noop_definition("Bucket").regions(&["x1", "x2"]),
                noop_definition("VM").excluded_regions(&["r2"]),
                noop_definition("Gone").regions(&["r1"]).excluded_regions(&["r1"]),
            ],
            &["r1", "r2", "r3"],
        );
        let units = plan_units(&p, &account("a"));
        let pairs: Vec<_> = units.iter().map(|u| (u.definition, u.region.as_str())).collect();
        assert_eq!(pairs, vec![(0, "x1"), (0, "x2"), (1, "r1"), (1, "r3")]);
    }

    #[test]
    fn test_pinned_region_and_type_filter() {
        let p = platform(vec![noop_definition("VM"), noop_definition("Bucket")], &["r1", "r2"]);
        let mut acct = account("private");
        acct.pinned_region = Some("onprem-1".to_string());
        acct.resource_types = vec!["VM".to_string()];

        let units = plan_units(&p, &acct);
        assert_eq!(
            units,
            vec![CollectionUnit {
                account_id: "private".to_string(),
                region: "onprem-1".to_string(),
                definition: 0,
            }]
        );
    }
}
