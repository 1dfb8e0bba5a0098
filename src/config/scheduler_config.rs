use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_CANCEL_GRACE_MS, DEFAULT_CONDUIT_CAPACITY, DEFAULT_ENRICHMENT_WORKERS,
    DEFAULT_MAX_BATCH_SIZE, DEFAULT_MAX_CONCURRENT_ACCOUNTS, DEFAULT_PAGE_SIZE,
    DEFAULT_PER_REGION_CONCURRENCY, DEFAULT_SUBMIT_RETRIES, DEFAULT_UNIT_TIMEOUT_SECS,
    MAX_CANCEL_GRACE_MS, MAX_DEFAULT_CONCURRENT_UNITS, MAX_UNIT_TIMEOUT_SECS, UNITS_PER_CPU,
};
use crate::error::CollectError;

/// Tunables of one scheduler instance.
///
/// Passed to the scheduler at construction and never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Deadline of a single collection unit in seconds.
    pub unit_timeout_secs: u64,
    /// Global ceiling on concurrently running units.
    pub max_concurrent_units: usize,
    /// Accounts assessed and collected at the same time.
    pub max_concurrent_accounts: usize,
    /// Concurrently running units per region.
    pub per_region_concurrency: usize,
    /// Capacity of each unit's result conduit.
    pub conduit_capacity: usize,
    /// Maximum records per flushed batch.
    pub max_batch_size: usize,
    /// Size of the enrichment worker pool handed to collectors.
    pub enrichment_workers: usize,
    /// Time a cancelled collector gets to return before it is aborted.
    pub cancel_grace_ms: u64,
    /// Page size requested from list APIs.
    pub page_size: u32,
    /// Retries after a failed batch submission; zero submits once.
    pub submit_retries: usize,
    /// Skip accounts whose previous collection ended less than this many
    /// seconds ago. Zero always collects.
    pub min_collect_interval_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            unit_timeout_secs: DEFAULT_UNIT_TIMEOUT_SECS,
            max_concurrent_units: default_concurrency(),
            max_concurrent_accounts: DEFAULT_MAX_CONCURRENT_ACCOUNTS,
            per_region_concurrency: DEFAULT_PER_REGION_CONCURRENCY,
            conduit_capacity: DEFAULT_CONDUIT_CAPACITY,
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            enrichment_workers: DEFAULT_ENRICHMENT_WORKERS,
            cancel_grace_ms: DEFAULT_CANCEL_GRACE_MS,
            page_size: DEFAULT_PAGE_SIZE,
            submit_retries: DEFAULT_SUBMIT_RETRIES,
            min_collect_interval_secs: 0,
        }
    }
}

/// Concurrency ceiling derived from the host's CPU count.
pub fn default_concurrency() -> usize {
    (num_cpus::get() * UNITS_PER_CPU).clamp(1, MAX_DEFAULT_CONCURRENT_UNITS)
}

impl SchedulerConfig {
    pub fn unit_timeout(&self) -> Duration {
        Duration::from_secs(self.unit_timeout_secs)
    }

    pub fn cancel_grace(&self) -> Duration {
        Duration::from_millis(self.cancel_grace_ms)
    }

    /// Reject values that would stall or disable the scheduler, and
    /// durations too large to turn into a deadline.
    pub fn validate(&self) -> Result<(), CollectError> {
        let checks: [(&str, u64); 8] = [
            ("unit_timeout_secs", self.unit_timeout_secs),
            ("max_concurrent_units", self.max_concurrent_units as u64),
            ("max_concurrent_accounts", self.max_concurrent_accounts as u64),
            ("per_region_concurrency", self.per_region_concurrency as u64),
            ("conduit_capacity", self.conduit_capacity as u64),
            ("max_batch_size", self.max_batch_size as u64),
            ("enrichment_workers", self.enrichment_workers as u64),
            ("page_size", self.page_size as u64),
        ];
        if let Some((name, _)) = checks.iter().find(|(_, value)| *value == 0) {
            return Err(CollectError::Config(format!("{} must be greater than zero", name)));
        }

        let limits: [(&str, u64, u64); 2] = [
            ("unit_timeout_secs", self.unit_timeout_secs, MAX_UNIT_TIMEOUT_SECS),
            ("cancel_grace_ms", self.cancel_grace_ms, MAX_CANCEL_GRACE_MS),
        ];
        match limits.iter().find(|(_, value, max)| value > max) {
            Some((name, _, max)) => Err(CollectError::Config(format!("{} must not exceed {}", name, max))),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SchedulerConfig::default();
        assert_eq!(config.unit_timeout(), Duration::from_secs(30));
        assert_eq!(config.max_batch_size, 50);
        assert_eq!(config.enrichment_workers, 10);
        assert_eq!(config.max_concurrent_accounts, 4);
        assert!(config.max_concurrent_units >= 1);
        assert!(config.max_concurrent_units <= MAX_DEFAULT_CONCURRENT_UNITS);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero() {
        let config = SchedulerConfig {
            max_batch_size: 0,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("max_batch_size"));

        let config = SchedulerConfig {
            unit_timeout_secs: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = SchedulerConfig {
            max_concurrent_accounts: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = SchedulerConfig {
            submit_retries: 0,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_unbounded_durations() {
        let config = SchedulerConfig {
            unit_timeout_secs: u64::MAX,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("unit_timeout_secs must not exceed"));

        let config = SchedulerConfig {
            cancel_grace_ms: MAX_CANCEL_GRACE_MS + 1,
            ..Default::default()
        };
        assert!(config.validate().unwrap_err().to_string().contains("cancel_grace_ms"));

        let config = SchedulerConfig {
            unit_timeout_secs: MAX_UNIT_TIMEOUT_SECS,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let config: SchedulerConfig =
            serde_yaml::from_str("unit_timeout_secs: 5\nmax_batch_size: 10\n").unwrap();
        assert_eq!(config.unit_timeout_secs, 5);
        assert_eq!(config.max_batch_size, 10);
        assert_eq!(config.conduit_capacity, DEFAULT_CONDUIT_CAPACITY);
        assert_eq!(config.cancel_grace(), Duration::from_millis(DEFAULT_CANCEL_GRACE_MS));
    }
}
