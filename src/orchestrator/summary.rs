use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::models::{AccountStatus, CollectRecordInfo, UnitOutcome, UnitState};

/// Bookkeeping outcome of one account.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct AccountReport {
    pub record: CollectRecordInfo,
    pub status: AccountStatus,
    pub units: usize,
}

/// Number of units per terminal state.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StateCounts {
    pub succeeded: usize,
    pub failed: usize,
    pub timed_out: usize,
    pub cancelled: usize,
}

impl StateCounts {
    pub fn total(&self) -> usize {
        self.succeeded + self.failed + self.timed_out + self.cancelled
    }
}

/// Result of one scheduler run: one outcome per unit plus one report per
/// account.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RunSummary {
    pub run_id: String,
    pub platform: String,
    pub hostname: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub units: Vec<UnitOutcome>,
    pub accounts: Vec<AccountReport>,
}

impl RunSummary {
    pub fn counts(&self) -> StateCounts {
        let mut counts = StateCounts::default();
        for unit in &self.units {
            match unit.state {
                UnitState::Succeeded => counts.succeeded += 1,
                UnitState::Failed => counts.failed += 1,
                UnitState::TimedOut => counts.timed_out += 1,
                UnitState::Cancelled => counts.cancelled += 1,
                UnitState::Pending | UnitState::Running => {}
            }
        }
        counts
    }

    pub fn records_delivered(&self) -> u64 {
        self.units.iter().map(|u| u.records_delivered).sum()
    }

    /// Bookkeeping records of the accounts that were collected.
    pub fn collected_records(&self) -> impl Iterator<Item = &CollectRecordInfo> + '_ {
        self.accounts
            .iter()
            .filter(|a| a.status == AccountStatus::Collected)
            .map(|a| &a.record)
    }

    /// Outcomes of one resource type, in planning order.
    pub fn units_of<'a>(&'a self, resource_type: &'a str) -> impl Iterator<Item = &'a UnitOutcome> + 'a {
        self.units.iter().filter(move |u| u.labels.resource_type == resource_type)
    }

    /// Create a JSON summary of the run.
    ///
    /// # Example Output
    ///
    /// ```json
    /// {
    ///   "run_id": "550e8400-e29b-41d4-a716-446655440000",
    ///   "platform": "aws",
    ///   "collector_version": "0.3.0",
    ///   "counts": { "succeeded": 40, "failed": 1, "timed_out": 0, "cancelled": 0 },
    ///   "units": [...],
    ///   "accounts": [...]
    /// }
    /// ```
    pub fn to_json_pretty(&self) -> Result<String> {
        let summary = json!({
            "run_id": self.run_id,
            "platform": self.platform,
            "hostname": self.hostname,
            "started_at": self.started_at,
            "finished_at": self.finished_at,
            "duration_ms": (self.finished_at - self.started_at).num_milliseconds(),
            "collector_version": env!("CARGO_PKG_VERSION"),
            "counts": self.counts(),
            "records_delivered": self.records_delivered(),
            "units": self.units,
            "accounts": self.accounts,
        });
        serde_json::to_string_pretty(&summary).context("Failed to serialize run summary to JSON")
    }

    pub async fn write_to(&self, path: &Path) -> Result<()> {
        let body = self.to_json_pretty()?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .context(format!("Failed to create directory {}", parent.display()))?;
        }
        tokio::fs::write(path, body)
            .await
            .context(format!("Failed to write summary to {}", path.display()))?;
        info!("Run summary written to {}", path.display());
        Ok(())
    }

    /// Log totals, then every unit that did not succeed.
    pub fn log_report(&self) {
        let counts = self.counts();
        info!(
            "Run {} finished: {} units ({} succeeded, {} failed, {} timed out, {} cancelled), {} records",
            self.run_id,
            counts.total(),
            counts.succeeded,
            counts.failed,
            counts.timed_out,
            counts.cancelled,
            self.records_delivered()
        );

        for account in self.accounts.iter().filter(|a| a.status == AccountStatus::Skipped) {
            warn!(
                "Account {} skipped: {}",
                account.record.account_id,
                account.record.message.as_deref().unwrap_or("collection disabled")
            );
        }

        let problems: Vec<_> = self
            .units
            .iter()
            .filter(|u| u.state != UnitState::Succeeded)
            .collect();
        if problems.is_empty() {
            return;
        }

        warn!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
        warn!("{} unit(s) did not complete successfully:", problems.len());
        for unit in problems {
            warn!(
                "  • {} {}{}",
                unit.labels,
                unit.state,
                unit.error.as_deref().map(|e| format!(": {}", e)).unwrap_or_default()
            );
        }
        warn!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::UnitLabels;
    use serde_json::Value;

    fn unit(state: UnitState, delivered: u64) -> UnitOutcome {
        UnitOutcome {
            labels: UnitLabels::new("a", "r1", "VM"),
            state,
            records_emitted: delivered,
            records_delivered: delivered,
            batches_flushed: 1,
            duration_ms: 5,
            error: None,
        }
    }

    fn summary() -> RunSummary {
        RunSummary {
            run_id: "run-1".to_string(),
            platform: "simulated".to_string(),
            hostname: "host".to_string(),
            started_at: Utc::now(),
            finished_at: Utc::now(),
            units: vec![
                unit(UnitState::Succeeded, 10),
                unit(UnitState::Succeeded, 5),
                unit(UnitState::TimedOut, 2),
                unit(UnitState::Failed, 0),
            ],
            accounts: vec![AccountReport {
                record: CollectRecordInfo::enabled("a", "simulated"),
                status: AccountStatus::Collected,
                units: 4,
            }],
        }
    }

    #[test]
    fn test_counts() {
        let s = summary();
        assert_eq!(
            s.counts(),
            StateCounts {
                succeeded: 2,
                failed: 1,
                timed_out: 1,
                cancelled: 0
            }
        );
        assert_eq!(s.records_delivered(), 17);
        assert_eq!(s.units_of("VM").count(), 4);
    }

    #[test]
    fn test_json_summary() {
        let json: Value = serde_json::from_str(&summary().to_json_pretty().unwrap()).unwrap();
        assert_eq!(json["run_id"], "run-1");
        assert_eq!(json["counts"]["timed_out"], 1);
        assert_eq!(json["units"].as_array().unwrap().len(), 4);
        assert_eq!(json["units"][2]["state"], "timed_out");
        assert_eq!(json["accounts"][0]["status"], "collected");
    }

    #[tokio::test]
    async fn test_write_to_creates_parent() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("reports").join("summary.json");
        summary().write_to(&path).await.unwrap();
        assert!(path.exists());
    }
}
