use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::orchestrator::context::UnitLabels;

/// Per-account bookkeeping for one collection run.
///
/// Written once before any unit of the account is scheduled and finalized
/// after the last unit reaches a terminal state.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CollectRecordInfo {
    pub account_id: String,
    pub platform: String,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub enable_collection: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl CollectRecordInfo {
    /// A record that allows collection, stamped with the current time.
    pub fn enabled(account_id: &str, platform: &str) -> Self {
        Self {
            account_id: account_id.to_string(),
            platform: platform.to_string(),
            start_time: Some(Utc::now()),
            end_time: None,
            enable_collection: true,
            message: None,
            error_message: None,
        }
    }

    /// A record that skips collection for the given reason.
    pub fn skipped(account_id: &str, platform: &str, reason: impl Into<String>) -> Self {
        Self {
            enable_collection: false,
            message: Some(reason.into()),
            ..Self::enabled(account_id, platform)
        }
    }

    pub fn finish(&mut self) {
        self.end_time = Some(Utc::now());
    }
}

/// How an account's run ended, as persisted alongside its record.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AccountStatus {
    Collected,
    Skipped,
}

/// Lifecycle of a collection unit.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum UnitState {
    Pending,
    Running,
    Succeeded,
    Failed,
    TimedOut,
    Cancelled,
}

impl UnitState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, UnitState::Pending | UnitState::Running)
    }
}

impl fmt::Display for UnitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            UnitState::Pending => "pending",
            UnitState::Running => "running",
            UnitState::Succeeded => "succeeded",
            UnitState::Failed => "failed",
            UnitState::TimedOut => "timed_out",
            UnitState::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// Final, attributed result of one collection unit.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct UnitOutcome {
    pub labels: UnitLabels,
    pub state: UnitState,
    /// Records accepted by the conduit.
    pub records_emitted: u64,
    /// Records handed to the downstream sink.
    pub records_delivered: u64,
    pub batches_flushed: u64,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
