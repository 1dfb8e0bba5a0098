//! Global constants for the cloud collector.
//!
//! Defaults for every tunable live here; the values actually used at runtime
//! come from [`crate::config::SchedulerConfig`].

// Scheduling defaults
/// Default per-unit deadline in seconds
pub const DEFAULT_UNIT_TIMEOUT_SECS: u64 = 30;

/// Longest accepted per-unit deadline (24h)
pub const MAX_UNIT_TIMEOUT_SECS: u64 = 24 * 60 * 60;

/// Longest accepted cancellation grace period (10min)
pub const MAX_CANCEL_GRACE_MS: u64 = 10 * 60 * 1000;

/// Default number of accounts collected at the same time
pub const DEFAULT_MAX_CONCURRENT_ACCOUNTS: usize = 4;

/// Upper bound on the default global concurrency ceiling
pub const MAX_DEFAULT_CONCURRENT_UNITS: usize = 64;

/// Running units allowed per CPU when no ceiling is configured
pub const UNITS_PER_CPU: usize = 4;

/// Default number of concurrently running units per region
pub const DEFAULT_PER_REGION_CONCURRENCY: usize = 10;

/// Grace period between a unit's cancellation and a forced abort (2s)
pub const DEFAULT_CANCEL_GRACE_MS: u64 = 2000;

// Conduit and batching defaults
/// Capacity of the bounded conduit between a collector and the scheduler
pub const DEFAULT_CONDUIT_CAPACITY: usize = 50;

/// Maximum number of records in one flushed batch
pub const DEFAULT_MAX_BATCH_SIZE: usize = 50;

/// Retries after a failed batch submission
pub const DEFAULT_SUBMIT_RETRIES: usize = 3;

/// Linear back-off step between batch submission attempts
pub const SUBMIT_RETRY_STEP_MS: u64 = 1000;

// Collector defaults
/// Default page size requested from list APIs
pub const DEFAULT_PAGE_SIZE: u32 = 50;

/// Default enrichment worker pool size
pub const DEFAULT_ENRICHMENT_WORKERS: usize = 10;

/// Attempts for an endpoint-correcting call (one original, one corrected)
pub const CORRECTIVE_RETRY_ATTEMPTS: usize = 2;

/// Timeout for trigger handshakes such as credential validation (10s)
pub const TRIGGER_TIMEOUT_SECS: u64 = 10;

// Platform identifiers
pub const PLATFORM_AWS: &str = "aws";
pub const PLATFORM_SIMULATED: &str = "simulated";

/// Region used for global AWS services
pub const AWS_GLOBAL_REGION: &str = "us-east-1";

// Error codes carried in log lines
pub const CODE_COLLECTOR_ERROR: &str = "CollectorError";
pub const CODE_SDK_ERROR: &str = "SDKError";
pub const CODE_UNKNOWN_ERROR: &str = "UnknownError";

// Output file names
pub const DEFAULT_SUMMARY_NAME: &str = "collection_summary.json";
pub const COLLECT_RECORDS_FILE: &str = "collect_records.jsonl";
pub const DEFAULT_CONFIG_NAME: &str = "collector.yaml";

// Environment variables for credentials
pub const ENV_ACCOUNT_ID: &str = "CLOUD_ACCOUNT_ID";
pub const ENV_ACCESS_KEY_ID: &str = "CLOUD_ACCESS_KEY_ID";
pub const ENV_SECRET_ACCESS_KEY: &str = "CLOUD_SECRET_ACCESS_KEY";
pub const ENV_CREDENTIALS_JSON: &str = "CLOUD_CREDENTIALS_JSON";
pub const ENV_AWS_ACCESS_KEY_ID: &str = "AWS_ACCESS_KEY_ID";
pub const ENV_AWS_SECRET_ACCESS_KEY: &str = "AWS_SECRET_ACCESS_KEY";
