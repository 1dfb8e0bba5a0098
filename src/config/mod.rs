// Re-export all items from the submodules
mod accounts;
mod collector_config;
mod env_vars;
mod scheduler_config;

// Re-export account types
pub use accounts::{CloudAccount, Credentials};

// Re-export configuration files
pub use collector_config::{load_or_default_config, CollectorConfig};
pub use scheduler_config::{default_concurrency, SchedulerConfig};

// Re-export environment variable functions
pub use env_vars::{expand_env_vars, first_env};
