use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::config::accounts::{CloudAccount, Credentials};
use crate::config::scheduler_config::SchedulerConfig;
use crate::constants::PLATFORM_SIMULATED;

/// Contents of the collector configuration file.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CollectorConfig {
    /// Provider to collect from (`aws` or `simulated`).
    pub platform: String,
    /// Regions to sweep; empty keeps the platform defaults.
    #[serde(default)]
    pub regions: Vec<String>,
    /// Resource types to collect; empty collects every registered type.
    #[serde(default)]
    pub resource_types: Vec<String>,
    #[serde(default)]
    pub accounts: Vec<CloudAccount>,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            platform: PLATFORM_SIMULATED.to_string(),
            regions: Vec::new(),
            resource_types: Vec::new(),
            accounts: vec![CloudAccount::new(
                "000000000001",
                PLATFORM_SIMULATED,
                Credentials::Ambient,
            )],
            scheduler: SchedulerConfig::default(),
        }
    }
}

impl CollectorConfig {
    /// Load configuration from a YAML file and expand environment
    /// references in account credentials.
    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .context(format!("Failed to read config file: {}", path.display()))?;

        let mut config: CollectorConfig =
            serde_yaml::from_str(&content).context("Failed to parse YAML config")?;

        config.process_environment_variables();
        config
            .scheduler
            .validate()
            .context(format!("Invalid scheduler section in {}", path.display()))?;

        debug!(
            "Loaded configuration from {} ({} accounts)",
            path.display(),
            config.accounts.len()
        );
        Ok(config)
    }

    /// Save configuration to a YAML file
    pub fn save_to_yaml_file(&self, path: &Path) -> Result<()> {
        let yaml = serde_yaml::to_string(self).context("Failed to serialize config to YAML")?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .context(format!("Failed to create directory {}", parent.display()))?;
        }

        fs::write(path, yaml).context(format!("Failed to write config to {}", path.display()))?;

        info!("Saved configuration to {}", path.display());
        Ok(())
    }

    /// Write a default configuration file.
    pub fn create_default_config_file(path: &Path) -> Result<()> {
        CollectorConfig::default().save_to_yaml_file(path)
    }

    pub fn process_environment_variables(&mut self) {
        for account in &mut self.accounts {
            account.expand_environment();
            if account.platform.is_empty() {
                account.platform = self.platform.clone();
            }
        }
    }
}

/// Load a configuration file, or fall back to defaults plus an account read
/// from the environment when no file is given.
pub fn load_or_default_config(config_path: Option<&Path>) -> Result<CollectorConfig> {
    match config_path {
        Some(path) => CollectorConfig::from_yaml_file(path),
        None => {
            let mut config = CollectorConfig::default();
            if let Some(account) = CloudAccount::from_env(&config.platform) {
                info!("Using account {} from environment", account.account_id);
                config.accounts = vec![account];
            }
            Ok(config)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("collector.yaml");

        CollectorConfig::create_default_config_file(&path).unwrap();
        assert!(path.exists());

        let loaded = CollectorConfig::from_yaml_file(&path).unwrap();
        assert_eq!(loaded.platform, PLATFORM_SIMULATED);
        assert_eq!(loaded.accounts.len(), 1);
        assert_eq!(loaded.scheduler, SchedulerConfig::default());
    }

    #[test]
    fn test_account_inherits_platform() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("c.yaml");
        fs::write(
            &path,
            "platform: aws\nregions: [us-east-1, eu-west-1]\naccounts:\n  - account_id: \"1\"\n",
        )
        .unwrap();

        let config = CollectorConfig::from_yaml_file(&path).unwrap();
        assert_eq!(config.accounts[0].platform, "aws");
        assert_eq!(config.regions.len(), 2);
    }

    #[test]
    fn test_invalid_scheduler_section_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.yaml");
        fs::write(&path, "platform: simulated\nscheduler:\n  conduit_capacity: 0\n").unwrap();

        let err = CollectorConfig::from_yaml_file(&path).unwrap_err();
        assert!(format!("{:#}", err).contains("conduit_capacity"));
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        assert!(load_or_default_config(Some(&dir.path().join("missing.yaml"))).is_err());
    }
}
