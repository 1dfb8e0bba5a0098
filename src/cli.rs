use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::constants::{DEFAULT_CONFIG_NAME, DEFAULT_SUMMARY_NAME};

/// Command-line arguments for the cloud-collector tool.
///
/// Options given here override the matching values of the configuration file.
#[derive(Parser, Debug)]
#[clap(name = "cloud-collector", about = "Multi-account cloud resource inventory collector")]
pub struct Args {
    /// Path to configuration YAML file
    #[clap(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// Platform to collect from (aws, simulated)
    #[clap(short, long)]
    pub platform: Option<String>,

    /// Override the platform's default regions (comma-separated)
    #[clap(short, long)]
    pub regions: Option<String>,

    /// Restrict collection to these resource types (comma-separated)
    #[clap(short = 't', long)]
    pub resource_types: Option<String>,

    /// Directory for JSON-lines output; records are only logged when omitted
    #[clap(short, long)]
    pub output: Option<PathBuf>,

    /// Where to write the run summary (default: <output>/collection_summary.json)
    #[clap(long)]
    pub summary: Option<PathBuf>,

    /// Per-unit timeout in seconds
    #[clap(long)]
    pub timeout: Option<u64>,

    /// Maximum number of units running at once
    #[clap(long)]
    pub concurrency: Option<usize>,

    /// Repeat the collection every this many seconds until interrupted
    #[clap(long, value_parser = clap::value_parser!(u64).range(1..))]
    pub interval: Option<u64>,

    /// Verbose logging
    #[clap(short, long)]
    pub verbose: bool,

    /// Also write the log to this file
    #[clap(long)]
    pub log_file: Option<PathBuf>,

    /// Subcommands
    #[clap(subcommand)]
    pub command: Option<Commands>,
}

impl Args {
    pub fn region_list(&self) -> Option<Vec<String>> {
        self.regions.as_deref().map(split_list)
    }

    pub fn resource_type_list(&self) -> Option<Vec<String>> {
        self.resource_types.as_deref().map(split_list)
    }

    /// Summary location: explicit path, else inside the output directory,
    /// else the working directory.
    pub fn summary_path(&self) -> PathBuf {
        match (&self.summary, &self.output) {
            (Some(path), _) => path.clone(),
            (None, Some(dir)) => dir.join(DEFAULT_SUMMARY_NAME),
            (None, None) => PathBuf::from(DEFAULT_SUMMARY_NAME),
        }
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// Available subcommands for the collector.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create a default configuration file
    InitConfig {
        /// Path to output configuration file
        #[clap(default_value = DEFAULT_CONFIG_NAME)]
        path: PathBuf,
    },

    /// List the resource types a platform registers
    ListResources,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_args_parsing() {
        let args = Args::parse_from([
            "cloud-collector",
            "--platform", "aws",
            "--output", "/tmp/inventory",
            "--verbose",
        ]);

        assert_eq!(args.platform.as_deref(), Some("aws"));
        assert_eq!(args.output, Some(PathBuf::from("/tmp/inventory")));
        assert!(args.verbose);
        assert!(args.command.is_none());
        assert_eq!(args.summary_path(), PathBuf::from("/tmp/inventory/collection_summary.json"));
    }

    #[test]
    fn test_list_options() {
        let args = Args::parse_from([
            "cloud-collector",
            "--regions", "us-east-1, eu-west-1,,",
            "-t", "S3 Bucket,IAM User",
            "--timeout", "120",
            "--concurrency", "8",
        ]);

        assert_eq!(
            args.region_list(),
            Some(vec!["us-east-1".to_string(), "eu-west-1".to_string()])
        );
        assert_eq!(
            args.resource_type_list(),
            Some(vec!["S3 Bucket".to_string(), "IAM User".to_string()])
        );
        assert_eq!(args.timeout, Some(120));
        assert_eq!(args.concurrency, Some(8));
        assert!(args.interval.is_none());
        assert_eq!(args.summary_path(), PathBuf::from(DEFAULT_SUMMARY_NAME));
    }

    #[test]
    fn test_subcommands() {
        let args = Args::parse_from(["cloud-collector", "init-config"]);
        match args.command {
            Some(Commands::InitConfig { path }) => assert_eq!(path, PathBuf::from(DEFAULT_CONFIG_NAME)),
            other => panic!("unexpected command {:?}", other),
        }

        let args = Args::parse_from(["cloud-collector", "init-config", "/etc/collector.yaml"]);
        assert!(matches!(args.command, Some(Commands::InitConfig { path }) if path == PathBuf::from("/etc/collector.yaml")));

        let args = Args::parse_from(["cloud-collector", "--platform", "simulated", "list-resources"]);
        assert!(matches!(args.command, Some(Commands::ListResources)));
    }

    #[test]
    fn test_interval_must_be_positive() {
        let args = Args::parse_from(["cloud-collector", "--interval", "3600"]);
        assert_eq!(args.interval, Some(3600));
        assert!(Args::try_parse_from(["cloud-collector", "--interval", "0"]).is_err());
    }

    #[test]
    fn test_summary_override() {
        let args = Args::parse_from([
            "cloud-collector",
            "--output", "/tmp/out",
            "--summary", "/tmp/summary.json",
        ]);
        assert_eq!(args.summary_path(), PathBuf::from("/tmp/summary.json"));
    }
}
