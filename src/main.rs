use std::fs::File;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use log::{error, info, warn, LevelFilter};
use simplelog::{ColorChoice, CombinedLogger, Config, SharedLogger, TermLogger, TerminalMode, WriteLogger};
use tokio::runtime::Runtime;
use tokio::time::MissedTickBehavior;

use cloud_collector::cli::{Args, Commands};
use cloud_collector::config::{load_or_default_config, CollectorConfig};
use cloud_collector::constants::{PLATFORM_AWS, PLATFORM_SIMULATED};
use cloud_collector::orchestrator::Scheduler;
use cloud_collector::platform::{ClientBundle, PlatformConfig};
use cloud_collector::providers::{aws, simulated};
use cloud_collector::sink::{JsonLinesSink, LogSink, ResultSink};

fn main() -> Result<()> {
    let args = Args::parse();

    initialize_logging(&args)?;

    let mut config = load_or_default_config(args.config.as_deref())?;
    apply_overrides(&mut config, &args)?;

    if let Some(cmd) = &args.command {
        return handle_subcommand(cmd, &config);
    }

    info!("Starting {} collection", config.platform);

    let runtime = Runtime::new().context("Failed to create Tokio runtime")?;
    runtime.block_on(async {
        match config.platform.as_str() {
            PLATFORM_AWS => collect(aws::platform()?, &config, &args).await,
            PLATFORM_SIMULATED => collect(simulated::platform()?, &config, &args).await,
            other => Err(anyhow!("Unknown platform: {}", other)),
        }
    })
}

/// Initialize terminal logging and, when requested, a log file
fn initialize_logging(args: &Args) -> Result<()> {
    let log_level = if args.verbose { LevelFilter::Debug } else { LevelFilter::Info };

    let mut loggers: Vec<Box<dyn SharedLogger>> = Vec::new();
    loggers.push(TermLogger::new(
        log_level,
        Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    ));
    if let Some(path) = &args.log_file {
        let file = File::create(path).context(format!("Failed to create log file {}", path.display()))?;
        loggers.push(WriteLogger::new(log_level, Config::default(), file));
    }

    CombinedLogger::init(loggers).context("Failed to initialize logger")?;
    Ok(())
}

/// Fold command-line options into the loaded configuration
fn apply_overrides(config: &mut CollectorConfig, args: &Args) -> Result<()> {
    if let Some(platform) = &args.platform {
        config.platform = platform.to_lowercase();
    }
    if let Some(regions) = args.region_list() {
        config.regions = regions;
    }
    if let Some(types) = args.resource_type_list() {
        config.resource_types = types;
    }
    if let Some(timeout) = args.timeout {
        config.scheduler.unit_timeout_secs = timeout;
    }
    if let Some(concurrency) = args.concurrency {
        config.scheduler.max_concurrent_units = concurrency;
    }
    config.scheduler.validate().context("Invalid scheduler options")?;
    Ok(())
}

/// Handle subcommands (init-config and list-resources)
fn handle_subcommand(cmd: &Commands, config: &CollectorConfig) -> Result<()> {
    match cmd {
        Commands::InitConfig { path } => {
            info!("Creating default configuration file at {}", path.display());
            CollectorConfig::create_default_config_file(path)?;
            info!("Configuration created successfully");
            Ok(())
        }
        Commands::ListResources => match config.platform.as_str() {
            PLATFORM_AWS => {
                list_resources(&aws::platform()?);
                Ok(())
            }
            PLATFORM_SIMULATED => {
                list_resources(&simulated::platform()?);
                Ok(())
            }
            other => Err(anyhow!("Unknown platform: {}", other)),
        },
    }
}

fn list_resources<B: ClientBundle>(platform: &PlatformConfig<B>) {
    println!("Platform {} ({} resource types)", platform.name, platform.resources.len());
    for def in &platform.resources {
        let regions = if def.regions.is_empty() {
            "default regions".to_string()
        } else {
            def.regions.join(",")
        };
        println!(
            "  {:<20} {:<10} {:<8} {}",
            def.resource_type, def.group, def.dimension, regions
        );
    }
}

/// Narrow the platform to the configured regions and types, run every
/// account and write the summary.
async fn collect<B: ClientBundle>(platform: PlatformConfig<B>, config: &CollectorConfig, args: &Args) -> Result<()> {
    let mut platform = platform;
    if !config.regions.is_empty() {
        platform = platform.with_regions(config.regions.clone())?;
    }
    if !config.resource_types.is_empty() {
        platform = platform.retain_resources(&config.resource_types)?;
    }

    let sink: Arc<dyn ResultSink> = match &args.output {
        Some(dir) => Arc::new(JsonLinesSink::create(dir).await?),
        None => Arc::new(LogSink::new(args.verbose)),
    };

    let mut accounts: Vec<_> = config
        .accounts
        .iter()
        .filter(|account| {
            let matches = account.platform == platform.name;
            if !matches {
                warn!(
                    "Skipping account {} configured for platform {}",
                    account.account_id, account.platform
                );
            }
            matches
        })
        .cloned()
        .collect();

    if accounts.is_empty() {
        accounts = platform.default_accounts.clone();
    }
    if let Some(dir) = &args.output {
        let previous = JsonLinesSink::last_collects(dir).await?;
        for account in accounts.iter_mut() {
            if let Some(record) = previous.get(&account.account_id) {
                account.remember(record);
            }
        }
    }

    let scheduler = Scheduler::new(platform, config.scheduler.clone(), sink)?;

    let shutdown = scheduler.shutdown_token();
    let ctrl_c = tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                warn!("Interrupt received, cancelling all units");
                shutdown.cancel();
            }
            Err(e) => error!("Failed to listen for interrupt: {}", e),
        }
    });

    let mut ticker = args.interval.map(|secs| {
        let mut ticker = tokio::time::interval(Duration::from_secs(secs));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        ticker
    });
    let shutdown = scheduler.shutdown_token();

    loop {
        if let Some(ticker) = ticker.as_mut() {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }
        }

        let summary = scheduler.run(accounts.clone()).await;
        summary.log_report();
        summary.write_to(&args.summary_path()).await?;

        for record in summary.collected_records() {
            for account in accounts.iter_mut() {
                account.remember(record);
            }
        }
        if ticker.is_none() || shutdown.is_cancelled() {
            break;
        }
        info!("Next collection in at most {}s", args.interval.unwrap_or_default());
    }
    ctrl_c.abort();

    info!("Collection completed");
    Ok(())
}
