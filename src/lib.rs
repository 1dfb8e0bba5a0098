//! # cloud_collector
//!
//! A multi-account, multi-region cloud resource inventory collector written in
//! Rust, built for security posture assessment.
//!
//! ## Overview
//!
//! Every resource type is gathered by a small provider-specific *collector*
//! that lists resources page by page and enriches each item with secondary
//! detail calls. This crate provides the orchestration framework those
//! collectors plug into: the scheduler that fans work out across
//! (account × region × resource type) units, the bounded result conduit
//! between a collector and the scheduler, deadline and cancellation
//! discipline, and per-unit failure isolation.
//!
//! ## Features
//!
//! - **Bounded fan-out**: a global ceiling plus a per-region limiter on running units
//! - **Backpressure**: collectors push into a bounded conduit drained in capped batches
//! - **Deadlines**: every unit owns a cancellable deadline; hung collectors are stopped
//! - **Isolation**: errors and panics become attributed per-unit outcomes
//! - **Bookkeeping**: a per-account trigger decides whether to collect at all
//! - **Providers**: AWS (rusoto) and a deterministic simulated provider
//!
//! ## Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use cloud_collector::config::SchedulerConfig;
//! use cloud_collector::orchestrator::Scheduler;
//! use cloud_collector::providers::simulated;
//! use cloud_collector::sink::MemorySink;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let sink = Arc::new(MemorySink::new());
//! let scheduler = Scheduler::new(
//!     simulated::platform()?,
//!     SchedulerConfig::default(),
//!     sink.clone(),
//! )?;
//!
//! let summary = scheduler.run(Vec::new()).await;
//! println!("{} units, {} records", summary.units.len(), sink.record_count().await);
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Organization
//!
//! - [`cli`]: Command-line interface definitions and argument parsing
//! - [`models`]: Bookkeeping records and per-unit outcomes
//! - [`platform`]: Platform configuration, resource definitions, client bundles
//! - [`collectors`]: Collector contract plus pagination, enrichment and retry helpers
//! - [`orchestrator`]: Unit planning, scheduling, conduit and supervision
//! - [`sink`]: Downstream result sinks and field extraction
//! - [`providers`]: Concrete provider bundles and collectors
//! - [`config`]: Configuration files, accounts and environment variables
//! - [`constants`]: Application-wide defaults

/// Command-line interface definitions and argument parsing
pub mod cli;

/// Bookkeeping records and per-unit outcome models
pub mod models;

/// Typed orchestration errors
pub mod error;

/// Platform configuration, resource definitions and client bundles
pub mod platform;

/// Collector contract and the pagination/enrichment toolkit
pub mod collectors;

/// Unit planning, scheduling, result conduit and supervision
pub mod orchestrator;

/// Downstream result sinks
pub mod sink;

/// Provider implementations (AWS, simulated)
pub mod providers;

/// Configuration management, accounts and environment variables
pub mod config;

/// Application constants and default values
pub mod constants;

#[doc(hidden)]
pub use log as __log;

/// Test utilities and helpers
#[cfg(test)]
pub mod test_utils;
