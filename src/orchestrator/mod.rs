//! Orchestration core: planning, scheduling, conduit and supervision.
//!
//! ```text
//! Scheduler ──► trigger per account ──► plan units
//!     │
//!     └─► per unit (bounded): bundle init ──► collector ──► conduit ──► batches ──► sink
//!                             └───────── deadline / cancellation / panic ─────────┘
//! ```

pub mod conduit;
pub mod context;
mod scheduler;
mod summary;
mod supervisor;
pub mod units;

pub use conduit::{conduit, BatchAccumulator, BatchMeta, DrainStats, RecordSink, RecordStream, ResourceRecord, ResultBatch};
pub use context::{CancelCause, CancelHandle, CollectContext, UnitLabels};
pub use scheduler::Scheduler;
pub use summary::{AccountReport, RunSummary, StateCounts};
pub use units::{loop_regions, plan_units, CollectionUnit};
