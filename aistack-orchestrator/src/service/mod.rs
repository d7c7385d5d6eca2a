//! Service Module
//!
//! Business logic layer for the orchestrator.
//! Services sit between the HTTP handlers, the stores and the stage
//! executors.

pub mod gate;
pub mod pipeline;
pub mod pricing;
pub mod report;
pub mod retry;
pub mod status;

pub use gate::{ConcurrencyGate, GatePermit};
pub use pipeline::{Accepted, Coordinator, StageSet, TriggerError};
pub use report::{ReportAggregator, ReportError};
pub use retry::{Attempted, Backoff, RetryPolicy};
