//! Data Transfer Objects of the orchestrator HTTP API
//!
//! Request and response bodies shared by the orchestrator, the client crate
//! and the CLI.

pub mod job;
pub mod report;
