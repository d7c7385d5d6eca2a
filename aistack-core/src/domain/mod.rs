//! Core domain types
//!
//! These types are persisted by the orchestrator and returned verbatim by its
//! HTTP API, so the client and CLI share them as well.

pub mod batch;
pub mod cost;
pub mod job;
pub mod report;
