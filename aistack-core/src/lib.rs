//! AI-Stack Core
//!
//! Core types shared by the AI-Stack services.
//!
//! This crate contains:
//! - Domain types: jobs and their stage history, cost entries, reports
//! - DTOs: request and response bodies of the orchestrator HTTP API

pub mod domain;
pub mod dto;
