// ABOUTME: Library root for strata - exposes the orchestration engine for the binary and tests.
// ABOUTME: The main binary is in main.rs.

pub mod catalog;
pub mod config;
pub mod context;
pub mod detect;
pub mod diagnostics;
pub mod error;
pub mod events;
pub mod executor;
pub mod orchestrator;
pub mod output;
pub mod plan;
pub mod provider;
pub mod report;
pub mod types;
pub mod validate;
