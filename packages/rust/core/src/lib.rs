//! Core pipeline orchestration and ranking logic for leadscout.
//!
//! This crate ties the sources together into the end-to-end `generate`
//! workflow: fan-out discovery, dedup, enrichment, scoring, filtering,
//! and export to the lead archive.

pub mod export;
pub mod filter;
pub mod pipeline;
pub mod scoring;

pub use pipeline::{
    ConnectorReport, GenerateResult, LeadPipeline, ProgressReporter, RunReport, SilentProgress,
};
