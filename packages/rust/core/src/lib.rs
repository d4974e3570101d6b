//! Core pipeline orchestration and domain logic for asinscout.
//!
//! This crate ties together discovery, snapshot enrichment, and relevance
//! filtering into the end-to-end `scout` workflow.

pub mod enrichment;
pub mod pipeline;
pub mod relevance;
