//! Advisor - portfolio rebalancing advice for Brazilian retail investors
//!
//! The library runs a five-stage pipeline over a client's documents:
//! extraction, monthly return calculation, rule-based rebalancing, letter
//! drafting and compliance checking. [`run_advisory`] is the programmatic
//! entry point; the `advisor` binary wraps it in a CLI.

pub mod cli;
pub mod collaborators;
pub mod compliance;
pub mod config;
pub mod error;
pub mod export;
pub mod market_data;
pub mod models;
pub mod pipeline;
pub mod strategy;
pub mod utils;

pub use collaborators::{Collaborators, DocumentExtractor, LetterDrafter};
pub use config::AdvisorConfig;
pub use error::{AdvisorError, Result};
pub use pipeline::{run_advisory, AdvisoryInputs, AgentState, PipelineFailure, Stage};
