//! External collaborators of the pipeline
//!
//! Ingestion turns the raw documents into structured data and drafting turns a
//! plan into a letter. The pipeline only knows the two traits below; the
//! heuristic/template pair works offline and deterministically, the OpenAI
//! pair talks to a chat-completions endpoint.

pub mod heuristic;
pub mod openai;
pub mod template;

use chrono::NaiveDate;
use serde::Serialize;
use std::sync::Arc;

use crate::config::AdvisorConfig;
use crate::error::Result;
use crate::models::{MacroView, Portfolio, RiskProfile};
use crate::strategy::RebalancingPlan;

pub use heuristic::HeuristicExtractor;
pub use openai::{OpenAiClient, OpenAiDrafter, OpenAiExtractor};
pub use template::TemplateDrafter;

/// The three client documents, as text
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawDocuments {
    pub portfolio: String,
    pub risk_profile: String,
    pub macro_analysis: String,
}

/// Structured data recovered from [`RawDocuments`]
#[derive(Debug, Clone, PartialEq)]
pub struct Extraction {
    pub portfolio: Portfolio,
    pub risk_profile: RiskProfile,
    pub macro_view: MacroView,
}

/// Everything a drafter may use to write the letter
#[derive(Debug, Clone, Serialize)]
pub struct DraftContext {
    pub portfolio: Portfolio,
    pub risk_profile: RiskProfile,
    pub macro_view: MacroView,
    pub plan: RebalancingPlan,
    pub date: NaiveDate,
}

/// Turns raw documents into structured data
pub trait DocumentExtractor: Send + Sync {
    fn name(&self) -> &str;

    fn extract(&self, documents: &RawDocuments) -> Result<Extraction>;
}

/// Writes the client letter for a plan
pub trait LetterDrafter: Send + Sync {
    fn name(&self) -> &str;

    fn draft(&self, context: &DraftContext) -> Result<String>;
}

/// The pair of collaborators used by a run
#[derive(Clone)]
pub struct Collaborators {
    pub extractor: Arc<dyn DocumentExtractor>,
    pub drafter: Arc<dyn LetterDrafter>,
}

impl Collaborators {
    pub fn new(extractor: Arc<dyn DocumentExtractor>, drafter: Arc<dyn LetterDrafter>) -> Self {
        Self { extractor, drafter }
    }

    /// Heuristic extraction and template drafting, no network
    pub fn offline(config: &AdvisorConfig) -> Self {
        Self::new(
            Arc::new(HeuristicExtractor::new(config.risk.clone())),
            Arc::new(TemplateDrafter::new()),
        )
    }

    /// Both collaborators backed by the configured chat-completions endpoint
    pub fn openai(config: &AdvisorConfig) -> Result<Self> {
        let client = Arc::new(OpenAiClient::new(&config.llm)?);
        Ok(Self::new(
            Arc::new(OpenAiExtractor::new(client.clone(), config.risk.clone())),
            Arc::new(OpenAiDrafter::new(client)),
        ))
    }
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators")
            .field("extractor", &self.extractor.name())
            .field("drafter", &self.drafter.name())
            .finish()
    }
}
