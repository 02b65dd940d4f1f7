//! The state record threaded through the pipeline
//!
//! Raw inputs are fixed at creation. Every derived field starts empty and is
//! written once, by the stage that owns it, through a `with_*` method that
//! consumes the previous state and returns the next one.

use anyhow::Context;
use serde::Serialize;
use std::fmt;
use std::path::Path;

use crate::collaborators::{Extraction, RawDocuments};
use crate::compliance::{AdvisoryLetter, ComplianceReport};
use crate::market_data::MarketData;
use crate::models::{MacroView, Portfolio, RiskProfile};
use crate::strategy::RebalancingPlan;
use crate::utils::read_document;

/// Pipeline stages, in execution order, plus the two terminal states
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Ingestion,
    MarketData,
    Strategy,
    Drafter,
    Compliance,
    Done,
    Failed,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Ingestion => "INGESTION",
            Stage::MarketData => "MARKET_DATA",
            Stage::Strategy => "STRATEGY",
            Stage::Drafter => "DRAFTER",
            Stage::Compliance => "COMPLIANCE",
            Stage::Done => "DONE",
            Stage::Failed => "FAILED",
        }
    }

    /// The stage that follows on success; terminal states have none
    pub fn next(&self) -> Option<Stage> {
        match self {
            Stage::Ingestion => Some(Stage::MarketData),
            Stage::MarketData => Some(Stage::Strategy),
            Stage::Strategy => Some(Stage::Drafter),
            Stage::Drafter => Some(Stage::Compliance),
            Stage::Compliance => Some(Stage::Done),
            Stage::Done | Stage::Failed => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Stage::Done | Stage::Failed)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Non-fatal data issue, kept for the audit trail
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct DataQualityWarning {
    pub stage: Stage,
    pub symbol: Option<String>,
    pub message: String,
}

impl DataQualityWarning {
    pub fn new(stage: Stage, message: impl Into<String>) -> Self {
        Self {
            stage,
            symbol: None,
            message: message.into(),
        }
    }

    pub fn for_symbol(stage: Stage, symbol: &str, message: impl Into<String>) -> Self {
        Self {
            stage,
            symbol: Some(symbol.to_string()),
            message: message.into(),
        }
    }
}

impl fmt::Display for DataQualityWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.symbol {
            Some(symbol) => write!(f, "[{}] {}: {}", self.stage, symbol, self.message),
            None => write!(f, "[{}] {}", self.stage, self.message),
        }
    }
}

/// The four raw inputs of a run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdvisoryInputs {
    pub documents: RawDocuments,
    pub prices_csv: String,
}

impl AdvisoryInputs {
    pub fn new(
        portfolio_text: impl Into<String>,
        risk_text: impl Into<String>,
        macro_text: impl Into<String>,
        prices_csv: impl Into<String>,
    ) -> Self {
        Self {
            documents: RawDocuments {
                portfolio: portfolio_text.into(),
                risk_profile: risk_text.into(),
                macro_analysis: macro_text.into(),
            },
            prices_csv: prices_csv.into(),
        }
    }

    /// Read the inputs from disk (`.pdf` or text)
    pub fn from_files(
        portfolio: &Path,
        risk: &Path,
        macro_analysis: &Path,
        prices: &Path,
    ) -> anyhow::Result<Self> {
        Ok(Self::new(
            read_document(portfolio).context("Failed to read portfolio statement")?,
            read_document(risk).context("Failed to read risk profile")?,
            read_document(macro_analysis).context("Failed to read macro analysis")?,
            read_document(prices).context("Failed to read price table")?,
        ))
    }

    /// blake3 over the inputs, each prefixed by its length
    pub fn digest(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        for part in [
            &self.documents.portfolio,
            &self.documents.risk_profile,
            &self.documents.macro_analysis,
            &self.prices_csv,
        ] {
            hasher.update(&(part.len() as u64).to_le_bytes());
            hasher.update(part.as_bytes());
        }
        hasher.finalize().to_hex().to_string()
    }
}

/// Everything known about a run so far
#[derive(Debug, Clone, Serialize)]
pub struct AgentState {
    #[serde(skip)]
    inputs: AdvisoryInputs,
    input_digest: String,
    portfolio: Option<Portfolio>,
    risk_profile: Option<RiskProfile>,
    macro_view: Option<MacroView>,
    market_data: Option<MarketData>,
    plan: Option<RebalancingPlan>,
    draft_letter: Option<String>,
    letter: Option<AdvisoryLetter>,
    compliance_report: Option<ComplianceReport>,
    warnings: Vec<DataQualityWarning>,
}

impl AgentState {
    pub fn new(inputs: AdvisoryInputs) -> Self {
        Self {
            input_digest: inputs.digest(),
            inputs,
            portfolio: None,
            risk_profile: None,
            macro_view: None,
            market_data: None,
            plan: None,
            draft_letter: None,
            letter: None,
            compliance_report: None,
            warnings: Vec::new(),
        }
    }

    pub fn inputs(&self) -> &AdvisoryInputs {
        &self.inputs
    }

    pub fn input_digest(&self) -> &str {
        &self.input_digest
    }

    pub fn portfolio(&self) -> Option<&Portfolio> {
        self.portfolio.as_ref()
    }

    pub fn risk_profile(&self) -> Option<&RiskProfile> {
        self.risk_profile.as_ref()
    }

    pub fn macro_view(&self) -> Option<&MacroView> {
        self.macro_view.as_ref()
    }

    pub fn market_data(&self) -> Option<&MarketData> {
        self.market_data.as_ref()
    }

    pub fn plan(&self) -> Option<&RebalancingPlan> {
        self.plan.as_ref()
    }

    pub fn draft_letter(&self) -> Option<&str> {
        self.draft_letter.as_deref()
    }

    pub fn letter(&self) -> Option<&AdvisoryLetter> {
        self.letter.as_ref()
    }

    pub fn compliance_report(&self) -> Option<&ComplianceReport> {
        self.compliance_report.as_ref()
    }

    pub fn warnings(&self) -> &[DataQualityWarning] {
        &self.warnings
    }

    /// The compliant letter, once the run reached Done
    pub fn final_text(&self) -> Option<&str> {
        self.letter.as_ref().map(|l| l.sanitized_text.as_str())
    }

    pub fn with_extraction(self, extraction: Extraction) -> Self {
        Self {
            portfolio: Some(extraction.portfolio),
            risk_profile: Some(extraction.risk_profile),
            macro_view: Some(extraction.macro_view),
            ..self
        }
    }

    pub fn with_market_data(self, market_data: MarketData) -> Self {
        Self {
            market_data: Some(market_data),
            ..self
        }
    }

    pub fn with_plan(self, plan: RebalancingPlan) -> Self {
        Self {
            plan: Some(plan),
            ..self
        }
    }

    pub fn with_draft(self, draft: String) -> Self {
        Self {
            draft_letter: Some(draft),
            ..self
        }
    }

    pub fn with_compliance(self, letter: AdvisoryLetter, report: ComplianceReport) -> Self {
        Self {
            letter: Some(letter),
            compliance_report: Some(report),
            ..self
        }
    }

    /// Append to the warning log; earlier entries are never touched
    pub fn with_warnings(mut self, warnings: impl IntoIterator<Item = DataQualityWarning>) -> Self {
        self.warnings.extend(warnings);
        self
    }
}
