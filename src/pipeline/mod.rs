// Pipeline module - the advisory state machine
//
// Ingestion -> MarketData -> Strategy -> Drafter -> Compliance -> Done, with
// Failed reachable from every stage. Each stage reads the current state,
// computes its complete output and only then is the output written into the
// next state; a failing stage leaves the state untouched.

pub mod state;

pub use state::{AdvisoryInputs, AgentState, DataQualityWarning, Stage};

use chrono::Local;
use std::fmt;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::collaborators::{Collaborators, DraftContext, Extraction};
use crate::compliance::{ComplianceOutcome, ComplianceValidator};
use crate::config::AdvisorConfig;
use crate::error::{AdvisorError, Result};
use crate::market_data::{MarketData, Period, PeriodWindow, PriceTable, ReturnCalculator};
use crate::strategy::{RebalancingEngine, RebalancingPlan};

/// A run that stopped before Done
#[derive(Debug)]
pub struct PipelineFailure {
    /// Stage that failed
    pub stage: Stage,
    pub error: AdvisorError,
    /// State as it was when the stage started
    pub state: AgentState,
}

impl fmt::Display for PipelineFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} stage failed: {}", self.stage, self.error)
    }
}

impl std::error::Error for PipelineFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

#[derive(Debug)]
pub enum PipelineOutcome {
    Done(AgentState),
    Failed(PipelineFailure),
}

/// Outcome of a run plus every stage it entered, terminal state last
#[derive(Debug)]
pub struct PipelineRun {
    pub outcome: PipelineOutcome,
    pub transitions: Vec<Stage>,
}

impl PipelineRun {
    pub fn into_result(self) -> std::result::Result<AgentState, PipelineFailure> {
        match self.outcome {
            PipelineOutcome::Done(state) => Ok(state),
            PipelineOutcome::Failed(failure) => Err(failure),
        }
    }
}

/// Complete output of one stage, applied to the state in one step
enum StageOutput {
    Extraction(Extraction, Vec<DataQualityWarning>),
    MarketData(MarketData, Vec<DataQualityWarning>),
    Plan(RebalancingPlan, Vec<DataQualityWarning>),
    Draft(String, Vec<DataQualityWarning>),
    Compliance(ComplianceOutcome),
}

impl StageOutput {
    fn apply(self, state: AgentState) -> AgentState {
        match self {
            StageOutput::Extraction(extraction, warnings) => {
                state.with_extraction(extraction).with_warnings(warnings)
            }
            StageOutput::MarketData(market_data, warnings) => {
                state.with_market_data(market_data).with_warnings(warnings)
            }
            StageOutput::Plan(plan, warnings) => state.with_plan(plan).with_warnings(warnings),
            StageOutput::Draft(draft, warnings) => state.with_draft(draft).with_warnings(warnings),
            StageOutput::Compliance(outcome) => state
                .with_compliance(outcome.letter, outcome.report)
                .with_warnings(outcome.warnings),
        }
    }
}

/// Runs `call` on a helper thread and waits at most `timeout` for it.
///
/// On timeout the helper is abandoned; its result, if any, is dropped.
pub fn call_with_timeout<T, F>(name: &str, timeout: Option<Duration>, call: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    let Some(limit) = timeout else {
        return call();
    };

    let (tx, rx) = mpsc::channel();
    thread::Builder::new()
        .name(format!("advisor-{}", name))
        .spawn(move || {
            // The receiver is gone after a timeout
            let _ = tx.send(call());
        })
        .map_err(|e| AdvisorError::ExternalCallError(format!("cannot start {}: {}", name, e)))?;

    match rx.recv_timeout(limit) {
        Ok(result) => result,
        Err(RecvTimeoutError::Timeout) => Err(AdvisorError::ExternalCallError(format!(
            "{} did not respond within {:.1}s",
            name,
            limit.as_secs_f64()
        ))),
        Err(RecvTimeoutError::Disconnected) => Err(AdvisorError::ExternalCallError(format!(
            "{} stopped without a result",
            name
        ))),
    }
}

fn missing(what: &str, stage: Stage) -> AdvisorError {
    AdvisorError::ParseError(format!("{} is not available at stage {}", what, stage))
}

/// The orchestrator: owns the stage components and threads one state through them
#[derive(Debug)]
pub struct Pipeline {
    config: AdvisorConfig,
    collaborators: Collaborators,
    calculator: ReturnCalculator,
    engine: RebalancingEngine,
    validator: ComplianceValidator,
    timeout: Option<Duration>,
}

impl Pipeline {
    /// Builds every component up front, so configuration errors surface before any stage runs
    pub fn new(config: AdvisorConfig, collaborators: Collaborators) -> Result<Self> {
        let engine = RebalancingEngine::new(&config.strategy)?;
        let validator = ComplianceValidator::new(config.compliance.clone())?;
        let calculator = ReturnCalculator::new(PeriodWindow::new(
            config.market_data.window_start,
            config.market_data.window_end,
        ));
        let timeout = config
            .pipeline
            .collaborator_timeout_secs
            .map(Duration::from_secs);

        Ok(Self {
            config,
            collaborators,
            calculator,
            engine,
            validator,
            timeout,
        })
    }

    /// Override the collaborator deadline; `None` waits indefinitely
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn config(&self) -> &AdvisorConfig {
        &self.config
    }

    pub fn run(&self, inputs: AdvisoryInputs) -> PipelineRun {
        let mut state = AgentState::new(inputs);
        let mut stage = Stage::Ingestion;
        let mut transitions = vec![stage];
        info!("Advisory run started (inputs {})", &state.input_digest()[..12]);

        while !stage.is_terminal() {
            match self.step(stage, &state) {
                Ok(output) => {
                    state = output.apply(state);
                    let next = stage.next().unwrap_or(Stage::Done);
                    info!("{} -> {}", stage, next);
                    transitions.push(next);
                    stage = next;
                }
                Err(error) => {
                    error!("{} -> {}: {}", stage, Stage::Failed, error);
                    transitions.push(Stage::Failed);
                    return PipelineRun {
                        outcome: PipelineOutcome::Failed(PipelineFailure {
                            stage,
                            error,
                            state,
                        }),
                        transitions,
                    };
                }
            }
        }

        info!(
            "Advisory run finished with {} warning(s)",
            state.warnings().len()
        );
        PipelineRun {
            outcome: PipelineOutcome::Done(state),
            transitions,
        }
    }

    fn step(&self, stage: Stage, state: &AgentState) -> Result<StageOutput> {
        match stage {
            Stage::Ingestion => self.ingest(state),
            Stage::MarketData => self.load_market_data(state),
            Stage::Strategy => self.plan(state),
            Stage::Drafter => self.draft(state),
            Stage::Compliance => self.check(state),
            Stage::Done | Stage::Failed => Err(missing("a next stage", stage)),
        }
    }

    fn ingest(&self, state: &AgentState) -> Result<StageOutput> {
        let extractor = self.collaborators.extractor.clone();
        let documents = state.inputs().documents.clone();
        info!("Extracting documents with {}", extractor.name());
        let extraction = call_with_timeout("extractor", self.timeout, move || {
            extractor.extract(&documents)
        })?;

        let (risk_profile, notes) = extraction.risk_profile.normalized(&self.config.risk);
        let warnings: Vec<DataQualityWarning> = extraction
            .portfolio
            .issues()
            .iter()
            .chain(notes.iter())
            .map(|issue| {
                warn!("Ingestion: {}", issue);
                DataQualityWarning::new(Stage::Ingestion, issue.clone())
            })
            .collect();

        Ok(StageOutput::Extraction(
            Extraction {
                risk_profile,
                ..extraction
            },
            warnings,
        ))
    }

    fn load_market_data(&self, state: &AgentState) -> Result<StageOutput> {
        let portfolio = state
            .portfolio()
            .ok_or_else(|| missing("portfolio", Stage::MarketData))?;
        let as_of = self.config.market_data.as_of.unwrap_or_else(Period::current);

        let table = PriceTable::parse_csv(&state.inputs().prices_csv, as_of)?;
        let calculation = self
            .calculator
            .calculate(&table, &portfolio.equity_symbols());

        let mut warnings = table.warnings().to_vec();
        warnings.extend(calculation.warnings);
        Ok(StageOutput::MarketData(calculation.market_data, warnings))
    }

    fn plan(&self, state: &AgentState) -> Result<StageOutput> {
        let (Some(portfolio), Some(risk), Some(macro_view), Some(market_data)) = (
            state.portfolio(),
            state.risk_profile(),
            state.macro_view(),
            state.market_data(),
        ) else {
            return Err(missing("extracted data", Stage::Strategy));
        };

        let (plan, warnings) = self.engine.plan(portfolio, risk, macro_view, market_data);
        Ok(StageOutput::Plan(plan, warnings))
    }

    fn draft(&self, state: &AgentState) -> Result<StageOutput> {
        let (Some(portfolio), Some(risk), Some(macro_view), Some(plan)) = (
            state.portfolio(),
            state.risk_profile(),
            state.macro_view(),
            state.plan(),
        ) else {
            return Err(missing("plan", Stage::Drafter));
        };

        let context = DraftContext {
            portfolio: portfolio.clone(),
            risk_profile: risk.clone(),
            macro_view: macro_view.clone(),
            plan: plan.clone(),
            date: Local::now().date_naive(),
        };
        let drafter = self.collaborators.drafter.clone();
        info!("Drafting letter with {}", drafter.name());
        let draft = call_with_timeout("drafter", self.timeout, move || drafter.draft(&context))?;

        let mut warnings = Vec::new();
        if draft.trim().is_empty() {
            warn!("Drafter returned an empty letter");
            warnings.push(DataQualityWarning::new(
                Stage::Drafter,
                "drafter returned an empty letter",
            ));
        }
        Ok(StageOutput::Draft(draft, warnings))
    }

    fn check(&self, state: &AgentState) -> Result<StageOutput> {
        let draft = state
            .draft_letter()
            .ok_or_else(|| missing("draft letter", Stage::Compliance))?;
        let outcome = self.validator.validate(draft, state.plan())?;
        Ok(StageOutput::Compliance(outcome))
    }
}

/// Run the whole pipeline once.
///
/// A configuration the components reject is reported as a failure of the
/// first stage, with an empty state.
pub fn run_advisory(
    inputs: AdvisoryInputs,
    config: &AdvisorConfig,
    collaborators: Collaborators,
) -> std::result::Result<AgentState, PipelineFailure> {
    match Pipeline::new(config.clone(), collaborators) {
        Ok(pipeline) => pipeline.run(inputs).into_result(),
        Err(error) => Err(PipelineFailure {
            stage: Stage::Ingestion,
            error,
            state: AgentState::new(inputs),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{DocumentExtractor, LetterDrafter, RawDocuments};
    use crate::models::{Asset, AssetClass, HouseView, InvestorType, MacroView, Portfolio, RiskProfile};
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    struct FixedExtractor;

    impl DocumentExtractor for FixedExtractor {
        fn name(&self) -> &str {
            "fixed"
        }

        fn extract(&self, _documents: &RawDocuments) -> Result<Extraction> {
            Ok(Extraction {
                portfolio: Portfolio::new(
                    vec![
                        Asset::new("PETR4", AssetClass::Equity, dec!(49380)),
                        Asset::new("OIBR3", AssetClass::Equity, dec!(620)),
                        Asset::new("CDB", AssetClass::FixedIncome, dec!(150000)),
                    ],
                    None,
                ),
                risk_profile: RiskProfile {
                    investor_type: InvestorType::Moderate,
                    max_equity_pct: dec!(40),
                    drift_tolerance_pct: dec!(5),
                },
                macro_view: MacroView::new(HouseView::Neutral),
            })
        }
    }

    struct FailingExtractor;

    impl DocumentExtractor for FailingExtractor {
        fn name(&self) -> &str {
            "failing"
        }

        fn extract(&self, _documents: &RawDocuments) -> Result<Extraction> {
            Err(AdvisorError::ParseError("unreadable statement".to_string()))
        }
    }

    struct EchoDrafter {
        text: String,
        delay: Duration,
    }

    impl LetterDrafter for EchoDrafter {
        fn name(&self) -> &str {
            "echo"
        }

        fn draft(&self, _context: &DraftContext) -> Result<String> {
            thread::sleep(self.delay);
            Ok(self.text.clone())
        }
    }

    const PRICES: &str = "symbol,period,price\nPETR4,2025-05,30.00\nPETR4,2025-06,37.80\n";

    fn config() -> AdvisorConfig {
        let mut config = AdvisorConfig::default();
        config.market_data.as_of = Period::new(2025, 6);
        config
    }

    fn pipeline(extractor: Arc<dyn DocumentExtractor>, text: &str, delay: Duration) -> Pipeline {
        let drafter = Arc::new(EchoDrafter {
            text: text.to_string(),
            delay,
        });
        Pipeline::new(config(), Collaborators::new(extractor, drafter)).unwrap()
    }

    fn inputs() -> AdvisoryInputs {
        AdvisoryInputs::new("carteira", "perfil", "macro", PRICES)
    }

    #[test]
    fn test_happy_path_visits_every_stage() {
        let run = pipeline(
            Arc::new(FixedExtractor),
            "Prezado cliente, sugerimos realizar lucro em PETR4 com ganho garantido.",
            Duration::ZERO,
        )
        .run(inputs());

        assert_eq!(
            run.transitions,
            vec![
                Stage::Ingestion,
                Stage::MarketData,
                Stage::Strategy,
                Stage::Drafter,
                Stage::Compliance,
                Stage::Done
            ]
        );
        let state = run.into_result().unwrap();

        let plan = state.plan().unwrap();
        assert_eq!(plan.actions.len(), 1);
        assert_eq!(plan.actions[0].rounded_sell_value(), dec!(12345.00));

        let text = state.final_text().unwrap();
        assert!(!text.contains("garantido"));
        assert!(text.contains("AVISO LEGAL"));
        assert_eq!(state.compliance_report().unwrap().violations_found.len(), 1);

        // OIBR3 has no prices at all
        assert!(state
            .warnings()
            .iter()
            .any(|w| w.stage == Stage::MarketData && w.symbol.as_deref() == Some("OIBR3")));
    }

    #[test]
    fn test_extractor_failure_stops_at_ingestion() {
        let run = pipeline(Arc::new(FailingExtractor), "carta", Duration::ZERO).run(inputs());

        assert_eq!(run.transitions, vec![Stage::Ingestion, Stage::Failed]);
        let failure = run.into_result().unwrap_err();
        assert_eq!(failure.stage, Stage::Ingestion);
        assert_eq!(failure.error.kind(), "ParseError");
        assert!(failure.state.portfolio().is_none());
    }

    #[test]
    fn test_bad_price_table_fails_market_data() {
        let inputs = AdvisoryInputs::new("carteira", "perfil", "macro", "foo,bar\n1,2\n");
        let failure = pipeline(Arc::new(FixedExtractor), "carta", Duration::ZERO)
            .run(inputs)
            .into_result()
            .unwrap_err();

        assert_eq!(failure.stage, Stage::MarketData);
        assert!(failure.state.portfolio().is_some());
        assert!(failure.state.market_data().is_none());
    }

    #[test]
    fn test_slow_drafter_times_out_with_partial_state() {
        let run = pipeline(Arc::new(FixedExtractor), "carta", Duration::from_secs(2))
            .with_timeout(Some(Duration::from_millis(50)))
            .run(inputs());

        assert_eq!(run.transitions.last(), Some(&Stage::Failed));
        let failure = run.into_result().unwrap_err();
        assert_eq!(failure.stage, Stage::Drafter);
        assert_eq!(failure.error.kind(), "ExternalCallError");
        assert!(failure.state.plan().is_some());
        assert!(failure.state.draft_letter().is_none());
        assert!(failure.to_string().starts_with("DRAFTER stage failed"));
    }

    #[test]
    fn test_letter_that_cannot_be_sanitised_fails_at_compliance() {
        // Each removal re-creates the term, so the pass limit is reached
        let mut config = config();
        config.compliance.forbidden_terms = vec!["sem risco".to_string()];
        config.compliance.replacement = Some("sem".to_string());
        let draft = format!("Carteira sem{}.", " risco".repeat(12));
        let collaborators = Collaborators::new(
            Arc::new(FixedExtractor),
            Arc::new(EchoDrafter {
                text: draft,
                delay: Duration::ZERO,
            }),
        );

        let run = Pipeline::new(config, collaborators).unwrap().run(inputs());
        assert_eq!(run.transitions.last(), Some(&Stage::Failed));
        let failure = run.into_result().unwrap_err();
        assert_eq!(failure.stage, Stage::Compliance);
        assert_eq!(failure.error.kind(), "ComplianceFailure");
        assert!(failure.state.draft_letter().is_some());
        assert!(failure.state.letter().is_none());
        assert!(failure.state.final_text().is_none());
        assert!(failure.state.compliance_report().is_none());
    }

    #[test]
    fn test_call_with_timeout_without_deadline_runs_inline() {
        let value = call_with_timeout("inline", None, || Ok(42)).unwrap();
        assert_eq!(value, 42);
    }

    #[test]
    fn test_invalid_config_fails_before_any_stage() {
        let mut config = config();
        config.strategy.rules[0].sell_pct = dec!(1.5);
        let collaborators = Collaborators::new(
            Arc::new(FixedExtractor),
            Arc::new(EchoDrafter {
                text: String::new(),
                delay: Duration::ZERO,
            }),
        );

        let failure = run_advisory(inputs(), &config, collaborators).unwrap_err();
        assert_eq!(failure.error.kind(), "ConfigError");
        assert!(failure.state.portfolio().is_none());
    }
}
