use itertools::Itertools;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::rules::{ActionKind, MissingReturnPolicy, Rule, RuleId};
use crate::config::StrategyConfig;
use crate::error::{AdvisorError, Result};
use crate::market_data::MarketData;
use crate::models::{MacroView, Portfolio, RiskProfile};
use crate::pipeline::{DataQualityWarning, Stage};
use crate::utils::{format_currency, format_pct, round_currency};

/// A non-hold decision for one asset
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RebalancingAction {
    pub symbol: String,
    pub action: ActionKind,
    pub rule: RuleId,
    pub return_pct: Decimal,
    pub market_value: Decimal,
    pub sell_pct: Decimal,
    /// `market_value × sell_pct`, unrounded
    pub sell_value: Decimal,
    pub rationale: String,
}

impl RebalancingAction {
    pub fn rounded_sell_value(&self) -> Decimal {
        round_currency(self.sell_value)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RebalancingPlan {
    pub needed: bool,
    pub current_equity_pct: Decimal,
    pub target_equity_pct: Decimal,
    /// `current_equity_pct - target_equity_pct`
    pub drift_pct: Decimal,
    pub drift_breached: bool,
    pub total_sell_value: Decimal,
    /// In portfolio order
    pub actions: Vec<RebalancingAction>,
    /// Equities without return data, under [`MissingReturnPolicy::ManualReview`]
    pub manual_review: Vec<String>,
    pub summary: String,
}

impl RebalancingPlan {
    pub fn rounded_total_sell_value(&self) -> Decimal {
        round_currency(self.total_sell_value)
    }

    pub fn action_for(&self, symbol: &str) -> Option<&RebalancingAction> {
        self.actions
            .iter()
            .find(|a| a.symbol.eq_ignore_ascii_case(symbol))
    }

    pub fn count_by_rule(&self, rule: RuleId) -> usize {
        self.actions.iter().filter(|a| a.rule == rule).count()
    }
}

/// Applies the rule table to a portfolio.
///
/// Pure: the same inputs always produce the same plan.
#[derive(Debug, Clone)]
pub struct RebalancingEngine {
    rules: Vec<Rule>,
    missing_return_policy: MissingReturnPolicy,
}

impl RebalancingEngine {
    pub fn new(config: &StrategyConfig) -> Result<Self> {
        for rule in &config.rules {
            if rule.sell_pct < Decimal::ZERO || rule.sell_pct > Decimal::ONE {
                return Err(AdvisorError::ConfigError(format!(
                    "rule {} has sell_pct {} outside [0, 1]",
                    rule.id.as_str(),
                    rule.sell_pct
                )));
            }
        }

        Ok(Self {
            rules: config.rules.clone(),
            missing_return_policy: config.missing_return_policy,
        })
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// First matching rule, or `None` for hold
    fn evaluate(&self, return_pct: Decimal, macro_view: &MacroView) -> Option<&Rule> {
        self.rules
            .iter()
            .find(|rule| rule.matches(return_pct, macro_view.house_view))
    }

    pub fn plan(
        &self,
        portfolio: &Portfolio,
        risk: &RiskProfile,
        macro_view: &MacroView,
        market_data: &MarketData,
    ) -> (RebalancingPlan, Vec<DataQualityWarning>) {
        let mut actions = Vec::new();
        let mut manual_review = Vec::new();
        let mut warnings = Vec::new();

        for asset in portfolio.assets().iter().filter(|a| a.is_equity()) {
            let return_pct = match market_data.latest_return(&asset.symbol) {
                Some(value) => value,
                None => match self.missing_return_policy {
                    MissingReturnPolicy::TreatAsZero => {
                        debug!("{}: no return data, evaluating as 0%", asset.symbol);
                        Decimal::ZERO
                    }
                    MissingReturnPolicy::ManualReview => {
                        warn!("{}: no return data, flagged for manual review", asset.symbol);
                        manual_review.push(asset.symbol.clone());
                        warnings.push(DataQualityWarning::for_symbol(
                            Stage::Strategy,
                            &asset.symbol,
                            "no return data, held pending manual review",
                        ));
                        continue;
                    }
                },
            };

            let Some(rule) = self.evaluate(return_pct, macro_view) else {
                continue;
            };
            if rule.action == ActionKind::Hold {
                continue;
            }

            let sell_value = asset.market_value * rule.sell_pct;
            info!(
                "{}: {} at {}% monthly return, sell {}",
                asset.symbol,
                rule.id.as_str(),
                return_pct.round_dp(2),
                format_currency(sell_value)
            );
            actions.push(RebalancingAction {
                symbol: asset.symbol.clone(),
                action: rule.action,
                rule: rule.id,
                return_pct,
                market_value: asset.market_value,
                sell_pct: rule.sell_pct,
                sell_value,
                rationale: rule.rationale.clone(),
            });
        }

        let current_equity_pct = portfolio.equity_pct();
        let target_equity_pct = risk.max_equity_pct;
        let drift_pct = current_equity_pct - target_equity_pct;
        let drift_breached = !portfolio.is_empty() && drift_pct > risk.drift_tolerance_pct;
        if drift_breached {
            warn!(
                "Equity allocation {}% exceeds limit {}% + {}% tolerance",
                current_equity_pct.round_dp(1),
                target_equity_pct,
                risk.drift_tolerance_pct
            );
        }

        let total_sell_value: Decimal = actions.iter().map(|a| a.sell_value).sum();
        let needed = drift_breached || !actions.is_empty();

        let mut plan = RebalancingPlan {
            needed,
            current_equity_pct,
            target_equity_pct,
            drift_pct,
            drift_breached,
            total_sell_value,
            actions,
            manual_review,
            summary: String::new(),
        };
        plan.summary = build_summary(&plan, risk);

        info!(
            "Rebalancing plan: {} actions, needed={}",
            plan.actions.len(),
            plan.needed
        );
        (plan, warnings)
    }
}

fn build_summary(plan: &RebalancingPlan, risk: &RiskProfile) -> String {
    let mut summary = String::new();

    if plan.drift_breached {
        summary.push_str(&format!(
            "[ALERTA] Alocacao em renda variavel ({}) excede o limite ({} + {} de tolerancia). ",
            format_pct(plan.current_equity_pct),
            format_pct(plan.target_equity_pct),
            format_pct(risk.drift_tolerance_pct)
        ));
    }

    if plan.actions.is_empty() {
        summary.push_str("Nenhuma acao de rebalanceamento necessaria no momento.");
    } else {
        let parts = [
            (RuleId::HardSell, "venda(s) urgente(s)"),
            (RuleId::SoftSell, "reducao(oes) por cenario macro"),
            (RuleId::Trim, "realizacao(oes) de lucro"),
        ]
        .iter()
        .filter_map(|(rule, label)| match plan.count_by_rule(*rule) {
            0 => None,
            n => Some(format!("{} {}", n, label)),
        })
        .join(", ");

        summary.push_str(&format!(
            "Rebalanceamento recomendado: {}. Valor total sugerido para venda: {}",
            parts,
            format_currency(plan.total_sell_value)
        ));
    }

    if !plan.manual_review.is_empty() {
        summary.push_str(&format!(
            ". Revisao manual: {}",
            plan.manual_review.iter().join(", ")
        ));
    }

    summary
}
