//! Rebalancing rules as data
//!
//! A rule table is an ordered list; the engine walks it per asset and the first
//! matching rule decides. Thresholds are in percentage points of monthly
//! return, sell percentages are fractions of the position.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::models::HouseView;

/// Identifies which rule produced an action
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum RuleId {
    HardSell,
    SoftSell,
    Trim,
}

impl RuleId {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleId::HardSell => "HARD_SELL",
            RuleId::SoftSell => "SOFT_SELL",
            RuleId::Trim => "TRIM",
        }
    }

    /// Label used in letters and terminal output
    pub fn label_pt(&self) -> &'static str {
        match self {
            RuleId::HardSell => "[URGENTE] VENDA",
            RuleId::SoftSell => "[MODERADO] REDUCAO",
            RuleId::Trim => "[LUCRO] REALIZACAO",
        }
    }
}

impl FromStr for RuleId {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().replace('-', "_").as_str() {
            "HARD_SELL" => Ok(RuleId::HardSell),
            "SOFT_SELL" => Ok(RuleId::SoftSell),
            "TRIM" => Ok(RuleId::Trim),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Sell,
    Trim,
    Hold,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Sell => "SELL",
            ActionKind::Trim => "TRIM",
            ActionKind::Hold => "HOLD",
        }
    }
}

/// Return condition of a rule. Comparisons are strict.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    ReturnBelow(Decimal),
    ReturnAbove(Decimal),
}

impl Trigger {
    pub fn fires(&self, return_pct: Decimal) -> bool {
        match *self {
            Trigger::ReturnBelow(threshold) => return_pct < threshold,
            Trigger::ReturnAbove(threshold) => return_pct > threshold,
        }
    }
}

/// One row of the rule table
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Rule {
    pub id: RuleId,
    /// When set, the rule only applies under this house view
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub house_view: Option<HouseView>,
    pub action: ActionKind,
    /// Fraction of the position to sell, in `[0, 1]`
    pub sell_pct: Decimal,
    pub rationale: String,
    pub trigger: Trigger,
}

impl Rule {
    pub fn matches(&self, return_pct: Decimal, house_view: HouseView) -> bool {
        self.trigger.fires(return_pct) && self.house_view.map_or(true, |view| view == house_view)
    }

    /// The house rule table: hard sell, macro-driven soft sell, profit trim.
    pub fn default_table() -> Vec<Rule> {
        vec![
            Rule {
                id: RuleId::HardSell,
                house_view: None,
                action: ActionKind::Sell,
                sell_pct: Decimal::new(50, 2),
                rationale: "Ativo com perda superior a 20%. Recomendacao de venda parcial \
                            para protecao do capital."
                    .to_string(),
                trigger: Trigger::ReturnBelow(Decimal::from(-20)),
            },
            Rule {
                id: RuleId::SoftSell,
                house_view: Some(HouseView::Negative),
                action: ActionKind::Sell,
                sell_pct: Decimal::new(30, 2),
                rationale: "Cenario macro desfavoravel combinado com desempenho negativo. \
                            Recomendacao de reducao da posicao."
                    .to_string(),
                trigger: Trigger::ReturnBelow(Decimal::from(-10)),
            },
            Rule {
                id: RuleId::Trim,
                house_view: None,
                action: ActionKind::Trim,
                sell_pct: Decimal::new(25, 2),
                rationale: "Ativo com valorizacao expressiva (+25%). Recomendacao de \
                            realizacao parcial de lucros."
                    .to_string(),
                trigger: Trigger::ReturnAbove(Decimal::from(25)),
            },
        ]
    }
}

/// What to do with an equity that has no return in the price table
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MissingReturnPolicy {
    /// Evaluate as a 0% return, which holds under the default table
    #[default]
    TreatAsZero,
    /// Hold, list the symbol in the plan for manual review and warn
    ManualReview,
}
