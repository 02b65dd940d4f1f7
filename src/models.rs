//! Domain types shared by every pipeline stage
//!
//! Money and percentages are `Decimal`. Allocation and return percentages are
//! expressed in percentage points (`37` means 37%).

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::config::RiskDefaults;

/// Stated totals may differ from the sum of positions by this much (in pp of
/// allocation) before the portfolio is flagged.
const ALLOCATION_SUM_TOLERANCE: i64 = 5;

/// Broad asset classes used by the rebalancing rules
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AssetClass {
    Equity,      // Ações / renda variável
    FixedIncome, // Renda fixa (CDB, Tesouro, LCI/LCA, debêntures)
    Other,       // Funds, international, cash
}

impl AssetClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssetClass::Equity => "EQUITY",
            AssetClass::FixedIncome => "FIXED_INCOME",
            AssetClass::Other => "OTHER",
        }
    }

    pub fn label_pt(&self) -> &'static str {
        match self {
            AssetClass::Equity => "Renda Variável",
            AssetClass::FixedIncome => "Renda Fixa",
            AssetClass::Other => "Outros",
        }
    }

    /// Lenient classification used by extractors; unknown labels become `Other`
    pub fn classify(label: &str) -> Self {
        label.parse().unwrap_or(AssetClass::Other)
    }
}

impl FromStr for AssetClass {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().replace('-', "_").as_str() {
            "EQUITY" | "EQUITIES" | "STOCK" | "STOCKS" | "AÇÕES" | "ACOES" | "AÇÃO" | "ACAO"
            | "RENDA VARIÁVEL" | "RENDA VARIAVEL" | "RV" => Ok(AssetClass::Equity),
            "FIXED_INCOME" | "FIXED INCOME" | "RENDA FIXA" | "RF" | "CDB" | "LCI" | "LCA"
            | "TESOURO" | "TESOURO DIRETO" | "BOND" | "BONDS" | "DEBÊNTURE" | "DEBENTURE" => {
                Ok(AssetClass::FixedIncome)
            }
            "OTHER" | "OUTROS" | "FUNDS" | "FUNDOS" | "INTERNATIONAL" | "CASH" => {
                Ok(AssetClass::Other)
            }
            _ => Err(()),
        }
    }
}

/// A single position in the client's portfolio
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Asset {
    pub symbol: String,
    pub quantity: Option<Decimal>,
    pub unit_price: Option<Decimal>,
    pub market_value: Decimal,
    pub asset_class: AssetClass,
    /// Share of the owning portfolio's total value, recomputed by [`Portfolio::new`]
    pub allocation_pct: Decimal,
}

impl Asset {
    /// Position known only by its market value
    pub fn new(symbol: impl Into<String>, asset_class: AssetClass, market_value: Decimal) -> Self {
        Self {
            symbol: symbol.into().trim().to_uppercase(),
            quantity: None,
            unit_price: None,
            market_value,
            asset_class,
            allocation_pct: Decimal::ZERO,
        }
    }

    /// Position known by quantity and unit price; market value is derived
    pub fn with_position(
        symbol: impl Into<String>,
        asset_class: AssetClass,
        quantity: Decimal,
        unit_price: Decimal,
    ) -> Self {
        Self {
            quantity: Some(quantity),
            unit_price: Some(unit_price),
            ..Self::new(symbol, asset_class, quantity * unit_price)
        }
    }

    pub fn is_equity(&self) -> bool {
        self.asset_class == AssetClass::Equity
    }
}

/// Structured representation of the client's portfolio.
///
/// Totals and allocations are derived from the assets when the portfolio is
/// built, so they can never go stale. Fields are private for that reason.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Portfolio {
    assets: Vec<Asset>,
    total_value: Decimal,
    equity_value: Decimal,
    equity_pct: Decimal,
    fixed_income_value: Decimal,
    fixed_income_pct: Decimal,
    issues: Vec<String>,
}

impl Portfolio {
    /// Build a portfolio, deriving totals and per-asset allocation.
    ///
    /// `stated_total` is the total printed on the statement, if any. It wins over
    /// the sum of positions (statements may include uninvested cash), but a large
    /// mismatch is recorded as a validation issue.
    pub fn new(assets: Vec<Asset>, stated_total: Option<Decimal>) -> Self {
        let positions_total: Decimal = assets.iter().map(|a| a.market_value).sum();
        let total_value = match stated_total {
            Some(total) if total > Decimal::ZERO => total,
            _ => positions_total,
        };

        let mut issues = Vec::new();
        let pct_of = |value: Decimal| {
            if total_value > Decimal::ZERO {
                value / total_value * Decimal::ONE_HUNDRED
            } else {
                Decimal::ZERO
            }
        };

        let assets: Vec<Asset> = assets
            .into_iter()
            .map(|mut asset| {
                if asset.market_value <= Decimal::ZERO {
                    issues.push(format!("Asset {} has missing or zero value", asset.symbol));
                }
                asset.allocation_pct = pct_of(asset.market_value);
                asset
            })
            .collect();

        let equity_value: Decimal = assets
            .iter()
            .filter(|a| a.asset_class == AssetClass::Equity)
            .map(|a| a.market_value)
            .sum();
        let fixed_income_value: Decimal = assets
            .iter()
            .filter(|a| a.asset_class == AssetClass::FixedIncome)
            .map(|a| a.market_value)
            .sum();

        if !assets.is_empty() {
            let allocation_sum = pct_of(positions_total);
            let tolerance = Decimal::from(ALLOCATION_SUM_TOLERANCE);
            if (allocation_sum - Decimal::ONE_HUNDRED).abs() > tolerance {
                issues.push(format!(
                    "Total allocation is {:.1}%, expected approximately 100%",
                    allocation_sum
                ));
            }
        }

        Self {
            equity_pct: pct_of(equity_value),
            fixed_income_pct: pct_of(fixed_income_value),
            assets,
            total_value,
            equity_value,
            fixed_income_value,
            issues,
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new(), None)
    }

    pub fn assets(&self) -> &[Asset] {
        &self.assets
    }

    pub fn total_value(&self) -> Decimal {
        self.total_value
    }

    pub fn equity_value(&self) -> Decimal {
        self.equity_value
    }

    pub fn equity_pct(&self) -> Decimal {
        self.equity_pct
    }

    pub fn fixed_income_value(&self) -> Decimal {
        self.fixed_income_value
    }

    pub fn fixed_income_pct(&self) -> Decimal {
        self.fixed_income_pct
    }

    /// Validation issues found while building the portfolio
    pub fn issues(&self) -> &[String] {
        &self.issues
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }

    pub fn find(&self, symbol: &str) -> Option<&Asset> {
        self.assets
            .iter()
            .find(|a| a.symbol.eq_ignore_ascii_case(symbol))
    }

    /// Equity symbols in portfolio order
    pub fn equity_symbols(&self) -> Vec<String> {
        self.assets
            .iter()
            .filter(|a| a.is_equity())
            .map(|a| a.symbol.clone())
            .collect()
    }
}

/// Investor suitability classification
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum InvestorType {
    Conservative,
    Moderate,
    Aggressive,
}

impl InvestorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvestorType::Conservative => "CONSERVATIVE",
            InvestorType::Moderate => "MODERATE",
            InvestorType::Aggressive => "AGGRESSIVE",
        }
    }

    pub fn label_pt(&self) -> &'static str {
        match self {
            InvestorType::Conservative => "Conservador",
            InvestorType::Moderate => "Moderado",
            InvestorType::Aggressive => "Arrojado",
        }
    }
}

impl FromStr for InvestorType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "CONSERVATIVE" | "CONSERVADOR" | "CONSERVADORA" => Ok(InvestorType::Conservative),
            "MODERATE" | "MODERADO" | "MODERADA" | "BALANCED" => Ok(InvestorType::Moderate),
            "AGGRESSIVE" | "ARROJADO" | "ARROJADA" | "AGRESSIVO" | "AGRESSIVA" => {
                Ok(InvestorType::Aggressive)
            }
            _ => Err(()),
        }
    }
}

/// Client's risk profile and investment constraints
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RiskProfile {
    pub investor_type: InvestorType,
    /// Maximum percentage allowed in equities
    pub max_equity_pct: Decimal,
    /// Allowed drift above `max_equity_pct` before rebalancing (pp)
    pub drift_tolerance_pct: Decimal,
}

impl RiskProfile {
    /// Replace implausible limits with the configured defaults for the profile.
    ///
    /// Returns the normalized profile and a note for each substitution made.
    pub fn normalized(self, defaults: &RiskDefaults) -> (Self, Vec<String>) {
        let mut notes = Vec::new();
        let mut profile = self;

        if profile.max_equity_pct <= Decimal::ZERO || profile.max_equity_pct > Decimal::ONE_HUNDRED
        {
            let fallback = defaults.max_equity_for(profile.investor_type);
            notes.push(format!(
                "max equity {}% out of range, using {} default of {}%",
                profile.max_equity_pct,
                profile.investor_type.label_pt(),
                fallback
            ));
            profile.max_equity_pct = fallback;
        }

        if profile.drift_tolerance_pct <= Decimal::ZERO {
            notes.push(format!(
                "drift tolerance {}% not usable, using default of {}%",
                profile.drift_tolerance_pct, defaults.drift_tolerance_pct
            ));
            profile.drift_tolerance_pct = defaults.drift_tolerance_pct;
        }

        (profile, notes)
    }
}

/// The macro team's directional stance
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum HouseView {
    Positive,
    Neutral,
    Negative,
}

impl HouseView {
    pub fn label_pt(&self) -> &'static str {
        match self {
            HouseView::Positive => "Positiva",
            HouseView::Neutral => "Neutra",
            HouseView::Negative => "Negativa",
        }
    }
}

impl FromStr for HouseView {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "POSITIVE" | "BULLISH" | "POSITIVA" | "POSITIVO" | "OTIMISTA" | "CONSTRUTIVA" => {
                Ok(HouseView::Positive)
            }
            "NEUTRAL" | "NEUTRA" | "NEUTRO" => Ok(HouseView::Neutral),
            "NEGATIVE" | "BEARISH" | "NEGATIVA" | "NEGATIVO" | "PESSIMISTA" | "CAUTELOSA" => {
                Ok(HouseView::Negative)
            }
            _ => Err(()),
        }
    }
}

/// Expected direction of the policy rate (Selic)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum RateDirection {
    Rising,
    Stable,
    Falling,
    #[default]
    Unknown,
}

impl RateDirection {
    pub fn label_pt(&self) -> &'static str {
        match self {
            RateDirection::Rising => "alta",
            RateDirection::Stable => "estabilidade",
            RateDirection::Falling => "queda",
            RateDirection::Unknown => "indefinida",
        }
    }
}

impl FromStr for RateDirection {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "RISING" | "UP" | "ALTA" | "SUBINDO" | "AUMENTO" => Ok(RateDirection::Rising),
            "STABLE" | "FLAT" | "ESTÁVEL" | "ESTAVEL" | "MANUTENÇÃO" | "MANUTENCAO" => {
                Ok(RateDirection::Stable)
            }
            "FALLING" | "DOWN" | "QUEDA" | "CORTE" | "CORTES" => Ok(RateDirection::Falling),
            "UNKNOWN" => Ok(RateDirection::Unknown),
            _ => Err(()),
        }
    }
}

/// Structured macro-economic context from the research report
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MacroView {
    pub house_view: HouseView,
    /// Inflation (IPCA) forecast, %
    pub inflation_expectation: Option<Decimal>,
    pub rate_direction: RateDirection,
    /// Projected terminal Selic, %
    pub selic_terminal: Option<Decimal>,
    pub gdp_growth: Option<Decimal>,
    /// Expected BRL/USD at end of year
    pub exchange_rate: Option<Decimal>,
}

impl MacroView {
    pub fn new(house_view: HouseView) -> Self {
        Self {
            house_view,
            inflation_expectation: None,
            rate_direction: RateDirection::Unknown,
            selic_terminal: None,
            gdp_growth: None,
            exchange_rate: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_portfolio_derives_equity_pct() {
        let portfolio = Portfolio::new(
            vec![
                Asset::new("PETR4", AssetClass::Equity, dec!(200000)),
                Asset::new("VALE3", AssetClass::Equity, dec!(170000)),
                Asset::new("CDB BANCO X", AssetClass::FixedIncome, dec!(630000)),
            ],
            None,
        );

        assert_eq!(portfolio.total_value(), dec!(1000000));
        assert_eq!(portfolio.equity_value(), dec!(370000));
        assert_eq!(portfolio.equity_pct(), dec!(37));
        assert_eq!(portfolio.fixed_income_pct(), dec!(63));
        assert_eq!(portfolio.assets()[0].allocation_pct, dec!(20));
        assert!(portfolio.issues().is_empty());
    }

    #[test]
    fn test_allocation_is_recomputed_on_build() {
        let mut stale = Asset::new("ITUB4", AssetClass::Equity, dec!(500));
        stale.allocation_pct = dec!(99);
        let portfolio = Portfolio::new(
            vec![stale, Asset::new("LFT", AssetClass::FixedIncome, dec!(500))],
            None,
        );
        assert_eq!(portfolio.assets()[0].allocation_pct, dec!(50));
    }

    #[test]
    fn test_stated_total_mismatch_is_flagged() {
        let portfolio = Portfolio::new(
            vec![Asset::new("PETR4", AssetClass::Equity, dec!(500))],
            Some(dec!(1000)),
        );
        assert_eq!(portfolio.total_value(), dec!(1000));
        assert_eq!(portfolio.equity_pct(), dec!(50));
        assert_eq!(portfolio.issues().len(), 1);
        assert!(portfolio.issues()[0].contains("50.0%"));
    }

    #[test]
    fn test_zero_value_asset_is_flagged() {
        let portfolio = Portfolio::new(
            vec![
                Asset::new("PETR4", AssetClass::Equity, dec!(100)),
                Asset::new("MGLU3", AssetClass::Equity, Decimal::ZERO),
            ],
            None,
        );
        assert!(portfolio.issues().iter().any(|i| i.contains("MGLU3")));
    }

    #[test]
    fn test_empty_portfolio() {
        let portfolio = Portfolio::empty();
        assert!(portfolio.is_empty());
        assert_eq!(portfolio.equity_pct(), Decimal::ZERO);
        assert!(portfolio.issues().is_empty());
    }

    #[test]
    fn test_with_position_derives_market_value() {
        let asset = Asset::with_position("petr4", AssetClass::Equity, dec!(1000), dec!(49.38));
        assert_eq!(asset.symbol, "PETR4");
        assert_eq!(asset.market_value, dec!(49380));
    }

    #[test]
    fn test_lenient_labels() {
        assert_eq!(AssetClass::classify("Ações"), AssetClass::Equity);
        assert_eq!(AssetClass::classify("Fixed_Income"), AssetClass::FixedIncome);
        assert_eq!(AssetClass::classify("Renda Fixa"), AssetClass::FixedIncome);
        assert_eq!(AssetClass::classify("Cripto"), AssetClass::Other);
        assert_eq!("Arrojado".parse(), Ok(InvestorType::Aggressive));
        assert_eq!("Bearish".parse(), Ok(HouseView::Negative));
        assert_eq!("queda".parse(), Ok(RateDirection::Falling));
    }

    #[test]
    fn test_risk_profile_normalization() {
        let defaults = RiskDefaults::default();
        let (profile, notes) = RiskProfile {
            investor_type: InvestorType::Moderate,
            max_equity_pct: dec!(150),
            drift_tolerance_pct: Decimal::ZERO,
        }
        .normalized(&defaults);

        assert_eq!(profile.max_equity_pct, dec!(40));
        assert_eq!(profile.drift_tolerance_pct, dec!(5));
        assert_eq!(notes.len(), 2);

        let (kept, notes) = RiskProfile {
            investor_type: InvestorType::Conservative,
            max_equity_pct: dec!(35),
            drift_tolerance_pct: dec!(3),
        }
        .normalized(&defaults);
        assert_eq!(kept.max_equity_pct, dec!(35));
        assert!(notes.is_empty());
    }
}
