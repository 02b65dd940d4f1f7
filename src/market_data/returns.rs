use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

use super::{Period, PeriodWindow, PriceTable};
use crate::pipeline::{DataQualityWarning, Stage};

/// Month-over-month return for one symbol, in percentage points
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReturnRecord {
    pub symbol: String,
    pub period: Period,
    pub previous_price: Decimal,
    pub price: Decimal,
    pub return_pct: Decimal,
}

/// Return history plus the latest return per symbol
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MarketData {
    records: Vec<ReturnRecord>,
    latest: BTreeMap<String, Decimal>,
}

impl MarketData {
    /// Build from records; `latest` keeps each symbol's most recent period.
    pub fn new(records: Vec<ReturnRecord>) -> Self {
        let mut newest: BTreeMap<String, (Period, Decimal)> = BTreeMap::new();
        for record in &records {
            let entry = newest
                .entry(record.symbol.clone())
                .or_insert((record.period, record.return_pct));
            if record.period >= entry.0 {
                *entry = (record.period, record.return_pct);
            }
        }

        let latest = newest
            .into_iter()
            .map(|(symbol, (_, return_pct))| (symbol, return_pct))
            .collect();

        Self { records, latest }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn records(&self) -> &[ReturnRecord] {
        &self.records
    }

    pub fn latest(&self) -> &BTreeMap<String, Decimal> {
        &self.latest
    }

    pub fn latest_return(&self, symbol: &str) -> Option<Decimal> {
        self.latest.get(&symbol.to_uppercase()).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Output of a calculation run
#[derive(Debug, Clone, Default)]
pub struct ReturnCalculation {
    pub market_data: MarketData,
    pub warnings: Vec<DataQualityWarning>,
}

/// Turns a price table into monthly returns.
///
/// A record is emitted for each `(symbol, period)` inside the window whose
/// immediately preceding calendar month also has a price. Gaps are not
/// bridged: a symbol priced in January and March gets no March return.
#[derive(Debug, Clone, Default)]
pub struct ReturnCalculator {
    window: PeriodWindow,
}

impl ReturnCalculator {
    pub fn new(window: PeriodWindow) -> Self {
        Self { window }
    }

    /// `required_symbols` are the symbols the caller needs a return for;
    /// each one left without any return yields a warning.
    pub fn calculate(&self, table: &PriceTable, required_symbols: &[String]) -> ReturnCalculation {
        let mut warnings = Vec::new();

        let mut prices: BTreeMap<(String, Period), Decimal> = BTreeMap::new();
        for row in table.rows() {
            let key = (row.symbol.clone(), row.period);
            if let Some(previous) = prices.insert(key, row.price) {
                warn!(
                    "Duplicate price for {} {}: {} replaced by {}",
                    row.symbol, row.period, previous, row.price
                );
                warnings.push(DataQualityWarning::for_symbol(
                    Stage::MarketData,
                    &row.symbol,
                    format!(
                        "duplicate price for {}, keeping the last value ({})",
                        row.period, row.price
                    ),
                ));
            }
        }

        // Keys are ordered by symbol then period, so the first entry is the earliest
        let mut first_priced: BTreeMap<&str, Period> = BTreeMap::new();
        for (symbol, period) in prices.keys() {
            first_priced.entry(symbol.as_str()).or_insert(*period);
        }

        let mut records = Vec::new();
        for ((symbol, period), price) in &prices {
            if !self.window.contains(*period) {
                continue;
            }

            let predecessor = period.predecessor();
            let Some(previous_price) = prices.get(&(symbol.clone(), predecessor)).copied() else {
                if first_priced.get(symbol.as_str()).is_some_and(|first| first < period) {
                    warn!("No price for {} in {}, no return for {}", symbol, predecessor, period);
                    warnings.push(DataQualityWarning::for_symbol(
                        Stage::MarketData,
                        symbol,
                        format!("missing price for {}, no return for {}", predecessor, period),
                    ));
                } else {
                    debug!("{} starts in {}, no return for it", symbol, period);
                }
                continue;
            };

            if previous_price <= Decimal::ZERO {
                warn!(
                    "Non-positive price for {} in {}, cannot compute {} return",
                    symbol, predecessor, period
                );
                warnings.push(DataQualityWarning::for_symbol(
                    Stage::MarketData,
                    symbol,
                    format!(
                        "non-positive price {} in {}, no return for {}",
                        previous_price, predecessor, period
                    ),
                ));
                continue;
            }

            let return_pct = (*price - previous_price) / previous_price * Decimal::ONE_HUNDRED;
            records.push(ReturnRecord {
                symbol: symbol.clone(),
                period: *period,
                previous_price,
                price: *price,
                return_pct,
            });
        }

        let market_data = MarketData::new(records);

        for symbol in required_symbols {
            if market_data.latest_return(symbol).is_none() {
                warn!("No return data for {}", symbol);
                warnings.push(DataQualityWarning::for_symbol(
                    Stage::MarketData,
                    symbol,
                    "no valid return period in the price table",
                ));
            }
        }

        info!(
            "Calculated {} returns for {} symbols",
            market_data.records().len(),
            market_data.latest().len()
        );

        ReturnCalculation {
            market_data,
            warnings,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market_data::PriceRow;
    use rust_decimal_macros::dec;

    fn p(year: i32, month: u32) -> Period {
        Period::new(year, month).unwrap()
    }

    fn row(symbol: &str, period: Period, price: Decimal) -> PriceRow {
        PriceRow::new(symbol, period, price)
    }

    #[test]
    fn test_return_is_percentage_points() {
        let table = PriceTable::from_rows(vec![
            row("PETR4", p(2025, 1), dec!(100)),
            row("PETR4", p(2025, 2), dec!(80)),
            row("VALE3", p(2025, 1), dec!(10000)),
            row("VALE3", p(2025, 2), dec!(7999)),
        ]);
        let result = ReturnCalculator::default().calculate(&table, &[]);

        assert_eq!(result.market_data.latest_return("PETR4"), Some(dec!(-20)));
        assert_eq!(result.market_data.latest_return("VALE3"), Some(dec!(-20.01)));
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn test_first_period_and_gaps_have_no_return() {
        let table = PriceTable::from_rows(vec![
            row("ITUB4", p(2025, 1), dec!(30)),
            row("ITUB4", p(2025, 3), dec!(33)),
        ]);
        let result = ReturnCalculator::default().calculate(&table, &[]);

        assert!(result.market_data.is_empty());
        assert_eq!(result.market_data.latest_return("ITUB4"), None);
        assert_eq!(result.warnings.len(), 1);
        assert!(result.warnings[0].message.contains("2025-02"));
    }

    #[test]
    fn test_gap_inside_history_warns() {
        let table = PriceTable::from_rows(vec![
            row("ITUB4", p(2025, 1), dec!(30)),
            row("ITUB4", p(2025, 2), dec!(31)),
            row("ITUB4", p(2025, 4), dec!(35)),
        ]);
        let required = vec!["ITUB4".to_string()];
        let result = ReturnCalculator::default().calculate(&table, &required);

        assert_eq!(result.market_data.records().len(), 1);
        assert_eq!(result.market_data.records()[0].period, p(2025, 2));
        assert_eq!(result.warnings.len(), 1);
        assert_eq!(result.warnings[0].symbol.as_deref(), Some("ITUB4"));
        assert_eq!(result.warnings[0].stage, Stage::MarketData);
        assert!(result.warnings[0].message.contains("2025-03"));
    }

    #[test]
    fn test_year_boundary_predecessor() {
        let table = PriceTable::from_rows(vec![
            row("WEGE3", p(2024, 12), dec!(40)),
            row("WEGE3", p(2025, 1), dec!(44)),
        ]);
        let result = ReturnCalculator::default().calculate(&table, &[]);

        assert_eq!(result.market_data.records().len(), 1);
        assert_eq!(result.market_data.records()[0].return_pct, dec!(10));
        assert_eq!(result.market_data.records()[0].previous_price, dec!(40));
    }

    #[test]
    fn test_latest_is_most_recent_period_regardless_of_row_order() {
        let table = PriceTable::from_rows(vec![
            row("BBAS3", p(2025, 3), dec!(33)),
            row("BBAS3", p(2025, 1), dec!(30)),
            row("BBAS3", p(2025, 2), dec!(30)),
        ]);
        let result = ReturnCalculator::default().calculate(&table, &[]);

        assert_eq!(result.market_data.records().len(), 2);
        assert_eq!(result.market_data.latest_return("bbas3"), Some(dec!(10)));
    }

    #[test]
    fn test_duplicate_rows_last_wins_with_warning() {
        let table = PriceTable::from_rows(vec![
            row("PETR4", p(2025, 1), dec!(40)),
            row("PETR4", p(2025, 2), dec!(41)),
            row("PETR4", p(2025, 2), dec!(50)),
        ]);
        let result = ReturnCalculator::default().calculate(&table, &[]);

        assert_eq!(result.market_data.latest_return("PETR4"), Some(dec!(25)));
        assert_eq!(result.warnings.len(), 1);
        assert_eq!(result.warnings[0].symbol.as_deref(), Some("PETR4"));
    }

    #[test]
    fn test_non_positive_predecessor_is_skipped_with_warning() {
        let table = PriceTable::from_rows(vec![
            row("MGLU3", p(2025, 1), dec!(0)),
            row("MGLU3", p(2025, 2), dec!(2)),
        ]);
        let result = ReturnCalculator::default().calculate(&table, &[]);

        assert!(result.market_data.is_empty());
        assert_eq!(result.warnings.len(), 1);
        assert!(result.warnings[0].message.contains("non-positive"));
    }

    #[test]
    fn test_window_limits_emitted_periods() {
        let table = PriceTable::from_rows(vec![
            row("PETR4", p(2025, 1), dec!(10)),
            row("PETR4", p(2025, 2), dec!(11)),
            row("PETR4", p(2025, 3), dec!(22)),
        ]);
        let calculator = ReturnCalculator::new(PeriodWindow::new(None, Some(p(2025, 2))));
        let result = calculator.calculate(&table, &[]);

        assert_eq!(result.market_data.records().len(), 1);
        assert_eq!(result.market_data.latest_return("PETR4"), Some(dec!(10)));
    }

    #[test]
    fn test_required_symbol_without_returns_warns() {
        let table = PriceTable::from_rows(vec![
            row("PETR4", p(2025, 1), dec!(10)),
            row("PETR4", p(2025, 2), dec!(11)),
        ]);
        let required = vec!["PETR4".to_string(), "ABEV3".to_string()];
        let result = ReturnCalculator::default().calculate(&table, &required);

        assert_eq!(result.warnings.len(), 1);
        assert_eq!(result.warnings[0].symbol.as_deref(), Some("ABEV3"));
        assert_eq!(result.warnings[0].stage, Stage::MarketData);
    }
}
