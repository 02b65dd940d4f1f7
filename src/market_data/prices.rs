use csv::{ReaderBuilder, StringRecord, Trim};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::Period;
use crate::error::{AdvisorError, Result};
use crate::pipeline::{DataQualityWarning, Stage};
use crate::utils::parse_brl_amount;

/// One closing price for a symbol in a period
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceRow {
    pub symbol: String,
    pub period: Period,
    pub price: Decimal,
}

impl PriceRow {
    pub fn new(symbol: impl Into<String>, period: Period, price: Decimal) -> Self {
        Self {
            symbol: symbol.into().trim().to_uppercase(),
            period,
            price,
        }
    }
}

/// Static historical price table, plus the rows that had to be skipped
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PriceTable {
    rows: Vec<PriceRow>,
    warnings: Vec<DataQualityWarning>,
}

/// Column layout detected from the CSV header
#[derive(Debug)]
enum CsvLayout {
    /// One row per (symbol, period, price)
    Long {
        symbol: usize,
        period: usize,
        price: usize,
    },
    /// One row per symbol with current and last-month prices side by side
    Snapshot {
        symbol: usize,
        current: usize,
        previous: usize,
    },
}

impl PriceTable {
    pub fn from_rows(rows: Vec<PriceRow>) -> Self {
        Self {
            rows,
            warnings: Vec::new(),
        }
    }

    pub fn rows(&self) -> &[PriceRow] {
        &self.rows
    }

    /// Rows skipped while parsing
    pub fn warnings(&self) -> &[DataQualityWarning] {
        &self.warnings
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Parse a price CSV.
    ///
    /// Long tables (`symbol, period, price`) and snapshot tables
    /// (`Asset class, Asset, Current price, Last month price`) are both
    /// accepted; snapshot prices are placed at `as_of` and its predecessor.
    /// Malformed rows are skipped with a warning. An empty input yields an
    /// empty table; a table whose header is unrecognisable, or whose rows are
    /// all malformed, is a `ParseError`.
    pub fn parse_csv(content: &str, as_of: Period) -> Result<Self> {
        if content.trim().is_empty() {
            warn!("Empty price table, no returns will be calculated");
            return Ok(Self {
                rows: Vec::new(),
                warnings: vec![DataQualityWarning::new(
                    Stage::MarketData,
                    "price table is empty",
                )],
            });
        }

        let delimiter = detect_delimiter(content);
        let mut reader = ReaderBuilder::new()
            .delimiter(delimiter)
            .flexible(true)
            .trim(Trim::All)
            .from_reader(content.as_bytes());

        let headers = reader
            .headers()
            .map_err(|e| AdvisorError::ParseError(format!("failed to read price header: {}", e)))?
            .clone();
        debug!("Price CSV headers: {:?}", headers);

        let layout = detect_layout(&headers)?;
        debug!("Price CSV layout: {:?}", layout);

        let mut table = Self::default();
        let mut data_rows = 0usize;

        for (idx, result) in reader.records().enumerate() {
            let row_num = idx + 2;
            let record = match result {
                Ok(record) => record,
                Err(e) => {
                    table.skip_row(row_num, &e.to_string());
                    data_rows += 1;
                    continue;
                }
            };
            if record.iter().all(|field| field.is_empty()) {
                continue;
            }
            data_rows += 1;

            match parse_record(&record, &layout, as_of) {
                Ok(rows) => table.rows.extend(rows),
                Err(reason) => table.skip_row(row_num, &reason),
            }
        }

        if data_rows > 0 && table.rows.is_empty() {
            return Err(AdvisorError::ParseError(format!(
                "none of the {} price rows could be parsed",
                data_rows
            )));
        }

        info!(
            "Parsed {} price points ({} rows skipped)",
            table.rows.len(),
            table.warnings.len()
        );
        Ok(table)
    }

    fn skip_row(&mut self, row_num: usize, reason: &str) {
        warn!("Skipping price row {}: {}", row_num, reason);
        self.warnings.push(DataQualityWarning::new(
            Stage::MarketData,
            format!("price row {} skipped: {}", row_num, reason),
        ));
    }
}

fn detect_delimiter(content: &str) -> u8 {
    let header = content.lines().find(|l| !l.trim().is_empty()).unwrap_or("");
    let semicolons = header.matches(';').count();
    let commas = header.matches(',').count();
    if semicolons > 0 && semicolons >= commas {
        b';'
    } else {
        b','
    }
}

fn detect_layout(headers: &StringRecord) -> Result<CsvLayout> {
    let mut symbol_idx = None;
    let mut period_idx = None;
    let mut price_idx = None;
    let mut current_idx = None;
    let mut previous_idx = None;

    for (idx, header) in headers.iter().enumerate() {
        let text = header.to_lowercase();
        let is_price = text.contains("price") || text.contains("preço") || text.contains("preco");

        // Symbol ("Asset class" is a classification, not the ticker)
        if (text.contains("symbol")
            || text.contains("ticker")
            || text.contains("asset")
            || text.contains("ativo")
            || text.contains("código")
            || text.contains("codigo"))
            && !text.contains("class")
            && symbol_idx.is_none()
        {
            symbol_idx = Some(idx);
        }

        // Period
        if text.contains("period")
            || text.contains("período")
            || text.contains("month") && !is_price
            || text.contains("mês")
            || text.contains("date")
            || text.contains("data")
        {
            period_idx = Some(idx);
        }

        // Snapshot columns
        if is_price && (text.contains("current") || text.contains("atual")) {
            current_idx = Some(idx);
        } else if is_price
            && (text.contains("last") || text.contains("previous") || text.contains("anterior"))
        {
            previous_idx = Some(idx);
        } else if is_price || text.contains("close") || text.contains("fechamento") {
            price_idx = Some(idx);
        }
    }

    let symbol = symbol_idx
        .ok_or_else(|| AdvisorError::ParseError("price table has no symbol column".to_string()))?;

    match (current_idx, previous_idx, period_idx, price_idx) {
        (Some(current), Some(previous), _, _) => Ok(CsvLayout::Snapshot {
            symbol,
            current,
            previous,
        }),
        (_, _, Some(period), Some(price)) => Ok(CsvLayout::Long {
            symbol,
            period,
            price,
        }),
        _ => Err(AdvisorError::ParseError(format!(
            "unrecognised price table header: {}",
            headers.iter().collect::<Vec<_>>().join(", ")
        ))),
    }
}

fn parse_record(
    record: &StringRecord,
    layout: &CsvLayout,
    as_of: Period,
) -> std::result::Result<Vec<PriceRow>, String> {
    let field = |idx: usize, name: &str| {
        record
            .get(idx)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| format!("missing {}", name))
    };
    let price = |idx: usize, name: &str| -> std::result::Result<Decimal, String> {
        let raw = field(idx, name)?;
        let value = parse_brl_amount(raw).ok_or_else(|| format!("invalid {} '{}'", name, raw))?;
        if value <= Decimal::ZERO {
            return Err(format!("non-positive {} '{}'", name, raw));
        }
        Ok(value)
    };

    match *layout {
        CsvLayout::Long {
            symbol,
            period,
            price: price_col,
        } => {
            let symbol = field(symbol, "symbol")?;
            let period_raw = field(period, "period")?;
            let period: Period = period_raw.parse()?;
            let value = price(price_col, "price")?;
            Ok(vec![PriceRow::new(symbol, period, value)])
        }
        CsvLayout::Snapshot {
            symbol,
            current,
            previous,
        } => {
            let symbol = field(symbol, "symbol")?;
            let current = price(current, "current price")?;
            let previous = price(previous, "last month price")?;
            Ok(vec![
                PriceRow::new(symbol, as_of.predecessor(), previous),
                PriceRow::new(symbol, as_of, current),
            ])
        }
    }
}
