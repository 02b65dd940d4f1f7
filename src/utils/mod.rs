//! Utility functions for formatting, parsing and reading input documents
//!
//! Currency and percentage display follows Brazilian locale conventions
//! (thousands `.`, decimals `,`). Parsing accepts both Brazilian and US
//! notation since statements and spreadsheets mix them freely.

use anyhow::{Context, Result};
use encoding_rs::WINDOWS_1252;
use rust_decimal::{Decimal, RoundingStrategy};
use std::fs;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info};

/// Currency symbol options for formatting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CurrencySymbol {
    /// Include "R$ " prefix (Brazilian Real)
    BRL,
    /// No currency symbol (for table cells, percentages)
    None,
}

/// Round a monetary amount to centavos, half away from zero.
///
/// Internal math keeps full precision; this is applied at output time only.
pub fn round_currency(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Format a value with Brazilian separators, rounded to 2 places.
///
/// # Examples
/// ```
/// use advisor::utils::{format_currency_with_width, CurrencySymbol};
/// use rust_decimal_macros::dec;
///
/// assert_eq!(
///     format_currency_with_width(dec!(12345.675), 0, CurrencySymbol::BRL),
///     "R$ 12.345,68"
/// );
/// assert_eq!(
///     format_currency_with_width(dec!(1234), 12, CurrencySymbol::None),
///     "    1.234,00"
/// );
/// ```
pub fn format_currency_with_width(value: Decimal, width: usize, symbol: CurrencySymbol) -> String {
    let rounded = round_currency(value);
    let sign = if rounded < Decimal::ZERO { "-" } else { "" };
    let formatted = format!("{:.2}", rounded.abs());
    let (integer_part, decimal_part) = formatted.split_once('.').unwrap_or((formatted.as_str(), "00"));

    let digits: Vec<char> = integer_part.chars().collect();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.iter().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(*c);
    }

    let prefix = match symbol {
        CurrencySymbol::BRL => "R$ ",
        CurrencySymbol::None => "",
    };

    let result = format!("{}{}{},{}", prefix, sign, grouped, decimal_part);
    if width > 0 && result.chars().count() < width {
        format!("{:>width$}", result, width = width)
    } else {
        result
    }
}

/// Format as Brazilian Real with symbol: "R$ 1.234,56"
///
/// # Examples
/// ```
/// use advisor::utils::format_currency;
/// use rust_decimal_macros::dec;
///
/// assert_eq!(format_currency(dec!(1234.56)), "R$ 1.234,56");
/// assert_eq!(format_currency(dec!(-500)), "R$ -500,00");
/// ```
pub fn format_currency(value: Decimal) -> String {
    format_currency_with_width(value, 0, CurrencySymbol::BRL)
}

/// Signed percentage with one decimal place: "+26,0%"
pub fn format_pct_signed(value: Decimal) -> String {
    let rounded = value.round_dp_with_strategy(1, RoundingStrategy::MidpointAwayFromZero);
    let sign = if rounded > Decimal::ZERO { "+" } else { "" };
    format!("{}{:.1}%", sign, rounded).replace('.', ",")
}

/// Unsigned percentage with one decimal place: "37,0%"
pub fn format_pct(value: Decimal) -> String {
    let rounded = value.round_dp_with_strategy(1, RoundingStrategy::MidpointAwayFromZero);
    format!("{:.1}%", rounded).replace('.', ",")
}

/// Parse a monetary amount written in Brazilian or US notation.
///
/// When both separators appear, the rightmost one is the decimal separator.
/// A lone comma is a decimal comma. Returns `None` for anything else.
///
/// # Examples
/// ```
/// use advisor::utils::parse_brl_amount;
/// use rust_decimal_macros::dec;
///
/// assert_eq!(parse_brl_amount("R$ 1.000,50"), Some(dec!(1000.50)));
/// assert_eq!(parse_brl_amount("R$386,858.82"), Some(dec!(386858.82)));
/// assert_eq!(parse_brl_amount("abc"), None);
/// ```
pub fn parse_brl_amount(text: &str) -> Option<Decimal> {
    let cleaned: String = text
        .replace("R$", "")
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '\u{a0}')
        .collect();
    if cleaned.is_empty() {
        return None;
    }

    let normalized = match (cleaned.rfind(','), cleaned.rfind('.')) {
        (Some(comma), Some(dot)) if comma > dot => cleaned.replace('.', "").replace(',', "."),
        (Some(_), Some(_)) => cleaned.replace(',', ""),
        (Some(_), None) => cleaned.replace(',', "."),
        _ => cleaned,
    };

    Decimal::from_str(&normalized).ok()
}

/// Parse a percentage such as "-41,7%" or "+43.5" into percentage points
pub fn parse_pct(text: &str) -> Option<Decimal> {
    let trimmed = text.trim().trim_end_matches('%').trim();
    let unsigned = trimmed.strip_prefix('+').unwrap_or(trimmed);
    parse_brl_amount(unsigned)
}

/// Read an input document as text.
///
/// PDFs go through text extraction; anything else is read as UTF-8, falling
/// back to Windows-1252 for files exported by older Brazilian tooling.
pub fn read_document<P: AsRef<Path>>(path: P) -> Result<String> {
    let path = path.as_ref();
    let is_pdf = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("pdf"))
        .unwrap_or(false);

    if is_pdf {
        info!("Extracting text from PDF: {:?}", path);
        return pdf_extract::extract_text(path)
            .with_context(|| format!("Failed to extract text from {}", path.display()));
    }

    let bytes = fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    match String::from_utf8(bytes) {
        Ok(text) => Ok(text),
        Err(err) => {
            debug!("{:?} is not UTF-8, decoding as Windows-1252", path);
            let (decoded, _, _) = WINDOWS_1252.decode(err.as_bytes());
            Ok(decoded.into_owned())
        }
    }
}
