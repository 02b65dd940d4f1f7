//! Offline, rule-of-thumb document extraction
//!
//! Reads the statement line by line: section headers set the asset class, lines
//! with an `R$` amount (or a delimited numeric field) become positions, and a
//! line mentioning a total sets the stated total. The risk and macro documents
//! are scanned for keywords and percentages.

use regex::Regex;
use rust_decimal::Decimal;
use tracing::{debug, info};

use super::{DocumentExtractor, Extraction, RawDocuments};
use crate::compliance::matcher::fold;
use crate::config::RiskDefaults;
use crate::error::{AdvisorError, Result};
use crate::models::{
    Asset, AssetClass, HouseView, InvestorType, MacroView, Portfolio, RateDirection, RiskProfile,
};
use crate::utils::{parse_brl_amount, parse_pct};

/// Class words that mark a "Total em ..." line as a subtotal
const CLASS_WORDS: [&str; 8] = [
    "acoes",
    "renda variavel",
    "renda fixa",
    "fundos",
    "stocks",
    "equity",
    "fixed income",
    "tesouro",
];

const PROFILE_WORDS: [(&str, InvestorType); 9] = [
    ("conservador", InvestorType::Conservative),
    ("conservadora", InvestorType::Conservative),
    ("conservative", InvestorType::Conservative),
    ("moderado", InvestorType::Moderate),
    ("moderada", InvestorType::Moderate),
    ("moderate", InvestorType::Moderate),
    ("arrojado", InvestorType::Aggressive),
    ("agressivo", InvestorType::Aggressive),
    ("aggressive", InvestorType::Aggressive),
];

const NEGATIVE_WORDS: [&str; 9] = [
    "pessimista",
    "bearish",
    "cautela",
    "cautelosa",
    "gelo fino",
    "deterioracao",
    "negativa",
    "negativo",
    "recessao",
];

const POSITIVE_WORDS: [&str; 7] = [
    "otimista",
    "bullish",
    "construtiva",
    "construtivo",
    "positiva",
    "positivo",
    "recuperacao",
];

#[derive(Debug, Clone, Default)]
pub struct HeuristicExtractor {
    risk_defaults: RiskDefaults,
}

impl HeuristicExtractor {
    pub fn new(risk_defaults: RiskDefaults) -> Self {
        Self { risk_defaults }
    }
}

impl DocumentExtractor for HeuristicExtractor {
    fn name(&self) -> &str {
        "heuristic"
    }

    fn extract(&self, documents: &RawDocuments) -> Result<Extraction> {
        let portfolio = parse_portfolio(&documents.portfolio)?;
        let risk_profile = parse_risk_profile(&documents.risk_profile, &self.risk_defaults)?;
        let macro_view = parse_macro_view(&documents.macro_analysis)?;

        info!(
            "Extracted {} assets, {} profile, house view {}",
            portfolio.assets().len(),
            risk_profile.investor_type.label_pt(),
            macro_view.house_view.label_pt()
        );

        Ok(Extraction {
            portfolio,
            risk_profile,
            macro_view,
        })
    }
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|e| AdvisorError::ParseError(format!("bad pattern: {}", e)))
}

fn has_word(folded: &str, word: &str) -> bool {
    folded
        .split(|c: char| !c.is_alphanumeric())
        .any(|token| token == word)
}

fn split_fields(line: &str) -> Vec<&str> {
    if line.contains(';') || line.contains('|') || line.contains('\t') {
        line.split(|c| c == ';' || c == '|' || c == '\t')
            .map(str::trim)
            .filter(|f| !f.is_empty())
            .collect()
    } else {
        line.split("  ")
            .map(str::trim)
            .filter(|f| !f.is_empty())
            .collect()
    }
}

fn header_label(line: &str) -> &str {
    let trimmed = line.trim_matches(|c: char| c == '#' || c == '*' || c == ':' || c.is_whitespace());
    trimmed.split('(').next().unwrap_or(trimmed).trim()
}

/// Amount in the last numeric field of a `;`/`|`/tab delimited line
fn delimited_amount(line: &str) -> Option<(Decimal, usize)> {
    if !(line.contains(';') || line.contains('|') || line.contains('\t')) {
        return None;
    }
    let fields = split_fields(line);
    fields
        .iter()
        .enumerate()
        .rev()
        .filter(|(_, f)| !f.ends_with('%'))
        .find_map(|(idx, f)| parse_brl_amount(f).map(|v| (v, idx)))
}

/// Parse a portfolio statement into a [`Portfolio`]
pub fn parse_portfolio(text: &str) -> Result<Portfolio> {
    let ticker_re = compile(r"\b([A-Z]{4}\d{1,2})\b")?;
    let money_re = compile(r"R\$\s*(-?\d[\d.,]*)")?;

    let mut section: Option<AssetClass> = None;
    let mut stated_total: Option<Decimal> = None;
    let mut assets = Vec::new();

    for raw_line in text.lines() {
        let line = raw_line.trim();
        if line.is_empty() {
            continue;
        }
        let folded = fold(line);

        // Amount and the label text preceding it
        let money = money_re
            .captures(line)
            .and_then(|c| {
                let whole = c.get(0)?;
                parse_brl_amount(&c[1]).map(|v| (v, line[..whole.start()].to_string()))
            })
            .or_else(|| {
                delimited_amount(line).map(|(v, idx)| {
                    let label = if idx > 0 { split_fields(line)[0] } else { "" };
                    (v, label.to_string())
                })
            });

        let Some((value, label)) = money else {
            if let Ok(class) = header_label(line).parse::<AssetClass>() {
                debug!("Section {:?} starts at '{}'", class, line);
                section = Some(class);
            }
            continue;
        };

        if has_word(&folded, "total") || has_word(&folded, "subtotal") {
            if CLASS_WORDS.iter().any(|w| folded.contains(w)) {
                debug!("Skipping subtotal line '{}'", line);
            } else if stated_total.is_none() {
                stated_total = Some(value);
            }
            continue;
        }

        let ticker = ticker_re.captures(line).map(|c| c[1].to_string());
        let label = label
            .trim_matches(|c: char| c == ':' || c == '-' || c == '|' || c == ';' || c.is_whitespace())
            .to_string();

        let first_word = label.split_whitespace().next().unwrap_or("");
        let inline_class = split_fields(line)
            .into_iter()
            .chain(std::iter::once(first_word))
            .find_map(|f| f.parse::<AssetClass>().ok());
        let asset_class = inline_class.or(section).unwrap_or(if ticker.is_some() {
            AssetClass::Equity
        } else {
            AssetClass::Other
        });

        let symbol = match ticker {
            Some(ticker) => ticker,
            None if !label.is_empty() => label,
            None => {
                debug!("No symbol on line '{}', skipped", line);
                continue;
            }
        };

        debug!("Position {} ({:?}): {}", symbol, asset_class, value);
        assets.push(Asset::new(symbol, asset_class, value));
    }

    if assets.is_empty() {
        return Err(AdvisorError::ParseError(
            "no positions found in portfolio statement".to_string(),
        ));
    }

    Ok(Portfolio::new(assets, stated_total))
}

/// Parse the risk profile; missing limits fall back to the profile defaults
pub fn parse_risk_profile(text: &str, defaults: &RiskDefaults) -> Result<RiskProfile> {
    let pct_re = compile(r"([-+]?\d+(?:[.,]\d+)?)\s*%")?;
    let folded = fold(text);

    let investor_type = PROFILE_WORDS
        .iter()
        .filter_map(|(word, kind)| {
            folded
                .match_indices(word)
                .find(|(idx, _)| {
                    folded[..*idx]
                        .chars()
                        .next_back()
                        .map_or(true, |c| !c.is_alphanumeric())
                })
                .map(|(idx, _)| (idx, *kind))
        })
        .min_by_key(|(idx, _)| *idx)
        .map(|(_, kind)| kind)
        .ok_or_else(|| {
            AdvisorError::ParseError("risk profile names no investor profile".to_string())
        })?;

    let first_pct = |line: &str| {
        pct_re
            .captures(line)
            .and_then(|c| parse_pct(&c[1]))
    };

    let mut max_equity_pct = None;
    let mut drift_tolerance_pct = None;
    for line in folded.lines() {
        let about_equity = line.contains("renda variavel")
            || has_word(line, "acoes")
            || has_word(line, "equity")
            || has_word(line, "equities");
        let is_limit = line.contains("maxim")
            || line.contains("limite")
            || has_word(line, "teto")
            || has_word(line, "ate")
            || has_word(line, "max");
        let is_drift =
            line.contains("drift") || line.contains("tolerancia") || line.contains("desvio");

        if is_drift && drift_tolerance_pct.is_none() {
            drift_tolerance_pct = first_pct(line);
        } else if about_equity && is_limit && max_equity_pct.is_none() {
            max_equity_pct = first_pct(line);
        }
    }

    Ok(RiskProfile {
        investor_type,
        max_equity_pct: max_equity_pct.unwrap_or_else(|| defaults.max_equity_for(investor_type)),
        drift_tolerance_pct: drift_tolerance_pct.unwrap_or(defaults.drift_tolerance_pct),
    })
}

/// Parse the macro report. Never fails: an unreadable report is neutral.
pub fn parse_macro_view(text: &str) -> Result<MacroView> {
    let pct_re = compile(r"([-+]?\d+(?:[.,]\d+)?)\s*%")?;
    let number_re = compile(r"(\d+[.,]\d+)")?;
    let folded = fold(text);

    let stated_view = folded.lines().find_map(|line| {
        let (key, value) = line.split_once(':')?;
        if key.contains("visao da casa") || key.contains("house view") || key.trim() == "visao" {
            value.split_whitespace().next()?.parse::<HouseView>().ok()
        } else {
            None
        }
    });

    let house_view = stated_view.unwrap_or_else(|| {
        let negative: usize = NEGATIVE_WORDS.iter().map(|w| folded.matches(w).count()).sum();
        let positive: usize = POSITIVE_WORDS.iter().map(|w| folded.matches(w).count()).sum();
        debug!("House view keywords: {} negative, {} positive", negative, positive);
        match negative.cmp(&positive) {
            std::cmp::Ordering::Greater => HouseView::Negative,
            std::cmp::Ordering::Less => HouseView::Positive,
            std::cmp::Ordering::Equal => HouseView::Neutral,
        }
    });

    let first_pct = |line: &str| pct_re.captures(line).and_then(|c| parse_pct(&c[1]));
    let mut view = MacroView::new(house_view);

    for line in folded.lines() {
        if view.inflation_expectation.is_none() && (has_word(line, "ipca") || line.contains("inflacao")) {
            view.inflation_expectation = first_pct(line);
        }
        if view.selic_terminal.is_none() && has_word(line, "selic") {
            view.selic_terminal = first_pct(line);
            view.rate_direction = rate_direction(line);
        }
        if view.gdp_growth.is_none() && (has_word(line, "pib") || has_word(line, "gdp")) {
            view.gdp_growth = first_pct(line);
        }
        if view.exchange_rate.is_none()
            && (line.contains("cambio") || line.contains("r$/us$") || line.contains("dolar"))
        {
            view.exchange_rate = number_re.captures_iter(line).find_map(|c| {
                let m = c.get(1)?;
                let rest = line[m.end()..].trim_start();
                if rest.starts_with('%') {
                    None
                } else {
                    parse_brl_amount(m.as_str())
                }
            });
        }
    }

    Ok(view)
}

fn rate_direction(line: &str) -> RateDirection {
    let any = |words: &[&str]| words.iter().any(|w| line.contains(w));
    if any(&["alta", "elevacao", "aumento", "subir", "aperto"]) {
        RateDirection::Rising
    } else if any(&["queda", "corte", "reducao", "cair", "afrouxamento"]) {
        RateDirection::Falling
    } else if any(&["manutencao", "estavel", "estabilidade"]) {
        RateDirection::Stable
    } else {
        RateDirection::Unknown
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const STATEMENT: &str = "\
Extrato consolidado - Cliente Albert
Patrimônio total: R$ 200.000,00

## Ações
PETR4   R$ 49.380,00   +43,5%
VALE3 - R$ 20.620,00 (-41,7%)
Total em Ações: R$ 70.000,00

## Renda Fixa
CDB Banco XP 2027   R$ 80.000,00
Tesouro IPCA+ 2035: R$ 50.000,00
";

    #[test]
    fn test_parse_statement_sections_and_total() {
        let portfolio = parse_portfolio(STATEMENT).unwrap();
        let symbols: Vec<&str> = portfolio.assets().iter().map(|a| a.symbol.as_str()).collect();

        assert_eq!(symbols, vec!["PETR4", "VALE3", "CDB BANCO XP 2027", "TESOURO IPCA+ 2035"]);
        assert_eq!(portfolio.total_value(), dec!(200000));
        assert_eq!(portfolio.equity_value(), dec!(70000));
        assert_eq!(portfolio.equity_pct(), dec!(35));
        assert_eq!(portfolio.assets()[2].asset_class, AssetClass::FixedIncome);
        assert!(portfolio.issues().is_empty());
    }

    #[test]
    fn test_parse_delimited_statement() {
        let text = "Ativo;Classe;Valor\nITUB4;Ações;30000,50\nLCA Banco;Renda Fixa;70.000,00\n";
        let portfolio = parse_portfolio(text).unwrap();

        assert_eq!(portfolio.assets().len(), 2);
        assert_eq!(portfolio.assets()[0].symbol, "ITUB4");
        assert_eq!(portfolio.assets()[0].market_value, dec!(30000.50));
        assert_eq!(portfolio.assets()[1].asset_class, AssetClass::FixedIncome);
    }

    #[test]
    fn test_statement_without_positions_is_parse_error() {
        let err = parse_portfolio("Prezado cliente,\nsem posições.").unwrap_err();
        assert!(matches!(err, AdvisorError::ParseError(_)));
    }

    #[test]
    fn test_parse_risk_profile() {
        let text = "Perfil do investidor: MODERADO\n\
                    Alocação máxima em renda variável: 35%\n\
                    Tolerância de desvio: 3%";
        let profile = parse_risk_profile(text, &RiskDefaults::default()).unwrap();

        assert_eq!(profile.investor_type, InvestorType::Moderate);
        assert_eq!(profile.max_equity_pct, dec!(35));
        assert_eq!(profile.drift_tolerance_pct, dec!(3));
    }

    #[test]
    fn test_risk_profile_defaults() {
        let profile =
            parse_risk_profile("Cliente de perfil arrojado.", &RiskDefaults::default()).unwrap();
        assert_eq!(profile.investor_type, InvestorType::Aggressive);
        assert_eq!(profile.max_equity_pct, dec!(70));
        assert_eq!(profile.drift_tolerance_pct, dec!(5));

        assert!(parse_risk_profile("sem dados", &RiskDefaults::default()).is_err());
    }

    #[test]
    fn test_parse_macro_view() {
        let text = "Relatório Macro\n\
                    Visão da casa: cautelosa\n\
                    Projetamos IPCA de 4,8% em 2025.\n\
                    Selic terminal de 15,00% com viés de alta.\n\
                    PIB: crescimento de 2,1%.\n\
                    Câmbio: R$ 5,70 ao fim do ano.";
        let view = parse_macro_view(text).unwrap();

        assert_eq!(view.house_view, HouseView::Negative);
        assert_eq!(view.inflation_expectation, Some(dec!(4.8)));
        assert_eq!(view.selic_terminal, Some(dec!(15.00)));
        assert_eq!(view.rate_direction, RateDirection::Rising);
        assert_eq!(view.gdp_growth, Some(dec!(2.1)));
        assert_eq!(view.exchange_rate, Some(dec!(5.70)));
    }

    #[test]
    fn test_macro_view_from_keywords() {
        let view = parse_macro_view("Seguimos otimistas? Não: patinando no gelo fino, com cautela.")
            .unwrap();
        assert_eq!(view.house_view, HouseView::Negative);
        assert_eq!(parse_macro_view("").unwrap().house_view, HouseView::Neutral);
    }
}
