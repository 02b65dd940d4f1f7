// Compliance module - forbidden wording, disclaimer enforcement and plan cross-check

pub mod matcher;

use regex::Regex;
use serde::Serialize;
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

use crate::config::ComplianceConfig;
use crate::error::{AdvisorError, Result};
use crate::pipeline::{DataQualityWarning, Stage};
use crate::strategy::RebalancingPlan;
use matcher::{fold, TermMatcher};

pub use matcher::TermMatch;

/// Sanitisation stops after this many passes even if removals keep exposing
/// new matches; the post-check then fails the letter.
const MAX_PASSES: usize = 8;

const SELL_WORDS: [&str; 7] = [
    "vender", "venda", "reduzir", "reducao", "realizar", "realizacao", "liquidar",
];

const BUY_PATTERNS: [&str; 3] = [
    r"recomendamos\s+(?:comprar|adquirir)",
    r"aumento\s+de\s+posicao",
    r"dobrar\s+a\s+aposta",
];

/// The letter before and after sanitisation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AdvisoryLetter {
    pub raw_text: String,
    pub sanitized_text: String,
    pub disclaimer_appended: bool,
}

/// One forbidden-term occurrence that was removed
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TermViolation {
    pub term: String,
    pub matched_text: String,
    /// Byte offset in the text being sanitised (the letter body on the first pass)
    pub offset: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MismatchKind {
    /// A sell/trim wording for a ticker the plan does not act on
    UnplannedAction,
    /// Any buy recommendation; plans only ever sell
    BuyRecommendation,
}

/// A letter statement that disagrees with the plan
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlanMismatch {
    pub kind: MismatchKind,
    pub symbol: Option<String>,
    pub excerpt: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComplianceReport {
    pub violations_found: Vec<TermViolation>,
    /// Whether the draft already carried the disclaimer marker
    pub disclaimer_present: bool,
    /// Post-sanitisation state: no forbidden terms and disclaimer present
    pub passed: bool,
    pub plan_mismatches: Vec<PlanMismatch>,
}

/// Everything the compliance stage produces
#[derive(Debug, Clone)]
pub struct ComplianceOutcome {
    pub letter: AdvisoryLetter,
    pub report: ComplianceReport,
    pub warnings: Vec<DataQualityWarning>,
}

/// Regexes for the punctuation left behind by removals
#[derive(Debug, Clone)]
struct Cleanup {
    empty_pairs: Regex,
    space_after_open: Regex,
    space_before_punct: Regex,
    repeated_separators: Regex,
    separator_before_period: Regex,
    leading_separator: Regex,
    space_runs: Regex,
    trailing_space: Regex,
}

impl Cleanup {
    fn new() -> std::result::Result<Self, regex::Error> {
        Ok(Self {
            empty_pairs: Regex::new(r#"\([ \t,;:]*\)|\[[ \t,;:]*\]|""|“[ \t,;:]*”"#)?,
            space_after_open: Regex::new(r"([(\[“])[ \t]+")?,
            space_before_punct: Regex::new(r"[ \t]+([,.;:!?)\]”])")?,
            repeated_separators: Regex::new(r"([,;:])(?:[ \t]*[,;:])+")?,
            separator_before_period: Regex::new(r"[,;:][ \t]*\.")?,
            leading_separator: Regex::new(r"(?m)^[ \t]*[,;:][ \t]*")?,
            space_runs: Regex::new(r"[ \t]{2,}")?,
            trailing_space: Regex::new(r"(?m)[ \t]+$")?,
        })
    }

    /// Repeat the cleanup rules until the text stops changing
    fn apply(&self, text: &str) -> String {
        let mut current = text.to_string();
        for _ in 0..MAX_PASSES {
            let next = self.apply_once(&current);
            if next == current {
                break;
            }
            current = next;
        }
        current
    }

    fn apply_once(&self, text: &str) -> String {
        let text = self.empty_pairs.replace_all(text, "");
        let text = self.space_runs.replace_all(&text, " ");
        let text = self.space_after_open.replace_all(&text, "$1");
        let text = self.space_before_punct.replace_all(&text, "$1");
        let text = self.repeated_separators.replace_all(&text, "$1");
        let text = self.separator_before_period.replace_all(&text, ".");
        let text = self.leading_separator.replace_all(&text, "");
        let text = self.trailing_space.replace_all(&text, "");
        text.into_owned()
    }
}

/// Enforces wording rules on outgoing letters.
///
/// A validator can only be built from a configuration whose disclaimer is
/// itself compliant, so every letter it returns carries a valid disclaimer.
#[derive(Debug, Clone)]
pub struct ComplianceValidator {
    config: ComplianceConfig,
    terms: TermMatcher,
    cleanup: Cleanup,
    ticker: Regex,
    buy_patterns: Vec<Regex>,
}

impl ComplianceValidator {
    pub fn new(config: ComplianceConfig) -> Result<Self> {
        let marker = config.disclaimer_marker.trim();
        if marker.is_empty() {
            return Err(AdvisorError::ComplianceFailure(
                "disclaimer marker is empty".to_string(),
            ));
        }
        if !config.disclaimer.contains(marker) {
            return Err(AdvisorError::ComplianceFailure(format!(
                "disclaimer does not contain the marker '{}'",
                marker
            )));
        }

        let terms = TermMatcher::new(&config.forbidden_terms)?;
        if let Some(found) = terms.find_all(&config.disclaimer).first() {
            return Err(AdvisorError::ComplianceFailure(format!(
                "disclaimer contains forbidden term '{}'",
                found.term
            )));
        }
        if let Some(replacement) = &config.replacement {
            if let Some(found) = terms.find_all(replacement).first() {
                return Err(AdvisorError::ComplianceFailure(format!(
                    "replacement text contains forbidden term '{}'",
                    found.term
                )));
            }
        }

        let regex_error = |e: regex::Error| AdvisorError::ConfigError(e.to_string());
        let cleanup = Cleanup::new().map_err(regex_error)?;
        let ticker = Regex::new(r"\b([A-Z]{4}\d{1,2})\b").map_err(regex_error)?;
        let buy_patterns = BUY_PATTERNS
            .iter()
            .map(|p| Regex::new(p))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(regex_error)?;

        Ok(Self {
            config,
            terms,
            cleanup,
            ticker,
            buy_patterns,
        })
    }

    pub fn config(&self) -> &ComplianceConfig {
        &self.config
    }

    /// Sanitise a draft and append the disclaimer.
    ///
    /// When a plan is given the letter is also cross-checked against it;
    /// mismatches are reported and warned about but do not fail the letter.
    pub fn validate(&self, draft: &str, plan: Option<&RebalancingPlan>) -> Result<ComplianceOutcome> {
        let marker = self.config.disclaimer_marker.trim();
        let disclaimer = self.config.disclaimer.trim_end();

        let (body, disclaimer_present) = match draft.find(marker) {
            Some(idx) => (self.strip_disclaimer_lead(&draft[..idx]), true),
            None => (draft, false),
        };
        debug!(
            "Compliance: body of {} bytes, disclaimer marker present: {}",
            body.len(),
            disclaimer_present
        );

        let (body, violations) = self.sanitize_body(body);
        let body = body.trim_end();

        let sanitized_text = if body.trim().is_empty() {
            disclaimer.to_string()
        } else {
            format!("{}\n\n{}", body, disclaimer)
        };
        let disclaimer_appended = !draft.trim_end().ends_with(disclaimer);

        let remaining = self.terms.find_all(&sanitized_text);
        let passed = remaining.is_empty() && sanitized_text.contains(marker);
        if !passed {
            return Err(AdvisorError::ComplianceFailure(format!(
                "letter still contains {} forbidden term occurrence(s) after sanitisation",
                remaining.len()
            )));
        }

        let plan_mismatches = self.cross_check(body, plan);
        let warnings = plan_mismatches
            .iter()
            .map(|mismatch| {
                let message = match mismatch.kind {
                    MismatchKind::UnplannedAction => {
                        format!("letter suggests an action not in the plan: \"{}\"", mismatch.excerpt)
                    }
                    MismatchKind::BuyRecommendation => {
                        format!("letter contains a buy recommendation: \"{}\"", mismatch.excerpt)
                    }
                };
                warn!("{}", message);
                match &mismatch.symbol {
                    Some(symbol) => DataQualityWarning::for_symbol(Stage::Compliance, symbol, message),
                    None => DataQualityWarning::new(Stage::Compliance, message),
                }
            })
            .collect();

        info!(
            "Compliance: {} term occurrence(s) removed, disclaimer appended: {}",
            violations.len(),
            disclaimer_appended
        );

        Ok(ComplianceOutcome {
            letter: AdvisoryLetter {
                raw_text: draft.to_string(),
                sanitized_text,
                disclaimer_appended,
            },
            report: ComplianceReport {
                violations_found: violations,
                disclaimer_present,
                passed,
                plan_mismatches,
            },
            warnings,
        })
    }

    /// Drop the part of the disclaimer that precedes the marker, when the body ends with it
    fn strip_disclaimer_lead<'a>(&self, body: &'a str) -> &'a str {
        let marker = self.config.disclaimer_marker.trim();
        let lead = self
            .config
            .disclaimer
            .find(marker)
            .map_or("", |idx| self.config.disclaimer[..idx].trim());
        let trimmed = body.trim_end();
        match trimmed.strip_suffix(lead) {
            Some(rest) if !lead.is_empty() => rest,
            _ => body,
        }
    }

    /// Remove terms and tidy punctuation until nothing changes
    fn sanitize_body(&self, body: &str) -> (String, Vec<TermViolation>) {
        let mut text = body.to_string();
        let mut violations = Vec::new();

        for pass in 0..MAX_PASSES {
            let found = self.terms.find_all(&text);
            if found.is_empty() {
                break;
            }
            debug!("Sanitisation pass {}: {} match(es)", pass + 1, found.len());

            violations.extend(found.iter().map(|m| TermViolation {
                term: m.term.clone(),
                matched_text: text[m.range.clone()].to_string(),
                offset: m.range.start,
            }));

            let replacement = self.config.replacement.as_deref().unwrap_or("");
            let mut rebuilt = String::with_capacity(text.len());
            let mut cursor = 0;
            for m in &found {
                // Overlapping matches are merged into the first
                if m.range.start < cursor {
                    cursor = cursor.max(m.range.end);
                    continue;
                }
                rebuilt.push_str(&text[cursor..m.range.start]);
                rebuilt.push_str(replacement);
                cursor = m.range.end;
            }
            rebuilt.push_str(&text[cursor..]);

            text = self.cleanup.apply(&rebuilt);
        }

        (text, violations)
    }

    fn cross_check(&self, body: &str, plan: Option<&RebalancingPlan>) -> Vec<PlanMismatch> {
        let mut mismatches = Vec::new();

        if let Some(plan) = plan {
            let planned: BTreeSet<&str> = plan.actions.iter().map(|a| a.symbol.as_str()).collect();
            let mut flagged = BTreeSet::new();

            for sentence in sentences(body) {
                let folded = fold(sentence);
                if !SELL_WORDS.iter().any(|w| contains_word(&folded, w)) {
                    continue;
                }
                for caps in self.ticker.captures_iter(sentence) {
                    let symbol = &caps[1];
                    if planned.contains(symbol) || !flagged.insert(symbol.to_string()) {
                        continue;
                    }
                    mismatches.push(PlanMismatch {
                        kind: MismatchKind::UnplannedAction,
                        symbol: Some(symbol.to_string()),
                        excerpt: sentence.trim().to_string(),
                    });
                }
            }
        }

        let folded = fold(body);
        for pattern in &self.buy_patterns {
            if let Some(found) = pattern.find(&folded) {
                mismatches.push(PlanMismatch {
                    kind: MismatchKind::BuyRecommendation,
                    symbol: None,
                    excerpt: found.as_str().to_string(),
                });
            }
        }

        mismatches
    }
}

/// Split on sentence punctuation and line breaks, keeping decimals intact
fn sentences(text: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0;
    let chars: Vec<(usize, char)> = text.char_indices().collect();
    for (i, &(idx, c)) in chars.iter().enumerate() {
        let next_is_space = chars.get(i + 1).map_or(true, |&(_, n)| n.is_whitespace());
        if c == '\n' || (matches!(c, '.' | '!' | '?' | ';') && next_is_space) {
            let end = idx + c.len_utf8();
            if !text[start..end].trim().is_empty() {
                out.push(&text[start..end]);
            }
            start = end;
        }
    }
    if !text[start..].trim().is_empty() {
        out.push(&text[start..]);
    }
    out
}

fn contains_word(folded: &str, word: &str) -> bool {
    folded
        .split(|c: char| !c.is_alphanumeric())
        .any(|token| token == word)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StrategyConfig;
    use crate::market_data::{MarketData, Period, ReturnRecord};
    use crate::models::{
        Asset, AssetClass, HouseView, InvestorType, MacroView, Portfolio, RiskProfile,
    };
    use crate::strategy::RebalancingEngine;
    use rust_decimal_macros::dec;

    fn validator() -> ComplianceValidator {
        ComplianceValidator::new(ComplianceConfig::default()).unwrap()
    }

    fn disclaimer() -> String {
        ComplianceConfig::default().disclaimer
    }

    fn trim_plan() -> RebalancingPlan {
        let portfolio = Portfolio::new(
            vec![
                Asset::new("PETR4", AssetClass::Equity, dec!(49380)),
                Asset::new("VALE3", AssetClass::Equity, dec!(10000)),
            ],
            None,
        );
        let data = MarketData::new(vec![ReturnRecord {
            symbol: "PETR4".to_string(),
            period: Period::new(2025, 6).unwrap(),
            previous_price: dec!(100),
            price: dec!(126),
            return_pct: dec!(26),
        }]);
        let risk = RiskProfile {
            investor_type: InvestorType::Aggressive,
            max_equity_pct: dec!(100),
            drift_tolerance_pct: dec!(5),
        };
        RebalancingEngine::new(&StrategyConfig::default())
            .unwrap()
            .plan(&portfolio, &risk, &MacroView::new(HouseView::Neutral), &data)
            .0
    }

    #[test]
    fn test_guaranteed_returns_removed_and_disclaimer_appended() {
        let outcome = validator()
            .validate("Este fundo oferece retornos guaranteed para você.", None)
            .unwrap();

        assert_eq!(
            outcome.letter.sanitized_text,
            format!("Este fundo oferece retornos para você.\n\n{}", disclaimer())
        );
        assert!(outcome.letter.disclaimer_appended);
        assert!(outcome.report.passed);
        assert!(!outcome.report.disclaimer_present);
        assert_eq!(outcome.report.violations_found.len(), 1);
        assert_eq!(outcome.report.violations_found[0].matched_text, "guaranteed");
        assert_eq!(outcome.report.violations_found[0].offset, 28);
    }

    #[test]
    fn test_no_dangling_punctuation() {
        let draft = "Resultado (garantido), com retorno certo, e lucro certo.\nSem risco, seguimos.";
        let outcome = validator().validate(draft, None).unwrap();
        let body = outcome
            .letter
            .sanitized_text
            .split("\n\nAVISO LEGAL")
            .next()
            .unwrap()
            .to_string();

        assert_eq!(body, "Resultado, com, e.\nseguimos.");
        assert_eq!(outcome.report.violations_found.len(), 4);

        let outcome = validator()
            .validate("Retorno (garantido, sem risco) hoje.", None)
            .unwrap();
        assert!(outcome
            .letter
            .sanitized_text
            .starts_with("Retorno hoje.\n\nAVISO LEGAL"));
        assert_eq!(outcome.report.violations_found.len(), 2);
    }

    #[test]
    fn test_accent_insensitive_removal() {
        let outcome = validator()
            .validate("Fique tranquilo: não há risco nesta operação.", None)
            .unwrap();
        assert!(outcome.letter.sanitized_text.starts_with("Fique tranquilo: nesta operação."));
        assert_eq!(outcome.report.violations_found[0].matched_text, "não há risco");
    }

    #[test]
    fn test_placeholder_substitution() {
        let config = ComplianceConfig {
            replacement: Some("[TERMO REMOVIDO]".to_string()),
            ..ComplianceConfig::default()
        };
        let outcome = ComplianceValidator::new(config)
            .unwrap()
            .validate("Rentabilidade garantida de 10%.", None)
            .unwrap();
        assert!(outcome
            .letter
            .sanitized_text
            .starts_with("[TERMO REMOVIDO] de 10%."));
    }

    #[test]
    fn test_sanitisation_is_idempotent() {
        let v = validator();
        let drafts = [
            "Investimento seguro, garantido; (sem risco) e \"\" fim.",
            "Texto limpo sem problemas.",
            "",
            "AVISO LEGAL parcial e incompleto",
        ];
        for draft in drafts {
            let once = v.validate(draft, None).unwrap();
            let twice = v.validate(&once.letter.sanitized_text, None).unwrap();
            assert_eq!(once.letter.sanitized_text, twice.letter.sanitized_text);
            assert!(!twice.letter.disclaimer_appended);
            assert!(twice.report.violations_found.is_empty());
        }
    }

    #[test]
    fn test_disclaimer_with_text_before_marker_is_not_repeated() {
        let config = ComplianceConfig {
            disclaimer: "---\nAVISO LEGAL: material informativo.".to_string(),
            ..ComplianceConfig::default()
        };
        let v = ComplianceValidator::new(config).unwrap();

        let once = v.validate("Prezado cliente.", None).unwrap();
        assert_eq!(
            once.letter.sanitized_text,
            "Prezado cliente.\n\n---\nAVISO LEGAL: material informativo."
        );
        let twice = v.validate(&once.letter.sanitized_text, None).unwrap();
        assert_eq!(once.letter.sanitized_text, twice.letter.sanitized_text);
        assert!(!twice.letter.disclaimer_appended);
    }

    #[test]
    fn test_partial_disclaimer_is_replaced() {
        let draft = "Prezado cliente, segue a carta.\n\nAVISO LEGAL: texto antigo garantido";
        let outcome = validator().validate(draft, None).unwrap();

        assert!(outcome.report.disclaimer_present);
        assert!(outcome.letter.disclaimer_appended);
        assert!(outcome.report.violations_found.is_empty());
        assert_eq!(
            outcome.letter.sanitized_text,
            format!("Prezado cliente, segue a carta.\n\n{}", disclaimer())
        );
    }

    #[test]
    fn test_letter_already_compliant_is_untouched() {
        let text = format!("Prezado cliente.\n\n{}", disclaimer());
        let outcome = validator().validate(&text, None).unwrap();
        assert_eq!(outcome.letter.sanitized_text, text);
        assert!(!outcome.letter.disclaimer_appended);
    }

    #[test]
    fn test_invalid_disclaimer_is_rejected() {
        let missing_marker = ComplianceConfig {
            disclaimer: "Sem aviso.".to_string(),
            ..ComplianceConfig::default()
        };
        let err = ComplianceValidator::new(missing_marker).unwrap_err();
        assert!(matches!(err, AdvisorError::ComplianceFailure(_)));

        let forbidden = ComplianceConfig {
            disclaimer: "AVISO LEGAL: retorno garantido.".to_string(),
            ..ComplianceConfig::default()
        };
        assert!(ComplianceValidator::new(forbidden).is_err());

        let bad_placeholder = ComplianceConfig {
            replacement: Some("sem risco".to_string()),
            ..ComplianceConfig::default()
        };
        assert!(ComplianceValidator::new(bad_placeholder).is_err());
    }

    #[test]
    fn test_plan_cross_check() {
        let plan = trim_plan();
        let draft = "Sugerimos realizar lucros em PETR4.\n\
                     Tambem recomendamos vender VALE3 integralmente.\n\
                     Recomendamos comprar ITUB4.";
        let outcome = validator().validate(draft, Some(&plan)).unwrap();

        let mismatches = &outcome.report.plan_mismatches;
        assert_eq!(mismatches.len(), 2);
        assert_eq!(mismatches[0].kind, MismatchKind::UnplannedAction);
        assert_eq!(mismatches[0].symbol.as_deref(), Some("VALE3"));
        assert_eq!(mismatches[1].kind, MismatchKind::BuyRecommendation);
        assert_eq!(outcome.warnings.len(), 2);
        assert!(outcome.report.passed);
    }

    #[test]
    fn test_sentences_keep_decimals() {
        let parts = sentences("Vender 1.5 mil. Manter VALE3!\nFim");
        assert_eq!(parts, vec!["Vender 1.5 mil.", " Manter VALE3!", "Fim"]);
    }
}
