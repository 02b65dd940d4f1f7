//! Output formatting module for CLI display
//!
//! This module handles all terminal output formatting, separating
//! the concerns of running the pipeline from presentation.

use colored::Colorize;
use rust_decimal::Decimal;
use serde::Serialize;
use tabled::{
    settings::{object::Columns, Alignment, Style},
    Table, Tabled,
};

use crate::compliance::{AdvisoryLetter, ComplianceReport};
use crate::models::Portfolio;
use crate::pipeline::{AgentState, DataQualityWarning, PipelineFailure};
use crate::strategy::{RebalancingPlan, RuleId};
use crate::utils::{format_currency, format_pct, format_pct_signed};

/// Pretty JSON for any serializable report
pub fn to_json<T: Serialize>(value: &T) -> String {
    serde_json::to_string_pretty(value)
        .unwrap_or_else(|e| format!(r#"{{"error": "JSON serialization failed: {}"}}"#, e))
}

/// JSON body printed when a run fails
pub fn format_failure_json(failure: &PipelineFailure) -> String {
    #[derive(Serialize)]
    struct JsonFailure<'a> {
        status: &'static str,
        stage: &'a str,
        kind: &'a str,
        message: String,
        state: &'a AgentState,
    }

    to_json(&JsonFailure {
        status: "failed",
        stage: failure.stage.as_str(),
        kind: failure.error.kind(),
        message: failure.error.to_string(),
        state: &failure.state,
    })
}

fn section(title: &str) -> String {
    format!("\n{} {}\n\n", "▶".cyan().bold(), title.bold())
}

fn colored_return(value: Decimal) -> String {
    let text = format_pct_signed(value);
    if value >= Decimal::ZERO {
        text.green().to_string()
    } else {
        text.red().to_string()
    }
}

/// Portfolio positions and allocation totals
pub fn format_portfolio_table(portfolio: &Portfolio) -> String {
    #[derive(Tabled)]
    struct PositionRow {
        #[tabled(rename = "Asset")]
        symbol: String,
        #[tabled(rename = "Class")]
        class: String,
        #[tabled(rename = "Value")]
        value: String,
        #[tabled(rename = "Allocation")]
        allocation: String,
    }

    let rows: Vec<PositionRow> = portfolio
        .assets()
        .iter()
        .map(|a| PositionRow {
            symbol: a.symbol.clone(),
            class: a.asset_class.label_pt().to_string(),
            value: format_currency(a.market_value),
            allocation: format_pct(a.allocation_pct),
        })
        .collect();

    let mut table = Table::new(&rows);
    table.with(Style::modern());
    table.modify(Columns::new(2..), Alignment::right());

    let mut output = table.to_string();
    output.push_str(&format!(
        "\n{:<16} {}",
        "Total:".bold(),
        format_currency(portfolio.total_value())
    ));
    output.push_str(&format!(
        "\n{:<16} {} ({})",
        "Equity:".bold(),
        format_currency(portfolio.equity_value()),
        format_pct(portfolio.equity_pct())
    ));
    output.push_str(&format!(
        "\n{:<16} {} ({})\n",
        "Fixed income:".bold(),
        format_currency(portfolio.fixed_income_value()),
        format_pct(portfolio.fixed_income_pct())
    ));
    output
}

/// Plan actions as a table followed by the drift line and the summary
pub fn format_plan(plan: &RebalancingPlan) -> String {
    #[derive(Tabled)]
    struct ActionRow {
        #[tabled(rename = "Asset")]
        symbol: String,
        #[tabled(rename = "Rule")]
        rule: String,
        #[tabled(rename = "Monthly Return")]
        return_pct: String,
        #[tabled(rename = "Position")]
        market_value: String,
        #[tabled(rename = "Sell %")]
        sell_pct: String,
        #[tabled(rename = "Sell Value")]
        sell_value: String,
    }

    let mut output = String::new();

    if plan.actions.is_empty() {
        output.push_str(&format!("{} No rebalancing actions\n", "ℹ".blue().bold()));
    } else {
        let rows: Vec<ActionRow> = plan
            .actions
            .iter()
            .map(|a| {
                let rule = match a.rule {
                    RuleId::HardSell => a.rule.label_pt().red().bold().to_string(),
                    RuleId::SoftSell => a.rule.label_pt().yellow().to_string(),
                    RuleId::Trim => a.rule.label_pt().green().to_string(),
                };
                ActionRow {
                    symbol: a.symbol.clone(),
                    rule,
                    return_pct: colored_return(a.return_pct),
                    market_value: format_currency(a.market_value),
                    sell_pct: format_pct(a.sell_pct * Decimal::ONE_HUNDRED),
                    sell_value: format_currency(a.sell_value),
                }
            })
            .collect();

        let mut table = Table::new(&rows);
        table.with(Style::modern());
        table.modify(Columns::new(2..), Alignment::right());
        output.push_str(&table.to_string());
        output.push_str(&format!(
            "\n{:<16} {}\n",
            "Total to sell:".bold(),
            format_currency(plan.total_sell_value)
        ));
    }

    let drift = format!(
        "Equity {} vs limit {} (drift {})",
        format_pct(plan.current_equity_pct),
        format_pct(plan.target_equity_pct),
        format_pct_signed(plan.drift_pct)
    );
    if plan.drift_breached {
        output.push_str(&format!("{} {}\n", "⚠".yellow().bold(), drift.yellow()));
    } else {
        output.push_str(&format!("{} {}\n", "✓".green(), drift));
    }

    if !plan.manual_review.is_empty() {
        output.push_str(&format!(
            "{} Manual review: {}\n",
            "⚠".yellow().bold(),
            plan.manual_review.join(", ")
        ));
    }

    output.push_str(&format!("\n{}\n", plan.summary));
    output
}

pub fn format_warnings(warnings: &[DataQualityWarning]) -> String {
    if warnings.is_empty() {
        return format!("{} No data quality warnings\n", "✓".green());
    }
    warnings
        .iter()
        .map(|w| format!("{} {}\n", "⚠".yellow(), w))
        .collect()
}

pub fn format_compliance(report: &ComplianceReport, letter: &AdvisoryLetter) -> String {
    let mut output = String::new();

    let status = if report.passed {
        "PASSED".green().bold()
    } else {
        "FAILED".red().bold()
    };
    output.push_str(&format!("{:<22} {}\n", "Compliance:".bold(), status));
    output.push_str(&format!(
        "{:<22} {}\n",
        "Terms removed:".bold(),
        report.violations_found.len()
    ));
    for violation in &report.violations_found {
        output.push_str(&format!(
            "  - \"{}\" (term '{}', offset {})\n",
            violation.matched_text, violation.term, violation.offset
        ));
    }
    output.push_str(&format!(
        "{:<22} {}\n",
        "Disclaimer appended:".bold(),
        if letter.disclaimer_appended { "yes" } else { "no" }
    ));
    for mismatch in &report.plan_mismatches {
        output.push_str(&format!(
            "{} Letter disagrees with plan: \"{}\"\n",
            "⚠".yellow().bold(),
            mismatch.excerpt
        ));
    }
    output
}

/// Full terminal report of a completed run, letter last
pub fn format_run_report(state: &AgentState) -> String {
    let mut output = String::new();

    if let Some(portfolio) = state.portfolio() {
        output.push_str(&section("Portfolio"));
        output.push_str(&format_portfolio_table(portfolio));
    }
    if let (Some(risk), Some(view)) = (state.risk_profile(), state.macro_view()) {
        output.push_str(&format!(
            "\n{:<16} {} (max equity {}, tolerance {})\n",
            "Profile:".bold(),
            risk.investor_type.label_pt(),
            format_pct(risk.max_equity_pct),
            format_pct(risk.drift_tolerance_pct)
        ));
        output.push_str(&format!(
            "{:<16} {}\n",
            "House view:".bold(),
            view.house_view.label_pt()
        ));
    }
    if let Some(plan) = state.plan() {
        output.push_str(&section("Rebalancing plan"));
        output.push_str(&format_plan(plan));
    }

    output.push_str(&section("Warnings"));
    output.push_str(&format_warnings(state.warnings()));

    if let (Some(report), Some(letter)) = (state.compliance_report(), state.letter()) {
        output.push_str(&section("Compliance"));
        output.push_str(&format_compliance(report, letter));
        output.push_str(&section("Letter"));
        output.push_str(&letter.sanitized_text);
        output.push('\n');
    }

    output
}

/// What a failed run got to, for the terminal
pub fn format_failure(failure: &PipelineFailure) -> String {
    let mut output = format!(
        "{} Pipeline failed at {} ({}): {}\n",
        "✗".red().bold(),
        failure.stage.as_str().bold(),
        failure.error.kind(),
        failure.error
    );
    if !failure.state.warnings().is_empty() {
        output.push_str(&section("Warnings"));
        output.push_str(&format_warnings(failure.state.warnings()));
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compliance::ComplianceValidator;
    use crate::config::ComplianceConfig;
    use crate::pipeline::Stage;

    #[test]
    fn test_warnings_listing() {
        colored::control::set_override(false);
        let warnings = vec![DataQualityWarning::for_symbol(
            Stage::MarketData,
            "OIBR3",
            "no return could be calculated",
        )];
        let text = format_warnings(&warnings);
        assert!(text.contains("[MARKET_DATA] OIBR3: no return could be calculated"));
        assert!(format_warnings(&[]).contains("No data quality warnings"));
    }

    #[test]
    fn test_compliance_summary_lists_removed_terms() {
        colored::control::set_override(false);
        let validator = ComplianceValidator::new(ComplianceConfig::default()).unwrap();
        let outcome = validator.validate("Retorno garantido!", None).unwrap();
        let text = format_compliance(&outcome.report, &outcome.letter);

        assert!(text.contains("PASSED"));
        assert!(text.contains("Terms removed:"));
        assert!(text.contains("\"garantido\""));
        assert!(text.contains("Disclaimer appended:"));
    }

    #[test]
    fn test_json_helper() {
        #[derive(Serialize)]
        struct Sample {
            value: u32,
        }
        assert_eq!(to_json(&Sample { value: 3 }), "{\n  \"value\": 3\n}");
    }
}
