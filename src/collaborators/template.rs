//! Deterministic letter drafting from a fixed Portuguese template

use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;
use std::fmt::Write;

use super::{DraftContext, LetterDrafter};
use crate::error::Result;
use crate::models::{HouseView, MacroView};
use crate::utils::{format_currency, format_pct, format_pct_signed};

const MONTHS_PT: [&str; 12] = [
    "janeiro",
    "fevereiro",
    "março",
    "abril",
    "maio",
    "junho",
    "julho",
    "agosto",
    "setembro",
    "outubro",
    "novembro",
    "dezembro",
];

/// Long Portuguese date: `15 de março de 2025`
pub fn format_date_pt(date: NaiveDate) -> String {
    format!(
        "{} de {} de {}",
        date.day(),
        MONTHS_PT[date.month0() as usize],
        date.year()
    )
}

/// Drafts the letter without any external service.
///
/// The text never carries the disclaimer; compliance appends it.
#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateDrafter;

impl TemplateDrafter {
    pub fn new() -> Self {
        Self
    }
}

impl LetterDrafter for TemplateDrafter {
    fn name(&self) -> &str {
        "template"
    }

    fn draft(&self, context: &DraftContext) -> Result<String> {
        Ok(render_letter(context))
    }
}

fn macro_paragraph(view: &MacroView) -> String {
    let mut text = match view.house_view {
        HouseView::Negative => {
            "Nossa leitura do cenário macroeconômico é cautelosa, o que pede atenção redobrada \
             às posições em renda variável."
                .to_string()
        }
        HouseView::Positive => {
            "Nossa leitura do cenário macroeconômico é construtiva para os próximos meses."
                .to_string()
        }
        HouseView::Neutral => {
            "Nossa leitura do cenário macroeconômico é neutra, sem mudanças relevantes de rota."
                .to_string()
        }
    };

    let mut figures = Vec::new();
    if let Some(ipca) = view.inflation_expectation {
        figures.push(format!("IPCA projetado de {}", format_pct(ipca)));
    }
    if let Some(selic) = view.selic_terminal {
        figures.push(format!(
            "Selic terminal de {} (tendência de {})",
            format_pct(selic),
            view.rate_direction.label_pt()
        ));
    }
    if let Some(gdp) = view.gdp_growth {
        figures.push(format!("crescimento do PIB de {}", format_pct_signed(gdp)));
    }
    if let Some(fx) = view.exchange_rate {
        figures.push(format!("câmbio em {}", format_currency(fx)));
    }
    if !figures.is_empty() {
        let _ = write!(text, " Consideramos {}.", figures.join("; "));
    }
    text
}

/// Render the full letter body
pub fn render_letter(context: &DraftContext) -> String {
    let plan = &context.plan;
    let mut letter = String::new();

    let _ = writeln!(letter, "São Paulo, {}.", format_date_pt(context.date));
    letter.push('\n');
    letter.push_str("Prezado(a) cliente,\n\n");

    let _ = writeln!(
        letter,
        "Revisamos sua carteira, com patrimônio de {} e perfil {}. \
         Hoje {} do patrimônio está em renda variável, para um limite de {}.",
        format_currency(context.portfolio.total_value()),
        context.risk_profile.investor_type.label_pt(),
        format_pct(plan.current_equity_pct),
        format_pct(plan.target_equity_pct)
    );
    letter.push('\n');

    letter.push_str(&macro_paragraph(&context.macro_view));
    letter.push_str("\n\n");

    if plan.actions.is_empty() {
        letter.push_str(
            "Com base nos retornos do último mês, não identificamos movimentos táticos \
             necessários nas posições atuais.\n",
        );
    } else {
        letter.push_str("Recomendações táticas:\n\n");
        for action in &plan.actions {
            let _ = writeln!(
                letter,
                "- {} {}: vender {} da posição ({}). {} Retorno mensal: {}.",
                action.rule.label_pt(),
                action.symbol,
                format_pct(action.sell_pct * Decimal::ONE_HUNDRED),
                format_currency(action.sell_value),
                action.rationale,
                format_pct_signed(action.return_pct)
            );
        }
        letter.push('\n');
        let _ = writeln!(
            letter,
            "Valor total sugerido para as operações: {}.",
            format_currency(plan.total_sell_value)
        );
    }

    if plan.drift_breached {
        letter.push('\n');
        let _ = writeln!(
            letter,
            "Atenção: a exposição a renda variável está {} acima do limite do seu perfil, \
             além da tolerância de {}. Sugerimos rebalancear a carteira em direção à renda fixa.",
            format_pct(plan.drift_pct),
            format_pct(context.risk_profile.drift_tolerance_pct)
        );
    }

    if !plan.manual_review.is_empty() {
        letter.push('\n');
        let _ = writeln!(
            letter,
            "Os ativos {} estão sem dados de retorno no período e passarão por revisão \
             individual da nossa equipe.",
            plan.manual_review.join(", ")
        );
    }

    letter.push('\n');
    letter.push_str(
        "Seguimos à disposição para conversar sobre estas sugestões.\n\n\
         Atenciosamente,\nEquipe de Assessoria de Investimentos\n",
    );

    letter
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compliance::ComplianceValidator;
    use crate::config::{ComplianceConfig, StrategyConfig};
    use crate::market_data::{MarketData, Period, ReturnRecord};
    use crate::models::{Asset, AssetClass, InvestorType, Portfolio, RiskProfile};
    use crate::strategy::RebalancingEngine;
    use rust_decimal_macros::dec;

    fn context(view: HouseView) -> DraftContext {
        let portfolio = Portfolio::new(
            vec![
                Asset::new("PETR4", AssetClass::Equity, dec!(49380)),
                Asset::new("VALE3", AssetClass::Equity, dec!(20620)),
                Asset::new("CDB XP", AssetClass::FixedIncome, dec!(130000)),
            ],
            None,
        );
        let risk = RiskProfile {
            investor_type: InvestorType::Moderate,
            max_equity_pct: dec!(40),
            drift_tolerance_pct: dec!(5),
        };
        let period = Period::new(2025, 3).unwrap();
        let market_data = MarketData::new(vec![
            ReturnRecord {
                symbol: "PETR4".to_string(),
                period,
                previous_price: dec!(30),
                price: dec!(37.8),
                return_pct: dec!(26),
            },
            ReturnRecord {
                symbol: "VALE3".to_string(),
                period,
                previous_price: dec!(60),
                price: dec!(35),
                return_pct: dec!(-41.67),
            },
        ]);
        let macro_view = MacroView::new(view);
        let engine = RebalancingEngine::new(&StrategyConfig::default()).unwrap();
        let (plan, _) = engine.plan(&portfolio, &risk, &macro_view, &market_data);

        DraftContext {
            portfolio,
            risk_profile: risk,
            macro_view,
            plan,
            date: NaiveDate::from_ymd_opt(2025, 3, 15).unwrap(),
        }
    }

    #[test]
    fn test_format_date_pt() {
        let date = NaiveDate::from_ymd_opt(2025, 3, 15).unwrap();
        assert_eq!(format_date_pt(date), "15 de março de 2025");
    }

    #[test]
    fn test_letter_lists_every_action() {
        let letter = render_letter(&context(HouseView::Negative));

        assert!(letter.starts_with("São Paulo, 15 de março de 2025."));
        assert!(letter.contains("Prezado(a) cliente,"));
        assert!(letter.contains("[LUCRO] REALIZACAO PETR4"));
        assert!(letter.contains("[URGENTE] VENDA VALE3"));
        assert!(letter.contains("Retorno mensal: +26,0%"));
        assert!(letter.contains("Atenciosamente,"));
    }

    #[test]
    fn test_letter_without_actions() {
        let mut ctx = context(HouseView::Neutral);
        ctx.plan.actions.clear();
        let letter = render_letter(&ctx);
        assert!(letter.contains("não identificamos movimentos táticos"));
        assert!(!letter.contains("Recomendações táticas"));
    }

    #[test]
    fn test_template_letter_passes_compliance_untouched() {
        let ctx = context(HouseView::Negative);
        let draft = TemplateDrafter::new().draft(&ctx).unwrap();
        let validator = ComplianceValidator::new(ComplianceConfig::default()).unwrap();
        let outcome = validator.validate(&draft, Some(&ctx.plan)).unwrap();

        assert!(outcome.report.violations_found.is_empty());
        assert!(outcome.report.plan_mismatches.is_empty());
        assert!(!outcome.report.disclaimer_present);
        assert!(outcome.letter.disclaimer_appended);
    }
}
