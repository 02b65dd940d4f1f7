//! Chat-completions backed collaborators
//!
//! One blocking HTTP client is shared by the extractor (JSON mode, low
//! temperature) and the drafter (free text). Model output is never trusted
//! as-is: extraction goes through lenient DTOs and the same validation as the
//! heuristic path, and drafted letters still go through compliance.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

use super::template::format_date_pt;
use super::{DocumentExtractor, DraftContext, Extraction, LetterDrafter, RawDocuments};
use crate::config::{LlmConfig, RiskDefaults};
use crate::error::{AdvisorError, Result};
use crate::models::{
    Asset, AssetClass, HouseView, InvestorType, MacroView, Portfolio, RateDirection, RiskProfile,
};
use crate::utils::{format_currency, format_pct, format_pct_signed, parse_pct};

const EXTRACTION_PROMPT: &str = r#"Você extrai dados estruturados de documentos de clientes de uma assessoria de investimentos brasileira.
Responda SOMENTE com um objeto JSON neste formato:
{
  "portfolio": {
    "total_value": number | null,
    "assets": [{"symbol": string, "asset_class": "equity" | "fixed_income" | "other", "market_value": number}]
  },
  "risk_profile": {
    "investor_type": "conservative" | "moderate" | "aggressive",
    "max_equity_pct": number | null,
    "drift_tolerance_pct": number | null
  },
  "macro_view": {
    "house_view": "positive" | "neutral" | "negative",
    "inflation_expectation": number | null,
    "rate_direction": "rising" | "stable" | "falling" | "unknown",
    "selic_terminal": number | null,
    "gdp_growth": number | null,
    "exchange_rate": number | null
  }
}
Percentuais em pontos percentuais (35 para 35%). Valores em reais, sem símbolo."#;

const DRAFTING_PROMPT: &str = "Você é um assessor de investimentos escrevendo uma carta em \
português para um cliente. Use somente as recomendações do plano fornecido, sem sugerir \
compras nem operações com outros ativos. Não prometa resultados e não inclua aviso legal; \
ele será anexado depois. Escreva em tom profissional e cordial.";

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Shared chat-completions client
pub struct OpenAiClient {
    http: reqwest::blocking::Client,
    config: LlmConfig,
    api_key: String,
}

impl OpenAiClient {
    /// Build a client; the API key is read from `config.api_key_env`
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| {
                AdvisorError::ExternalCallError(format!(
                    "{} is not set; use --offline or export the API key",
                    config.api_key_env
                ))
            })?;

        let http = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| AdvisorError::ExternalCallError(format!("HTTP client: {}", e)))?;

        Ok(Self {
            http,
            config: config.clone(),
            api_key,
        })
    }

    /// Send one system + user exchange and return the reply text
    pub fn complete(&self, system: &str, user: &str, temperature: f32, json: bool) -> Result<String> {
        let url = format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'));
        let request = ChatRequest {
            model: &self.config.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
            temperature,
            response_format: json.then_some(ResponseFormat { kind: "json_object" }),
        };

        info!("Calling {} at {}", self.config.model, url);
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .map_err(|e| {
                error!("Chat completion request failed: {}", e);
                AdvisorError::ExternalCallError(format!("request to {} failed: {}", url, e))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            error!("Chat completion returned {}: {}", status, body);
            return Err(AdvisorError::ExternalCallError(format!(
                "{} returned {}",
                url, status
            )));
        }

        let parsed: ChatResponse = response.json().map_err(|e| {
            AdvisorError::ExternalCallError(format!("unreadable completion response: {}", e))
        })?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| {
                AdvisorError::ExternalCallError("completion response has no content".to_string())
            })?;

        debug!("Completion of {} bytes received", content.len());
        Ok(content)
    }
}

impl std::fmt::Debug for OpenAiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiClient")
            .field("base_url", &self.config.base_url)
            .field("model", &self.config.model)
            .finish()
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ExtractionDto {
    portfolio: PortfolioDto,
    risk_profile: RiskProfileDto,
    macro_view: MacroViewDto,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PortfolioDto {
    total_value: Option<Value>,
    assets: Vec<AssetDto>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct AssetDto {
    symbol: String,
    asset_class: Option<String>,
    market_value: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RiskProfileDto {
    investor_type: Option<String>,
    max_equity_pct: Option<Value>,
    drift_tolerance_pct: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct MacroViewDto {
    house_view: Option<String>,
    inflation_expectation: Option<Value>,
    rate_direction: Option<String>,
    selic_terminal: Option<Value>,
    gdp_growth: Option<Value>,
    exchange_rate: Option<Value>,
}

/// Numbers may come back as JSON numbers or as strings like "35%" or "1.234,50"
fn decimal_from(value: &Option<Value>) -> Option<Decimal> {
    match value.as_ref()? {
        Value::Number(n) => {
            let text = n.to_string();
            Decimal::from_str(&text)
                .or_else(|_| Decimal::from_scientific(&text))
                .ok()
        }
        Value::String(s) => parse_pct(&s.replace("R$", "")),
        _ => None,
    }
}

/// Strip a ```json fence if the model added one
fn json_body(reply: &str) -> &str {
    let trimmed = reply.trim();
    match (trimmed.find('{'), trimmed.rfind('}')) {
        (Some(start), Some(end)) if end > start => &trimmed[start..=end],
        _ => trimmed,
    }
}

/// Turn a model reply into an [`Extraction`]
pub fn parse_extraction(reply: &str, defaults: &RiskDefaults) -> Result<Extraction> {
    let dto: ExtractionDto = serde_json::from_str(json_body(reply))
        .map_err(|e| AdvisorError::ParseError(format!("extraction reply is not valid JSON: {}", e)))?;

    let assets: Vec<Asset> = dto
        .portfolio
        .assets
        .iter()
        .filter(|a| !a.symbol.trim().is_empty())
        .map(|a| {
            let class = a
                .asset_class
                .as_deref()
                .map(AssetClass::classify)
                .unwrap_or(AssetClass::Other);
            Asset::new(
                a.symbol.as_str(),
                class,
                decimal_from(&a.market_value).unwrap_or(Decimal::ZERO),
            )
        })
        .collect();
    if assets.is_empty() {
        return Err(AdvisorError::ParseError(
            "extraction reply lists no portfolio positions".to_string(),
        ));
    }
    let portfolio = Portfolio::new(assets, decimal_from(&dto.portfolio.total_value));

    let investor_type = dto
        .risk_profile
        .investor_type
        .as_deref()
        .and_then(|t| t.parse::<InvestorType>().ok())
        .ok_or_else(|| {
            AdvisorError::ParseError("extraction reply has no valid investor type".to_string())
        })?;
    let risk_profile = RiskProfile {
        investor_type,
        max_equity_pct: decimal_from(&dto.risk_profile.max_equity_pct)
            .unwrap_or_else(|| defaults.max_equity_for(investor_type)),
        drift_tolerance_pct: decimal_from(&dto.risk_profile.drift_tolerance_pct)
            .unwrap_or(defaults.drift_tolerance_pct),
    };

    let macro_dto = &dto.macro_view;
    let macro_view = MacroView {
        house_view: macro_dto
            .house_view
            .as_deref()
            .and_then(|v| v.parse().ok())
            .unwrap_or(HouseView::Neutral),
        inflation_expectation: decimal_from(&macro_dto.inflation_expectation),
        rate_direction: macro_dto
            .rate_direction
            .as_deref()
            .and_then(|v| v.parse().ok())
            .unwrap_or(RateDirection::Unknown),
        selic_terminal: decimal_from(&macro_dto.selic_terminal),
        gdp_growth: decimal_from(&macro_dto.gdp_growth),
        exchange_rate: decimal_from(&macro_dto.exchange_rate),
    };

    Ok(Extraction {
        portfolio,
        risk_profile,
        macro_view,
    })
}

#[derive(Debug, Clone)]
pub struct OpenAiExtractor {
    client: Arc<OpenAiClient>,
    risk_defaults: RiskDefaults,
}

impl OpenAiExtractor {
    pub fn new(client: Arc<OpenAiClient>, risk_defaults: RiskDefaults) -> Self {
        Self {
            client,
            risk_defaults,
        }
    }
}

impl DocumentExtractor for OpenAiExtractor {
    fn name(&self) -> &str {
        "openai"
    }

    fn extract(&self, documents: &RawDocuments) -> Result<Extraction> {
        let user = format!(
            "=== EXTRATO DA CARTEIRA ===\n{}\n\n=== PERFIL DE RISCO ===\n{}\n\n=== ANÁLISE MACRO ===\n{}",
            documents.portfolio, documents.risk_profile, documents.macro_analysis
        );
        let reply = self.client.complete(
            EXTRACTION_PROMPT,
            &user,
            self.client.config.temperature_extraction,
            true,
        )?;
        parse_extraction(&reply, &self.risk_defaults)
    }
}

/// Plain-text briefing of the plan for the drafting prompt
fn drafting_brief(context: &DraftContext) -> String {
    let plan = &context.plan;
    let mut lines = vec![
        format!("Data: {}", format_date_pt(context.date)),
        format!(
            "Perfil: {} (limite de renda variável {}, tolerância {})",
            context.risk_profile.investor_type.label_pt(),
            format_pct(context.risk_profile.max_equity_pct),
            format_pct(context.risk_profile.drift_tolerance_pct)
        ),
        format!(
            "Patrimônio: {}; renda variável atual: {}",
            format_currency(context.portfolio.total_value()),
            format_pct(plan.current_equity_pct)
        ),
        format!(
            "Visão da casa: {}; Selic em {}",
            context.macro_view.house_view.label_pt(),
            context.macro_view.rate_direction.label_pt()
        ),
        format!("Resumo do plano: {}", plan.summary),
    ];

    if plan.actions.is_empty() {
        lines.push("Nenhuma operação recomendada.".to_string());
    }
    for action in &plan.actions {
        lines.push(format!(
            "- {} {}: vender {} da posição ({}), retorno mensal {}. {}",
            action.rule.label_pt(),
            action.symbol,
            format_pct(action.sell_pct * Decimal::ONE_HUNDRED),
            format_currency(action.sell_value),
            format_pct_signed(action.return_pct),
            action.rationale
        ));
    }
    if !plan.manual_review.is_empty() {
        lines.push(format!(
            "Ativos em revisão individual: {}",
            plan.manual_review.join(", ")
        ));
    }
    lines.join("\n")
}

#[derive(Debug, Clone)]
pub struct OpenAiDrafter {
    client: Arc<OpenAiClient>,
}

impl OpenAiDrafter {
    pub fn new(client: Arc<OpenAiClient>) -> Self {
        Self { client }
    }
}

impl LetterDrafter for OpenAiDrafter {
    fn name(&self) -> &str {
        "openai"
    }

    fn draft(&self, context: &DraftContext) -> Result<String> {
        self.client.complete(
            DRAFTING_PROMPT,
            &drafting_brief(context),
            self.client.config.temperature_generation,
            false,
        )
    }
}
