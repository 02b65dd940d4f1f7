//! Configuration for the advisory pipeline
//!
//! Every threshold, percentage, term list and text the core depends on lives
//! here and is handed to the engine/validator constructors explicitly. Values
//! are loaded from TOML; every section falls back to the built-in defaults.

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::market_data::Period;
use crate::models::InvestorType;
use crate::strategy::{MissingReturnPolicy, Rule};

const CONFIG_ENV_VAR: &str = "ADVISOR_CONFIG";
const CONFIG_DIR_NAME: &str = "portfolio-advisor";
const CONFIG_FILENAME: &str = "config.toml";

/// Complete configuration, one section per component
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AdvisorConfig {
    pub risk: RiskDefaults,
    pub strategy: StrategyConfig,
    pub compliance: ComplianceConfig,
    pub market_data: MarketDataConfig,
    pub pipeline: PipelineConfig,
    pub llm: LlmConfig,
}

/// Defaults applied when an extracted risk profile is incomplete
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RiskDefaults {
    pub conservative_max_equity_pct: Decimal,
    pub moderate_max_equity_pct: Decimal,
    pub aggressive_max_equity_pct: Decimal,
    pub drift_tolerance_pct: Decimal,
}

impl Default for RiskDefaults {
    fn default() -> Self {
        Self {
            conservative_max_equity_pct: Decimal::from(20),
            moderate_max_equity_pct: Decimal::from(40),
            aggressive_max_equity_pct: Decimal::from(70),
            drift_tolerance_pct: Decimal::from(5),
        }
    }
}

impl RiskDefaults {
    pub fn max_equity_for(&self, investor_type: InvestorType) -> Decimal {
        match investor_type {
            InvestorType::Conservative => self.conservative_max_equity_pct,
            InvestorType::Moderate => self.moderate_max_equity_pct,
            InvestorType::Aggressive => self.aggressive_max_equity_pct,
        }
    }
}

/// Rule table and data-gap policy for the rebalancing engine
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StrategyConfig {
    pub missing_return_policy: MissingReturnPolicy,
    /// Evaluated in order, first match wins
    pub rules: Vec<Rule>,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            missing_return_policy: MissingReturnPolicy::default(),
            rules: Rule::default_table(),
        }
    }
}

/// Forbidden wording and the mandatory disclaimer
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ComplianceConfig {
    /// Matched case- and accent-insensitively
    pub forbidden_terms: Vec<String>,
    pub disclaimer: String,
    /// Signature substring used to detect an existing disclaimer
    pub disclaimer_marker: String,
    /// Text substituted for a removed term; `None` removes it outright
    pub replacement: Option<String>,
}

impl Default for ComplianceConfig {
    fn default() -> Self {
        let forbidden_terms = [
            "garantido",
            "garantida",
            "garantia",
            "sem risco",
            "risco zero",
            "retorno certo",
            "retorno garantido",
            "lucro certo",
            "investimento seguro",
            "rentabilidade garantida",
            "nao ha risco",
            "livre de risco",
            "guaranteed",
            "guarantee",
            "risk-free",
            "risk free",
            "no risk",
        ];

        Self {
            forbidden_terms: forbidden_terms.iter().map(|t| t.to_string()).collect(),
            disclaimer: "AVISO LEGAL: Este material tem caráter exclusivamente informativo e não \
                         constitui oferta ou solicitação de compra ou venda de valores mobiliários. \
                         Rentabilidade passada não representa promessa de rentabilidade futura. \
                         Investimentos em renda variável estão sujeitos a oscilações de mercado e \
                         podem resultar em perdas patrimoniais. Leia os documentos dos produtos \
                         antes de investir."
                .to_string(),
            disclaimer_marker: "AVISO LEGAL".to_string(),
            replacement: None,
        }
    }
}

/// Which periods of the price table are considered
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MarketDataConfig {
    /// Period assigned to "current price" columns of snapshot tables.
    /// Defaults to the current month.
    pub as_of: Option<Period>,
    pub window_start: Option<Period>,
    pub window_end: Option<Period>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PipelineConfig {
    /// Deadline for each collaborator call; `None` waits indefinitely
    pub collaborator_timeout_secs: Option<u64>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            collaborator_timeout_secs: Some(120),
        }
    }
}

/// Chat-completions settings for the LLM-backed collaborators
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LlmConfig {
    pub base_url: String,
    pub model: String,
    /// Name of the environment variable holding the API key
    pub api_key_env: String,
    pub temperature_extraction: f32,
    pub temperature_generation: f32,
    pub request_timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            temperature_extraction: 0.0,
            temperature_generation: 0.3,
            request_timeout_secs: 90,
        }
    }
}

impl AdvisorConfig {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse configuration TOML")
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration")
    }

    /// Load configuration.
    ///
    /// Lookup order: explicit path, `$ADVISOR_CONFIG`, the user config
    /// directory, built-in defaults. An explicit path that does not exist is an
    /// error; a missing default file is not.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load_file(path);
        }

        if let Some(path) = std::env::var_os(CONFIG_ENV_VAR).map(PathBuf::from) {
            return Self::load_file(&path);
        }

        if let Some(path) = default_config_path() {
            if path.exists() {
                return Self::load_file(&path);
            }
            debug!("No config file at {:?}, using defaults", path);
        }

        Ok(Self::default())
    }

    fn load_file(path: &Path) -> Result<Self> {
        info!("Loading configuration from {:?}", path);
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml_str(&content)
            .with_context(|| format!("Invalid config file {}", path.display()))
    }
}

pub fn default_config_path() -> Option<PathBuf> {
    dir_spec::config_home().map(|dir| dir.join(CONFIG_DIR_NAME).join(CONFIG_FILENAME))
}
