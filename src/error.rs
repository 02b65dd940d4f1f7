//! Error handling for the advisory pipeline
//!
//! Fatal conditions are typed with [`AdvisorError`]; the binary and file
//! loaders use anyhow for context chaining on top of it. Non-fatal data
//! problems are not errors at all: they travel as
//! [`DataQualityWarning`](crate::pipeline::DataQualityWarning) values inside the
//! pipeline state.

use thiserror::Error;

/// Core error types for advisory operations
#[derive(Error, Debug)]
pub enum AdvisorError {
    /// Input text could not be turned into structured data
    #[error("parse error: {0}")]
    ParseError(String),

    /// A collaborator (extractor or drafter) failed or timed out
    #[error("external call error: {0}")]
    ExternalCallError(String),

    /// The letter could not be made compliant (e.g. disclaimer missing)
    #[error("compliance failure: {0}")]
    ComplianceFailure(String),

    #[error("configuration error: {0}")]
    ConfigError(String),

    #[error("io error")]
    Io(#[from] std::io::Error),
}

impl AdvisorError {
    /// Short machine-friendly name of the error kind
    pub fn kind(&self) -> &'static str {
        match self {
            AdvisorError::ParseError(_) => "ParseError",
            AdvisorError::ExternalCallError(_) => "ExternalCallError",
            AdvisorError::ComplianceFailure(_) => "ComplianceFailure",
            AdvisorError::ConfigError(_) => "ConfigError",
            AdvisorError::Io(_) => "Io",
        }
    }
}

/// Result type alias for library operations
pub type Result<T> = std::result::Result<T, AdvisorError>;
