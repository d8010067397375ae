//! Top-level error type for CLI runs.
//!
//! Errors are classified by recoverability:
//! - Retryable: network issues, timeouts, rate limits
//! - NonRetryable: configuration errors, bad input files
//! - RequiresUserAction: missing API keys, expired auth

use std::path::PathBuf;
use thiserror::Error;

use crate::activecampaign::AcError;
use crate::attio::AttioError;
use crate::clay::ClayError;
use crate::google::GoogleApiError;
use crate::llm::LlmError;
use crate::search::SearchError;
use crate::slack::SlackError;

/// Error type for component runs.
#[derive(Debug, Error)]
pub enum OpsError {
    #[error("Attio: {0}")]
    Attio(#[from] AttioError),

    #[error("Clay: {0}")]
    Clay(#[from] ClayError),

    #[error("Search: {0}")]
    Search(#[from] SearchError),

    #[error("ActiveCampaign: {0}")]
    ActiveCampaign(#[from] AcError),

    #[error("Google: {0}")]
    Google(#[from] GoogleApiError),

    #[error("Slack: {0}")]
    Slack(#[from] SlackError),

    #[error("LLM: {0}")]
    Llm(#[from] LlmError),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Input file not found: {0}")]
    InputNotFound(PathBuf),

    #[error("Failed to parse {what}: {detail}")]
    Parse { what: String, detail: String },

    #[error("Record not found: {0}")]
    RecordNotFound(String),

    #[error("IO error: {0}")]
    Io(String),
}

impl OpsError {
    /// Returns true if re-running the same invocation may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            OpsError::Attio(e) => e.is_retryable(),
            OpsError::Clay(e) => e.is_retryable(),
            OpsError::Search(e) => e.is_retryable(),
            OpsError::ActiveCampaign(e) => e.is_retryable(),
            OpsError::Google(e) => matches!(e, GoogleApiError::Http(_)),
            OpsError::Llm(e) => e.is_retryable(),
            _ => false,
        }
    }

    /// Returns true if this error needs a human before a retry can help.
    pub fn requires_user_action(&self) -> bool {
        matches!(
            self,
            OpsError::Configuration(_)
                | OpsError::Google(GoogleApiError::AuthExpired)
                | OpsError::Attio(AttioError::NoApiKey)
                | OpsError::Clay(ClayError::NoApiKey)
                | OpsError::Llm(LlmError::NoApiKey)
        )
    }

    /// Get a user-friendly recovery suggestion.
    pub fn recovery_suggestion(&self) -> &'static str {
        if self.requires_user_action() {
            return "Check your API keys and auth in ~/.gtm-ops/config.json";
        }
        if self.is_retryable() {
            return "Transient failure. Wait a few minutes and re-run.";
        }
        match self {
            OpsError::InputNotFound(_) => "Verify the file path passed on the command line.",
            OpsError::Parse { .. } => "Check the file or API response format.",
            OpsError::RecordNotFound(_) => "Verify the record ID exists in Attio.",
            OpsError::Io(_) => "Check file permissions and disk space.",
            _ => "Check the logs for details.",
        }
    }
}

impl From<std::io::Error> for OpsError {
    fn from(err: std::io::Error) -> Self {
        OpsError::Io(err.to_string())
    }
}
