//! Attio CRM client (REST v2).
//!
//! Attio is the source of truth for companies, people, and deals. Reads go
//! through record queries; writes are field-scoped PATCHes, and person
//! creation uses the assert-by-email endpoint so re-runs never duplicate a
//! contact.

mod client;
mod types;

pub use client::AttioClient;
pub use types::{AttioRecord, Company, Deal, NewPerson, Person, RecordId};

/// Errors from Attio operations.
#[derive(Debug, thiserror::Error)]
pub enum AttioError {
    #[error("HTTP: {0}")]
    Http(#[from] reqwest::Error),
    #[error("No API key configured for Attio")]
    NoApiKey,
    #[error("API rate limit exceeded")]
    RateLimited,
    #[error("Record not found: {0}")]
    NotFound(String),
    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },
    #[error("Unexpected response shape: {0}")]
    Parse(String),
}

impl AttioError {
    pub fn is_retryable(&self) -> bool {
        match self {
            AttioError::Http(e) => e.is_timeout() || e.is_connect(),
            AttioError::RateLimited => true,
            AttioError::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }
}
