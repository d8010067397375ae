//! Clay enrichment client.
//!
//! Two lookups: company firmographics by domain (tech stack, funding,
//! headcount, key people) and people search by title keywords, plus a
//! per-contact enrichment pass.

use serde::{Deserialize, Serialize};

use crate::http::{send_with_retry, RetryPolicy};

const BASE_URL: &str = "https://api.clay.com/v1";

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

/// Company firmographics returned by Clay.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompanyEnrichment {
    #[serde(default)]
    pub domain: String,
    #[serde(default)]
    pub tech_stack: Vec<String>,
    #[serde(default)]
    pub funding_stage: Option<String>,
    #[serde(default)]
    pub total_funding: Option<String>,
    #[serde(default)]
    pub headcount: Option<u64>,
    #[serde(default)]
    pub industry: Option<String>,
    #[serde(default)]
    pub key_people: Vec<ClayContact>,
}

/// A contact returned by Clay search or enrichment.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClayContact {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub linkedin_url: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ContactListResponse {
    #[serde(default)]
    results: Vec<ClayContact>,
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors from Clay operations.
#[derive(Debug, thiserror::Error)]
pub enum ClayError {
    #[error("HTTP: {0}")]
    Http(#[from] reqwest::Error),
    #[error("No API key configured for Clay")]
    NoApiKey,
    #[error("API rate limit exceeded")]
    RateLimited,
    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },
    #[error("Parse error: {0}")]
    Parse(String),
}

impl ClayError {
    pub fn is_retryable(&self) -> bool {
        match self {
            ClayError::Http(e) => e.is_timeout() || e.is_connect(),
            ClayError::RateLimited => true,
            ClayError::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct ClayClient {
    client: reqwest::Client,
    api_key: String,
    policy: RetryPolicy,
}

impl ClayClient {
    pub fn new(api_key: &str) -> Result<Self, ClayError> {
        if api_key.is_empty() {
            return Err(ClayError::NoApiKey);
        }
        Ok(Self {
            client: reqwest::Client::new(),
            api_key: api_key.to_string(),
            policy: RetryPolicy::default(),
        })
    }

    /// Company firmographics by domain.
    pub async fn enrich_company(&self, domain: &str) -> Result<CompanyEnrichment, ClayError> {
        let request = self
            .client
            .get(format!("{}/companies/enrich", BASE_URL))
            .bearer_auth(&self.api_key)
            .query(&[("domain", domain)]);
        let resp = send_with_retry(request, &self.policy).await?;
        let resp = self.check(resp).await?;
        resp.json().await.map_err(ClayError::Http)
    }

    /// People at `domain` whose titles match any of the keywords.
    pub async fn find_people(
        &self,
        domain: &str,
        title_keywords: &[String],
    ) -> Result<Vec<ClayContact>, ClayError> {
        let titles = title_keywords.join(",");
        let request = self
            .client
            .get(format!("{}/people/search", BASE_URL))
            .bearer_auth(&self.api_key)
            .query(&[("company_domain", domain), ("titles", titles.as_str())]);
        let resp = send_with_retry(request, &self.policy).await?;
        let resp = self.check(resp).await?;
        let parsed: ContactListResponse = resp.json().await?;
        Ok(parsed.results)
    }

    /// Fill in missing contact fields (email, LinkedIn, phone) by email or
    /// name+company.
    pub async fn enrich_contact(&self, contact: &ClayContact) -> Result<ClayContact, ClayError> {
        let mut query: Vec<(&str, String)> = Vec::new();
        if let Some(ref email) = contact.email {
            query.push(("email", email.clone()));
        } else if let (Some(name), Some(company)) = (&contact.name, &contact.company) {
            query.push(("name", name.clone()));
            query.push(("company", company.clone()));
        } else {
            return Ok(contact.clone());
        }

        let request = self
            .client
            .get(format!("{}/people/enrich", BASE_URL))
            .bearer_auth(&self.api_key)
            .query(&query);
        let resp = send_with_retry(request, &self.policy).await?;
        let resp = self.check(resp).await?;
        let enriched: ClayContact = resp.json().await?;
        Ok(merge_contact(contact, enriched))
    }

    async fn check(&self, resp: reqwest::Response) -> Result<reqwest::Response, ClayError> {
        let status = resp.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(ClayError::RateLimited);
        }
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(ClayError::Api {
                status: status.as_u16(),
                message,
            });
        }
        Ok(resp)
    }
}

/// Enrichment never clobbers a known field with an empty one.
fn merge_contact(base: &ClayContact, enriched: ClayContact) -> ClayContact {
    ClayContact {
        name: enriched.name.or_else(|| base.name.clone()),
        email: enriched.email.or_else(|| base.email.clone()),
        title: enriched.title.or_else(|| base.title.clone()),
        company: enriched.company.or_else(|| base.company.clone()),
        linkedin_url: enriched.linkedin_url.or_else(|| base.linkedin_url.clone()),
        phone: enriched.phone.or_else(|| base.phone.clone()),
        location: enriched.location.or_else(|| base.location.clone()),
    }
}
