//! Web search client (Brave Search API).
//!
//! Used by the intel engine (news, job postings, compliance announcements)
//! and the competitive tracker (news + jobs sweeps).

use serde::{Deserialize, Serialize};

use crate::http::{send_with_retry, RetryPolicy};

const BASE_URL: &str = "https://api.search.brave.com/res/v1/web/search";
const RESULT_COUNT: usize = 10;

#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("HTTP: {0}")]
    Http(#[from] reqwest::Error),
    #[error("No API key configured for search")]
    NoApiKey,
    #[error("API rate limit exceeded")]
    RateLimited,
    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },
}

impl SearchError {
    pub fn is_retryable(&self) -> bool {
        match self {
            SearchError::Http(e) => e.is_timeout() || e.is_connect(),
            SearchError::RateLimited => true,
            SearchError::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

/// One search hit, trimmed to what prompts consume.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    pub snippet: String,
    #[serde(default)]
    pub age: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WebSearchResponse {
    #[serde(default)]
    web: Option<WebResults>,
}

#[derive(Debug, Deserialize)]
struct WebResults {
    #[serde(default)]
    results: Vec<RawResult>,
}

#[derive(Debug, Deserialize)]
struct RawResult {
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    age: Option<String>,
}

pub struct SearchClient {
    client: reqwest::Client,
    api_key: String,
    policy: RetryPolicy,
}

impl SearchClient {
    pub fn new(api_key: &str) -> Result<Self, SearchError> {
        if api_key.is_empty() {
            return Err(SearchError::NoApiKey);
        }
        Ok(Self {
            client: reqwest::Client::new(),
            api_key: api_key.to_string(),
            policy: RetryPolicy::default(),
        })
    }

    /// Run a query, freshness-limited to the last `freshness_days` days.
    pub async fn search(
        &self,
        query: &str,
        freshness_days: u32,
    ) -> Result<Vec<SearchResult>, SearchError> {
        let freshness = if freshness_days <= 7 {
            "pw" // past week
        } else if freshness_days <= 31 {
            "pm"
        } else {
            "py"
        };
        let count = RESULT_COUNT.to_string();
        let request = self
            .client
            .get(BASE_URL)
            .header("X-Subscription-Token", &self.api_key)
            .header("Accept", "application/json")
            .query(&[
                ("q", query),
                ("count", count.as_str()),
                ("freshness", freshness),
            ]);

        let resp = send_with_retry(request, &self.policy).await?;
        let status = resp.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(SearchError::RateLimited);
        }
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(SearchError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: WebSearchResponse = resp.json().await?;
        Ok(parsed
            .web
            .map(|w| w.results)
            .unwrap_or_default()
            .into_iter()
            .map(|r| SearchResult {
                title: r.title,
                url: r.url,
                snippet: r.description,
                age: r.age,
            })
            .collect())
    }
}

/// Render search results as a compact block for prompt context.
pub fn results_block(results: &[SearchResult]) -> String {
    results
        .iter()
        .map(|r| {
            let age = r.age.as_deref().unwrap_or("undated");
            format!("- {} ({}) — {}", r.title, age, r.snippet)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_response_deserialization() {
        let json = r#"{
            "query": {"original": "Fountain funding"},
            "web": {
                "results": [
                    {
                        "title": "Fountain raises $35M",
                        "url": "https://example.com/news",
                        "description": "High-volume hiring platform Fountain announced...",
                        "age": "3 days ago"
                    }
                ]
            }
        }"#;
        let resp: WebSearchResponse = serde_json::from_str(json).unwrap();
        let results = resp.web.unwrap().results;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].title, "Fountain raises $35M");
    }

    #[test]
    fn test_search_response_empty() {
        let resp: WebSearchResponse = serde_json::from_str("{}").unwrap();
        assert!(resp.web.is_none());
    }

    #[test]
    fn test_results_block_format() {
        let results = vec![SearchResult {
            title: "Acme hires VP Compliance".to_string(),
            url: "https://example.com".to_string(),
            snippet: "Acme Staffing announced a new compliance lead.".to_string(),
            age: Some("1 week ago".to_string()),
        }];
        let block = results_block(&results);
        assert!(block.contains("Acme hires VP Compliance"));
        assert!(block.contains("1 week ago"));
        assert!(block.starts_with("- "));
    }
}
