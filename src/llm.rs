//! Anthropic Messages API client.
//!
//! All generation and extraction prompts instruct the model to return a
//! single JSON object; [`extract_json_from_response`] handles the cases where
//! it doesn't quite (code fences, surrounding prose).

use serde::{Deserialize, Serialize};

use crate::http::{send_with_retry, RetryPolicy};

const API_URL: &str = "https://api.anthropic.com/v1/messages";
const API_VERSION: &str = "2023-06-01";
const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";
const DEFAULT_MAX_TOKENS: u32 = 4096;

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("HTTP: {0}")]
    Http(#[from] reqwest::Error),
    #[error("No API key configured for Anthropic")]
    NoApiKey,
    #[error("API rate limit exceeded")]
    RateLimited,
    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },
    #[error("Empty completion")]
    EmptyCompletion,
    #[error("Response is not the expected JSON: {0}")]
    Parse(String),
}

impl LlmError {
    pub fn is_retryable(&self) -> bool {
        match self {
            LlmError::Http(e) => e.is_timeout() || e.is_connect(),
            LlmError::RateLimited => true,
            LlmError::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: Vec<Message<'a>>,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type", default)]
    block_type: String,
    #[serde(default)]
    text: String,
}

// ============================================================================
// Client
// ============================================================================

/// Messages API client. One instance per CLI run.
pub struct LlmClient {
    client: reqwest::Client,
    api_key: String,
    model: String,
    policy: RetryPolicy,
}

impl LlmClient {
    pub fn new(api_key: &str, model: Option<&str>) -> Result<Self, LlmError> {
        if api_key.is_empty() {
            return Err(LlmError::NoApiKey);
        }
        Ok(Self {
            client: reqwest::Client::new(),
            api_key: api_key.to_string(),
            model: model.unwrap_or(DEFAULT_MODEL).to_string(),
            policy: RetryPolicy::default(),
        })
    }

    /// Run a prompt and return the raw completion text.
    pub async fn complete(&self, system: &str, prompt: &str) -> Result<String, LlmError> {
        let body = MessagesRequest {
            model: &self.model,
            max_tokens: DEFAULT_MAX_TOKENS,
            system,
            messages: vec![Message {
                role: "user",
                content: prompt,
            }],
        };

        let request = self
            .client
            .post(API_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&body);

        let resp = send_with_retry(request, &self.policy).await?;
        let status = resp.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(LlmError::RateLimited);
        }
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(LlmError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: MessagesResponse = resp.json().await?;
        let text: String = parsed
            .content
            .iter()
            .filter(|b| b.block_type == "text")
            .map(|b| b.text.as_str())
            .collect();
        if text.trim().is_empty() {
            return Err(LlmError::EmptyCompletion);
        }
        Ok(text)
    }

    /// Run a prompt and parse the completion into `T` via JSON extraction.
    pub async fn complete_json<T: for<'de> Deserialize<'de>>(
        &self,
        system: &str,
        prompt: &str,
    ) -> Result<T, LlmError> {
        let text = self.complete(system, prompt).await?;
        let json = extract_json_from_response(&text)
            .ok_or_else(|| LlmError::Parse("no JSON object found in completion".to_string()))?;
        serde_json::from_str(json).map_err(|e| LlmError::Parse(e.to_string()))
    }
}

// ============================================================================
// JSON extraction
// ============================================================================

/// Extract a JSON object from completion text.
/// Handles ```json fences, generic fences, raw objects, and JSON embedded
/// in surrounding prose (brace matching, string-aware).
pub fn extract_json_from_response(response: &str) -> Option<&str> {
    // Try to find JSON in a ```json code fence
    if let Some(start) = response.find("```json") {
        let json_start = start + 7;
        if let Some(end) = response[json_start..].find("```") {
            return Some(response[json_start..json_start + end].trim());
        }
    }
    // Try generic ``` code fence
    if let Some(start) = response.find("```") {
        let after_fence = start + 3;
        if let Some(nl) = response[after_fence..].find('\n') {
            let json_start = after_fence + nl + 1;
            if let Some(end) = response[json_start..].find("```") {
                let candidate = response[json_start..json_start + end].trim();
                if candidate.starts_with('{') {
                    return Some(candidate);
                }
            }
        }
    }

    // Raw JSON object
    let trimmed = response.trim();
    if trimmed.starts_with('{') && trimmed.ends_with('}') {
        return Some(trimmed);
    }

    // JSON embedded in other text
    if let Some(start) = response.find('{') {
        let candidate = &response[start..];
        let mut depth = 0i32;
        let mut in_string = false;
        let mut escape = false;
        for (i, ch) in candidate.char_indices() {
            if escape {
                escape = false;
                continue;
            }
            if ch == '\\' && in_string {
                escape = true;
                continue;
            }
            if ch == '"' {
                in_string = !in_string;
                continue;
            }
            if in_string {
                continue;
            }
            if ch == '{' {
                depth += 1;
            } else if ch == '}' {
                depth -= 1;
                if depth == 0 {
                    return Some(&candidate[..=i]);
                }
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_json_fenced() {
        let response = "Here you go:\n```json\n{\"a\": 1}\n```\nDone.";
        assert_eq!(extract_json_from_response(response), Some("{\"a\": 1}"));
    }

    #[test]
    fn test_extract_json_generic_fence() {
        let response = "```\n{\"a\": 1}\n```";
        assert_eq!(extract_json_from_response(response), Some("{\"a\": 1}"));
    }

    #[test]
    fn test_extract_json_raw() {
        assert_eq!(
            extract_json_from_response("  {\"a\": 1}  "),
            Some("{\"a\": 1}")
        );
    }

    #[test]
    fn test_extract_json_embedded_in_prose() {
        let response = "Sure! The result is {\"a\": {\"b\": \"}\"}} as requested.";
        assert_eq!(
            extract_json_from_response(response),
            Some("{\"a\": {\"b\": \"}\"}}")
        );
    }

    #[test]
    fn test_extract_json_none() {
        assert_eq!(extract_json_from_response("no json here"), None);
    }

    #[test]
    fn test_messages_response_deserialization() {
        let json = r#"{
            "id": "msg_01",
            "type": "message",
            "role": "assistant",
            "content": [
                {"type": "text", "text": "{\"ok\": true}"}
            ],
            "model": "claude-sonnet-4-20250514",
            "stop_reason": "end_turn"
        }"#;
        let resp: MessagesResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.content.len(), 1);
        assert_eq!(resp.content[0].text, "{\"ok\": true}");
    }

    #[test]
    fn test_client_requires_api_key() {
        assert!(matches!(LlmClient::new("", None), Err(LlmError::NoApiKey)));
    }
}
