//! Gmail history lookups for meeting prep and follow-up drafts.

use base64::Engine;
use serde::Deserialize;

use super::{get_valid_access_token, GoogleApiError};
use crate::http::{send_with_retry, RetryPolicy};

const BASE_URL: &str = "https://gmail.googleapis.com/gmail/v1/users/me";

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct MessageListResponse {
    #[serde(default)]
    messages: Vec<MessageRef>,
}

#[derive(Debug, Deserialize)]
struct MessageRef {
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawMessage {
    #[serde(default)]
    snippet: String,
    #[serde(default)]
    internal_date: Option<String>,
    payload: Option<MessagePayload>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessagePayload {
    #[serde(default)]
    headers: Vec<MessageHeader>,
    #[serde(default)]
    mime_type: Option<String>,
    #[serde(default)]
    body: Option<MessageBody>,
    #[serde(default)]
    parts: Vec<MessagePayload>,
}

#[derive(Debug, Deserialize)]
struct MessageHeader {
    name: String,
    value: String,
}

#[derive(Debug, Deserialize)]
struct MessageBody {
    #[serde(default)]
    data: Option<String>,
}

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// A recent email exchanged with a contact, flattened for prompt context.
/// The id lets callers pull the full body via [`message_body`].
#[derive(Debug, Clone)]
pub struct EmailSummary {
    pub id: String,
    pub subject: String,
    pub from: String,
    pub date: Option<chrono::DateTime<chrono::Utc>>,
    pub snippet: String,
}

impl EmailSummary {
    pub fn context_line(&self) -> String {
        let date = self
            .date
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| "undated".to_string());
        format!("[{}] {} — {}: {}", date, self.from, self.subject, self.snippet)
    }
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

/// Most recent emails exchanged with `email`, newest first, limited to
/// `max_messages` within the last `lookback_days`.
pub async fn recent_messages_with(
    email: &str,
    lookback_days: u32,
    max_messages: usize,
) -> Result<Vec<EmailSummary>, GoogleApiError> {
    let token = get_valid_access_token().await?;
    let client = reqwest::Client::new();
    let query = format!(
        "(from:{email} OR to:{email}) newer_than:{lookback_days}d -in:spam -in:trash"
    );
    let max = max_messages.to_string();

    let request = client
        .get(format!("{}/messages", BASE_URL))
        .bearer_auth(&token)
        .query(&[("q", query.as_str()), ("maxResults", max.as_str())]);
    let resp = send_with_retry(request, &RetryPolicy::default()).await?;
    let list: MessageListResponse = check(resp).await?.json().await?;

    let mut summaries = Vec::with_capacity(list.messages.len());
    for msg_ref in list.messages {
        let request = client
            .get(format!("{}/messages/{}", BASE_URL, msg_ref.id))
            .bearer_auth(&token)
            .query(&[
                ("format", "metadata"),
                ("metadataHeaders", "Subject"),
                ("metadataHeaders", "From"),
            ]);
        let resp = send_with_retry(request, &RetryPolicy::default()).await?;
        let raw: RawMessage = check(resp).await?.json().await?;
        summaries.push(summarize(msg_ref.id, raw));
    }
    Ok(summaries)
}

fn summarize(id: String, raw: RawMessage) -> EmailSummary {
    let header = |name: &str| {
        raw.payload
            .as_ref()
            .map(|p| p.headers.as_slice())
            .unwrap_or_default()
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.clone())
            .unwrap_or_default()
    };
    let date = raw
        .internal_date
        .as_deref()
        .and_then(|ms| ms.parse::<i64>().ok())
        .and_then(chrono::DateTime::from_timestamp_millis);
    EmailSummary {
        id,
        subject: header("Subject"),
        from: header("From"),
        date,
        snippet: raw.snippet,
    }
}

/// Plain-text body of a single message, for deeper context when a snippet
/// is not enough. Gmail encodes bodies as URL-safe base64.
pub async fn message_body(message_id: &str) -> Result<String, GoogleApiError> {
    let token = get_valid_access_token().await?;
    let client = reqwest::Client::new();
    let request = client
        .get(format!("{}/messages/{}", BASE_URL, message_id))
        .bearer_auth(&token)
        .query(&[("format", "full")]);
    let resp = send_with_retry(request, &RetryPolicy::default()).await?;
    let raw: RawMessage = check(resp).await?.json().await?;
    Ok(raw
        .payload
        .as_ref()
        .and_then(extract_text)
        .unwrap_or(raw.snippet))
}

fn extract_text(payload: &MessagePayload) -> Option<String> {
    if payload.mime_type.as_deref() == Some("text/plain") {
        if let Some(data) = payload.body.as_ref().and_then(|b| b.data.as_deref()) {
            return decode_body(data);
        }
    }
    payload.parts.iter().find_map(extract_text)
}

fn decode_body(data: &str) -> Option<String> {
    let bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(data.trim_end_matches('='))
        .ok()?;
    String::from_utf8(bytes).ok()
}

async fn check(resp: reqwest::Response) -> Result<reqwest::Response, GoogleApiError> {
    let status = resp.status();
    if status.as_u16() == 401 {
        return Err(GoogleApiError::AuthExpired);
    }
    if !status.is_success() {
        let message = resp.text().await.unwrap_or_default();
        return Err(GoogleApiError::ApiError {
            status: status.as_u16(),
            message,
        });
    }
    Ok(resp)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summarize_message() {
        let json = r#"{
            "id": "18f1",
            "snippet": "Thanks for the walkthrough, sending over our I-9 volumes...",
            "internalDate": "1756400000000",
            "payload": {
                "headers": [
                    {"name": "Subject", "value": "Re: Onboarding workflow"},
                    {"name": "From", "value": "Sarah Chen <sarah.chen@acme.com>"}
                ]
            }
        }"#;
        let raw: RawMessage = serde_json::from_str(json).unwrap();
        let summary = summarize("18f1".to_string(), raw);
        assert_eq!(summary.id, "18f1");
        assert_eq!(summary.subject, "Re: Onboarding workflow");
        assert!(summary.from.contains("sarah.chen@acme.com"));
        assert!(summary.date.is_some());
        assert!(summary.context_line().contains("Re: Onboarding workflow"));
    }

    #[test]
    fn test_decode_body_url_safe() {
        // "Hello, world" in URL-safe base64
        let decoded = decode_body("SGVsbG8sIHdvcmxk").unwrap();
        assert_eq!(decoded, "Hello, world");
    }

    #[test]
    fn test_extract_text_nested_parts() {
        let json = r#"{
            "mimeType": "multipart/alternative",
            "headers": [],
            "parts": [
                {"mimeType": "text/html", "headers": [], "body": {"data": "PGI-aGk8L2I-"}},
                {"mimeType": "text/plain", "headers": [], "body": {"data": "aGkgdGhlcmU"}}
            ]
        }"#;
        let payload: MessagePayload = serde_json::from_str(json).unwrap();
        assert_eq!(extract_text(&payload).unwrap(), "hi there");
    }

    #[test]
    fn test_message_list_empty() {
        let list: MessageListResponse = serde_json::from_str("{}").unwrap();
        assert!(list.messages.is_empty());
    }
}
