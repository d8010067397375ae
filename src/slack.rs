//! Slack incoming-webhook notifier.

use serde_json::json;

use crate::http::{send_with_retry, RetryPolicy};

#[derive(Debug, thiserror::Error)]
pub enum SlackError {
    #[error("HTTP: {0}")]
    Http(#[from] reqwest::Error),
    #[error("No webhook URL configured for Slack")]
    NoWebhook,
    #[error("Webhook rejected message: {0}")]
    Rejected(String),
}

pub struct SlackClient {
    client: reqwest::Client,
    webhook_url: String,
    policy: RetryPolicy,
}

impl SlackClient {
    pub fn new(webhook_url: &str) -> Result<Self, SlackError> {
        if webhook_url.is_empty() {
            return Err(SlackError::NoWebhook);
        }
        Ok(Self {
            client: reqwest::Client::new(),
            webhook_url: webhook_url.to_string(),
            policy: RetryPolicy::default(),
        })
    }

    /// Post a mrkdwn message.
    pub async fn post(&self, text: &str) -> Result<(), SlackError> {
        let request = self
            .client
            .post(&self.webhook_url)
            .json(&json!({ "text": text }));
        let resp = send_with_retry(request, &self.policy).await?;
        if !resp.status().is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(SlackError::Rejected(body));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_requires_webhook() {
        assert!(matches!(SlackClient::new(""), Err(SlackError::NoWebhook)));
    }
}
