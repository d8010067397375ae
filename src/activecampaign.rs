//! ActiveCampaign client.
//!
//! Write-only surface: sync a contact, ensure tags exist, apply them, and
//! store a generated sequence as a note on the contact. Contact sync is
//! ActiveCampaign's own upsert-by-email endpoint, so pushes are idempotent.

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::http::{send_with_retry, RetryPolicy};

#[derive(Debug, thiserror::Error)]
pub enum AcError {
    #[error("HTTP: {0}")]
    Http(#[from] reqwest::Error),
    #[error("No API key or base URL configured for ActiveCampaign")]
    NotConfigured,
    #[error("API rate limit exceeded")]
    RateLimited,
    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },
}

impl AcError {
    pub fn is_retryable(&self) -> bool {
        match self {
            AcError::Http(e) => e.is_timeout() || e.is_connect(),
            AcError::RateLimited => true,
            AcError::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ContactSyncResponse {
    contact: AcContact,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AcContact {
    pub id: String,
    #[serde(default)]
    pub email: String,
}

#[derive(Debug, Deserialize)]
struct TagListResponse {
    #[serde(default)]
    tags: Vec<AcTag>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AcTag {
    pub id: String,
    #[serde(default)]
    pub tag: String,
}

#[derive(Debug, Deserialize)]
struct TagCreateResponse {
    tag: AcTag,
}

/// A generated outbound touch.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SequenceTouch {
    pub subject: String,
    pub body: String,
    /// Days after sequence start this touch goes out.
    pub day_offset: u32,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct AcClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    policy: RetryPolicy,
}

impl AcClient {
    pub fn new(base_url: &str, api_key: &str) -> Result<Self, AcError> {
        if base_url.is_empty() || api_key.is_empty() {
            return Err(AcError::NotConfigured);
        }
        Ok(Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            policy: RetryPolicy::default(),
        })
    }

    /// Upsert a contact by email and return its ActiveCampaign id.
    pub async fn sync_contact(
        &self,
        email: &str,
        first_name: &str,
        last_name: &str,
    ) -> Result<AcContact, AcError> {
        let body = json!({
            "contact": {
                "email": email,
                "firstName": first_name,
                "lastName": last_name
            }
        });
        let request = self
            .client
            .post(format!("{}/api/3/contact/sync", self.base_url))
            .header("Api-Token", &self.api_key)
            .json(&body);
        let resp = send_with_retry(request, &self.policy).await?;
        let parsed: ContactSyncResponse = self.check(resp).await?.json().await?;
        Ok(parsed.contact)
    }

    /// Find a tag by exact name, creating it when absent. Returns the tag id.
    pub async fn ensure_tag(&self, name: &str) -> Result<String, AcError> {
        let request = self
            .client
            .get(format!("{}/api/3/tags", self.base_url))
            .header("Api-Token", &self.api_key)
            .query(&[("search", name)]);
        let resp = send_with_retry(request, &self.policy).await?;
        let parsed: TagListResponse = self.check(resp).await?.json().await?;
        if let Some(tag) = parsed.tags.into_iter().find(|t| t.tag == name) {
            return Ok(tag.id);
        }

        let body = json!({
            "tag": { "tag": name, "tagType": "contact", "description": "" }
        });
        let request = self
            .client
            .post(format!("{}/api/3/tags", self.base_url))
            .header("Api-Token", &self.api_key)
            .json(&body);
        let resp = send_with_retry(request, &self.policy).await?;
        let parsed: TagCreateResponse = self.check(resp).await?.json().await?;
        Ok(parsed.tag.id)
    }

    /// Apply a tag to a contact. Re-applying an existing tag is a no-op on
    /// the ActiveCampaign side.
    pub async fn tag_contact(&self, contact_id: &str, tag_id: &str) -> Result<(), AcError> {
        let body = json!({
            "contactTag": { "contact": contact_id, "tag": tag_id }
        });
        let request = self
            .client
            .post(format!("{}/api/3/contactTags", self.base_url))
            .header("Api-Token", &self.api_key)
            .json(&body);
        let resp = send_with_retry(request, &self.policy).await?;
        self.check(resp).await?;
        Ok(())
    }

    /// Store a generated sequence as a note on the contact so the sending
    /// automation has the copy.
    pub async fn add_sequence_note(
        &self,
        contact_id: &str,
        sequence: &[SequenceTouch],
    ) -> Result<(), AcError> {
        let note = sequence
            .iter()
            .enumerate()
            .map(|(i, t)| {
                format!(
                    "Touch {} (day {}): {}\n{}",
                    i + 1,
                    t.day_offset,
                    t.subject,
                    t.body
                )
            })
            .collect::<Vec<_>>()
            .join("\n\n---\n\n");
        let body = json!({
            "note": { "note": note, "relid": contact_id, "reltype": "Subscriber" }
        });
        let request = self
            .client
            .post(format!("{}/api/3/notes", self.base_url))
            .header("Api-Token", &self.api_key)
            .json(&body);
        let resp = send_with_retry(request, &self.policy).await?;
        self.check(resp).await?;
        Ok(())
    }

    async fn check(&self, resp: reqwest::Response) -> Result<reqwest::Response, AcError> {
        let status = resp.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(AcError::RateLimited);
        }
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(AcError::Api {
                status: status.as_u16(),
                message,
            });
        }
        Ok(resp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contact_sync_deserialization() {
        let json = r#"{
            "contact": {
                "id": "113",
                "email": "sarah.chen@acme.com",
                "cdate": "2026-08-20T09:18:25-05:00"
            }
        }"#;
        let resp: ContactSyncResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.contact.id, "113");
        assert_eq!(resp.contact.email, "sarah.chen@acme.com");
    }

    #[test]
    fn test_tag_list_deserialization() {
        let json = r#"{
            "tags": [
                {"id": "7", "tag": "persona:hr_ops", "tagType": "contact"},
                {"id": "8", "tag": "persona:hr_ops_legacy", "tagType": "contact"}
            ]
        }"#;
        let resp: TagListResponse = serde_json::from_str(json).unwrap();
        let exact = resp.tags.into_iter().find(|t| t.tag == "persona:hr_ops");
        assert_eq!(exact.unwrap().id, "7");
    }

    #[test]
    fn test_sequence_touch_roundtrip() {
        let touch = SequenceTouch {
            subject: "Cutting time-to-start at Acme".to_string(),
            body: "Hi Sarah,\n...".to_string(),
            day_offset: 0,
        };
        let json = serde_json::to_string(&touch).unwrap();
        let parsed: SequenceTouch = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.day_offset, 0);
        assert!(json.contains("dayOffset"));
    }

    #[test]
    fn test_client_requires_config() {
        assert!(matches!(
            AcClient::new("", "key"),
            Err(AcError::NotConfigured)
        ));
        assert!(matches!(
            AcClient::new("https://acme.api-us1.com", ""),
            Err(AcError::NotConfigured)
        ));
    }
}
