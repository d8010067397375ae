//! Attio wire types and the normalized records the components work with.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ============================================================================
// Wire types (deserialized from Attio JSON)
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct RecordId {
    pub record_id: String,
    #[serde(default)]
    pub object_id: Option<String>,
}

/// A raw Attio record: every attribute is a list of value entries; the first
/// entry is the current value.
#[derive(Debug, Clone, Deserialize)]
pub struct AttioRecord {
    pub id: RecordId,
    #[serde(default)]
    pub values: HashMap<String, Vec<Value>>,
}

#[derive(Debug, Deserialize)]
pub(super) struct RecordListResponse {
    #[serde(default)]
    pub data: Vec<AttioRecord>,
}

#[derive(Debug, Deserialize)]
pub(super) struct RecordResponse {
    pub data: AttioRecord,
}

impl AttioRecord {
    /// Current value of an attribute as a string, if present.
    ///
    /// Attio value entries carry the payload under different keys by
    /// attribute type ("value" for text/number, "domain" for domains,
    /// "email_address" for emails, "status"/"title" for selects).
    pub fn first_string(&self, slug: &str) -> Option<String> {
        let entry = self.values.get(slug)?.first()?;
        for key in ["value", "domain", "email_address", "full_name"] {
            if let Some(s) = entry.get(key).and_then(Value::as_str) {
                return Some(s.to_string());
            }
        }
        // Select/status attributes nest the label one level down.
        if let Some(s) = entry
            .get("status")
            .and_then(|s| s.get("title"))
            .and_then(Value::as_str)
        {
            return Some(s.to_string());
        }
        if let Some(s) = entry
            .get("option")
            .and_then(|o| o.get("title"))
            .and_then(Value::as_str)
        {
            return Some(s.to_string());
        }
        entry.as_str().map(|s| s.to_string())
    }

    /// Current value of a numeric attribute.
    pub fn first_number(&self, slug: &str) -> Option<f64> {
        let entry = self.values.get(slug)?.first()?;
        entry
            .get("value")
            .and_then(Value::as_f64)
            .or_else(|| entry.as_f64())
    }

    /// Record id of the first referenced record for a relationship attribute.
    pub fn first_reference(&self, slug: &str) -> Option<String> {
        let entry = self.values.get(slug)?.first()?;
        entry
            .get("target_record_id")
            .and_then(Value::as_str)
            .map(|s| s.to_string())
    }

    pub fn has_value(&self, slug: &str) -> bool {
        self.values.get(slug).map(|v| !v.is_empty()).unwrap_or(false)
    }
}

// ============================================================================
// Normalized records
// ============================================================================

/// A company record with the fields the components read.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Company {
    pub id: String,
    pub name: String,
    pub domain: Option<String>,
    pub tier: Option<i64>,
    pub industry: Option<String>,
    pub account_brief: Option<String>,
    pub icp_rationale: Option<String>,
    pub pain_points: Option<String>,
    pub tech_stack: Option<String>,
    pub key_people: Option<String>,
    pub enriched_at: Option<String>,
    pub next_best_action: Option<String>,
    /// Slugs of enrichment attributes that are currently empty (audit mode).
    #[serde(skip)]
    pub empty_enrichment_fields: Vec<String>,
}

/// A person record linked to a company.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Person {
    pub id: String,
    pub name: String,
    pub email: Option<String>,
    pub title: Option<String>,
    pub company_id: Option<String>,
    pub persona: Option<String>,
    pub linkedin: Option<String>,
}

/// Payload for an idempotent person assert (keyed by email).
#[derive(Debug, Clone)]
pub struct NewPerson {
    pub name: String,
    pub email: String,
    pub title: Option<String>,
    pub company_id: String,
    pub persona: String,
    pub linkedin: Option<String>,
}

/// A deal record with the fields the pipeline monitor and post-meeting
/// processor touch.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Deal {
    pub id: String,
    pub name: String,
    pub company_id: Option<String>,
    pub stage: String,
    pub amount: Option<f64>,
    pub close_date: Option<String>,
    pub stage_entered_at: Option<String>,
    pub last_activity_at: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record_from_json(json: &str) -> AttioRecord {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_record_text_value() {
        let record = record_from_json(
            r#"{
                "id": {"record_id": "rec_1"},
                "values": {
                    "name": [{"value": "Acme Staffing", "active_from": "2026-01-01T00:00:00Z"}]
                }
            }"#,
        );
        assert_eq!(record.first_string("name").as_deref(), Some("Acme Staffing"));
        assert!(record.has_value("name"));
        assert!(!record.has_value("domains"));
    }

    #[test]
    fn test_record_domain_and_email_values() {
        let record = record_from_json(
            r#"{
                "id": {"record_id": "rec_2"},
                "values": {
                    "domains": [{"domain": "acme.com"}],
                    "email_addresses": [{"email_address": "sarah@acme.com"}]
                }
            }"#,
        );
        assert_eq!(record.first_string("domains").as_deref(), Some("acme.com"));
        assert_eq!(
            record.first_string("email_addresses").as_deref(),
            Some("sarah@acme.com")
        );
    }

    #[test]
    fn test_record_status_value() {
        let record = record_from_json(
            r#"{
                "id": {"record_id": "rec_3"},
                "values": {
                    "stage": [{"status": {"title": "Discovery", "id": "st_1"}}]
                }
            }"#,
        );
        assert_eq!(record.first_string("stage").as_deref(), Some("Discovery"));
    }

    #[test]
    fn test_record_number_and_reference() {
        let record = record_from_json(
            r#"{
                "id": {"record_id": "rec_4"},
                "values": {
                    "amount": [{"value": 48000.0}],
                    "company": [{"target_record_id": "rec_acme", "target_object": "companies"}]
                }
            }"#,
        );
        assert_eq!(record.first_number("amount"), Some(48000.0));
        assert_eq!(
            record.first_reference("company").as_deref(),
            Some("rec_acme")
        );
    }

    #[test]
    fn test_record_missing_attribute() {
        let record = record_from_json(r#"{"id": {"record_id": "rec_5"}, "values": {}}"#);
        assert_eq!(record.first_string("name"), None);
        assert_eq!(record.first_number("amount"), None);
    }
}
