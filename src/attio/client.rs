//! Attio REST v2 operations.

use chrono::{Duration, Utc};
use serde_json::{json, Map, Value};

use crate::config::AttioSchemaConfig;
use crate::http::{send_with_retry, RetryPolicy};

use super::types::{RecordListResponse, RecordResponse};
use super::{AttioError, AttioRecord, Company, Deal, NewPerson, Person};

const BASE_URL: &str = "https://api.attio.com/v2";
const PAGE_SIZE: usize = 500;

pub struct AttioClient {
    client: reqwest::Client,
    api_key: String,
    schema: AttioSchemaConfig,
    policy: RetryPolicy,
}

impl AttioClient {
    pub fn new(api_key: &str, schema: AttioSchemaConfig) -> Result<Self, AttioError> {
        if api_key.is_empty() {
            return Err(AttioError::NoApiKey);
        }
        Ok(Self {
            client: reqwest::Client::new(),
            api_key: api_key.to_string(),
            schema,
            policy: RetryPolicy::default(),
        })
    }

    // ------------------------------------------------------------------
    // Companies
    // ------------------------------------------------------------------

    /// Companies whose enrichment is missing or older than `max_age_days`,
    /// optionally filtered by tier.
    pub async fn find_stale_companies(
        &self,
        max_age_days: i64,
        tier: Option<i64>,
    ) -> Result<Vec<Company>, AttioError> {
        let cutoff = (Utc::now() - Duration::days(max_age_days)).to_rfc3339();
        let enriched_at = self.schema.enriched_at_attr.as_str();
        let mut filter = json!({
            "$or": [
                { enriched_at: { "$eq": null } },
                { enriched_at: { "$lt": cutoff } }
            ]
        });
        if let Some(tier) = tier {
            filter = json!({ "$and": [filter, { "tier": { "$eq": tier } }] });
        }
        let records = self
            .query_records(&self.schema.company_object.clone(), &filter)
            .await?;
        Ok(records.iter().map(|r| self.normalize_company(r)).collect())
    }

    /// Companies whose Next Best Action equals `action`.
    pub async fn find_companies_by_nba(&self, action: &str) -> Result<Vec<Company>, AttioError> {
        let nba_attr = self.schema.next_best_action_attr.as_str();
        let filter = json!({ nba_attr: { "$eq": action } });
        let records = self
            .query_records(&self.schema.company_object.clone(), &filter)
            .await?;
        Ok(records.iter().map(|r| self.normalize_company(r)).collect())
    }

    /// All companies (audit mode).
    pub async fn list_companies(&self) -> Result<Vec<Company>, AttioError> {
        let records = self
            .query_records(&self.schema.company_object.clone(), &json!({}))
            .await?;
        Ok(records.iter().map(|r| self.normalize_company(r)).collect())
    }

    /// First company whose name contains `name` (case-insensitive on the
    /// Attio side). Used to match transcripts and badge scans to accounts.
    pub async fn find_company_by_name(&self, name: &str) -> Result<Option<Company>, AttioError> {
        let filter = json!({ "name": { "$contains": name } });
        let records = self
            .query_records(&self.schema.company_object.clone(), &filter)
            .await?;
        Ok(records.first().map(|r| self.normalize_company(r)))
    }

    /// Idempotent company creation keyed by domain. Re-importing a badge
    /// scan for a known account updates the record instead of duplicating it.
    pub async fn assert_company(&self, name: &str, domain: &str) -> Result<Company, AttioError> {
        let url = format!(
            "{}/objects/{}/records?matching_attribute=domains",
            BASE_URL, self.schema.company_object
        );
        let request = self
            .client
            .put(&url)
            .bearer_auth(&self.api_key)
            .json(&json!({
                "data": {
                    "values": {
                        "name": name,
                        "domains": [domain]
                    }
                }
            }));
        let resp = send_with_retry(request, &self.policy).await?;
        let record: RecordResponse = self.check(resp).await?.json().await?;
        Ok(self.normalize_company(&record.data))
    }

    pub async fn get_company(&self, record_id: &str) -> Result<Company, AttioError> {
        let record = self
            .get_record(&self.schema.company_object.clone(), record_id)
            .await?;
        Ok(self.normalize_company(&record))
    }

    /// Field-scoped company update. `values` maps attribute slugs to values;
    /// callers only pass the fields their component owns.
    pub async fn update_company_fields(
        &self,
        record_id: &str,
        values: Map<String, Value>,
    ) -> Result<(), AttioError> {
        self.patch_record(&self.schema.company_object.clone(), record_id, values)
            .await
    }

    // ------------------------------------------------------------------
    // People
    // ------------------------------------------------------------------

    /// People linked to a company.
    pub async fn people_for_company(&self, company_id: &str) -> Result<Vec<Person>, AttioError> {
        let filter = json!({
            "company": { "target_object": self.schema.company_object, "target_record_id": company_id }
        });
        let records = self
            .query_records(&self.schema.person_object.clone(), &filter)
            .await?;
        Ok(records.iter().map(normalize_person).collect())
    }

    pub async fn find_person_by_email(&self, email: &str) -> Result<Option<Person>, AttioError> {
        let filter = json!({ "email_addresses": { "$eq": email } });
        let records = self
            .query_records(&self.schema.person_object.clone(), &filter)
            .await?;
        Ok(records.first().map(normalize_person))
    }

    /// Idempotent person creation keyed by email: Attio's assert endpoint
    /// matches on `email_addresses`, so re-running a committee build updates
    /// the existing record instead of duplicating it.
    pub async fn assert_person(&self, person: &NewPerson) -> Result<Person, AttioError> {
        let mut values = Map::new();
        values.insert("name".to_string(), json!(person.name));
        values.insert("email_addresses".to_string(), json!([person.email]));
        if let Some(ref title) = person.title {
            values.insert("title".to_string(), json!(title));
        }
        values.insert(
            "company".to_string(),
            json!({
                "target_object": self.schema.company_object,
                "target_record_id": person.company_id
            }),
        );
        values.insert("persona".to_string(), json!(person.persona));
        if let Some(ref linkedin) = person.linkedin {
            values.insert("linkedin".to_string(), json!(linkedin));
        }

        let url = format!(
            "{}/objects/{}/records?matching_attribute=email_addresses",
            BASE_URL, self.schema.person_object
        );
        let request = self
            .client
            .put(&url)
            .bearer_auth(&self.api_key)
            .json(&json!({ "data": { "values": values } }));

        let resp = send_with_retry(request, &self.policy).await?;
        let record: RecordResponse = self.check(resp).await?.json().await?;
        Ok(normalize_person(&record.data))
    }

    // ------------------------------------------------------------------
    // Deals
    // ------------------------------------------------------------------

    /// All deals in active pipeline stages.
    pub async fn find_active_deals(&self, stages: &[&str]) -> Result<Vec<Deal>, AttioError> {
        let clauses: Vec<Value> = stages
            .iter()
            .map(|s| json!({ "stage": { "$eq": s } }))
            .collect();
        let filter = json!({ "$or": clauses });
        let records = self
            .query_records(&self.schema.deal_object.clone(), &filter)
            .await?;
        Ok(records.iter().map(normalize_deal).collect())
    }

    pub async fn deals_for_company(&self, company_id: &str) -> Result<Vec<Deal>, AttioError> {
        let filter = json!({
            "associated_company": { "target_object": self.schema.company_object, "target_record_id": company_id }
        });
        let records = self
            .query_records(&self.schema.deal_object.clone(), &filter)
            .await?;
        Ok(records.iter().map(normalize_deal).collect())
    }

    pub async fn update_deal_fields(
        &self,
        record_id: &str,
        values: Map<String, Value>,
    ) -> Result<(), AttioError> {
        self.patch_record(&self.schema.deal_object.clone(), record_id, values)
            .await
    }

    // ------------------------------------------------------------------
    // Notes and tasks
    // ------------------------------------------------------------------

    /// Create a plaintext note on a record.
    pub async fn create_note(
        &self,
        parent_object: &str,
        parent_record_id: &str,
        title: &str,
        content: &str,
    ) -> Result<(), AttioError> {
        let body = json!({
            "data": {
                "parent_object": parent_object,
                "parent_record_id": parent_record_id,
                "title": title,
                "format": "plaintext",
                "content": content
            }
        });
        let request = self
            .client
            .post(format!("{}/notes", BASE_URL))
            .bearer_auth(&self.api_key)
            .json(&body);
        let resp = send_with_retry(request, &self.policy).await?;
        self.check(resp).await?;
        Ok(())
    }

    /// Create a task linked to a record.
    pub async fn create_task(
        &self,
        content: &str,
        deadline_at: Option<&str>,
        linked_object: &str,
        linked_record_id: &str,
    ) -> Result<(), AttioError> {
        let body = json!({
            "data": {
                "content": content,
                "format": "plaintext",
                "deadline_at": deadline_at,
                "is_completed": false,
                "linked_records": [{
                    "target_object": linked_object,
                    "target_record_id": linked_record_id
                }],
                "assignees": []
            }
        });
        let request = self
            .client
            .post(format!("{}/tasks", BASE_URL))
            .bearer_auth(&self.api_key)
            .json(&body);
        let resp = send_with_retry(request, &self.policy).await?;
        self.check(resp).await?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Plumbing
    // ------------------------------------------------------------------

    async fn query_records(
        &self,
        object: &str,
        filter: &Value,
    ) -> Result<Vec<AttioRecord>, AttioError> {
        let url = format!("{}/objects/{}/records/query", BASE_URL, object);
        let mut all = Vec::new();
        let mut offset = 0usize;

        loop {
            let mut body = Map::new();
            if filter.as_object().map(|o| !o.is_empty()).unwrap_or(false) {
                body.insert("filter".to_string(), filter.clone());
            }
            body.insert("limit".to_string(), json!(PAGE_SIZE));
            body.insert("offset".to_string(), json!(offset));

            let request = self
                .client
                .post(&url)
                .bearer_auth(&self.api_key)
                .json(&Value::Object(body));
            let resp = send_with_retry(request, &self.policy).await?;
            let page: RecordListResponse = self.check(resp).await?.json().await?;

            let count = page.data.len();
            all.extend(page.data);
            if count < PAGE_SIZE {
                break;
            }
            offset += PAGE_SIZE;
        }

        Ok(all)
    }

    async fn get_record(&self, object: &str, record_id: &str) -> Result<AttioRecord, AttioError> {
        let url = format!("{}/objects/{}/records/{}", BASE_URL, object, record_id);
        let request = self.client.get(&url).bearer_auth(&self.api_key);
        let resp = send_with_retry(request, &self.policy).await?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(AttioError::NotFound(record_id.to_string()));
        }
        let record: RecordResponse = self.check(resp).await?.json().await?;
        Ok(record.data)
    }

    async fn patch_record(
        &self,
        object: &str,
        record_id: &str,
        values: Map<String, Value>,
    ) -> Result<(), AttioError> {
        let url = format!("{}/objects/{}/records/{}", BASE_URL, object, record_id);
        let request = self
            .client
            .patch(&url)
            .bearer_auth(&self.api_key)
            .json(&json!({ "data": { "values": values } }));
        let resp = send_with_retry(request, &self.policy).await?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(AttioError::NotFound(record_id.to_string()));
        }
        self.check(resp).await?;
        Ok(())
    }

    async fn check(&self, resp: reqwest::Response) -> Result<reqwest::Response, AttioError> {
        let status = resp.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(AttioError::RateLimited);
        }
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(AttioError::Api {
                status: status.as_u16(),
                message,
            });
        }
        Ok(resp)
    }

    fn normalize_company(&self, record: &AttioRecord) -> Company {
        let empty_enrichment_fields = self
            .schema
            .enrichment_attrs()
            .into_iter()
            .filter(|slug| !record.has_value(slug))
            .map(|slug| slug.to_string())
            .collect();
        Company {
            id: record.id.record_id.clone(),
            name: record.first_string("name").unwrap_or_default(),
            domain: record.first_string("domains"),
            tier: record.first_number("tier").map(|t| t as i64),
            industry: record.first_string("industry"),
            account_brief: record.first_string(&self.schema.account_brief_attr),
            icp_rationale: record.first_string(&self.schema.icp_rationale_attr),
            pain_points: record.first_string(&self.schema.pain_points_attr),
            tech_stack: record.first_string(&self.schema.tech_stack_attr),
            key_people: record.first_string(&self.schema.key_people_attr),
            enriched_at: record.first_string(&self.schema.enriched_at_attr),
            next_best_action: record.first_string(&self.schema.next_best_action_attr),
            empty_enrichment_fields,
        }
    }
}

fn normalize_person(record: &AttioRecord) -> Person {
    Person {
        id: record.id.record_id.clone(),
        name: record.first_string("name").unwrap_or_default(),
        email: record.first_string("email_addresses"),
        title: record.first_string("title"),
        company_id: record.first_reference("company"),
        persona: record.first_string("persona"),
        linkedin: record.first_string("linkedin"),
    }
}

fn normalize_deal(record: &AttioRecord) -> Deal {
    Deal {
        id: record.id.record_id.clone(),
        name: record.first_string("name").unwrap_or_default(),
        company_id: record.first_reference("associated_company"),
        stage: record.first_string("stage").unwrap_or_default(),
        amount: record.first_number("value"),
        close_date: record.first_string("close_date"),
        stage_entered_at: record.first_string("stage_entered_at"),
        last_activity_at: record.first_string("last_activity_at"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_company_tracks_empty_enrichment() {
        let client =
            AttioClient::new("att_test", AttioSchemaConfig::default()).unwrap();
        let record: AttioRecord = serde_json::from_str(
            r#"{
                "id": {"record_id": "rec_1"},
                "values": {
                    "name": [{"value": "Acme Staffing"}],
                    "domains": [{"domain": "acme.com"}],
                    "ai_account_brief": [{"value": "Large staffing firm."}]
                }
            }"#,
        )
        .unwrap();

        let company = client.normalize_company(&record);
        assert_eq!(company.name, "Acme Staffing");
        assert_eq!(company.domain.as_deref(), Some("acme.com"));
        assert!(!company
            .empty_enrichment_fields
            .contains(&"ai_account_brief".to_string()));
        assert!(company
            .empty_enrichment_fields
            .contains(&"ai_icp_rationale".to_string()));
        assert!(company
            .empty_enrichment_fields
            .contains(&"next_bext_action".to_string()));
    }

    #[test]
    fn test_normalize_company_reads_renamed_slugs() {
        let mut schema = AttioSchemaConfig::default();
        schema.account_brief_attr = "account_summary".to_string();
        schema.next_best_action_attr = "next_action".to_string();
        let client = AttioClient::new("att_test", schema).unwrap();
        let record: AttioRecord = serde_json::from_str(
            r#"{
                "id": {"record_id": "rec_2"},
                "values": {
                    "name": [{"value": "Acme Staffing"}],
                    "account_summary": [{"value": "Large staffing firm."}],
                    "next_action": [{"value": "Nurture"}]
                }
            }"#,
        )
        .unwrap();

        let company = client.normalize_company(&record);
        assert_eq!(company.account_brief.as_deref(), Some("Large staffing firm."));
        assert_eq!(company.next_best_action.as_deref(), Some("Nurture"));
        assert!(!company
            .empty_enrichment_fields
            .contains(&"account_summary".to_string()));
    }

    #[test]
    fn test_normalize_person() {
        let record: AttioRecord = serde_json::from_str(
            r#"{
                "id": {"record_id": "rec_p1"},
                "values": {
                    "name": [{"value": "Sarah Chen"}],
                    "email_addresses": [{"email_address": "sarah.chen@acme.com"}],
                    "title": [{"value": "VP HR Operations"}],
                    "company": [{"target_record_id": "rec_acme"}],
                    "persona": [{"value": "hr_ops"}]
                }
            }"#,
        )
        .unwrap();

        let person = normalize_person(&record);
        assert_eq!(person.name, "Sarah Chen");
        assert_eq!(person.email.as_deref(), Some("sarah.chen@acme.com"));
        assert_eq!(person.company_id.as_deref(), Some("rec_acme"));
        assert_eq!(person.persona.as_deref(), Some("hr_ops"));
    }

    #[test]
    fn test_normalize_deal() {
        let record: AttioRecord = serde_json::from_str(
            r#"{
                "id": {"record_id": "rec_d1"},
                "values": {
                    "name": [{"value": "Acme — Onboarding Platform"}],
                    "stage": [{"status": {"title": "Discovery"}}],
                    "value": [{"value": 48000.0}],
                    "associated_company": [{"target_record_id": "rec_acme"}],
                    "stage_entered_at": [{"value": "2026-08-01T00:00:00Z"}]
                }
            }"#,
        )
        .unwrap();

        let deal = normalize_deal(&record);
        assert_eq!(deal.stage, "Discovery");
        assert_eq!(deal.amount, Some(48000.0));
        assert_eq!(deal.company_id.as_deref(), Some("rec_acme"));
    }

    #[test]
    fn test_client_requires_api_key() {
        assert!(matches!(
            AttioClient::new("", AttioSchemaConfig::default()),
            Err(AttioError::NoApiKey)
        ));
    }
}
