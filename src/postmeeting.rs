//! Post-meeting transcript processor.
//!
//! Watches the Fathom transcript folder, extracts structured outcomes from
//! each new call, and fans them out to the CRM: a structured note, deal
//! updates driven by the stage signal, tasks for action items, a follow-up
//! draft, and new stakeholders asserted by email. A transcript's doc id is
//! ledgered only after every write lands, so a failed run retries in full.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map};

use crate::attio::{AttioClient, Company, NewPerson};
use crate::clay::ClayClient;
use crate::committee::CommitteeEngine;
use crate::config::{OpsConfig, StageConfig};
use crate::error::OpsError;
use crate::google::drive::{self, DriveFile};
use crate::llm::LlmClient;
use crate::settings::Settings;
use crate::state::StateStore;
use crate::util::{truncate_chars, wrap_user_data};

const EXTRACTION_SYSTEM: &str = "You extract structured outcomes from B2B \
sales call transcripts for an employee onboarding platform vendor. Only \
report what the transcript supports. Respond with a single JSON object and \
nothing else.";

const FOLLOWUP_SYSTEM: &str = "You draft short, concrete follow-up emails \
after sales calls. Recap decisions, confirm owners and deadlines, and \
propose the next step. Under 150 words.";

const DEFAULT_BATCH_WINDOW_DAYS: i64 = 7;
const TRANSCRIPT_CHAR_BUDGET: usize = 24000;

#[derive(Debug)]
pub enum PostMeetingMode {
    Single { doc_id: String },
    Batch { since: Option<NaiveDate> },
    Backfill { count: usize },
}

pub struct PostMeetingEngine<'a> {
    pub attio: &'a AttioClient,
    pub clay: &'a ClayClient,
    pub llm: &'a LlmClient,
    pub settings: &'a Settings,
    pub config: &'a OpsConfig,
    pub dry_run: bool,
}

// ---------------------------------------------------------------------------
// Extraction types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
pub struct MeetingExtraction {
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub company_name: Option<String>,
    #[serde(default)]
    pub attendee_emails: Vec<String>,
    #[serde(default)]
    pub decisions: Vec<String>,
    #[serde(default)]
    pub action_items: Vec<ActionItem>,
    #[serde(default)]
    pub objections: Vec<String>,
    #[serde(default)]
    pub competitive_mentions: Vec<String>,
    #[serde(default)]
    pub technical_requirements: Vec<String>,
    #[serde(default)]
    pub next_steps: Vec<String>,
    /// "advance", "hold", or "regress".
    #[serde(default)]
    pub deal_stage_signal: String,
    #[serde(default)]
    pub deal_amount: Option<f64>,
    #[serde(default)]
    pub close_date: Option<String>,
    #[serde(default)]
    pub new_stakeholders: Vec<Stakeholder>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ActionItem {
    #[serde(default)]
    pub owner: String,
    pub task: String,
    #[serde(default)]
    pub deadline: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Stakeholder {
    pub name: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

impl<'a> PostMeetingEngine<'a> {
    pub async fn run(&self, mode: PostMeetingMode, state: &mut StateStore) -> Result<(), OpsError> {
        match mode {
            PostMeetingMode::Single { doc_id } => {
                let doc = drive::get_file(&doc_id).await?;
                self.process_transcript(&doc, state).await
            }
            PostMeetingMode::Batch { since } => {
                let cutoff = since
                    .and_then(|d| d.and_hms_opt(0, 0, 0))
                    .map(|dt| dt.and_utc())
                    .unwrap_or_else(|| {
                        chrono::Utc::now() - chrono::Duration::days(DEFAULT_BATCH_WINDOW_DAYS)
                    });
                let docs = self.unprocessed_docs(Some(cutoff), state).await?;
                log::info!("post-meeting batch: {} new transcripts", docs.len());
                self.process_all(&docs, state).await
            }
            PostMeetingMode::Backfill { count } => {
                let docs = self.unprocessed_docs(None, state).await?;
                let docs: Vec<DriveFile> = docs.into_iter().take(count).collect();
                log::info!("post-meeting backfill: processing {} transcripts", docs.len());
                self.process_all(&docs, state).await
            }
        }
    }

    async fn unprocessed_docs(
        &self,
        modified_after: Option<chrono::DateTime<chrono::Utc>>,
        state: &StateStore,
    ) -> Result<Vec<DriveFile>, OpsError> {
        let folder = Settings::require(&self.settings.fathom_folder_id, "FATHOM_FOLDER_ID")?;
        let docs = drive::list_folder_docs(folder, modified_after).await?;
        Ok(docs
            .into_iter()
            .filter(|d| !state.is_transcript_processed(&d.id))
            .collect())
    }

    async fn process_all(
        &self,
        docs: &[DriveFile],
        state: &mut StateStore,
    ) -> Result<(), OpsError> {
        for doc in docs {
            if let Err(e) = self.process_transcript(doc, state).await {
                log::warn!("post-meeting: skipping \"{}\": {}", doc.name, e);
            }
        }
        Ok(())
    }

    async fn process_transcript(
        &self,
        doc: &DriveFile,
        state: &mut StateStore,
    ) -> Result<(), OpsError> {
        if state.is_transcript_processed(&doc.id) {
            log::info!("post-meeting: \"{}\" already processed", doc.name);
            return Ok(());
        }
        log::info!("post-meeting: processing \"{}\"", doc.name);

        let text = drive::export_doc_text(&doc.id).await?;
        let prompt = extraction_prompt(&doc.name, &text);
        let extraction: MeetingExtraction =
            self.llm.complete_json(EXTRACTION_SYSTEM, &prompt).await?;

        let company = self.match_company(&extraction, &doc.name).await?;
        match &company {
            Some(company) => self.apply(doc, &extraction, company).await?,
            None => {
                log::warn!(
                    "post-meeting: \"{}\" matched no CRM company; summary only",
                    doc.name
                );
                println!("{}\n{}", doc.name, render_note(&extraction));
            }
        }

        if self.dry_run {
            log::info!("post-meeting: dry run, not ledgering \"{}\"", doc.name);
            return Ok(());
        }
        state.mark_transcript_processed(&doc.id)?;
        Ok(())
    }

    /// Match a transcript to a CRM company: attendee emails first, then the
    /// extracted company name.
    async fn match_company(
        &self,
        extraction: &MeetingExtraction,
        doc_name: &str,
    ) -> Result<Option<Company>, OpsError> {
        for email in &extraction.attendee_emails {
            if let Some(person) = self.attio.find_person_by_email(email).await? {
                if let Some(company_id) = person.company_id.as_deref() {
                    return Ok(Some(self.attio.get_company(company_id).await?));
                }
            }
        }
        if let Some(name) = extraction.company_name.as_deref() {
            if let Some(company) = self.attio.find_company_by_name(name).await? {
                return Ok(Some(company));
            }
        }
        log::debug!("post-meeting: no company match for \"{}\"", doc_name);
        Ok(None)
    }

    async fn apply(
        &self,
        doc: &DriveFile,
        extraction: &MeetingExtraction,
        company: &Company,
    ) -> Result<(), OpsError> {
        let note = render_note(extraction);
        let note_title = format!("Call notes: {}", doc.name);

        if self.dry_run {
            log::info!(
                "post-meeting: dry run for {} — would create note, {} tasks, {} stakeholders, stage signal \"{}\"",
                company.name,
                extraction.action_items.len(),
                extraction.new_stakeholders.len(),
                extraction.deal_stage_signal
            );
            println!("{}\n{}", note_title, note);
            return Ok(());
        }

        let company_object = self.config.attio_schema.company_object.as_str();
        self.attio
            .create_note(company_object, &company.id, &note_title, &note)
            .await?;

        self.update_deal(extraction, company).await?;

        for item in &extraction.action_items {
            let content = if item.owner.is_empty() {
                item.task.clone()
            } else {
                format!("{}: {}", item.owner, item.task)
            };
            let deadline = item.deadline.as_deref().and_then(normalize_deadline);
            self.attio
                .create_task(&content, deadline.as_deref(), company_object, &company.id)
                .await?;
        }

        let followup = self
            .llm
            .complete(FOLLOWUP_SYSTEM, &followup_prompt(extraction, &company.name))
            .await?;
        self.attio
            .create_note(
                company_object,
                &company.id,
                &format!("Follow-up draft: {}", doc.name),
                &followup,
            )
            .await?;

        self.add_stakeholders(extraction, company).await?;
        log::info!(
            "post-meeting: {} updated from \"{}\" ({} action items)",
            company.name,
            doc.name,
            extraction.action_items.len()
        );
        Ok(())
    }

    /// Deal update driven by the extraction: stage moves per the signal,
    /// amount and close date when the call surfaced them.
    async fn update_deal(
        &self,
        extraction: &MeetingExtraction,
        company: &Company,
    ) -> Result<(), OpsError> {
        let deals = self.attio.deals_for_company(&company.id).await?;
        let active = self.config.stages.active_stages();
        let Some(deal) = deals
            .iter()
            .find(|d| active.iter().any(|s| s.eq_ignore_ascii_case(&d.stage)))
        else {
            if !extraction.deal_stage_signal.is_empty() {
                log::info!(
                    "post-meeting: {} has no active deal for stage signal \"{}\"",
                    company.name,
                    extraction.deal_stage_signal
                );
            }
            return Ok(());
        };

        let mut values = Map::new();
        if let Some(stage) = shifted_stage(
            &deal.stage,
            &extraction.deal_stage_signal,
            &self.config.stages,
        ) {
            log::info!(
                "post-meeting: moving \"{}\" {} → {} (signal: {})",
                deal.name,
                deal.stage,
                stage,
                extraction.deal_stage_signal
            );
            values.insert("stage".to_string(), json!(stage));
            values.insert(
                "stage_entered_at".to_string(),
                json!(chrono::Utc::now().to_rfc3339()),
            );
        }
        if let Some(amount) = extraction.deal_amount {
            values.insert("value".to_string(), json!(amount));
        }
        if let Some(close) = extraction.close_date.as_deref() {
            values.insert("close_date".to_string(), json!(close));
        }
        values.insert(
            "last_activity_at".to_string(),
            json!(chrono::Utc::now().to_rfc3339()),
        );
        self.attio.update_deal_fields(&deal.id, values).await?;
        Ok(())
    }

    /// Assert new stakeholders by email (no email means no record), then let
    /// the committee builder fill any remaining persona gaps.
    async fn add_stakeholders(
        &self,
        extraction: &MeetingExtraction,
        company: &Company,
    ) -> Result<(), OpsError> {
        let mut added = false;
        for stakeholder in &extraction.new_stakeholders {
            let Some(email) = stakeholder.email.as_deref() else {
                log::info!(
                    "post-meeting: stakeholder {} has no email, not asserting",
                    stakeholder.name
                );
                continue;
            };
            let persona = stakeholder
                .title
                .as_deref()
                .and_then(|t| self.config.messaging.persona_for_title(t))
                .map(|d| d.persona.clone())
                .unwrap_or_else(|| "unclassified".to_string());
            self.attio
                .assert_person(&NewPerson {
                    name: stakeholder.name.clone(),
                    email: email.to_string(),
                    title: stakeholder.title.clone(),
                    company_id: company.id.clone(),
                    persona,
                    linkedin: None,
                })
                .await?;
            added = true;
        }
        if added {
            let committee = CommitteeEngine {
                attio: self.attio,
                clay: self.clay,
                config: self.config,
                dry_run: self.dry_run,
            };
            committee.build_for(company).await?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Prompts and rendering
// ---------------------------------------------------------------------------

fn extraction_prompt(title: &str, transcript: &str) -> String {
    format!(
        "Extract the outcomes of this sales call.\n\n\
         Title: {title}\n\nTranscript:\n{transcript}\n\n\
         Return JSON with exactly these keys:\n\
         {{\"summary\": \"3-4 sentences\",\n \
         \"company_name\": \"prospect company or null\",\n \
         \"attendee_emails\": [\"...\"],\n \
         \"decisions\": [\"...\"],\n \
         \"action_items\": [{{\"owner\": \"...\", \"task\": \"...\", \"deadline\": \"YYYY-MM-DD or null\"}}],\n \
         \"objections\": [\"...\"],\n \
         \"competitive_mentions\": [\"...\"],\n \
         \"technical_requirements\": [\"...\"],\n \
         \"next_steps\": [\"...\"],\n \
         \"deal_stage_signal\": \"advance|hold|regress\",\n \
         \"deal_amount\": number or null,\n \
         \"close_date\": \"YYYY-MM-DD or null\",\n \
         \"new_stakeholders\": [{{\"name\": \"...\", \"title\": \"... or null\", \"email\": \"... or null\"}}]}}",
        title = title,
        transcript = wrap_user_data(&truncate_chars(transcript, TRANSCRIPT_CHAR_BUDGET)),
    )
}

fn followup_prompt(extraction: &MeetingExtraction, company_name: &str) -> String {
    format!(
        "Draft a follow-up email to {company}.\n\nCall outcomes:\n{outcomes}",
        company = company_name,
        outcomes = wrap_user_data(&serde_json::to_string_pretty(extraction).unwrap_or_default()),
    )
}

/// Render the structured extraction as a CRM note body.
pub fn render_note(extraction: &MeetingExtraction) -> String {
    let section = |title: &str, items: &[String]| {
        if items.is_empty() {
            String::new()
        } else {
            format!(
                "\n{}:\n{}",
                title,
                items
                    .iter()
                    .map(|i| format!("- {}", i))
                    .collect::<Vec<_>>()
                    .join("\n")
            )
        }
    };
    let actions: Vec<String> = extraction
        .action_items
        .iter()
        .map(|a| {
            format!(
                "{} — {}{}",
                if a.owner.is_empty() {
                    "unassigned"
                } else {
                    a.owner.as_str()
                },
                a.task,
                a.deadline
                    .as_deref()
                    .map(|d| format!(" (due {})", d))
                    .unwrap_or_default()
            )
        })
        .collect();
    let stakeholders: Vec<String> = extraction
        .new_stakeholders
        .iter()
        .map(|s| {
            format!(
                "{} ({})",
                s.name,
                s.title.as_deref().unwrap_or("title unknown")
            )
        })
        .collect();

    format!(
        "{summary}{decisions}{actions}{objections}{competitive}{technical}{next}{stakeholders}\n\nStage signal: {signal}",
        summary = extraction.summary,
        decisions = section("Decisions", &extraction.decisions),
        actions = section("Action items", &actions),
        objections = section("Objections", &extraction.objections),
        competitive = section("Competitive mentions", &extraction.competitive_mentions),
        technical = section("Technical requirements", &extraction.technical_requirements),
        next = section("Next steps", &extraction.next_steps),
        stakeholders = section("New stakeholders", &stakeholders),
        signal = if extraction.deal_stage_signal.is_empty() {
            "none"
        } else {
            &extraction.deal_stage_signal
        },
    )
}

/// The stage a deal should move to for a given signal, if any. The ladder is
/// the configured active stages in funnel order, so every target stage has a
/// velocity benchmark. "hold" and unknown signals never move a deal; stages
/// at either end stay put.
pub fn shifted_stage<'c>(
    current: &str,
    signal: &str,
    stages: &'c StageConfig,
) -> Option<&'c str> {
    let ladder = stages.active_stages();
    let idx = ladder.iter().position(|s| s.eq_ignore_ascii_case(current))?;
    match signal {
        "advance" => ladder.get(idx + 1).copied(),
        "regress" => idx.checked_sub(1).map(|i| ladder[i]),
        _ => None,
    }
}

/// Normalize a bare date to a CRM deadline timestamp.
fn normalize_deadline(deadline: &str) -> Option<String> {
    if chrono::DateTime::parse_from_rfc3339(deadline).is_ok() {
        return Some(deadline.to_string());
    }
    NaiveDate::parse_from_str(deadline, "%Y-%m-%d")
        .ok()
        .map(|d| format!("{}T17:00:00Z", d))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_extraction() -> MeetingExtraction {
        serde_json::from_str(
            r#"{
                "summary": "Acme confirmed budget and wants a Bullhorn-integrated pilot.",
                "company_name": "Acme Staffing",
                "attendee_emails": ["sarah.chen@acme.com"],
                "decisions": ["Pilot scoped to Texas branch"],
                "action_items": [
                    {"owner": "Sarah", "task": "Send I-9 volume report", "deadline": "2026-09-02"},
                    {"owner": "", "task": "Share security questionnaire"}
                ],
                "objections": ["Worried about Bullhorn sync latency"],
                "competitive_mentions": ["WorkBright"],
                "technical_requirements": ["SSO via Okta"],
                "next_steps": ["Technical deep dive next week"],
                "deal_stage_signal": "advance",
                "deal_amount": 52000,
                "new_stakeholders": [
                    {"name": "Raj Patel", "title": "Director of IT", "email": "raj.patel@acme.com"}
                ]
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn test_extraction_parses() {
        let e = sample_extraction();
        assert_eq!(e.company_name.as_deref(), Some("Acme Staffing"));
        assert_eq!(e.action_items.len(), 2);
        assert_eq!(e.deal_stage_signal, "advance");
        assert_eq!(e.deal_amount, Some(52000.0));
        assert!(e.close_date.is_none());
    }

    #[test]
    fn test_render_note_sections() {
        let note = render_note(&sample_extraction());
        assert!(note.contains("Decisions:"));
        assert!(note.contains("Sarah — Send I-9 volume report (due 2026-09-02)"));
        assert!(note.contains("unassigned — Share security questionnaire"));
        assert!(note.contains("Competitive mentions:"));
        assert!(note.contains("Raj Patel (Director of IT)"));
        assert!(note.contains("Stage signal: advance"));
    }

    #[test]
    fn test_render_note_omits_empty_sections() {
        let mut e = sample_extraction();
        e.objections.clear();
        let note = render_note(&e);
        assert!(!note.contains("Objections:"));
    }

    #[test]
    fn test_shifted_stage_advance_and_regress() {
        let stages = StageConfig::default();
        assert_eq!(
            shifted_stage("Discovery", "advance", &stages),
            Some("Solutioning")
        );
        assert_eq!(
            shifted_stage("Discovery", "regress", &stages),
            Some("Intro Call")
        );
        assert_eq!(shifted_stage("Discovery", "hold", &stages), None);
        assert_eq!(shifted_stage("Lead", "regress", &stages), None);
        assert_eq!(shifted_stage("Redlines", "advance", &stages), None);
        assert_eq!(shifted_stage("Closed Won", "advance", &stages), None);
    }

    #[test]
    fn test_advanced_deal_stays_in_monitored_pipeline() {
        let stages = StageConfig::default();
        for stage in stages.active_stages() {
            if let Some(next) = shifted_stage(stage, "advance", &stages) {
                let benchmark = stages.benchmark(next).unwrap();
                assert!(benchmark.active, "{} advanced out of active pipeline", stage);
            }
        }
    }

    #[test]
    fn test_shifted_stage_skips_inactive_stages() {
        let mut stages = StageConfig::default();
        stages.stages[3].active = false; // Solutioning
        assert_eq!(
            shifted_stage("Discovery", "advance", &stages),
            Some("Redlines")
        );
        assert_eq!(shifted_stage("Solutioning", "advance", &stages), None);
    }

    #[test]
    fn test_normalize_deadline() {
        assert_eq!(
            normalize_deadline("2026-09-02").as_deref(),
            Some("2026-09-02T17:00:00Z")
        );
        assert_eq!(
            normalize_deadline("2026-09-02T09:00:00Z").as_deref(),
            Some("2026-09-02T09:00:00Z")
        );
        assert!(normalize_deadline("next Tuesday").is_none());
    }
}
