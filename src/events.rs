//! Event GTM orchestrator.
//!
//! Pre-event: import the attendee list, enrich it, score attendees against
//! the ICPs, and generate personalized outreach plus per-account briefs.
//! Post-event: import badge scans into the CRM (idempotent asserts), process
//! meeting notes into CRM notes, queue follow-up sequences, and write the
//! event report.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;

use crate::activecampaign::AcClient;
use crate::attio::{AttioClient, NewPerson};
use crate::clay::{ClayClient, ClayContact};
use crate::config::OpsConfig;
use crate::error::OpsError;
use crate::google::drive;
use crate::llm::LlmClient;
use crate::settings::Settings;
use crate::util::{name_from_email, org_from_email, slugify, truncate_chars, wrap_user_data};

const OUTREACH_SYSTEM: &str = "You write short pre-event outreach notes (under \
80 words) for an employee onboarding platform vendor. Reference the event and \
one specific reason to meet. No hype.";

const BRIEF_SYSTEM: &str = "You write one-paragraph account briefs for event \
prep, for an employee onboarding platform vendor. Factual and specific.";

const NOTES_SYSTEM: &str = "You extract structured conversations from raw \
event notes. Respond with a single JSON object and nothing else.";

pub struct EventEngine<'a> {
    pub attio: &'a AttioClient,
    pub clay: &'a ClayClient,
    pub llm: &'a LlmClient,
    pub ac: Option<&'a AcClient>,
    pub settings: &'a Settings,
    pub config: &'a OpsConfig,
    pub dry_run: bool,
}

// ---------------------------------------------------------------------------
// Input files
// ---------------------------------------------------------------------------

/// One row of an attendee or badge-scan CSV. Column names are the common
/// export headers; extras are ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct AttendeeRow {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
}

pub fn read_attendee_csv(path: &Path) -> Result<Vec<AttendeeRow>, OpsError> {
    if !path.exists() {
        return Err(OpsError::InputNotFound(path.to_path_buf()));
    }
    let mut reader = csv::Reader::from_path(path).map_err(|e| OpsError::Parse {
        what: path.display().to_string(),
        detail: e.to_string(),
    })?;
    let mut rows = Vec::new();
    for result in reader.deserialize() {
        let row: AttendeeRow = result.map_err(|e| OpsError::Parse {
            what: path.display().to_string(),
            detail: e.to_string(),
        })?;
        if row.name.is_empty() && row.email.is_none() {
            continue;
        }
        rows.push(row);
    }
    Ok(rows)
}

// ---------------------------------------------------------------------------
// Pre-event
// ---------------------------------------------------------------------------

/// A scored attendee ready for outreach.
pub struct ScoredAttendee {
    pub contact: ClayContact,
    pub company_label: String,
    pub icp_id: String,
    pub score: u8,
}

impl<'a> EventEngine<'a> {
    pub async fn run_pre(&self, event: &str, attendee_file: &Path) -> Result<(), OpsError> {
        let rows = read_attendee_csv(attendee_file)?;
        log::info!("event pre: {} attendees imported for {}", rows.len(), event);

        let mut scored = Vec::new();
        for row in &rows {
            let contact = ClayContact {
                name: if row.name.is_empty() {
                    row.email.as_deref().map(name_from_email)
                } else {
                    Some(row.name.clone())
                },
                email: row.email.clone(),
                title: row.title.clone(),
                company: row.company.clone(),
                ..ClayContact::default()
            };
            let enriched = match self.clay.enrich_contact(&contact).await {
                Ok(c) => c,
                Err(e) => {
                    log::warn!("event pre: enrichment failed for {:?}: {}", row.name, e);
                    contact
                }
            };
            scored.push(self.score_attendee(enriched));
        }
        scored.sort_by(|a, b| b.score.cmp(&a.score));

        println!("Priority list for {} ({} attendees):", event, scored.len());
        for attendee in &scored {
            println!(
                "  [{:>3}] {} — {} ({}) [{}]",
                attendee.score,
                attendee.contact.name.as_deref().unwrap_or("?"),
                attendee.contact.title.as_deref().unwrap_or("?"),
                attendee.company_label,
                attendee.icp_id,
            );
        }

        self.generate_outreach(event, &scored).await;
        self.generate_briefs(event, &scored).await?;
        Ok(())
    }

    /// Score by ICP signal keywords across title and company. Pre-event
    /// scoring is deterministic; there is no time for a per-attendee LLM
    /// pass over thousands of rows.
    fn score_attendee(&self, contact: ClayContact) -> ScoredAttendee {
        let company_label = contact
            .company
            .clone()
            .or_else(|| contact.email.as_deref().map(org_from_email))
            .unwrap_or_else(|| "unknown".to_string());
        let haystack = format!(
            "{} {}",
            contact.title.as_deref().unwrap_or(""),
            company_label
        )
        .to_lowercase();

        let mut icp_id = String::new();
        let mut best_hits = 0usize;
        for icp in &self.config.icp.icps {
            let hits = icp
                .signal_keywords
                .iter()
                .filter(|k| haystack.contains(&k.to_lowercase()))
                .count();
            if hits > best_hits || icp_id.is_empty() {
                best_hits = hits;
                icp_id = icp.id.clone();
            }
        }
        // Persona-matching titles are worth meeting regardless of company.
        let persona_bonus = contact
            .title
            .as_deref()
            .and_then(|t| self.config.messaging.persona_for_title(t))
            .map(|_| 30)
            .unwrap_or(0);
        let score = ((best_hits * 20) + persona_bonus).min(100) as u8;
        ScoredAttendee {
            contact,
            company_label,
            icp_id,
            score,
        }
    }

    async fn generate_outreach(&self, event: &str, scored: &[ScoredAttendee]) {
        for attendee in scored.iter().filter(|a| a.score > 0) {
            let prompt = format!(
                "Event: {event}\nAttendee: {name}, {title} at {company}\n\
                 Our angle: {positioning}\n\nWrite the outreach note.",
                event = event,
                name = attendee.contact.name.as_deref().unwrap_or("there"),
                title = attendee.contact.title.as_deref().unwrap_or("unknown title"),
                company = attendee.company_label,
                positioning = self.config.messaging.positioning.join("; "),
            );
            match self.llm.complete(OUTREACH_SYSTEM, &prompt).await {
                Ok(note) => println!(
                    "\n--- Outreach: {} ({}) ---\n{}",
                    attendee.contact.name.as_deref().unwrap_or("?"),
                    attendee.company_label,
                    note
                ),
                Err(e) => log::warn!(
                    "event pre: outreach generation failed for {:?}: {}",
                    attendee.contact.name,
                    e
                ),
            }
        }
    }

    /// One brief per distinct company among scoring attendees.
    async fn generate_briefs(
        &self,
        event: &str,
        scored: &[ScoredAttendee],
    ) -> Result<(), OpsError> {
        let mut by_company: BTreeMap<&str, Vec<&ScoredAttendee>> = BTreeMap::new();
        for attendee in scored.iter().filter(|a| a.score > 0) {
            by_company
                .entry(attendee.company_label.as_str())
                .or_default()
                .push(attendee);
        }

        let mut briefs = String::new();
        for (company, attendees) in &by_company {
            let roster = attendees
                .iter()
                .map(|a| {
                    format!(
                        "{} ({})",
                        a.contact.name.as_deref().unwrap_or("?"),
                        a.contact.title.as_deref().unwrap_or("?")
                    )
                })
                .collect::<Vec<_>>()
                .join(", ");
            let prompt = format!(
                "Event: {}\nCompany: {}\nAttending: {}\n\nWrite the account brief.",
                event, company, roster
            );
            match self.llm.complete(BRIEF_SYSTEM, &prompt).await {
                Ok(brief) => briefs.push_str(&format!("## {}\n{}\n\n", company, brief)),
                Err(e) => log::warn!("event pre: brief failed for {}: {}", company, e),
            }
        }
        if briefs.is_empty() {
            return Ok(());
        }

        let title = format!("Event Briefs — {}", event);
        if self.dry_run || self.settings.reports_folder_id.is_none() {
            println!("\n{}\n\n{}", title, briefs);
            return Ok(());
        }
        let folder = Settings::require(&self.settings.reports_folder_id, "REPORTS_FOLDER_ID")?;
        let doc = drive::create_doc(folder, &title, &briefs).await?;
        log::info!(
            "event pre: briefs saved to Drive ({})",
            doc.web_view_link.as_deref().unwrap_or(&doc.id)
        );
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Post-event
    // -----------------------------------------------------------------------

    pub async fn run_post(
        &self,
        event: &str,
        badge_file: Option<&Path>,
        notes_file: Option<&Path>,
    ) -> Result<(), OpsError> {
        let mut imported = 0usize;
        let mut conversations = 0usize;

        if let Some(path) = badge_file {
            imported = self.import_badges(event, path).await?;
        }
        if let Some(path) = notes_file {
            conversations = self.process_notes(event, path).await?;
        }

        let report = format!(
            "# Event Report — {}\n\n- Badge scans imported: {}\n- Conversations processed: {}\n",
            event, imported, conversations
        );
        println!("{}", report);
        if !self.dry_run {
            if let Some(folder) = self.settings.reports_folder_id.as_deref() {
                let doc = drive::create_doc(
                    folder,
                    &format!("Event Report — {}", event),
                    &report,
                )
                .await?;
                log::info!(
                    "event post: report saved to Drive ({})",
                    doc.web_view_link.as_deref().unwrap_or(&doc.id)
                );
            }
        }
        Ok(())
    }

    /// Badge scans become CRM records: company asserted by domain, person
    /// asserted by email. Re-importing the same file is a no-op.
    async fn import_badges(&self, event: &str, path: &Path) -> Result<usize, OpsError> {
        let rows = read_attendee_csv(path)?;
        log::info!("event post: {} badge scans in {}", rows.len(), path.display());

        let mut imported = 0usize;
        for row in &rows {
            let Some(email) = row.email.as_deref().filter(|e| e.contains('@')) else {
                log::info!("event post: badge scan without email, skipping: {:?}", row.name);
                continue;
            };
            let domain = email.split('@').nth(1).unwrap_or_default().to_string();
            let company_name = row
                .company
                .clone()
                .unwrap_or_else(|| org_from_email(email));
            let persona = row
                .title
                .as_deref()
                .and_then(|t| self.config.messaging.persona_for_title(t))
                .map(|d| d.persona.clone())
                .unwrap_or_else(|| "unclassified".to_string());

            if self.dry_run {
                log::info!(
                    "event post: dry run, would assert {} @ {} ({})",
                    row.name,
                    company_name,
                    persona
                );
                continue;
            }
            let company = self.attio.assert_company(&company_name, &domain).await?;
            let person = self
                .attio
                .assert_person(&NewPerson {
                    name: if row.name.is_empty() {
                        name_from_email(email)
                    } else {
                        row.name.clone()
                    },
                    email: email.to_string(),
                    title: row.title.clone(),
                    company_id: company.id.clone(),
                    persona: persona.clone(),
                    linkedin: None,
                })
                .await?;
            imported += 1;

            self.queue_followup(event, email, &person.name, &persona).await;
        }
        log::info!("event post: {} badge scans imported", imported);
        Ok(imported)
    }

    /// Event follow-up goes out via ActiveCampaign tags; the automation on
    /// that side owns send timing. Missing AC config downgrades to a log.
    async fn queue_followup(&self, event: &str, email: &str, name: &str, persona: &str) {
        let Some(ac) = self.ac else {
            log::info!("event post: ActiveCampaign not configured, no follow-up for {}", email);
            return;
        };
        let (first, last) = match name.split_once(' ') {
            Some((f, l)) => (f, l),
            None => (name, ""),
        };
        let result = async {
            let contact = ac.sync_contact(email, first, last).await?;
            for tag in [
                format!("event:{}", slugify(event)),
                format!("persona:{}", persona),
            ] {
                let tag_id = ac.ensure_tag(&tag).await?;
                ac.tag_contact(&contact.id, &tag_id).await?;
            }
            Ok::<(), crate::activecampaign::AcError>(())
        }
        .await;
        if let Err(e) = result {
            log::warn!("event post: follow-up queue failed for {}: {}", email, e);
        }
    }

    async fn process_notes(&self, event: &str, path: &Path) -> Result<usize, OpsError> {
        if !path.exists() {
            return Err(OpsError::InputNotFound(path.to_path_buf()));
        }
        let raw = std::fs::read_to_string(path)?;
        let prompt = format!(
            "Event: {event}\n\nRaw notes:\n{notes}\n\n\
             Return JSON: {{\"conversations\": [{{\"company\": \"...\", \
             \"contact\": \"... or null\", \"summary\": \"...\", \
             \"follow_up\": \"...\", \"hot\": true/false}}]}}",
            event = event,
            notes = wrap_user_data(&truncate_chars(&raw, 16000)),
        );
        let extraction: EventNotesExtraction =
            self.llm.complete_json(NOTES_SYSTEM, &prompt).await?;
        log::info!(
            "event post: {} conversations extracted from notes",
            extraction.conversations.len()
        );

        for conversation in &extraction.conversations {
            let note = format!(
                "{}{}\nFollow-up: {}",
                conversation.summary,
                conversation
                    .contact
                    .as_deref()
                    .map(|c| format!("\nContact: {}", c))
                    .unwrap_or_default(),
                conversation.follow_up
            );
            let title = format!(
                "{} conversation — {}",
                event,
                if conversation.hot { "HOT" } else { "follow-up" }
            );

            if self.dry_run {
                log::info!(
                    "event post: dry run, would note {} on {}",
                    title,
                    conversation.company
                );
                continue;
            }
            match self.attio.find_company_by_name(&conversation.company).await? {
                Some(company) => {
                    self.attio
                        .create_note(
                            &self.config.attio_schema.company_object,
                            &company.id,
                            &title,
                            &note,
                        )
                        .await?;
                }
                None => {
                    log::warn!(
                        "event post: no CRM company for \"{}\", printing note",
                        conversation.company
                    );
                    println!("{} — {}\n{}", conversation.company, title, note);
                }
            }
        }
        Ok(extraction.conversations.len())
    }
}

#[derive(Debug, Deserialize)]
struct EventNotesExtraction {
    #[serde(default)]
    conversations: Vec<EventConversation>,
}

#[derive(Debug, Deserialize)]
struct EventConversation {
    company: String,
    #[serde(default)]
    contact: Option<String>,
    #[serde(default)]
    summary: String,
    #[serde(default)]
    follow_up: String,
    #[serde(default)]
    hot: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_attendee_csv() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("attendees.csv");
        std::fs::write(
            &path,
            "name,email,company,title\n\
             Sarah Chen,sarah.chen@acme.com,Acme Staffing,VP HR Operations\n\
             ,raj.patel@acme.com,,Director of IT\n\
             ,,,\n",
        )
        .unwrap();

        let rows = read_attendee_csv(&path).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].name, "Sarah Chen");
        assert_eq!(rows[0].company.as_deref(), Some("Acme Staffing"));
        assert_eq!(rows[1].email.as_deref(), Some("raj.patel@acme.com"));
    }

    #[test]
    fn test_read_attendee_csv_missing_file() {
        let err = read_attendee_csv(Path::new("/nonexistent/attendees.csv")).unwrap_err();
        assert!(matches!(err, OpsError::InputNotFound(_)));
    }

    #[test]
    fn test_notes_extraction_parses() {
        let json = r#"{
            "conversations": [
                {
                    "company": "Acme Staffing",
                    "contact": "Sarah Chen",
                    "summary": "Long chat at the booth about I-9 backlogs.",
                    "follow_up": "Send the staffing case study by Friday.",
                    "hot": true
                }
            ]
        }"#;
        let extraction: EventNotesExtraction = serde_json::from_str(json).unwrap();
        assert_eq!(extraction.conversations.len(), 1);
        assert!(extraction.conversations[0].hot);
    }
}
