//! Meeting prep generator.
//!
//! Pulls today's external meetings from Google Calendar, assembles CRM,
//! transcript, and email context per meeting, and generates a structured
//! prep brief. Delivery is a Drive doc plus a CRM note, console, or both.

use chrono::NaiveDate;

use crate::attio::{AttioClient, Company, Deal, Person};
use crate::cli::OutputTarget;
use crate::error::OpsError;
use crate::google::calendar::{self, CalendarEvent};
use crate::google::{drive, gmail};
use crate::llm::LlmClient;
use crate::settings::Settings;
use crate::util::{classify_relationship, truncate_chars, wrap_user_data};

const PREP_SYSTEM: &str = "You prepare sales meeting briefs for an account \
executive at an employee onboarding platform. Be specific and skimmable; \
cite the provided context rather than inventing facts. Output markdown.";

const TRANSCRIPT_LIMIT: usize = 3;
const TRANSCRIPT_CHAR_BUDGET: usize = 4000;
const EMAIL_LOOKBACK_DAYS: u32 = 90;
const EMAILS_PER_ATTENDEE: usize = 5;
const EMAIL_BODY_CHAR_BUDGET: usize = 1500;

pub struct PrepEngine<'a> {
    pub attio: &'a AttioClient,
    pub llm: &'a LlmClient,
    pub settings: &'a Settings,
    pub config: &'a crate::config::OpsConfig,
    pub dry_run: bool,
}

/// Everything we could find about one attendee.
struct AttendeeContext {
    email: String,
    name: String,
    relationship: String,
    person: Option<Person>,
    emails: Vec<gmail::EmailSummary>,
    /// Body of the newest thread; snippets alone lose the ask.
    latest_body: Option<String>,
}

impl<'a> PrepEngine<'a> {
    pub async fn run(
        &self,
        date: Option<NaiveDate>,
        meeting_id: Option<&str>,
        output: OutputTarget,
    ) -> Result<(), OpsError> {
        let user_domain = Settings::require(&self.settings.user_domain, "USER_DOMAIN")?;
        let date = date.unwrap_or_else(|| chrono::Local::now().date_naive());

        let events = calendar::events_for_date(date).await?;
        let targets: Vec<&CalendarEvent> = match meeting_id {
            Some(id) => events.iter().filter(|e| e.id == id).collect(),
            None => events.iter().filter(|e| e.is_external(user_domain)).collect(),
        };
        if targets.is_empty() {
            log::info!("prep: no external meetings on {}", date);
            println!("No external meetings on {}.", date);
            return Ok(());
        }
        log::info!("prep: {} external meetings on {}", targets.len(), date);

        for event in targets {
            match self.prep_meeting(event, user_domain).await {
                Ok((company, brief)) => {
                    self.deliver(event, company.as_ref(), &brief, output).await?
                }
                Err(e) => log::warn!("prep: failed for \"{}\": {}", event.title, e),
            }
        }
        Ok(())
    }

    async fn prep_meeting(
        &self,
        event: &CalendarEvent,
        user_domain: &str,
    ) -> Result<(Option<Company>, String), OpsError> {
        let mut attendees = Vec::new();
        for attendee in event.external_attendees(user_domain) {
            attendees.push(self.attendee_context(&attendee.email, attendee.name.as_deref()).await);
        }

        // Company context comes from the first CRM-linked attendee.
        let company = match attendees
            .iter()
            .filter_map(|a| a.person.as_ref())
            .filter_map(|p| p.company_id.as_deref())
            .next()
        {
            Some(company_id) => Some(self.attio.get_company(company_id).await?),
            None => None,
        };
        let deals = match &company {
            Some(c) => self.attio.deals_for_company(&c.id).await?,
            None => Vec::new(),
        };
        let transcripts = self.relevant_transcripts(&company, &attendees).await;

        let prompt = build_prep_prompt(event, &attendees, &company, &deals, &transcripts);
        let brief = self.llm.complete(PREP_SYSTEM, &prompt).await?;
        Ok((company, brief))
    }

    async fn attendee_context(&self, email: &str, display_name: Option<&str>) -> AttendeeContext {
        let person = match self.attio.find_person_by_email(email).await {
            Ok(p) => p,
            Err(e) => {
                log::warn!("prep: CRM lookup failed for {}: {}", email, e);
                None
            }
        };
        let emails = match gmail::recent_messages_with(
            email,
            EMAIL_LOOKBACK_DAYS,
            EMAILS_PER_ATTENDEE,
        )
        .await
        {
            Ok(msgs) => msgs,
            Err(e) => {
                log::warn!("prep: gmail lookup failed for {}: {}", email, e);
                Vec::new()
            }
        };
        let latest_body = match emails.first() {
            Some(latest) => match gmail::message_body(&latest.id).await {
                Ok(body) => Some(truncate_chars(&body, EMAIL_BODY_CHAR_BUDGET)),
                Err(e) => {
                    log::warn!("prep: body fetch failed for {}: {}", email, e);
                    None
                }
            },
            None => None,
        };
        let name = person
            .as_ref()
            .map(|p| p.name.clone())
            .or_else(|| display_name.map(|n| n.to_string()))
            .unwrap_or_else(|| crate::util::name_from_email(email));
        AttendeeContext {
            email: email.to_string(),
            name,
            relationship: classify_relationship(email, self.settings.user_domain.as_deref()),
            person,
            emails,
            latest_body,
        }
    }

    /// Transcript docs in the Fathom folder whose title mentions the company
    /// or an attendee. No folder configured means no transcript context.
    async fn relevant_transcripts(
        &self,
        company: &Option<Company>,
        attendees: &[AttendeeContext],
    ) -> Vec<(String, String)> {
        let Some(folder) = self.settings.fathom_folder_id.as_deref() else {
            return Vec::new();
        };
        let docs = match drive::list_folder_docs(folder, None).await {
            Ok(docs) => docs,
            Err(e) => {
                log::warn!("prep: transcript listing failed: {}", e);
                return Vec::new();
            }
        };
        let needles: Vec<String> = company
            .iter()
            .map(|c| c.name.to_lowercase())
            .chain(attendees.iter().map(|a| a.name.to_lowercase()))
            .collect();

        let mut out = Vec::new();
        for doc in docs {
            if out.len() >= TRANSCRIPT_LIMIT {
                break;
            }
            let title = doc.name.to_lowercase();
            if !needles.iter().any(|n| !n.is_empty() && title.contains(n)) {
                continue;
            }
            match drive::export_doc_text(&doc.id).await {
                Ok(text) => out.push((doc.name, truncate_chars(&text, TRANSCRIPT_CHAR_BUDGET))),
                Err(e) => log::warn!("prep: transcript export failed for {}: {}", doc.name, e),
            }
        }
        out
    }

    async fn deliver(
        &self,
        event: &CalendarEvent,
        company: Option<&Company>,
        brief: &str,
        output: OutputTarget,
    ) -> Result<(), OpsError> {
        let title = format!("Meeting Prep: {}", event.title);
        if matches!(output, OutputTarget::Console | OutputTarget::Both) {
            println!("\n===== {} =====\n{}\n", title, brief);
        }
        if matches!(output, OutputTarget::Slack) {
            log::warn!("prep: slack output not supported, printing to console");
            println!("\n===== {} =====\n{}\n", title, brief);
        }
        if !matches!(output, OutputTarget::Gdrive | OutputTarget::Both) {
            return Ok(());
        }
        if self.dry_run {
            log::info!("prep: dry run, would write \"{}\" to Drive and CRM", title);
            return Ok(());
        }

        let folder = Settings::require(&self.settings.reports_folder_id, "REPORTS_FOLDER_ID")?;
        let doc = drive::create_doc(folder, &title, brief).await?;
        log::info!(
            "prep: brief saved to Drive ({})",
            doc.web_view_link.as_deref().unwrap_or(&doc.id)
        );
        if let Some(company) = company {
            self.attio
                .create_note(
                    &self.config.attio_schema.company_object,
                    &company.id,
                    &title,
                    brief,
                )
                .await?;
            log::info!("prep: note created on {}", company.name);
        }
        Ok(())
    }
}

fn build_prep_prompt(
    event: &CalendarEvent,
    attendees: &[AttendeeContext],
    company: &Option<Company>,
    deals: &[Deal],
    transcripts: &[(String, String)],
) -> String {
    let attendee_block = attendees
        .iter()
        .map(|a| {
            let crm = match &a.person {
                Some(p) => format!(
                    "in CRM as \"{}\" ({}), persona {}",
                    p.name,
                    p.title.as_deref().unwrap_or("no title"),
                    p.persona.as_deref().unwrap_or("unclassified")
                ),
                None => "not in CRM".to_string(),
            };
            let history = if a.emails.is_empty() {
                "no recent email".to_string()
            } else {
                a.emails
                    .iter()
                    .map(|e| e.context_line())
                    .collect::<Vec<_>>()
                    .join("\n  ")
            };
            let latest = a
                .latest_body
                .as_deref()
                .map(|body| format!("\n  Latest thread:\n  {}", body))
                .unwrap_or_default();
            format!(
                "- {} <{}> ({}): {}\n  Recent email:\n  {}{}",
                a.name, a.email, a.relationship, crm, history, latest
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    let company_block = match company {
        Some(c) => format!(
            "{} (tier {})\nBrief: {}\nPain points: {}\nTech stack: {}",
            c.name,
            c.tier.map(|t| t.to_string()).unwrap_or_else(|| "?".to_string()),
            c.account_brief.as_deref().unwrap_or("none"),
            c.pain_points.as_deref().unwrap_or("none"),
            c.tech_stack.as_deref().unwrap_or("unknown"),
        ),
        None => "No CRM company matched.".to_string(),
    };

    let deal_block = if deals.is_empty() {
        "No open deals.".to_string()
    } else {
        deals
            .iter()
            .map(|d| {
                format!(
                    "- {} — stage {}, amount {}, close {}",
                    d.name,
                    d.stage,
                    d.amount
                        .map(|a| format!("${:.0}", a))
                        .unwrap_or_else(|| "unset".to_string()),
                    d.close_date.as_deref().unwrap_or("unset")
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    };

    let transcript_block = if transcripts.is_empty() {
        "None found.".to_string()
    } else {
        transcripts
            .iter()
            .map(|(name, text)| format!("### {}\n{}", name, text))
            .collect::<Vec<_>>()
            .join("\n\n")
    };

    format!(
        "Prepare a meeting brief.\n\n\
         Meeting: {title} ({start})\n\n\
         Attendees:\n{attendees}\n\n\
         Account:\n{company}\n\n\
         Deals:\n{deals}\n\n\
         Prior call transcripts:\n{transcripts}\n\n\
         Write these sections: Meeting Snapshot, Attendee Profiles, \
         Relationship History, Deal Status, Suggested Talking Points, \
         Competitive Positioning, Objection Prep.",
        title = event.title,
        start = event.start,
        attendees = wrap_user_data(&attendee_block),
        company = wrap_user_data(&company_block),
        deals = wrap_user_data(&deal_block),
        transcripts = wrap_user_data(&truncate_chars(&transcript_block, 12000)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::google::calendar::Attendee;

    fn sample_event() -> CalendarEvent {
        CalendarEvent {
            id: "evt1".to_string(),
            title: "Acme <> Discovery".to_string(),
            description: None,
            start: "2026-08-29T15:00:00Z".to_string(),
            end: "2026-08-29T15:45:00Z".to_string(),
            attendees: vec![Attendee {
                email: "sarah.chen@acme.com".to_string(),
                name: Some("Sarah Chen".to_string()),
                response: Some("accepted".to_string()),
                organizer: false,
            }],
            meet_link: None,
        }
    }

    #[test]
    fn test_prompt_includes_all_sections() {
        let attendees = vec![AttendeeContext {
            email: "sarah.chen@acme.com".to_string(),
            name: "Sarah Chen".to_string(),
            relationship: "external".to_string(),
            person: Some(Person {
                id: "rec_p1".to_string(),
                name: "Sarah Chen".to_string(),
                title: Some("VP HR Operations".to_string()),
                persona: Some("hr_ops".to_string()),
                ..Person::default()
            }),
            emails: vec![gmail::EmailSummary {
                id: "18f1".to_string(),
                subject: "Re: Onboarding workflow".to_string(),
                from: "Sarah Chen <sarah.chen@acme.com>".to_string(),
                date: None,
                snippet: "Sending over our I-9 volumes...".to_string(),
            }],
            latest_body: Some("We need Okta SSO confirmed before the pilot kicks off.".to_string()),
        }];
        let company = Some(Company {
            id: "rec_1".to_string(),
            name: "Acme Staffing".to_string(),
            tier: Some(1),
            ..Company::default()
        });
        let deals = vec![Deal {
            id: "rec_d1".to_string(),
            name: "Acme — Platform".to_string(),
            stage: "Discovery".to_string(),
            amount: Some(48000.0),
            ..Deal::default()
        }];

        let prompt = build_prep_prompt(&sample_event(), &attendees, &company, &deals, &[]);
        assert!(prompt.contains("Acme <> Discovery"));
        assert!(prompt.contains("sarah.chen@acme.com"));
        assert!(prompt.contains("hr_ops"));
        assert!(prompt.contains("stage Discovery"));
        assert!(prompt.contains("Objection Prep"));
        assert!(prompt.contains("Re: Onboarding workflow"));
        assert!(prompt.contains("Okta SSO confirmed before the pilot"));
    }

    #[test]
    fn test_prompt_handles_unknown_account() {
        let attendees = vec![AttendeeContext {
            email: "new@unknownco.com".to_string(),
            name: "New Contact".to_string(),
            relationship: "external".to_string(),
            person: None,
            emails: vec![],
            latest_body: None,
        }];
        let prompt = build_prep_prompt(&sample_event(), &attendees, &None, &[], &[]);
        assert!(prompt.contains("not in CRM"));
        assert!(prompt.contains("No CRM company matched."));
        assert!(prompt.contains("No open deals."));
        assert!(!prompt.contains("Latest thread:"));
    }
}
