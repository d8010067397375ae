//! Outbound sequence generator.
//!
//! For accounts flagged "Launch Outbound": map each contact's persona to a
//! messaging track, generate a 4-touch sequence that weaves in the account
//! intelligence and the mandatory positioning phrases, and push it to
//! ActiveCampaign tagged by ICP tier, industry, persona, and sequence
//! version. Preview mode prints instead of pushing.

use serde::Deserialize;

use crate::activecampaign::{AcClient, SequenceTouch};
use crate::attio::{AttioClient, Company, Person};
use crate::config::OpsConfig;
use crate::error::OpsError;
use crate::llm::LlmClient;
use crate::util::{slugify, truncate_chars, wrap_user_data};

const TARGET_ACTION: &str = "Launch Outbound";
const TOUCH_COUNT: usize = 4;

const SEQUENCE_SYSTEM: &str = "You write concise, specific B2B outbound email \
sequences for an employee onboarding platform. No filler, no hype, under 120 \
words per touch. Respond with a single JSON object and nothing else.";

#[derive(Debug)]
pub enum OutboundMode {
    Single { company_id: String },
    Batch,
    Preview { company_id: Option<String> },
}

pub struct OutboundEngine<'a> {
    pub attio: &'a AttioClient,
    /// Absent in preview-only setups; pushing without it is a config error.
    pub ac: Option<&'a AcClient>,
    pub llm: &'a LlmClient,
    pub config: &'a OpsConfig,
    pub dry_run: bool,
}

impl<'a> OutboundEngine<'a> {
    pub async fn run(&self, mode: OutboundMode) -> Result<(), OpsError> {
        match mode {
            OutboundMode::Single { company_id } => {
                let company = self.attio.get_company(&company_id).await?;
                self.generate_for(&company, true).await
            }
            OutboundMode::Batch => {
                let companies = self.attio.find_companies_by_nba(TARGET_ACTION).await?;
                log::info!(
                    "outbound batch: {} accounts flagged \"{}\"",
                    companies.len(),
                    TARGET_ACTION
                );
                for company in &companies {
                    if let Err(e) = self.generate_for(company, true).await {
                        log::warn!("outbound: skipping {}: {}", company.name, e);
                    }
                }
                Ok(())
            }
            OutboundMode::Preview { company_id } => {
                let companies = match company_id {
                    Some(id) => vec![self.attio.get_company(&id).await?],
                    None => self.attio.find_companies_by_nba(TARGET_ACTION).await?,
                };
                for company in &companies {
                    if let Err(e) = self.generate_for(company, false).await {
                        log::warn!("outbound: preview failed for {}: {}", company.name, e);
                    }
                }
                Ok(())
            }
        }
    }

    async fn generate_for(&self, company: &Company, push: bool) -> Result<(), OpsError> {
        let people = self.attio.people_for_company(&company.id).await?;
        let targets: Vec<&Person> = people
            .iter()
            .filter(|p| p.email.is_some() && p.persona.is_some())
            .collect();
        if targets.is_empty() {
            log::info!(
                "outbound: {} has no contacts with email + persona, nothing to send",
                company.name
            );
            return Ok(());
        }

        for person in targets {
            let persona = person.persona.as_deref().unwrap_or_default();
            let Some(definition) = self
                .config
                .messaging
                .personas
                .iter()
                .find(|d| d.persona == persona)
            else {
                log::warn!(
                    "outbound: {} has unknown persona \"{}\", skipping",
                    person.name,
                    persona
                );
                continue;
            };
            let track = self
                .config
                .messaging
                .track(&definition.track)
                .ok_or_else(|| {
                    OpsError::Configuration(format!(
                        "persona {} maps to missing track {}",
                        persona, definition.track
                    ))
                })?;

            let prompt = self.sequence_prompt(company, person, persona, &track.themes);
            let generated: GeneratedSequence =
                self.llm.complete_json(SEQUENCE_SYSTEM, &prompt).await?;
            if generated.touches.len() != TOUCH_COUNT {
                log::warn!(
                    "outbound: {} sequence for {} has {} touches, expected {}",
                    company.name,
                    person.name,
                    generated.touches.len(),
                    TOUCH_COUNT
                );
            }

            if push {
                self.push(company, person, persona, &generated.touches).await?;
            } else {
                print_preview(company, person, &generated.touches);
            }
        }
        Ok(())
    }

    fn sequence_prompt(
        &self,
        company: &Company,
        person: &Person,
        persona: &str,
        themes: &[String],
    ) -> String {
        let intel = format!(
            "Brief: {}\nPain points: {}\nTech stack: {}",
            company.account_brief.as_deref().unwrap_or("none"),
            company.pain_points.as_deref().unwrap_or("none"),
            company.tech_stack.as_deref().unwrap_or("unknown"),
        );
        format!(
            "Write a {count}-touch outbound email sequence.\n\n\
             Recipient: {name}, {title} at {company} (persona: {persona})\n\
             Messaging themes: {themes}\n\
             Positioning phrases to weave in naturally: {positioning}\n\n\
             Account intelligence:\n{intel}\n\n\
             The arc: (1) pain-aware intro, (2) value prop with social proof, \
             (3) competitive differentiation, (4) direct call to action.\n\
             Day offsets: 0, 3, 7, 12.\n\n\
             Return JSON: {{\"touches\": [{{\"subject\": \"...\", \"body\": \
             \"...\", \"dayOffset\": 0}}, ...]}}",
            count = TOUCH_COUNT,
            name = person.name,
            title = person.title.as_deref().unwrap_or("unknown title"),
            company = company.name,
            persona = persona,
            themes = themes.join(", "),
            positioning = self.config.messaging.positioning.join("; "),
            intel = wrap_user_data(&truncate_chars(&intel, 3000)),
        )
    }

    async fn push(
        &self,
        company: &Company,
        person: &Person,
        persona: &str,
        touches: &[SequenceTouch],
    ) -> Result<(), OpsError> {
        let email = person.email.as_deref().unwrap_or_default();
        let tags = sequence_tags(
            company,
            persona,
            &self.config.messaging.sequence_version,
        );

        if self.dry_run {
            log::info!(
                "outbound: dry run, would push {} touches to {} with tags {:?}",
                touches.len(),
                email,
                tags
            );
            return Ok(());
        }
        let ac = self.ac.ok_or_else(|| {
            OpsError::Configuration("ActiveCampaign not configured (AC_API_KEY / AC_BASE_URL)".to_string())
        })?;

        let (first, last) = split_name(&person.name);
        let contact = ac.sync_contact(email, first, last).await?;
        for tag in &tags {
            let tag_id = ac.ensure_tag(tag).await?;
            ac.tag_contact(&contact.id, &tag_id).await?;
        }
        ac.add_sequence_note(&contact.id, touches).await?;
        log::info!(
            "outbound: pushed {}-touch sequence to {} ({})",
            touches.len(),
            person.name,
            email
        );
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct GeneratedSequence {
    #[serde(default)]
    touches: Vec<SequenceTouch>,
}

/// Tag set applied to every pushed contact.
fn sequence_tags(company: &Company, persona: &str, sequence_version: &str) -> Vec<String> {
    let mut tags = vec![
        format!(
            "icp-tier:{}",
            company
                .tier
                .map(|t| t.to_string())
                .unwrap_or_else(|| "unknown".to_string())
        ),
        format!("persona:{}", persona),
        format!("sequence:{}", sequence_version),
    ];
    if let Some(industry) = company.industry.as_deref() {
        tags.push(format!("industry:{}", slugify(industry)));
    }
    tags
}

fn split_name(name: &str) -> (&str, &str) {
    match name.split_once(' ') {
        Some((first, last)) => (first, last),
        None => (name, ""),
    }
}

fn print_preview(company: &Company, person: &Person, touches: &[SequenceTouch]) {
    println!(
        "── {} — {} ({}) ──",
        company.name,
        person.name,
        person.persona.as_deref().unwrap_or("?")
    );
    for (i, touch) in touches.iter().enumerate() {
        println!(
            "Touch {} (day {}): {}\n{}\n",
            i + 1,
            touch.day_offset,
            touch.subject,
            touch.body
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_tags() {
        let company = Company {
            id: "rec_1".to_string(),
            name: "Acme Staffing".to_string(),
            tier: Some(1),
            industry: Some("Staffing & Recruiting".to_string()),
            ..Company::default()
        };
        let tags = sequence_tags(&company, "hr_ops", "v3");
        assert!(tags.contains(&"icp-tier:1".to_string()));
        assert!(tags.contains(&"persona:hr_ops".to_string()));
        assert!(tags.contains(&"sequence:v3".to_string()));
        assert!(tags.contains(&"industry:staffing-recruiting".to_string()));
    }

    #[test]
    fn test_sequence_tags_without_tier_or_industry() {
        let company = Company {
            id: "rec_2".to_string(),
            name: "Mystery Co".to_string(),
            ..Company::default()
        };
        let tags = sequence_tags(&company, "c_suite", "v3");
        assert!(tags.contains(&"icp-tier:unknown".to_string()));
        assert!(!tags.iter().any(|t| t.starts_with("industry:")));
    }

    #[test]
    fn test_split_name() {
        assert_eq!(split_name("Sarah Chen"), ("Sarah", "Chen"));
        assert_eq!(split_name("Cher"), ("Cher", ""));
        assert_eq!(split_name("Mary Jo Kane"), ("Mary", "Jo Kane"));
    }

    #[test]
    fn test_generated_sequence_parses() {
        let json = r#"{
            "touches": [
                {"subject": "Cutting time-to-start at Acme", "body": "Hi Sarah...", "dayOffset": 0},
                {"subject": "How TalentBridge cut onboarding 38%", "body": "...", "dayOffset": 3},
                {"subject": "Beyond the Bullhorn module", "body": "...", "dayOffset": 7},
                {"subject": "Worth 20 minutes?", "body": "...", "dayOffset": 12}
            ]
        }"#;
        let seq: GeneratedSequence = serde_json::from_str(json).unwrap();
        assert_eq!(seq.touches.len(), 4);
        assert_eq!(seq.touches[3].day_offset, 12);
    }
}
