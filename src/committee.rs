//! Buying committee builder.
//!
//! For accounts flagged "Build Buying Committee": find which personas are
//! missing from the account's linked people, hunt candidates in Clay by title
//! pattern, enrich them, and assert them into the CRM keyed by email so
//! re-runs never duplicate a contact.

use std::collections::BTreeSet;

use crate::attio::{AttioClient, Company, NewPerson, Person};
use crate::clay::{ClayClient, ClayContact};
use crate::config::{MessagingConfig, OpsConfig};
use crate::error::OpsError;

const TARGET_ACTION: &str = "Build Buying Committee";

#[derive(Debug)]
pub enum CommitteeMode {
    Single { company_id: String },
    Batch,
}

pub struct CommitteeEngine<'a> {
    pub attio: &'a AttioClient,
    pub clay: &'a ClayClient,
    pub config: &'a OpsConfig,
    pub dry_run: bool,
}

impl<'a> CommitteeEngine<'a> {
    pub async fn run(&self, mode: CommitteeMode) -> Result<(), OpsError> {
        match mode {
            CommitteeMode::Single { company_id } => {
                let company = self.attio.get_company(&company_id).await?;
                self.build_for(&company).await
            }
            CommitteeMode::Batch => {
                let companies = self.attio.find_companies_by_nba(TARGET_ACTION).await?;
                log::info!(
                    "committee batch: {} accounts flagged \"{}\"",
                    companies.len(),
                    TARGET_ACTION
                );
                for company in &companies {
                    if let Err(e) = self.build_for(company).await {
                        log::warn!("committee: skipping {}: {}", company.name, e);
                    }
                }
                Ok(())
            }
        }
    }

    /// Fill persona gaps for one account. Also invoked by the post-meeting
    /// processor after new stakeholders land.
    pub async fn build_for(&self, company: &Company) -> Result<(), OpsError> {
        let domain = company.domain.as_deref().ok_or_else(|| {
            OpsError::RecordNotFound(format!("{} has no domain", company.name))
        })?;

        let existing = self.attio.people_for_company(&company.id).await?;
        let covered = covered_personas(&existing, &self.config.messaging);
        log::info!(
            "committee: {} has {} contacts covering {:?}",
            company.name,
            existing.len(),
            covered
        );

        let mut added = 0usize;
        for persona in &self.config.messaging.personas {
            if covered.contains(&persona.persona) {
                continue;
            }
            let candidates = self
                .clay
                .find_people(domain, &persona.title_keywords)
                .await?;
            let Some(candidate) = pick_candidate(&candidates, &persona.title_keywords) else {
                log::info!(
                    "committee: {} gap remains for persona {} (no candidates)",
                    company.name,
                    persona.persona
                );
                continue;
            };

            let enriched = self.clay.enrich_contact(candidate).await?;
            let Some(email) = enriched.email.clone() else {
                log::info!(
                    "committee: {} candidate {} has no email, skipping",
                    company.name,
                    enriched.name.as_deref().unwrap_or("?")
                );
                continue;
            };

            let new_person = NewPerson {
                name: enriched
                    .name
                    .clone()
                    .unwrap_or_else(|| crate::util::name_from_email(&email)),
                email,
                title: enriched.title.clone(),
                company_id: company.id.clone(),
                persona: persona.persona.clone(),
                linkedin: enriched.linkedin_url.clone(),
            };
            if self.dry_run {
                log::info!(
                    "committee: dry run, would assert {} <{}> as {} at {}",
                    new_person.name,
                    new_person.email,
                    new_person.persona,
                    company.name
                );
                continue;
            }
            let person = self.attio.assert_person(&new_person).await?;
            log::info!(
                "committee: added {} ({}) to {}",
                person.name,
                persona.persona,
                company.name
            );
            added += 1;
        }
        log::info!("committee: {} — {} contacts added", company.name, added);
        Ok(())
    }
}

/// Personas already represented by the account's linked people. A person's
/// stored persona label wins; otherwise their title is classified against
/// the configured patterns.
pub fn covered_personas(people: &[Person], messaging: &MessagingConfig) -> BTreeSet<String> {
    people
        .iter()
        .filter_map(|p| {
            p.persona.clone().or_else(|| {
                p.title
                    .as_deref()
                    .and_then(|t| messaging.persona_for_title(t))
                    .map(|d| d.persona.clone())
            })
        })
        .collect()
}

/// Prefer a candidate whose title actually matches the persona's keywords;
/// Clay's title search can return near misses.
fn pick_candidate<'c>(
    candidates: &'c [ClayContact],
    title_keywords: &[String],
) -> Option<&'c ClayContact> {
    candidates
        .iter()
        .find(|c| {
            c.title.as_deref().is_some_and(|t| {
                let lowered = t.to_lowercase();
                title_keywords
                    .iter()
                    .any(|k| lowered.contains(&k.to_lowercase()))
            })
        })
        .or_else(|| candidates.first())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_covered_personas_from_stored_label() {
        let messaging = MessagingConfig::default();
        let people = vec![Person {
            id: "rec_p1".to_string(),
            name: "Sarah Chen".to_string(),
            persona: Some("hr_ops".to_string()),
            ..Person::default()
        }];
        let covered = covered_personas(&people, &messaging);
        assert!(covered.contains("hr_ops"));
        assert_eq!(covered.len(), 1);
    }

    #[test]
    fn test_covered_personas_classified_from_title() {
        let messaging = MessagingConfig::default();
        let people = vec![Person {
            id: "rec_p2".to_string(),
            name: "Pat Lee".to_string(),
            title: Some("Chief People Officer".to_string()),
            ..Person::default()
        }];
        let covered = covered_personas(&people, &messaging);
        assert!(covered.contains("c_suite"));
    }

    #[test]
    fn test_covered_personas_unclassifiable_title_ignored() {
        let messaging = MessagingConfig::default();
        let people = vec![Person {
            id: "rec_p3".to_string(),
            name: "Sam Roe".to_string(),
            title: Some("Staff Accountant".to_string()),
            ..Person::default()
        }];
        assert!(covered_personas(&people, &messaging).is_empty());
    }

    #[test]
    fn test_pick_candidate_prefers_title_match() {
        let keywords = vec!["VP HR Operations".to_string()];
        let candidates = vec![
            ClayContact {
                name: Some("Near Miss".to_string()),
                title: Some("HR Coordinator".to_string()),
                ..ClayContact::default()
            },
            ClayContact {
                name: Some("Exact Fit".to_string()),
                title: Some("VP HR Operations".to_string()),
                ..ClayContact::default()
            },
        ];
        let picked = pick_candidate(&candidates, &keywords).unwrap();
        assert_eq!(picked.name.as_deref(), Some("Exact Fit"));
    }

    #[test]
    fn test_pick_candidate_falls_back_to_first() {
        let keywords = vec!["CHRO".to_string()];
        let candidates = vec![ClayContact {
            name: Some("Only Option".to_string()),
            title: Some("People Lead".to_string()),
            ..ClayContact::default()
        }];
        let picked = pick_candidate(&candidates, &keywords).unwrap();
        assert_eq!(picked.name.as_deref(), Some("Only Option"));
    }
}
