//! Account intelligence engine.
//!
//! For each target company: Clay firmographics, a web research sweep, ICP
//! scoring against the configured rubrics, a Next Best Action decision, and a
//! GTM channel call. All of it lands back on the Attio company record in one
//! field-scoped update stamped with `ai_enriched_at`, so the batch mode only
//! touches records whose enrichment is missing or stale.

use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::attio::{AttioClient, Company};
use crate::clay::{ClayClient, CompanyEnrichment};
use crate::config::{AttioSchemaConfig, OpsConfig};
use crate::error::OpsError;
use crate::llm::LlmClient;
use crate::search::{results_block, SearchClient, SearchResult};
use crate::util::{truncate_chars, wrap_user_data};

const SCORING_SYSTEM: &str = "You are a B2B GTM analyst for an employee \
onboarding platform. You score accounts against Ideal Customer Profiles and \
recommend a go-to-market channel. Respond with a single JSON object and \
nothing else.";

#[derive(Debug)]
pub enum IntelMode {
    Single { company_id: String },
    Batch { tier: Option<i64>, max_age_days: i64 },
    Audit,
}

pub struct IntelEngine<'a> {
    pub attio: &'a AttioClient,
    pub clay: &'a ClayClient,
    pub search: &'a SearchClient,
    pub llm: &'a LlmClient,
    pub config: &'a OpsConfig,
    pub dry_run: bool,
}

/// The scoring synthesis the LLM returns (or the fallback builds).
#[derive(Debug, Deserialize)]
pub struct IntelAssessment {
    pub account_brief: String,
    /// Id of the best-matching ICP from the configured rubrics.
    pub best_icp: String,
    /// 0-100 fit confidence for the best ICP.
    pub icp_confidence: u8,
    pub icp_rationale: String,
    #[serde(default)]
    pub pain_points: Vec<String>,
    #[serde(default)]
    pub buying_signals: Vec<String>,
    /// Persona labels worth pursuing at this account.
    #[serde(default)]
    pub personas: Vec<String>,
    pub gtm_channel: String,
    #[serde(default)]
    pub gtm_confidence: u8,
    #[serde(default)]
    pub gtm_reasoning: String,
}

impl<'a> IntelEngine<'a> {
    pub async fn run(&self, mode: IntelMode) -> Result<(), OpsError> {
        match mode {
            IntelMode::Single { company_id } => {
                let company = self.attio.get_company(&company_id).await?;
                self.enrich_company(&company).await
            }
            IntelMode::Batch { tier, max_age_days } => {
                let companies = self.attio.find_stale_companies(max_age_days, tier).await?;
                log::info!(
                    "intel batch: {} companies stale beyond {} days",
                    companies.len(),
                    max_age_days
                );
                for company in &companies {
                    if let Err(e) = self.enrich_company(company).await {
                        log::warn!("intel: skipping {}: {}", company.name, e);
                    }
                }
                Ok(())
            }
            IntelMode::Audit => self.audit().await,
        }
    }

    /// Full enrichment pass for one company.
    async fn enrich_company(&self, company: &Company) -> Result<(), OpsError> {
        let domain = company.domain.as_deref().ok_or_else(|| {
            OpsError::RecordNotFound(format!("{} has no domain, cannot enrich", company.name))
        })?;
        log::info!("intel: enriching {} ({})", company.name, domain);

        let enrichment = self.clay.enrich_company(domain).await?;
        let research = self.research(&company.name, domain).await;

        let assessment = match self.score(company, &enrichment, &research).await {
            Ok(a) => a,
            Err(e) => {
                log::warn!(
                    "intel: LLM scoring failed for {} ({}), using keyword fallback",
                    company.name,
                    e
                );
                self.fallback_assessment(company, &enrichment, &research)
            }
        };

        let has_contacts = !self.attio.people_for_company(&company.id).await?.is_empty();
        let partner_match = self
            .config
            .icp
            .icps
            .iter()
            .any(|i| i.id == assessment.best_icp && i.partner_ecosystem);
        let next_action =
            decide_next_action(&assessment, &enrichment, has_contacts, partner_match);
        let channel = self.validated_channel(&assessment.gtm_channel);

        log::info!(
            "intel: {} → icp={} confidence={} nba=\"{}\" channel=\"{}\"",
            company.name,
            assessment.best_icp,
            assessment.icp_confidence,
            next_action,
            channel
        );

        let values = field_updates(
            &self.config.attio_schema,
            &assessment,
            &enrichment,
            next_action,
            &channel,
        );
        if self.dry_run {
            log::info!(
                "intel: dry run, would update {} with: {}",
                company.name,
                serde_json::to_string(&values).unwrap_or_default()
            );
            return Ok(());
        }
        self.attio.update_company_fields(&company.id, values).await?;
        Ok(())
    }

    /// Web sweep: recent news, hiring signals, compliance/ATS movement.
    /// Search failures degrade to an empty section rather than aborting.
    async fn research(&self, name: &str, domain: &str) -> Vec<SearchResult> {
        let queries: [(String, u32); 3] = [
            (format!("\"{}\" news", name), 31),
            (format!("\"{}\" hiring onboarding jobs", name), 31),
            (format!("\"{}\" OR {} compliance ATS migration", name, domain), 93),
        ];
        let mut all = Vec::new();
        for (query, freshness) in &queries {
            match self.search.search(query, *freshness).await {
                Ok(mut results) => all.append(&mut results),
                Err(e) => log::warn!("intel: search \"{}\" failed: {}", query, e),
            }
        }
        all
    }

    async fn score(
        &self,
        company: &Company,
        enrichment: &CompanyEnrichment,
        research: &[SearchResult],
    ) -> Result<IntelAssessment, OpsError> {
        let prompt = self.scoring_prompt(company, enrichment, research);
        let assessment: IntelAssessment =
            self.llm.complete_json(SCORING_SYSTEM, &prompt).await?;
        Ok(assessment)
    }

    fn scoring_prompt(
        &self,
        company: &Company,
        enrichment: &CompanyEnrichment,
        research: &[SearchResult],
    ) -> String {
        let rubrics = self
            .config
            .icp
            .icps
            .iter()
            .map(|i| {
                format!(
                    "- id \"{}\" ({}, {}% of GTM focus): {}",
                    i.id,
                    i.name,
                    i.focus_pct,
                    i.criteria.join("; ")
                )
            })
            .collect::<Vec<_>>()
            .join("\n");
        let channels = self.config.icp.gtm_channels.join(", ");
        let enrichment_json = serde_json::to_string(enrichment).unwrap_or_default();
        let research_text = truncate_chars(&results_block(research), 6000);

        format!(
            "Score this account against our ICPs and recommend a GTM channel.\n\n\
             ICP rubrics:\n{rubrics}\n\n\
             Allowed GTM channels: {channels}\n\n\
             Company: {name}\nFirmographics:\n{firmo}\n\nRecent research:\n{research}\n\n\
             Return JSON with exactly these keys:\n\
             {{\"account_brief\": \"2-3 sentence account summary\",\n \
             \"best_icp\": \"id of best ICP\",\n \
             \"icp_confidence\": 0-100,\n \
             \"icp_rationale\": \"why this ICP, citing evidence\",\n \
             \"pain_points\": [\"...\"],\n \
             \"buying_signals\": [\"...\"],\n \
             \"personas\": [\"hr_ops|c_suite|compliance|hr_engineer|operations\"],\n \
             \"gtm_channel\": \"one allowed channel\",\n \
             \"gtm_confidence\": 0-100,\n \
             \"gtm_reasoning\": \"one sentence\"}}",
            rubrics = rubrics,
            channels = channels,
            name = company.name,
            firmo = wrap_user_data(&enrichment_json),
            research = wrap_user_data(&research_text),
        )
    }

    /// Deterministic scorer used when the LLM response cannot be parsed:
    /// rank ICPs by signal-keyword hits across firmographics and research.
    fn fallback_assessment(
        &self,
        company: &Company,
        enrichment: &CompanyEnrichment,
        research: &[SearchResult],
    ) -> IntelAssessment {
        let haystack = format!(
            "{} {} {} {}",
            enrichment.industry.as_deref().unwrap_or(""),
            enrichment.tech_stack.join(" "),
            company.name,
            research
                .iter()
                .map(|r| format!("{} {}", r.title, r.snippet))
                .collect::<Vec<_>>()
                .join(" ")
        )
        .to_lowercase();

        // Ties break toward the higher-focus ICP.
        let scored = self
            .config
            .icp
            .icps
            .iter()
            .map(|icp| {
                let hits = icp
                    .signal_keywords
                    .iter()
                    .filter(|k| haystack.contains(&k.to_lowercase()))
                    .count();
                (icp, hits)
            })
            .max_by_key(|(icp, hits)| (*hits, icp.focus_pct));
        let Some((icp, hits)) = scored else {
            // Config validation rejects an empty ICP list before we get here.
            return IntelAssessment {
                account_brief: format!("{}: no ICP rubrics configured.", company.name),
                best_icp: String::new(),
                icp_confidence: 0,
                icp_rationale: "No ICP rubrics configured.".to_string(),
                pain_points: Vec::new(),
                buying_signals: Vec::new(),
                personas: Vec::new(),
                gtm_channel: "Direct Outbound".to_string(),
                gtm_confidence: 0,
                gtm_reasoning: String::new(),
            };
        };
        let matched: Vec<&str> = icp
            .signal_keywords
            .iter()
            .filter(|k| haystack.contains(&k.to_lowercase()))
            .map(|k| k.as_str())
            .collect();

        IntelAssessment {
            account_brief: format!(
                "{}: {} company, ~{} employees.",
                company.name,
                enrichment.industry.as_deref().unwrap_or("unknown industry"),
                enrichment
                    .headcount
                    .map(|h| h.to_string())
                    .unwrap_or_else(|| "unknown".to_string())
            ),
            best_icp: icp.id.clone(),
            icp_confidence: (hits * 20).min(90) as u8,
            icp_rationale: if matched.is_empty() {
                "No signal keywords matched enrichment or research data.".to_string()
            } else {
                format!("Keyword signals matched: {}", matched.join(", "))
            },
            pain_points: Vec::new(),
            buying_signals: Vec::new(),
            personas: Vec::new(),
            gtm_channel: if icp.partner_ecosystem {
                "Partner Referral".to_string()
            } else {
                "Direct Outbound".to_string()
            },
            gtm_confidence: 40,
            gtm_reasoning: "Keyword-ranked ICP match without LLM synthesis.".to_string(),
        }
    }

    fn validated_channel(&self, channel: &str) -> String {
        if let Some(known) = self
            .config
            .icp
            .gtm_channels
            .iter()
            .find(|c| c.eq_ignore_ascii_case(channel))
        {
            return known.clone();
        }
        log::warn!("intel: unknown GTM channel \"{}\", using Direct Outbound", channel);
        "Direct Outbound".to_string()
    }

    /// Report companies with empty AI fields. Read-only.
    async fn audit(&self) -> Result<(), OpsError> {
        let companies = self.attio.list_companies().await?;
        let mut gaps = 0usize;
        println!("Enrichment audit ({} companies)", companies.len());
        for company in &companies {
            if company.empty_enrichment_fields.is_empty() {
                continue;
            }
            gaps += 1;
            println!(
                "  {} — missing: {}",
                company.name,
                company.empty_enrichment_fields.join(", ")
            );
        }
        println!(
            "{} of {} companies have enrichment gaps",
            gaps,
            companies.len()
        );
        Ok(())
    }
}

/// The company update for one enrichment pass, keyed by the configured
/// attribute slugs so a workspace with renamed attributes only changes
/// config.
fn field_updates(
    schema: &AttioSchemaConfig,
    assessment: &IntelAssessment,
    enrichment: &CompanyEnrichment,
    next_action: &str,
    channel: &str,
) -> Map<String, Value> {
    let key_people = enrichment
        .key_people
        .iter()
        .map(|p| {
            format!(
                "{} — {}",
                p.name.as_deref().unwrap_or("?"),
                p.title.as_deref().unwrap_or("?")
            )
        })
        .collect::<Vec<_>>()
        .join("; ");

    let mut values = Map::new();
    values.insert(
        schema.account_brief_attr.clone(),
        json!(assessment.account_brief),
    );
    values.insert(
        schema.icp_rationale_attr.clone(),
        json!(assessment.icp_rationale),
    );
    values.insert(
        schema.personas_attr.clone(),
        json!(assessment.personas.join(", ")),
    );
    values.insert(
        schema.pain_points_attr.clone(),
        json!(assessment.pain_points.join("; ")),
    );
    values.insert(
        schema.buying_signals_attr.clone(),
        json!(assessment.buying_signals.join("; ")),
    );
    values.insert(
        schema.tech_stack_attr.clone(),
        json!(enrichment.tech_stack.join(", ")),
    );
    values.insert(schema.key_people_attr.clone(), json!(key_people));
    values.insert(
        schema.enrichment_confidence_attr.clone(),
        json!(assessment.icp_confidence),
    );
    values.insert(
        schema.enriched_at_attr.clone(),
        json!(chrono::Utc::now().to_rfc3339()),
    );
    values.insert(schema.next_best_action_attr.clone(), json!(next_action));
    values.insert(schema.gtm_channel_attr.clone(), json!(channel));
    values.insert(
        schema.gtm_confidence_attr.clone(),
        json!(assessment.gtm_confidence),
    );
    values.insert(
        schema.gtm_reasoning_attr.clone(),
        json!(assessment.gtm_reasoning),
    );
    values
}

/// Next Best Action decision table. Branches are checked in priority order;
/// the first that applies wins.
pub fn decide_next_action(
    assessment: &IntelAssessment,
    enrichment: &CompanyEnrichment,
    has_contacts: bool,
    partner_match: bool,
) -> &'static str {
    let fit = assessment.icp_confidence >= 70;
    let has_signals = !assessment.buying_signals.is_empty();
    if fit && has_signals {
        return "Launch Outbound";
    }
    if fit && !has_contacts {
        return "Build Buying Committee";
    }
    if partner_match && assessment.icp_confidence >= 50 {
        return "Partner Intro Request";
    }
    if missing_critical_data(enrichment) {
        return "Enrich Missing Data";
    }
    if assessment.icp_confidence >= 40 {
        return "Nurture";
    }
    "Disqualify"
}

/// Industry, headcount, and tech stack all absent means we can't score the
/// account meaningfully yet.
fn missing_critical_data(enrichment: &CompanyEnrichment) -> bool {
    enrichment.industry.is_none()
        && enrichment.headcount.is_none()
        && enrichment.tech_stack.is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clay::ClayContact;

    fn assessment(confidence: u8, signals: &[&str]) -> IntelAssessment {
        IntelAssessment {
            account_brief: "brief".to_string(),
            best_icp: "staffing_orgs".to_string(),
            icp_confidence: confidence,
            icp_rationale: "r".to_string(),
            pain_points: vec![],
            buying_signals: signals.iter().map(|s| s.to_string()).collect(),
            personas: vec![],
            gtm_channel: "Direct Outbound".to_string(),
            gtm_confidence: 70,
            gtm_reasoning: "g".to_string(),
        }
    }

    fn rich_enrichment() -> CompanyEnrichment {
        CompanyEnrichment {
            domain: "acme.com".to_string(),
            tech_stack: vec!["Bullhorn".to_string()],
            industry: Some("Staffing & Recruiting".to_string()),
            headcount: Some(1200),
            ..CompanyEnrichment::default()
        }
    }

    #[test]
    fn test_nba_fit_with_signals_launches_outbound() {
        let a = assessment(85, &["hired VP of Onboarding"]);
        assert_eq!(
            decide_next_action(&a, &rich_enrichment(), true, false),
            "Launch Outbound"
        );
    }

    #[test]
    fn test_nba_fit_without_contacts_builds_committee() {
        let a = assessment(80, &[]);
        assert_eq!(
            decide_next_action(&a, &rich_enrichment(), false, false),
            "Build Buying Committee"
        );
    }

    #[test]
    fn test_nba_partner_match() {
        let a = assessment(60, &[]);
        assert_eq!(
            decide_next_action(&a, &rich_enrichment(), true, true),
            "Partner Intro Request"
        );
    }

    #[test]
    fn test_nba_missing_data() {
        let a = assessment(30, &[]);
        assert_eq!(
            decide_next_action(&a, &CompanyEnrichment::default(), true, false),
            "Enrich Missing Data"
        );
    }

    #[test]
    fn test_nba_nurture_and_disqualify() {
        assert_eq!(
            decide_next_action(&assessment(50, &[]), &rich_enrichment(), true, false),
            "Nurture"
        );
        assert_eq!(
            decide_next_action(&assessment(20, &[]), &rich_enrichment(), true, false),
            "Disqualify"
        );
    }

    #[test]
    fn test_field_updates_follow_schema_slugs() {
        let mut schema = AttioSchemaConfig::default();
        schema.account_brief_attr = "account_summary".to_string();
        let values = field_updates(
            &schema,
            &assessment(80, &[]),
            &rich_enrichment(),
            "Nurture",
            "Direct Outbound",
        );
        assert!(values.contains_key("account_summary"));
        assert!(!values.contains_key("ai_account_brief"));
        assert_eq!(values["next_bext_action"], serde_json::json!("Nurture"));
        assert!(values.contains_key("ai_enriched_at"));
    }

    #[test]
    fn test_assessment_parses_llm_json() {
        let json = r#"{
            "account_brief": "Acme Staffing is a 1,200-person multi-state staffing firm on Bullhorn.",
            "best_icp": "staffing_orgs",
            "icp_confidence": 88,
            "icp_rationale": "Bullhorn ATS, multi-state, 500+ monthly onboards.",
            "pain_points": ["slow I-9 turnaround"],
            "buying_signals": ["hired Director of Onboarding"],
            "personas": ["hr_ops", "compliance"],
            "gtm_channel": "Direct Outbound",
            "gtm_confidence": 75,
            "gtm_reasoning": "Strong direct fit with active hiring signal."
        }"#;
        let a: IntelAssessment = serde_json::from_str(json).unwrap();
        assert_eq!(a.best_icp, "staffing_orgs");
        assert_eq!(a.icp_confidence, 88);
        assert_eq!(a.personas.len(), 2);
    }

    #[test]
    fn test_fallback_ranks_keyword_hits() {
        let config = OpsConfig::default();
        let enrichment = CompanyEnrichment {
            domain: "acme.com".to_string(),
            tech_stack: vec!["Bullhorn".to_string(), "ADP".to_string()],
            industry: Some("Staffing".to_string()),
            headcount: Some(800),
            key_people: vec![ClayContact::default()],
            ..CompanyEnrichment::default()
        };
        let haystack = format!(
            "{} {}",
            enrichment.industry.clone().unwrap_or_default(),
            enrichment.tech_stack.join(" ")
        )
        .to_lowercase();
        let staffing = &config.icp.icps[0];
        let hits = staffing
            .signal_keywords
            .iter()
            .filter(|k| haystack.contains(&k.to_lowercase()))
            .count();
        assert!(hits >= 2); // "staffing" and "bullhorn"
    }
}
