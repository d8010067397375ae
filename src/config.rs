//! Typed operating config: ICP definitions, Attio schema slugs, messaging
//! framework, pipeline stage benchmarks, competitive landscape.
//!
//! Each config has embedded defaults; a JSON file under `config/` overrides
//! them wholesale. Loading validates the parts components depend on (a stage
//! table with no stages is a config error, not a later panic).

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::OpsError;

// ============================================================================
// ICP definitions
// ============================================================================

/// One Ideal Customer Profile scoring rubric.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct IcpDefinition {
    /// Stable key, e.g. "staffing_orgs".
    pub id: String,
    pub name: String,
    /// Share of GTM focus, 0-100. Used to break ties between equal fits.
    pub focus_pct: u8,
    /// Criteria text given to the LLM verbatim.
    pub criteria: Vec<String>,
    /// Keywords for the deterministic fallback scorer.
    #[serde(default)]
    pub signal_keywords: Vec<String>,
    /// True for partner-ecosystem profiles (drives the Partner Intro NBA).
    #[serde(default)]
    pub partner_ecosystem: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct IcpConfig {
    pub icps: Vec<IcpDefinition>,
    /// The GTM channel vocabulary the intel engine classifies into.
    pub gtm_channels: Vec<String>,
}

impl Default for IcpConfig {
    fn default() -> Self {
        Self {
            icps: vec![
                IcpDefinition {
                    id: "staffing_orgs".to_string(),
                    name: "Staffing Organizations".to_string(),
                    focus_pct: 70,
                    criteria: vec![
                        "500+ onboards per month".to_string(),
                        "multi-state operations".to_string(),
                        "runs Bullhorn, Jobvite, or TempWorks".to_string(),
                    ],
                    signal_keywords: vec![
                        "staffing".to_string(),
                        "bullhorn".to_string(),
                        "jobvite".to_string(),
                        "tempworks".to_string(),
                        "temp labor".to_string(),
                    ],
                    partner_ecosystem: false,
                },
                IcpDefinition {
                    id: "platform_partners".to_string(),
                    name: "Platform Partners".to_string(),
                    focus_pct: 20,
                    criteria: vec![
                        "ATS, payroll, or screening vendor".to_string(),
                        "wants embedded onboarding".to_string(),
                    ],
                    signal_keywords: vec![
                        "ats".to_string(),
                        "payroll".to_string(),
                        "screening".to_string(),
                        "platform".to_string(),
                        "api".to_string(),
                    ],
                    partner_ecosystem: true,
                },
                IcpDefinition {
                    id: "enterprise_direct".to_string(),
                    name: "Enterprise Direct".to_string(),
                    focus_pct: 10,
                    criteria: vec![
                        "high-volume hourly hiring".to_string(),
                        "healthcare, logistics, or retail".to_string(),
                    ],
                    signal_keywords: vec![
                        "hourly".to_string(),
                        "healthcare".to_string(),
                        "logistics".to_string(),
                        "retail".to_string(),
                        "high volume".to_string(),
                    ],
                    partner_ecosystem: false,
                },
            ],
            gtm_channels: vec![
                "Direct Outbound".to_string(),
                "Partner Referral".to_string(),
                "Partner Embedded".to_string(),
                "Inbound Nurture".to_string(),
                "Event Follow-Up".to_string(),
                "Association Channel".to_string(),
                "Analyst Referral".to_string(),
                "Customer Referral".to_string(),
                "Paid Search".to_string(),
                "Content Syndication".to_string(),
                "Webinar".to_string(),
                "Community".to_string(),
                "Marketplace Listing".to_string(),
                "Reseller".to_string(),
                "Strategic Alliance".to_string(),
                "Founder Network".to_string(),
            ],
        }
    }
}

// ============================================================================
// Attio schema slugs
// ============================================================================

/// Attribute slugs for the Attio workspace objects we touch.
///
/// Kept in config so a workspace with renamed attributes doesn't need a code
/// change. The default matches the Onboarded workspace (including its
/// long-standing `next_bext_action` typo, which is the live slug).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct AttioSchemaConfig {
    pub company_object: String,
    pub person_object: String,
    pub deal_object: String,
    /// Slug of the Next Best Action attribute on companies.
    pub next_best_action_attr: String,
    /// Slug of the enrichment freshness timestamp on companies.
    pub enriched_at_attr: String,
    pub account_brief_attr: String,
    pub icp_rationale_attr: String,
    pub personas_attr: String,
    pub pain_points_attr: String,
    pub buying_signals_attr: String,
    pub tech_stack_attr: String,
    pub key_people_attr: String,
    pub enrichment_confidence_attr: String,
    pub gtm_channel_attr: String,
    pub gtm_confidence_attr: String,
    pub gtm_reasoning_attr: String,
}

impl AttioSchemaConfig {
    /// Every company slug the intel engine owns. The audit reports records
    /// where any of these are empty.
    pub fn enrichment_attrs(&self) -> Vec<&str> {
        vec![
            self.account_brief_attr.as_str(),
            self.icp_rationale_attr.as_str(),
            self.personas_attr.as_str(),
            self.pain_points_attr.as_str(),
            self.buying_signals_attr.as_str(),
            self.tech_stack_attr.as_str(),
            self.key_people_attr.as_str(),
            self.enrichment_confidence_attr.as_str(),
            self.enriched_at_attr.as_str(),
            self.next_best_action_attr.as_str(),
            self.gtm_channel_attr.as_str(),
            self.gtm_confidence_attr.as_str(),
            self.gtm_reasoning_attr.as_str(),
        ]
    }
}

impl Default for AttioSchemaConfig {
    fn default() -> Self {
        Self {
            company_object: "companies".to_string(),
            person_object: "people".to_string(),
            deal_object: "deals".to_string(),
            next_best_action_attr: "next_bext_action".to_string(),
            enriched_at_attr: "ai_enriched_at".to_string(),
            account_brief_attr: "ai_account_brief".to_string(),
            icp_rationale_attr: "ai_icp_rationale".to_string(),
            personas_attr: "ai_personas".to_string(),
            pain_points_attr: "ai_enriched_pain_points".to_string(),
            buying_signals_attr: "ai_enriched_buying_signals".to_string(),
            tech_stack_attr: "ai_enriched_tech_stack".to_string(),
            key_people_attr: "ai_enriched_key_people".to_string(),
            enrichment_confidence_attr: "ai_enrichment_confidence".to_string(),
            gtm_channel_attr: "claude_ai_gtm_channel".to_string(),
            gtm_confidence_attr: "gtm_confidence".to_string(),
            gtm_reasoning_attr: "gtm_reasoning".to_string(),
        }
    }
}

// ============================================================================
// Messaging framework
// ============================================================================

/// A persona the committee builder hunts for, with title patterns.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct PersonaDefinition {
    /// Stable key, e.g. "hr_ops".
    pub persona: String,
    pub title_keywords: Vec<String>,
    /// Which messaging track this persona maps to.
    pub track: String,
    /// Compiled once at load; event imports match thousands of titles.
    #[serde(skip)]
    title_pattern: Option<regex::Regex>,
}

fn compile_title_pattern(keywords: &[String]) -> Option<regex::Regex> {
    if keywords.is_empty() {
        return None;
    }
    let alternation = keywords
        .iter()
        .map(|k| regex::escape(k))
        .collect::<Vec<_>>()
        .join("|");
    regex::Regex::new(&format!(r"(?i)\b(?:{})\b", alternation)).ok()
}

/// A messaging track with its themes and mandatory positioning phrases.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct MessagingTrack {
    pub track: String,
    pub themes: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct MessagingConfig {
    pub personas: Vec<PersonaDefinition>,
    pub tracks: Vec<MessagingTrack>,
    /// Positioning phrases woven into every sequence.
    pub positioning: Vec<String>,
    /// Current sequence version, used as an ActiveCampaign tag.
    pub sequence_version: String,
}

impl MessagingConfig {
    /// Compile each persona's title keywords into a single matcher.
    pub(crate) fn compile_patterns(&mut self) {
        for persona in &mut self.personas {
            persona.title_pattern = compile_title_pattern(&persona.title_keywords);
        }
    }

    /// Persona whose title keywords match `title` (case-insensitive, on word
    /// boundaries so "CHRO" doesn't match "Chrome"). First match wins;
    /// persona order is priority order.
    pub fn persona_for_title(&self, title: &str) -> Option<&PersonaDefinition> {
        self.personas.iter().find(|p| {
            p.title_pattern
                .as_ref()
                .map(|re| re.is_match(title))
                .unwrap_or(false)
        })
    }

    pub fn track(&self, name: &str) -> Option<&MessagingTrack> {
        self.tracks.iter().find(|t| t.track == name)
    }
}

impl Default for MessagingConfig {
    fn default() -> Self {
        let persona = |key: &str, keywords: &[&str], track: &str| PersonaDefinition {
            persona: key.to_string(),
            title_keywords: keywords.iter().map(|s| s.to_string()).collect(),
            track: track.to_string(),
            title_pattern: None,
        };
        let mut config = Self {
            personas: vec![
                persona(
                    "hr_ops",
                    &[
                        "VP HR Operations",
                        "Director of Onboarding",
                        "Head of Onboarding",
                    ],
                    "speed_efficiency",
                ),
                persona(
                    "c_suite",
                    &["Chief People Officer", "CHRO", "VP People"],
                    "roi_risk",
                ),
                persona(
                    "compliance",
                    &["Head of Compliance", "Director of Compliance", "VP Risk"],
                    "roi_risk",
                ),
                persona(
                    "hr_engineer",
                    &["Director of IT", "Head of Systems", "VP Technology"],
                    "integration_configuration",
                ),
                persona(
                    "operations",
                    &["COO", "Chief Operating Officer", "VP Operations"],
                    "roi_risk",
                ),
            ],
            tracks: vec![
                MessagingTrack {
                    track: "speed_efficiency".to_string(),
                    themes: vec![
                        "time-to-start reduction".to_string(),
                        "onboarding throughput".to_string(),
                    ],
                },
                MessagingTrack {
                    track: "integration_configuration".to_string(),
                    themes: vec![
                        "ATS integration depth".to_string(),
                        "configuration without engineering".to_string(),
                    ],
                },
                MessagingTrack {
                    track: "roi_risk".to_string(),
                    themes: vec![
                        "compliance risk reduction".to_string(),
                        "cost of delayed starts".to_string(),
                    ],
                },
            ],
            positioning: vec![
                "System of Action".to_string(),
                "30-40% improvement in time-to-start".to_string(),
                "data orchestration layer".to_string(),
            ],
            sequence_version: "v3".to_string(),
        };
        config.compile_patterns();
        config
    }
}

// ============================================================================
// Pipeline stages
// ============================================================================

/// Velocity benchmark for one pipeline stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct StageBenchmark {
    pub stage: String,
    /// Days in stage beyond which the deal is over the benchmark.
    pub max_days: i64,
    /// Days without activity before a stall alert fires.
    pub stall_alert_days: i64,
    /// Whether deals in this stage count as active pipeline.
    #[serde(default = "default_true")]
    pub active: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct StageConfig {
    pub stages: Vec<StageBenchmark>,
    /// Pipeline coverage target (pipeline value / quota), e.g. 3.0.
    pub coverage_target: f64,
    /// Quarterly quota used for the coverage ratio.
    pub quarterly_quota: f64,
}

impl Default for StageConfig {
    fn default() -> Self {
        let stage = |name: &str, max_days, stall_alert_days| StageBenchmark {
            stage: name.to_string(),
            max_days,
            stall_alert_days,
            active: true,
        };
        Self {
            stages: vec![
                stage("Lead", 14, 7),
                stage("Intro Call", 7, 5),
                stage("Discovery", 21, 10),
                stage("Solutioning", 30, 14),
                stage("Redlines", 21, 7),
            ],
            coverage_target: 3.0,
            quarterly_quota: 250_000.0,
        }
    }
}

impl StageConfig {
    pub fn benchmark(&self, stage: &str) -> Option<&StageBenchmark> {
        self.stages
            .iter()
            .find(|s| s.stage.eq_ignore_ascii_case(stage))
    }

    /// Stage names that count as active pipeline, in funnel order. Both the
    /// pipeline monitor's deal query and the post-meeting stage ladder read
    /// from here, so a stage signal can never move a deal out of monitored
    /// pipeline.
    pub fn active_stages(&self) -> Vec<&str> {
        self.stages
            .iter()
            .filter(|s| s.active)
            .map(|s| s.stage.as_str())
            .collect()
    }
}

// ============================================================================
// Competitive landscape
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct CompetitorDefinition {
    /// Stable key, e.g. "clickboarding".
    pub id: String,
    pub name: String,
    /// Search terms monitored alongside the competitor name.
    #[serde(default)]
    pub monitor: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct CompetitorConfig {
    pub competitors: Vec<CompetitorDefinition>,
}

impl Default for CompetitorConfig {
    fn default() -> Self {
        let comp = |id: &str, name: &str, monitor: &[&str]| CompetitorDefinition {
            id: id.to_string(),
            name: name.to_string(),
            monitor: monitor.iter().map(|s| s.to_string()).collect(),
        };
        Self {
            competitors: vec![
                comp(
                    "clickboarding",
                    "ClickBoarding",
                    &["Engage2Excel", "onboarding platform"],
                ),
                comp("workbright", "WorkBright", &["remote I-9", "onboarding"]),
                comp(
                    "bullhorn_onboarding",
                    "Bullhorn Onboarding",
                    &["Bullhorn onboarding module", "staffing"],
                ),
                comp("instawork", "Instawork", &["flexible staffing"]),
                comp("fountain", "Fountain", &["high volume hiring"]),
            ],
        }
    }
}

// ============================================================================
// Loading
// ============================================================================

/// All operating config, loaded once at startup.
#[derive(Debug, Clone, Default)]
pub struct OpsConfig {
    pub icp: IcpConfig,
    pub attio_schema: AttioSchemaConfig,
    pub messaging: MessagingConfig,
    pub stages: StageConfig,
    pub competitors: CompetitorConfig,
}

impl OpsConfig {
    /// Load from `<dir>/` with embedded defaults for missing files.
    pub fn load(dir: &Path) -> Result<Self, OpsError> {
        let mut config = Self {
            icp: load_or_default(&dir.join("icp_definitions.json"))?,
            attio_schema: load_or_default(&dir.join("attio_schema.json"))?,
            messaging: load_or_default(&dir.join("messaging_framework.json"))?,
            stages: load_or_default(&dir.join("pipeline_stages.json"))?,
            competitors: load_or_default(&dir.join("competitive_landscape.json"))?,
        };
        config.messaging.compile_patterns();
        config.validate()?;
        Ok(config)
    }

    /// Default config directory: `./config` when present, else embedded
    /// defaults only.
    pub fn default_dir() -> PathBuf {
        PathBuf::from("config")
    }

    fn validate(&self) -> Result<(), OpsError> {
        if self.icp.icps.is_empty() {
            return Err(OpsError::Configuration(
                "icp_definitions: at least one ICP is required".to_string(),
            ));
        }
        if self.icp.gtm_channels.is_empty() {
            return Err(OpsError::Configuration(
                "icp_definitions: gtm_channels must not be empty".to_string(),
            ));
        }
        if self.stages.stages.is_empty() {
            return Err(OpsError::Configuration(
                "pipeline_stages: at least one stage is required".to_string(),
            ));
        }
        for persona in &self.messaging.personas {
            if !self
                .messaging
                .tracks
                .iter()
                .any(|t| t.track == persona.track)
            {
                return Err(OpsError::Configuration(format!(
                    "messaging_framework: persona '{}' references unknown track '{}'",
                    persona.persona, persona.track
                )));
            }
        }
        Ok(())
    }
}

fn load_or_default<T: Default + for<'de> Deserialize<'de>>(path: &Path) -> Result<T, OpsError> {
    if !path.exists() {
        log::debug!("config {} not found, using defaults", path.display());
        return Ok(T::default());
    }
    let content = std::fs::read_to_string(path)?;
    serde_json::from_str(&content).map_err(|e| OpsError::Parse {
        what: path.display().to_string(),
        detail: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_validates() {
        let config = OpsConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_icps_cover_three_profiles() {
        let config = IcpConfig::default();
        assert_eq!(config.icps.len(), 3);
        let focus: u32 = config.icps.iter().map(|i| i.focus_pct as u32).sum();
        assert_eq!(focus, 100);
        assert!(config.icps.iter().any(|i| i.partner_ecosystem));
    }

    #[test]
    fn test_default_gtm_channels_has_sixteen_options() {
        assert_eq!(IcpConfig::default().gtm_channels.len(), 16);
    }

    #[test]
    fn test_stage_benchmark_lookup_case_insensitive() {
        let config = StageConfig::default();
        let b = config.benchmark("discovery").unwrap();
        assert_eq!(b.max_days, 21);
        assert_eq!(b.stall_alert_days, 10);
        assert!(config.benchmark("Closed Won").is_none());
    }

    #[test]
    fn test_active_stages_in_funnel_order() {
        let mut config = StageConfig::default();
        assert_eq!(
            config.active_stages(),
            vec!["Lead", "Intro Call", "Discovery", "Solutioning", "Redlines"]
        );
        config.stages[2].active = false;
        assert!(!config.active_stages().contains(&"Discovery"));
    }

    #[test]
    fn test_enrichment_attrs_cover_all_intel_slugs() {
        let schema = AttioSchemaConfig::default();
        let attrs = schema.enrichment_attrs();
        assert_eq!(attrs.len(), 13);
        assert!(attrs.contains(&"ai_account_brief"));
        assert!(attrs.contains(&"next_bext_action"));
        assert!(attrs.contains(&"claude_ai_gtm_channel"));
    }

    #[test]
    fn test_persona_for_title_word_boundaries() {
        let messaging = MessagingConfig::default();
        let hit = messaging.persona_for_title("Interim CHRO").unwrap();
        assert_eq!(hit.persona, "c_suite");
        assert!(messaging.persona_for_title("Chrome Platform Lead").is_none());
        let ops = messaging.persona_for_title("vp hr operations").unwrap();
        assert_eq!(ops.persona, "hr_ops");
    }

    #[test]
    fn test_persona_patterns_compiled_after_disk_load() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("messaging_framework.json"),
            r#"{
                "personas": [
                    {"persona": "finance", "title_keywords": ["CFO"], "track": "roi"}
                ],
                "tracks": [{"track": "roi", "themes": ["cost"]}],
                "positioning": ["System of Action"],
                "sequence_version": "v4"
            }"#,
        )
        .unwrap();

        let config = OpsConfig::load(dir.path()).unwrap();
        let hit = config.messaging.persona_for_title("Interim CFO").unwrap();
        assert_eq!(hit.persona, "finance");
        assert!(config
            .messaging
            .persona_for_title("CFOX Holdings Lead")
            .is_none());
    }

    #[test]
    fn test_persona_unknown_track_rejected() {
        let mut config = OpsConfig::default();
        config.messaging.personas[0].track = "nonexistent".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("unknown track"));
    }

    #[test]
    fn test_load_from_disk_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("pipeline_stages.json"),
            r#"{
                "stages": [
                    {"stage": "Lead", "max_days": 5, "stall_alert_days": 2}
                ],
                "coverage_target": 4.0,
                "quarterly_quota": 100000.0
            }"#,
        )
        .unwrap();

        let config = OpsConfig::load(dir.path()).unwrap();
        assert_eq!(config.stages.stages.len(), 1);
        assert_eq!(config.stages.benchmark("Lead").unwrap().max_days, 5);
        // Untouched configs fall back to defaults.
        assert_eq!(config.icp.icps.len(), 3);
    }

    #[test]
    fn test_malformed_config_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("icp_definitions.json"), "{not json").unwrap();
        let err = OpsConfig::load(dir.path()).unwrap_err();
        assert!(matches!(err, OpsError::Parse { .. }));
    }
}
