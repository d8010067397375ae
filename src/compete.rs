//! Competitive intelligence tracker.
//!
//! Weekly sweep over the configured competitive landscape: news and job
//! posting searches per competitor, LLM synthesis into developments and
//! positioning guidance, and a scan of recent call transcripts for
//! competitor mentions. Produces a positioning matrix in Drive and a
//! briefing in Slack.

use serde::Deserialize;

use crate::cli::OutputTarget;
use crate::config::{CompetitorDefinition, OpsConfig};
use crate::error::OpsError;
use crate::google::drive;
use crate::llm::LlmClient;
use crate::search::{results_block, SearchClient};
use crate::settings::Settings;
use crate::slack::SlackClient;
use crate::state::StateStore;
use crate::util::{truncate_chars, wrap_user_data};

const ANALYSIS_SYSTEM: &str = "You are a competitive intelligence analyst for \
an employee onboarding platform. Distill search results into factual \
developments, what they mean for us, and how sellers should position. \
Respond with a single JSON object and nothing else.";

const SWEEP_WINDOW_DAYS: i64 = 7;

pub struct CompeteEngine<'a> {
    pub search: &'a SearchClient,
    pub llm: &'a LlmClient,
    pub slack: Option<&'a SlackClient>,
    pub settings: &'a Settings,
    pub config: &'a OpsConfig,
    pub dry_run: bool,
}

#[derive(Debug, Deserialize)]
pub struct CompetitorAnalysis {
    #[serde(default)]
    pub developments: Vec<String>,
    #[serde(default)]
    pub implications: Vec<String>,
    #[serde(default)]
    pub positioning: Vec<String>,
}

/// One competitor's sweep results.
pub struct CompetitorReport {
    pub name: String,
    pub analysis: CompetitorAnalysis,
    /// Transcript docs that mentioned this competitor, with counts.
    pub transcript_mentions: Vec<(String, usize)>,
}

impl<'a> CompeteEngine<'a> {
    pub async fn run(
        &self,
        competitor: Option<&str>,
        output: OutputTarget,
        state: &mut StateStore,
    ) -> Result<(), OpsError> {
        let targets: Vec<&CompetitorDefinition> = self
            .config
            .competitors
            .competitors
            .iter()
            .filter(|c| competitor.map(|id| c.id == id).unwrap_or(true))
            .collect();
        if targets.is_empty() {
            return Err(OpsError::Configuration(format!(
                "unknown competitor \"{}\"",
                competitor.unwrap_or("")
            )));
        }

        let transcripts = self.recent_transcripts().await;
        let mut reports = Vec::new();
        for definition in targets {
            match self.sweep(definition, &transcripts).await {
                Ok(report) => reports.push(report),
                Err(e) => log::warn!("compete: sweep failed for {}: {}", definition.name, e),
            }
        }

        let briefing = build_briefing(&reports);
        let matrix = build_matrix(&reports);
        self.deliver(&briefing, &matrix, output).await?;
        if !self.dry_run {
            state.mark_competitive_sweep(&chrono::Utc::now().to_rfc3339())?;
        }
        Ok(())
    }

    async fn sweep(
        &self,
        definition: &CompetitorDefinition,
        transcripts: &[(String, String)],
    ) -> Result<CompetitorReport, OpsError> {
        log::info!("compete: sweeping {}", definition.name);
        let news_query = format!("\"{}\" {}", definition.name, definition.monitor.join(" OR "));
        let news = self.search.search(&news_query, 7).await.unwrap_or_else(|e| {
            log::warn!("compete: news search failed for {}: {}", definition.name, e);
            Vec::new()
        });
        let jobs_query = format!("\"{}\" hiring jobs engineering sales", definition.name);
        let jobs = self.search.search(&jobs_query, 31).await.unwrap_or_else(|e| {
            log::warn!("compete: jobs search failed for {}: {}", definition.name, e);
            Vec::new()
        });

        let prompt = format!(
            "Analyze this week's signals for competitor {name}.\n\n\
             News results:\n{news}\n\nJob posting results:\n{jobs}\n\n\
             Return JSON: {{\"developments\": [\"...\"], \"implications\": \
             [\"...\"], \"positioning\": [\"talk track for sellers\"]}}",
            name = definition.name,
            news = wrap_user_data(&truncate_chars(&results_block(&news), 4000)),
            jobs = wrap_user_data(&truncate_chars(&results_block(&jobs), 2000)),
        );
        let analysis: CompetitorAnalysis =
            self.llm.complete_json(ANALYSIS_SYSTEM, &prompt).await?;

        let transcript_mentions = transcripts
            .iter()
            .filter_map(|(doc, text)| {
                let count = count_mentions(text, &definition.name);
                (count > 0).then(|| (doc.clone(), count))
            })
            .collect();

        Ok(CompetitorReport {
            name: definition.name.clone(),
            analysis,
            transcript_mentions,
        })
    }

    /// Transcripts from the sweep window, exported once and scanned for
    /// every competitor. Missing folder means no transcript scan.
    async fn recent_transcripts(&self) -> Vec<(String, String)> {
        let Some(folder) = self.settings.fathom_folder_id.as_deref() else {
            return Vec::new();
        };
        let cutoff = chrono::Utc::now() - chrono::Duration::days(SWEEP_WINDOW_DAYS);
        let docs = match drive::list_folder_docs(folder, Some(cutoff)).await {
            Ok(docs) => docs,
            Err(e) => {
                log::warn!("compete: transcript listing failed: {}", e);
                return Vec::new();
            }
        };
        let mut out = Vec::new();
        for doc in docs {
            match drive::export_doc_text(&doc.id).await {
                Ok(text) => out.push((doc.name, text)),
                Err(e) => log::warn!("compete: export failed for {}: {}", doc.name, e),
            }
        }
        out
    }

    async fn deliver(
        &self,
        briefing: &str,
        matrix: &str,
        output: OutputTarget,
    ) -> Result<(), OpsError> {
        if matches!(output, OutputTarget::Console) {
            println!("{}\n\n{}", briefing, matrix);
            return Ok(());
        }
        if self.dry_run {
            log::info!("compete: dry run, briefing not delivered");
            println!("{}\n\n{}", briefing, matrix);
            return Ok(());
        }

        if matches!(output, OutputTarget::Slack | OutputTarget::Both) {
            let slack = self.slack.ok_or_else(|| {
                OpsError::Configuration("Slack webhook not configured (SLACK_WEBHOOK_URL)".to_string())
            })?;
            slack.post(briefing).await?;
            log::info!("compete: briefing posted to Slack");
        }
        if matches!(output, OutputTarget::Gdrive | OutputTarget::Both) {
            let folder =
                Settings::require(&self.settings.reports_folder_id, "REPORTS_FOLDER_ID")?;
            let title = format!(
                "Competitive Positioning Matrix — {}",
                chrono::Utc::now().format("%Y-%m-%d")
            );
            let doc = drive::create_doc(folder, &title, matrix).await?;
            log::info!(
                "compete: matrix saved to Drive ({})",
                doc.web_view_link.as_deref().unwrap_or(&doc.id)
            );
        }
        Ok(())
    }
}

/// Case-insensitive, whole-ish mention count. Substring matching is fine
/// here; competitor names are distinctive.
pub fn count_mentions(text: &str, name: &str) -> usize {
    let haystack = text.to_lowercase();
    let needle = name.to_lowercase();
    if needle.is_empty() {
        return 0;
    }
    haystack.matches(&needle).count()
}

fn build_briefing(reports: &[CompetitorReport]) -> String {
    let mut out = String::from("*Weekly competitive briefing*");
    for report in reports {
        out.push_str(&format!("\n\n*{}*", report.name));
        if report.analysis.developments.is_empty() {
            out.push_str("\nNo notable developments this week.");
        }
        for item in &report.analysis.developments {
            out.push_str(&format!("\n• {}", item));
        }
        for item in &report.analysis.implications {
            out.push_str(&format!("\n→ {}", item));
        }
        if !report.transcript_mentions.is_empty() {
            let docs: Vec<String> = report
                .transcript_mentions
                .iter()
                .map(|(doc, count)| format!("{} ({}x)", doc, count))
                .collect();
            out.push_str(&format!("\nMentioned on calls: {}", docs.join(", ")));
        }
    }
    out
}

fn build_matrix(reports: &[CompetitorReport]) -> String {
    let mut out = String::from("# Competitive Positioning Matrix\n");
    for report in reports {
        out.push_str(&format!("\n## {}\n", report.name));
        out.push_str("Developments:\n");
        if report.analysis.developments.is_empty() {
            out.push_str("- none this week\n");
        }
        for item in &report.analysis.developments {
            out.push_str(&format!("- {}\n", item));
        }
        out.push_str("Positioning:\n");
        for item in &report.analysis.positioning {
            out.push_str(&format!("- {}\n", item));
        }
        if !report.transcript_mentions.is_empty() {
            out.push_str(&format!(
                "Call mentions this week: {}\n",
                report.transcript_mentions.len()
            ));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_count_mentions_case_insensitive() {
        let text = "They asked about WorkBright twice. workbright came up again later.";
        assert_eq!(count_mentions(text, "WorkBright"), 2);
        assert_eq!(count_mentions(text, "Fountain"), 0);
        assert_eq!(count_mentions(text, ""), 0);
    }

    #[test]
    fn test_analysis_parses() {
        let json = r#"{
            "developments": ["Fountain raised a $35M Series D"],
            "implications": ["Expect aggressive pricing in high-volume deals"],
            "positioning": ["Lead with staffing-specific compliance depth"]
        }"#;
        let analysis: CompetitorAnalysis = serde_json::from_str(json).unwrap();
        assert_eq!(analysis.developments.len(), 1);
        assert_eq!(analysis.positioning.len(), 1);
    }

    #[test]
    fn test_briefing_includes_mentions() {
        let reports = vec![CompetitorReport {
            name: "WorkBright".to_string(),
            analysis: CompetitorAnalysis {
                developments: vec!["Launched remote I-9 v2".to_string()],
                implications: vec!["Closes a gap we used to win on".to_string()],
                positioning: vec![],
            },
            transcript_mentions: vec![("Acme Discovery Call".to_string(), 2)],
        }];
        let briefing = build_briefing(&reports);
        assert!(briefing.contains("*WorkBright*"));
        assert!(briefing.contains("Launched remote I-9 v2"));
        assert!(briefing.contains("Acme Discovery Call (2x)"));
    }

    #[test]
    fn test_matrix_handles_quiet_week() {
        let reports = vec![CompetitorReport {
            name: "Instawork".to_string(),
            analysis: CompetitorAnalysis {
                developments: vec![],
                implications: vec![],
                positioning: vec!["No change".to_string()],
            },
            transcript_mentions: vec![],
        }];
        let matrix = build_matrix(&reports);
        assert!(matrix.contains("## Instawork"));
        assert!(matrix.contains("- none this week"));
    }
}
