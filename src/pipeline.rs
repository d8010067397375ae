//! Pipeline health monitor.
//!
//! Reads all active deals, checks each against the configured stage-velocity
//! benchmarks, and aggregates pipeline metrics. Output is an alert list in a
//! fixed phrasing plus a summary, delivered to Slack, Drive, the console, or
//! any combination.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::attio::{AttioClient, Deal};
use crate::cli::OutputTarget;
use crate::config::{OpsConfig, StageBenchmark};
use crate::error::OpsError;
use crate::google::drive;
use crate::settings::Settings;
use crate::slack::SlackClient;
use crate::state::StateStore;

const WIN_RATE_WINDOW_DAYS: i64 = 90;

pub struct PipelineEngine<'a> {
    pub attio: &'a AttioClient,
    pub slack: Option<&'a SlackClient>,
    pub settings: &'a Settings,
    pub config: &'a OpsConfig,
    pub dry_run: bool,
}

#[derive(Debug, Default)]
pub struct PipelineMetrics {
    pub value_by_stage: BTreeMap<String, f64>,
    pub total_value: f64,
    pub coverage_ratio: f64,
    pub avg_days_in_stage: f64,
    /// Closed-deal win rate over the trailing window, when any deals closed.
    pub win_rate: Option<f64>,
}

impl<'a> PipelineEngine<'a> {
    pub async fn run(&self, output: OutputTarget, state: &mut StateStore) -> Result<(), OpsError> {
        let deals = self
            .attio
            .find_active_deals(&self.config.stages.active_stages())
            .await?;
        log::info!("pipeline: {} active deals", deals.len());

        let now = Utc::now();
        let mut alerts = Vec::new();
        for deal in &deals {
            alerts.extend(deal_alerts(
                deal,
                self.config.stages.benchmark(&deal.stage),
                now,
            ));
        }

        let win_rate = self.trailing_win_rate(now).await;
        let metrics = compute_metrics(&deals, self.config.stages.quarterly_quota, win_rate, now);
        let report = build_report(&metrics, &alerts, self.config, now);

        self.deliver(&report, &alerts, &metrics, output).await?;
        if !self.dry_run {
            state.mark_pipeline_run(&now.to_rfc3339())?;
        }
        Ok(())
    }

    async fn trailing_win_rate(&self, now: DateTime<Utc>) -> Option<f64> {
        let closed = match self
            .attio
            .find_active_deals(&["Closed Won", "Closed Lost"])
            .await
        {
            Ok(deals) => deals,
            Err(e) => {
                log::warn!("pipeline: closed-deal query failed, no win rate: {}", e);
                return None;
            }
        };
        let cutoff = now - chrono::Duration::days(WIN_RATE_WINDOW_DAYS);
        let recent: Vec<&Deal> = closed
            .iter()
            .filter(|d| {
                d.close_date
                    .as_deref()
                    .and_then(parse_when)
                    .map(|t| t >= cutoff)
                    .unwrap_or(false)
            })
            .collect();
        if recent.is_empty() {
            return None;
        }
        let won = recent.iter().filter(|d| d.stage == "Closed Won").count();
        Some(won as f64 / recent.len() as f64)
    }

    async fn deliver(
        &self,
        report: &str,
        alerts: &[String],
        metrics: &PipelineMetrics,
        output: OutputTarget,
    ) -> Result<(), OpsError> {
        if matches!(output, OutputTarget::Console) {
            println!("{}", report);
            return Ok(());
        }
        if self.dry_run {
            log::info!("pipeline: dry run, report not delivered");
            println!("{}", report);
            return Ok(());
        }

        if matches!(output, OutputTarget::Slack | OutputTarget::Both) {
            let slack = self.slack.ok_or_else(|| {
                OpsError::Configuration("Slack webhook not configured (SLACK_WEBHOOK_URL)".to_string())
            })?;
            slack.post(&slack_summary(metrics, alerts)).await?;
            log::info!("pipeline: summary posted to Slack");
        }
        if matches!(output, OutputTarget::Gdrive | OutputTarget::Both) {
            let folder =
                Settings::require(&self.settings.reports_folder_id, "REPORTS_FOLDER_ID")?;
            let title = format!("Pipeline Health — {}", Utc::now().format("%Y-%m-%d"));
            let doc = drive::create_doc(folder, &title, report).await?;
            log::info!(
                "pipeline: report saved to Drive ({})",
                doc.web_view_link.as_deref().unwrap_or(&doc.id)
            );
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Checks and metrics
// ---------------------------------------------------------------------------

/// Alerts for one deal. Phrasing is stable; dashboards and humans both
/// pattern-match on it.
pub fn deal_alerts(
    deal: &Deal,
    benchmark: Option<&StageBenchmark>,
    now: DateTime<Utc>,
) -> Vec<String> {
    let mut alerts = Vec::new();

    if let (Some(benchmark), Some(entered)) = (
        benchmark,
        deal.stage_entered_at.as_deref().and_then(parse_when),
    ) {
        let days = (now - entered).num_days();
        if days > benchmark.max_days {
            alerts.push(format!(
                "⚠️ {} has been in {} for {} days (benchmark: {} days)",
                deal.name, deal.stage, days, benchmark.max_days
            ));
        }
    }

    if let (Some(benchmark), Some(last)) = (
        benchmark,
        deal.last_activity_at.as_deref().and_then(parse_when),
    ) {
        let days = (now - last).num_days();
        if days > benchmark.stall_alert_days {
            alerts.push(format!(
                "🚨 {} stalled: no activity for {} days",
                deal.name, days
            ));
        }
    }

    let mut missing = Vec::new();
    if deal.amount.is_none() {
        missing.push("amount");
    }
    if deal.close_date.is_none() {
        missing.push("close date");
    }
    if !missing.is_empty() {
        alerts.push(format!("📋 {} missing: {}", deal.name, missing.join(", ")));
    }
    alerts
}

pub fn compute_metrics(
    deals: &[Deal],
    quarterly_quota: f64,
    win_rate: Option<f64>,
    now: DateTime<Utc>,
) -> PipelineMetrics {
    let mut value_by_stage: BTreeMap<String, f64> = BTreeMap::new();
    let mut total_value = 0.0;
    let mut stage_days = Vec::new();
    for deal in deals {
        let amount = deal.amount.unwrap_or(0.0);
        *value_by_stage.entry(deal.stage.clone()).or_insert(0.0) += amount;
        total_value += amount;
        if let Some(entered) = deal.stage_entered_at.as_deref().and_then(parse_when) {
            stage_days.push((now - entered).num_days() as f64);
        }
    }
    let avg_days_in_stage = if stage_days.is_empty() {
        0.0
    } else {
        stage_days.iter().sum::<f64>() / stage_days.len() as f64
    };
    PipelineMetrics {
        value_by_stage,
        total_value,
        coverage_ratio: if quarterly_quota > 0.0 {
            total_value / quarterly_quota
        } else {
            0.0
        },
        avg_days_in_stage,
        win_rate,
    }
}

fn build_report(
    metrics: &PipelineMetrics,
    alerts: &[String],
    config: &OpsConfig,
    now: DateTime<Utc>,
) -> String {
    let mut out = format!("# Pipeline Health — {}\n\n", now.format("%Y-%m-%d"));

    out.push_str("## Value by stage\n");
    for (stage, value) in &metrics.value_by_stage {
        out.push_str(&format!("- {}: ${:.0}\n", stage, value));
    }
    out.push_str(&format!("- Total: ${:.0}\n\n", metrics.total_value));

    out.push_str(&format!(
        "Coverage: {:.1}x of ${:.0} quota (target {:.1}x)\n",
        metrics.coverage_ratio, config.stages.quarterly_quota, config.stages.coverage_target
    ));
    out.push_str(&format!(
        "Average days in stage: {:.0}\n",
        metrics.avg_days_in_stage
    ));
    match metrics.win_rate {
        Some(rate) => out.push_str(&format!(
            "Win rate (trailing {} days): {:.0}%\n",
            WIN_RATE_WINDOW_DAYS,
            rate * 100.0
        )),
        None => out.push_str("Win rate: no recently closed deals\n"),
    }

    out.push_str("\n## Alerts\n");
    if alerts.is_empty() {
        out.push_str("No alerts. Pipeline is healthy.\n");
    } else {
        for alert in alerts {
            out.push_str(&format!("{}\n", alert));
        }
    }
    out
}

fn slack_summary(metrics: &PipelineMetrics, alerts: &[String]) -> String {
    let mut out = format!(
        "*Pipeline health*: ${:.0} across {} stages, coverage {:.1}x, {} alerts",
        metrics.total_value,
        metrics.value_by_stage.len(),
        metrics.coverage_ratio,
        alerts.len()
    );
    for alert in alerts.iter().take(10) {
        out.push_str(&format!("\n{}", alert));
    }
    if alerts.len() > 10 {
        out.push_str(&format!("\n(+{} more in the Drive report)", alerts.len() - 10));
    }
    out
}

fn parse_when(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|t| t.with_timezone(&Utc))
        .or_else(|| {
            chrono::NaiveDate::parse_from_str(value, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(|dt| dt.and_utc())
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StageConfig;

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-08-29T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn deal(stage: &str, entered_days_ago: i64, activity_days_ago: i64) -> Deal {
        let n = now();
        Deal {
            id: "rec_d1".to_string(),
            name: "Acme — Platform".to_string(),
            stage: stage.to_string(),
            amount: Some(48000.0),
            close_date: Some("2026-10-15".to_string()),
            stage_entered_at: Some((n - chrono::Duration::days(entered_days_ago)).to_rfc3339()),
            last_activity_at: Some((n - chrono::Duration::days(activity_days_ago)).to_rfc3339()),
            ..Deal::default()
        }
    }

    #[test]
    fn test_over_benchmark_alert_phrasing() {
        let config = StageConfig::default();
        let d = deal("Discovery", 30, 2);
        let alerts = deal_alerts(&d, config.benchmark("Discovery"), now());
        assert_eq!(alerts.len(), 1);
        assert_eq!(
            alerts[0],
            "⚠️ Acme — Platform has been in Discovery for 30 days (benchmark: 21 days)"
        );
    }

    #[test]
    fn test_stall_alert_phrasing() {
        let config = StageConfig::default();
        let d = deal("Discovery", 5, 14);
        let alerts = deal_alerts(&d, config.benchmark("Discovery"), now());
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0], "🚨 Acme — Platform stalled: no activity for 14 days");
    }

    #[test]
    fn test_missing_field_alert() {
        let config = StageConfig::default();
        let mut d = deal("Discovery", 5, 2);
        d.amount = None;
        d.close_date = None;
        let alerts = deal_alerts(&d, config.benchmark("Discovery"), now());
        assert_eq!(alerts, vec!["📋 Acme — Platform missing: amount, close date"]);
    }

    #[test]
    fn test_healthy_deal_no_alerts() {
        let config = StageConfig::default();
        let d = deal("Discovery", 5, 2);
        assert!(deal_alerts(&d, config.benchmark("Discovery"), now()).is_empty());
    }

    #[test]
    fn test_unknown_stage_still_checks_fields() {
        let mut d = deal("Legal Review", 100, 100);
        d.amount = None;
        let alerts = deal_alerts(&d, None, now());
        assert_eq!(alerts.len(), 1);
        assert!(alerts[0].starts_with("📋"));
    }

    #[test]
    fn test_compute_metrics() {
        let deals = vec![
            deal("Discovery", 10, 1),
            deal("Solutioning", 20, 1),
            {
                let mut d = deal("Discovery", 30, 1);
                d.amount = Some(27000.0);
                d
            },
        ];
        let metrics = compute_metrics(&deals, 250_000.0, Some(0.5), now());
        assert_eq!(metrics.total_value, 123_000.0);
        assert_eq!(metrics.value_by_stage["Discovery"], 75_000.0);
        assert_eq!(metrics.value_by_stage["Solutioning"], 48_000.0);
        assert!((metrics.coverage_ratio - 0.492).abs() < 0.001);
        assert!((metrics.avg_days_in_stage - 20.0).abs() < 0.001);
    }

    #[test]
    fn test_report_contains_alerts_and_coverage() {
        let config = OpsConfig::default();
        let deals = vec![deal("Discovery", 30, 2)];
        let metrics = compute_metrics(&deals, 250_000.0, None, now());
        let alerts = deal_alerts(
            &deals[0],
            config.stages.benchmark("Discovery"),
            now(),
        );
        let report = build_report(&metrics, &alerts, &config, now());
        assert!(report.contains("Pipeline Health — 2026-08-29"));
        assert!(report.contains("Coverage: 0.2x"));
        assert!(report.contains("⚠️"));
        assert!(report.contains("no recently closed deals"));
    }

    #[test]
    fn test_slack_summary_truncates() {
        let metrics = PipelineMetrics::default();
        let alerts: Vec<String> = (0..15).map(|i| format!("alert {}", i)).collect();
        let summary = slack_summary(&metrics, &alerts);
        assert!(summary.contains("15 alerts"));
        assert!(summary.contains("(+5 more in the Drive report)"));
    }
}
