//! Command-line interface: one subcommand per component.

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};

#[derive(Debug, Parser)]
#[command(
    name = "gtmops",
    version,
    about = "GTM operations automation: CRM enrichment, outbound, meeting prep, and pipeline health."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Log what would be written instead of writing to any external system.
    #[arg(long, global = true)]
    pub dry_run: bool,

    /// Directory of operating config files (default: ./config).
    #[arg(long, global = true)]
    pub config_dir: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Enrich accounts, score them against the ICPs, and set next best actions.
    Intel {
        #[arg(long, value_enum, default_value_t = IntelRunMode::Batch)]
        mode: IntelRunMode,
        /// Attio company record id (required with --mode single).
        #[arg(long)]
        company_id: Option<String>,
        /// Restrict the batch to one account tier.
        #[arg(long)]
        tier: Option<i64>,
        /// Re-enrich records whose enrichment is older than this many days.
        #[arg(long, default_value_t = 30)]
        max_age: i64,
    },

    /// Fill persona gaps on accounts flagged "Build Buying Committee".
    Committee {
        #[arg(long, value_enum, default_value_t = BatchRunMode::Batch)]
        mode: BatchRunMode,
        /// Attio company record id (required with --mode single).
        #[arg(long)]
        company_id: Option<String>,
    },

    /// Generate and push outbound sequences for "Launch Outbound" accounts.
    Outbound {
        #[arg(long, value_enum, default_value_t = OutboundRunMode::Batch)]
        mode: OutboundRunMode,
        /// Attio company record id (required with --mode single).
        #[arg(long)]
        company_id: Option<String>,
    },

    /// Generate prep briefs for today's external meetings.
    Prep {
        /// Date to prep for (YYYY-MM-DD, default today).
        #[arg(long)]
        date: Option<NaiveDate>,
        /// Prep a single calendar event by id.
        #[arg(long)]
        meeting_id: Option<String>,
        #[arg(long, value_enum, default_value_t = OutputTarget::Both)]
        output: OutputTarget,
    },

    /// Process new call transcripts into CRM notes, tasks, and deal updates.
    PostMeeting {
        #[arg(long, value_enum, default_value_t = PostMeetingRunMode::Batch)]
        mode: PostMeetingRunMode,
        /// Drive doc id (required with --mode single).
        #[arg(long)]
        doc_id: Option<String>,
        /// Batch cutoff date (YYYY-MM-DD, default 7 days back).
        #[arg(long)]
        since: Option<NaiveDate>,
        /// How many transcripts a backfill run processes.
        #[arg(long, default_value_t = 5)]
        backfill_count: usize,
    },

    /// Check active deals against stage benchmarks and report health.
    Pipeline {
        #[arg(long, value_enum, default_value_t = OutputTarget::Both)]
        output: OutputTarget,
    },

    /// Weekly competitive sweep: news, jobs, transcript mentions.
    Compete {
        /// Restrict the sweep to one configured competitor id.
        #[arg(long)]
        competitor: Option<String>,
        #[arg(long, value_enum, default_value_t = OutputTarget::Both)]
        output: OutputTarget,
    },

    /// Pre- and post-event orchestration.
    Event {
        #[arg(long, value_enum)]
        phase: EventPhase,
        /// Event name, used in outreach, tags, and report titles.
        #[arg(long)]
        event: String,
        /// Attendee CSV (required for --phase pre).
        #[arg(long)]
        attendee_file: Option<PathBuf>,
        /// Badge scan CSV (--phase post).
        #[arg(long)]
        badge_file: Option<PathBuf>,
        /// Raw meeting notes text file (--phase post).
        #[arg(long)]
        notes_file: Option<PathBuf>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum IntelRunMode {
    Single,
    Batch,
    Audit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BatchRunMode {
    Single,
    Batch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutboundRunMode {
    Single,
    Batch,
    Preview,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PostMeetingRunMode {
    Single,
    Batch,
    Backfill,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputTarget {
    Slack,
    Gdrive,
    Both,
    Console,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum EventPhase {
    Pre,
    Post,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_parses() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_intel_defaults() {
        let cli = Cli::parse_from(["gtmops", "intel"]);
        match cli.command {
            Command::Intel {
                mode,
                company_id,
                tier,
                max_age,
            } => {
                assert_eq!(mode, IntelRunMode::Batch);
                assert!(company_id.is_none());
                assert!(tier.is_none());
                assert_eq!(max_age, 30);
            }
            _ => panic!("expected intel"),
        }
        assert!(!cli.dry_run);
    }

    #[test]
    fn test_post_meeting_flags() {
        let cli = Cli::parse_from([
            "gtmops",
            "post-meeting",
            "--mode",
            "backfill",
            "--backfill-count",
            "10",
            "--dry-run",
        ]);
        match cli.command {
            Command::PostMeeting {
                mode,
                backfill_count,
                ..
            } => {
                assert_eq!(mode, PostMeetingRunMode::Backfill);
                assert_eq!(backfill_count, 10);
            }
            _ => panic!("expected post-meeting"),
        }
        assert!(cli.dry_run);
    }

    #[test]
    fn test_prep_date_parses() {
        let cli = Cli::parse_from(["gtmops", "prep", "--date", "2026-08-29", "--output", "console"]);
        match cli.command {
            Command::Prep { date, output, .. } => {
                assert_eq!(date.unwrap().to_string(), "2026-08-29");
                assert_eq!(output, OutputTarget::Console);
            }
            _ => panic!("expected prep"),
        }
    }

    #[test]
    fn test_event_requires_phase_and_name() {
        assert!(Cli::try_parse_from(["gtmops", "event", "--event", "HR Tech"]).is_err());
        assert!(Cli::try_parse_from(["gtmops", "event", "--phase", "pre"]).is_err());
        let cli = Cli::parse_from([
            "gtmops",
            "event",
            "--phase",
            "post",
            "--event",
            "HR Tech 2026",
            "--badge-file",
            "scans.csv",
        ]);
        match cli.command {
            Command::Event { phase, event, badge_file, .. } => {
                assert_eq!(phase, EventPhase::Post);
                assert_eq!(event, "HR Tech 2026");
                assert!(badge_file.is_some());
            }
            _ => panic!("expected event"),
        }
    }
}
