//! `gtmops` binary: parse the CLI, load settings and config, dispatch.

use clap::Parser;

use gtm_ops::activecampaign::AcClient;
use gtm_ops::attio::AttioClient;
use gtm_ops::clay::ClayClient;
use gtm_ops::cli::{
    BatchRunMode, Cli, Command, EventPhase, IntelRunMode, OutboundRunMode, PostMeetingRunMode,
};
use gtm_ops::committee::{CommitteeEngine, CommitteeMode};
use gtm_ops::compete::CompeteEngine;
use gtm_ops::config::OpsConfig;
use gtm_ops::error::OpsError;
use gtm_ops::events::EventEngine;
use gtm_ops::intel::{IntelEngine, IntelMode};
use gtm_ops::llm::LlmClient;
use gtm_ops::outbound::{OutboundEngine, OutboundMode};
use gtm_ops::pipeline::PipelineEngine;
use gtm_ops::postmeeting::{PostMeetingEngine, PostMeetingMode};
use gtm_ops::prep::PrepEngine;
use gtm_ops::search::SearchClient;
use gtm_ops::settings::Settings;
use gtm_ops::slack::SlackClient;
use gtm_ops::state::StateStore;

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        log::error!("{}", e);
        eprintln!("Error: {}", e);
        eprintln!("Hint: {}", e.recovery_suggestion());
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), OpsError> {
    let settings = Settings::load().map_err(OpsError::Configuration)?;
    let config_dir = cli
        .config_dir
        .clone()
        .unwrap_or_else(OpsConfig::default_dir);
    let config = OpsConfig::load(&config_dir)?;
    let dry_run = cli.dry_run;
    if dry_run {
        log::info!("dry run: no writes will reach external systems");
    }

    match cli.command {
        Command::Intel {
            mode,
            company_id,
            tier,
            max_age,
        } => {
            let attio = attio_client(&settings, &config)?;
            let clay = clay_client(&settings)?;
            let search = search_client(&settings)?;
            let llm = llm_client(&settings)?;
            let engine = IntelEngine {
                attio: &attio,
                clay: &clay,
                search: &search,
                llm: &llm,
                config: &config,
                dry_run,
            };
            let mode = match mode {
                IntelRunMode::Single => IntelMode::Single {
                    company_id: require_flag(company_id, "--company-id")?,
                },
                IntelRunMode::Batch => IntelMode::Batch {
                    tier,
                    max_age_days: max_age,
                },
                IntelRunMode::Audit => IntelMode::Audit,
            };
            engine.run(mode).await
        }

        Command::Committee { mode, company_id } => {
            let attio = attio_client(&settings, &config)?;
            let clay = clay_client(&settings)?;
            let engine = CommitteeEngine {
                attio: &attio,
                clay: &clay,
                config: &config,
                dry_run,
            };
            let mode = match mode {
                BatchRunMode::Single => CommitteeMode::Single {
                    company_id: require_flag(company_id, "--company-id")?,
                },
                BatchRunMode::Batch => CommitteeMode::Batch,
            };
            engine.run(mode).await
        }

        Command::Outbound { mode, company_id } => {
            let attio = attio_client(&settings, &config)?;
            let llm = llm_client(&settings)?;
            let ac = ac_client(&settings);
            let engine = OutboundEngine {
                attio: &attio,
                ac: ac.as_ref(),
                llm: &llm,
                config: &config,
                dry_run,
            };
            let mode = match mode {
                OutboundRunMode::Single => OutboundMode::Single {
                    company_id: require_flag(company_id, "--company-id")?,
                },
                OutboundRunMode::Batch => OutboundMode::Batch,
                OutboundRunMode::Preview => OutboundMode::Preview { company_id },
            };
            engine.run(mode).await
        }

        Command::Prep {
            date,
            meeting_id,
            output,
        } => {
            let attio = attio_client(&settings, &config)?;
            let llm = llm_client(&settings)?;
            let engine = PrepEngine {
                attio: &attio,
                llm: &llm,
                settings: &settings,
                config: &config,
                dry_run,
            };
            engine.run(date, meeting_id.as_deref(), output).await
        }

        Command::PostMeeting {
            mode,
            doc_id,
            since,
            backfill_count,
        } => {
            let attio = attio_client(&settings, &config)?;
            let clay = clay_client(&settings)?;
            let llm = llm_client(&settings)?;
            let mut state = StateStore::open_default()?;
            let engine = PostMeetingEngine {
                attio: &attio,
                clay: &clay,
                llm: &llm,
                settings: &settings,
                config: &config,
                dry_run,
            };
            let mode = match mode {
                PostMeetingRunMode::Single => PostMeetingMode::Single {
                    doc_id: require_flag(doc_id, "--doc-id")?,
                },
                PostMeetingRunMode::Batch => PostMeetingMode::Batch { since },
                PostMeetingRunMode::Backfill => PostMeetingMode::Backfill {
                    count: backfill_count,
                },
            };
            engine.run(mode, &mut state).await
        }

        Command::Pipeline { output } => {
            let attio = attio_client(&settings, &config)?;
            let slack = slack_client(&settings);
            let mut state = StateStore::open_default()?;
            let engine = PipelineEngine {
                attio: &attio,
                slack: slack.as_ref(),
                settings: &settings,
                config: &config,
                dry_run,
            };
            engine.run(output, &mut state).await
        }

        Command::Compete { competitor, output } => {
            let search = search_client(&settings)?;
            let llm = llm_client(&settings)?;
            let slack = slack_client(&settings);
            let mut state = StateStore::open_default()?;
            let engine = CompeteEngine {
                search: &search,
                llm: &llm,
                slack: slack.as_ref(),
                settings: &settings,
                config: &config,
                dry_run,
            };
            engine.run(competitor.as_deref(), output, &mut state).await
        }

        Command::Event {
            phase,
            event,
            attendee_file,
            badge_file,
            notes_file,
        } => {
            let attio = attio_client(&settings, &config)?;
            let clay = clay_client(&settings)?;
            let llm = llm_client(&settings)?;
            let ac = ac_client(&settings);
            let engine = EventEngine {
                attio: &attio,
                clay: &clay,
                llm: &llm,
                ac: ac.as_ref(),
                settings: &settings,
                config: &config,
                dry_run,
            };
            match phase {
                EventPhase::Pre => {
                    let attendee_file = require_flag(attendee_file, "--attendee-file")?;
                    engine.run_pre(&event, &attendee_file).await
                }
                EventPhase::Post => {
                    engine
                        .run_post(&event, badge_file.as_deref(), notes_file.as_deref())
                        .await
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Client construction
// ---------------------------------------------------------------------------

fn attio_client(settings: &Settings, config: &OpsConfig) -> Result<AttioClient, OpsError> {
    let key = Settings::require(&settings.attio_api_key, "ATTIO_API_KEY")?;
    Ok(AttioClient::new(key, config.attio_schema.clone())?)
}

fn clay_client(settings: &Settings) -> Result<ClayClient, OpsError> {
    let key = Settings::require(&settings.clay_api_key, "CLAY_API_KEY")?;
    Ok(ClayClient::new(key)?)
}

fn search_client(settings: &Settings) -> Result<SearchClient, OpsError> {
    let key = Settings::require(&settings.search_api_key, "SEARCH_API_KEY")?;
    Ok(SearchClient::new(key)?)
}

fn llm_client(settings: &Settings) -> Result<LlmClient, OpsError> {
    let key = Settings::require(&settings.anthropic_api_key, "ANTHROPIC_API_KEY")?;
    Ok(LlmClient::new(key, settings.model.as_deref())?)
}

/// ActiveCampaign is optional; components that need it fail at use time.
fn ac_client(settings: &Settings) -> Option<AcClient> {
    match (
        settings.ac_base_url.as_deref(),
        settings.ac_api_key.as_deref(),
    ) {
        (Some(base_url), Some(key)) => AcClient::new(base_url, key).ok(),
        _ => None,
    }
}

/// Slack is optional; delivery targets that need it fail at use time.
fn slack_client(settings: &Settings) -> Option<SlackClient> {
    settings
        .slack_webhook_url
        .as_deref()
        .and_then(|url| SlackClient::new(url).ok())
}

fn require_flag<T>(value: Option<T>, flag: &str) -> Result<T, OpsError> {
    value.ok_or_else(|| {
        OpsError::Configuration(format!("{} is required with this mode", flag))
    })
}
