//! GTM operations automation.
//!
//! Eight independent CLI components sharing a client layer (Attio CRM, Clay
//! enrichment, web search, ActiveCampaign, Google Calendar/Gmail/Drive,
//! Slack, Anthropic) and typed operating config. The CRM is the source of
//! truth; everything here reads from it, enriches around it, and writes back
//! idempotently.

pub mod activecampaign;
pub mod attio;
pub mod clay;
pub mod cli;
pub mod compete;
pub mod committee;
pub mod config;
pub mod error;
pub mod events;
pub mod google;
pub mod http;
pub mod intel;
pub mod llm;
pub mod outbound;
pub mod pipeline;
pub mod postmeeting;
pub mod prep;
pub mod search;
pub mod settings;
pub mod slack;
pub mod state;
pub mod util;

pub use error::OpsError;
