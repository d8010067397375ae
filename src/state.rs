//! Local run-state ledger.
//!
//! The CRM is the source of truth for records; this file only remembers what
//! this machine already processed so batch runs are at-most-once. A transcript
//! doc id is ledgered only after every downstream write lands, so a failed run
//! is retried in full on the next invocation.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::OpsError;

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct RunState {
    /// Drive doc ids of transcripts fully processed by `post-meeting`.
    pub processed_transcripts: BTreeSet<String>,
    /// Last successful competitive sweep (RFC 3339).
    pub last_competitive_sweep: Option<String>,
    /// Last successful pipeline health run (RFC 3339).
    pub last_pipeline_run: Option<String>,
}

/// Ledger handle bound to a state file path.
pub struct StateStore {
    path: PathBuf,
    state: RunState,
}

impl StateStore {
    /// Open the default ledger under `~/.gtm-ops/state.json`.
    pub fn open_default() -> Result<Self, OpsError> {
        Self::open(&crate::settings::config_dir().join("state.json"))
    }

    /// Open (or initialize) a ledger at `path`.
    pub fn open(path: &Path) -> Result<Self, OpsError> {
        let state = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            serde_json::from_str(&content).map_err(|e| OpsError::Parse {
                what: path.display().to_string(),
                detail: e.to_string(),
            })?
        } else {
            RunState::default()
        };
        Ok(Self {
            path: path.to_path_buf(),
            state,
        })
    }

    pub fn is_transcript_processed(&self, doc_id: &str) -> bool {
        self.state.processed_transcripts.contains(doc_id)
    }

    /// Record a fully-processed transcript and persist immediately.
    pub fn mark_transcript_processed(&mut self, doc_id: &str) -> Result<(), OpsError> {
        self.state.processed_transcripts.insert(doc_id.to_string());
        self.save()
    }

    pub fn mark_competitive_sweep(&mut self, at: &str) -> Result<(), OpsError> {
        self.state.last_competitive_sweep = Some(at.to_string());
        self.save()
    }

    pub fn mark_pipeline_run(&mut self, at: &str) -> Result<(), OpsError> {
        self.state.last_pipeline_run = Some(at.to_string());
        self.save()
    }

    pub fn state(&self) -> &RunState {
        &self.state
    }

    /// Write atomically: temp file then rename, so a crash never truncates
    /// the ledger.
    fn save(&self) -> Result<(), OpsError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&self.state).map_err(|e| OpsError::Parse {
            what: "run state".to_string(),
            detail: e.to_string(),
        })?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}
