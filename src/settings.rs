//! Runtime settings: API keys, workspace identifiers, delivery targets.
//!
//! Loaded from `~/.gtm-ops/config.json`; every field can be overridden by an
//! environment variable (the env var wins). Nothing here is validated until a
//! component actually needs the value, so e.g. `gtmops pipeline` runs without
//! a Clay key.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Settings file contents. All fields optional; components fail with a
/// configuration error when a required key is absent at use time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct Settings {
    /// Attio API bearer token (`ATTIO_API_KEY`).
    pub attio_api_key: Option<String>,
    /// Clay API key (`CLAY_API_KEY`).
    pub clay_api_key: Option<String>,
    /// Web search API key (`SEARCH_API_KEY`).
    pub search_api_key: Option<String>,
    /// ActiveCampaign API token (`AC_API_KEY`).
    pub ac_api_key: Option<String>,
    /// ActiveCampaign account base URL, e.g. `https://acme.api-us1.com`
    /// (`AC_BASE_URL`).
    pub ac_base_url: Option<String>,
    /// Anthropic API key (`ANTHROPIC_API_KEY`).
    pub anthropic_api_key: Option<String>,
    /// Model used for generation/extraction (`GTMOPS_MODEL`).
    pub model: Option<String>,
    /// Slack incoming-webhook URL (`SLACK_WEBHOOK_URL`).
    pub slack_webhook_url: Option<String>,
    /// Google Drive folder ID holding Fathom transcripts
    /// (`FATHOM_FOLDER_ID`).
    pub fathom_folder_id: Option<String>,
    /// Google Drive folder ID for generated reports/briefs
    /// (`REPORTS_FOLDER_ID`).
    pub reports_folder_id: Option<String>,
    /// Our email domain, used to split internal vs external attendees
    /// (`USER_DOMAIN`).
    pub user_domain: Option<String>,
}

/// Directory holding settings, Google token, and run state.
pub fn config_dir() -> PathBuf {
    dirs::home_dir().unwrap_or_default().join(".gtm-ops")
}

pub fn settings_path() -> PathBuf {
    config_dir().join("config.json")
}

impl Settings {
    /// Load settings from disk and apply environment overrides.
    ///
    /// A missing file is not an error (all-env setups are fine); a present
    /// but malformed file is.
    pub fn load() -> Result<Self, String> {
        let path = settings_path();
        let mut settings = if path.exists() {
            let content = std::fs::read_to_string(&path)
                .map_err(|e| format!("read {}: {}", path.display(), e))?;
            serde_json::from_str(&content)
                .map_err(|e| format!("parse {}: {}", path.display(), e))?
        } else {
            Settings::default()
        };
        settings.apply_env_overrides();
        Ok(settings)
    }

    fn apply_env_overrides(&mut self) {
        override_from_env(&mut self.attio_api_key, "ATTIO_API_KEY");
        override_from_env(&mut self.clay_api_key, "CLAY_API_KEY");
        override_from_env(&mut self.search_api_key, "SEARCH_API_KEY");
        override_from_env(&mut self.ac_api_key, "AC_API_KEY");
        override_from_env(&mut self.ac_base_url, "AC_BASE_URL");
        override_from_env(&mut self.anthropic_api_key, "ANTHROPIC_API_KEY");
        override_from_env(&mut self.model, "GTMOPS_MODEL");
        override_from_env(&mut self.slack_webhook_url, "SLACK_WEBHOOK_URL");
        override_from_env(&mut self.fathom_folder_id, "FATHOM_FOLDER_ID");
        override_from_env(&mut self.reports_folder_id, "REPORTS_FOLDER_ID");
        override_from_env(&mut self.user_domain, "USER_DOMAIN");
    }

    /// Fetch a required value or a configuration error naming the env var.
    pub fn require<'a>(
        field: &'a Option<String>,
        env_name: &str,
    ) -> Result<&'a str, crate::error::OpsError> {
        field.as_deref().filter(|s| !s.is_empty()).ok_or_else(|| {
            crate::error::OpsError::Configuration(format!(
                "{} not set (settings file or env var)",
                env_name
            ))
        })
    }
}

fn override_from_env(field: &mut Option<String>, name: &str) {
    if let Ok(value) = std::env::var(name) {
        if !value.is_empty() {
            *field = Some(value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_parse_partial_file() {
        let json = r#"{
            "attio_api_key": "att_test_key",
            "user_domain": "onboarded.com"
        }"#;
        let settings: Settings = serde_json::from_str(json).unwrap();
        assert_eq!(settings.attio_api_key.as_deref(), Some("att_test_key"));
        assert_eq!(settings.user_domain.as_deref(), Some("onboarded.com"));
        assert!(settings.clay_api_key.is_none());
    }

    #[test]
    fn test_require_present() {
        let field = Some("key".to_string());
        assert_eq!(Settings::require(&field, "ATTIO_API_KEY").unwrap(), "key");
    }

    #[test]
    fn test_require_missing_names_env_var() {
        let field: Option<String> = None;
        let err = Settings::require(&field, "CLAY_API_KEY").unwrap_err();
        assert!(err.to_string().contains("CLAY_API_KEY"));
    }

    #[test]
    fn test_require_empty_is_missing() {
        let field = Some(String::new());
        assert!(Settings::require(&field, "AC_API_KEY").is_err());
    }
}
