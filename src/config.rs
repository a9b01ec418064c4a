//! Runtime configuration loaded from `config.json`.
//!
//! Required shape:
//! ```json
//! {
//!   "tidyhq": {
//!     "token": "...",
//!     "ids": { "slack": "<custom field id>", "taiga": "<custom field id>" }
//!   },
//!   "cache_expiry": 86400
//! }
//! ```

use std::path::Path;

use serde::Deserialize;

use crate::error::PullError;

/// Default cache expiry when the config omits it: 24 hours.
pub const DEFAULT_CACHE_EXPIRY_SECS: i64 = 86_400;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub tidyhq: TidyHqConfig,
    /// Seconds before the fetched batch on disk is considered stale.
    #[serde(default)]
    pub cache_expiry: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TidyHqConfig {
    pub token: String,
    /// Custom field IDs for cross-service account links.
    pub ids: FieldIds,
}

/// TidyHQ custom field IDs that carry external account links.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FieldIds {
    #[serde(default)]
    pub slack: Option<String>,
    #[serde(default)]
    pub taiga: Option<String>,
}

impl Config {
    /// Load and validate config from a JSON file.
    pub fn load(path: &Path) -> Result<Config, PullError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            PullError::Config(format!(
                "{} not found or unreadable ({}). Create it using example.config.json as a template",
                path.display(),
                e
            ))
        })?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|e| PullError::Config(format!("{} is not valid: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), PullError> {
        if self.tidyhq.token.trim().is_empty() {
            return Err(PullError::Config(
                "Missing required config value tidyhq.token".into(),
            ));
        }
        if self.cache_expiry.is_none() {
            log::warn!(
                "Cache expiry not set in config. Defaulting to {} hours",
                DEFAULT_CACHE_EXPIRY_SECS / 3600
            );
        }
        Ok(())
    }

    /// Effective cache expiry in seconds.
    pub fn cache_expiry(&self) -> i64 {
        self.cache_expiry.unwrap_or(DEFAULT_CACHE_EXPIRY_SECS)
    }
}
