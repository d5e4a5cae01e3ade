//! Bish Config: provider credentials, token budget, completion fallback,
//! and coach cadence (SPEC_FULL §3 "Bish Config", §6 config files).
//!
//! Loading follows `config::CcswarmConfig::from_file`'s read-then-
//! `serde_json::from_str` shape; unlike ccswarm's single flat project file,
//! this blob sits alongside bash-script rc-file sourcing (`~/.gshrc`,
//! `~/.gshenv`) rather than replacing it — see SPEC_FULL §6.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::agent::provider::TimeoutTier;

/// Serialisable mirror of [`TimeoutTier`] (which carries no serde impl of
/// its own since it is only ever chosen programmatically elsewhere).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TimeoutTierConfig {
    Fast,
    Slow,
    Streaming,
}

impl From<TimeoutTierConfig> for TimeoutTier {
    fn from(value: TimeoutTierConfig) -> Self {
        match value {
            TimeoutTierConfig::Fast => TimeoutTier::Fast,
            TimeoutTierConfig::Slow => TimeoutTier::Slow,
            TimeoutTierConfig::Streaming => TimeoutTier::Streaming,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSettings {
    pub api_base: Option<String>,
    pub model: String,
    #[serde(default = "default_timeout_tier")]
    pub timeout_tier: TimeoutTierConfig,
}

fn default_timeout_tier() -> TimeoutTierConfig {
    TimeoutTierConfig::Fast
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoachCadence {
    pub tip_ttl_hours: i64,
    pub tip_cache_capacity: usize,
    pub daily_shown_reset_hour: u32,
}

impl Default for CoachCadence {
    fn default() -> Self {
        Self {
            tip_ttl_hours: 6,
            tip_cache_capacity: 20,
            daily_shown_reset_hour: 0,
        }
    }
}

/// The full Bish Config data model (SPEC_FULL §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BishConfig {
    pub default_provider: String,
    #[serde(default)]
    pub providers: HashMap<String, ProviderSettings>,
    pub token_budget: usize,
    pub completion_fallback_command: Option<String>,
    #[serde(default)]
    pub coach: CoachCadence,
    pub default_to_yes: bool,
}

impl Default for BishConfig {
    fn default() -> Self {
        let mut providers = HashMap::new();
        providers.insert(
            "openai".to_string(),
            ProviderSettings {
                api_base: None,
                model: "gpt-4o-mini".to_string(),
                timeout_tier: TimeoutTierConfig::Fast,
            },
        );
        Self {
            default_provider: "openai".to_string(),
            providers,
            token_budget: 8_000,
            completion_fallback_command: None,
            coach: CoachCadence::default(),
            default_to_yes: false,
        }
    }
}

impl BishConfig {
    /// Load the config blob at `path` if it exists, layered on top of the
    /// embedded defaults. Missing files are not an error (SPEC_FULL §6:
    /// "missing or empty files are skipped silently"); malformed files are
    /// either fatal (`strict`) or tolerated (falls back to defaults,
    /// logging a warning), per SPEC_FULL §7 "configuration errors".
    pub fn load(path: &Path, strict: bool) -> Result<Self> {
        let config = Self::default();
        let Ok(contents) = std::fs::read_to_string(path) else {
            return Ok(config);
        };
        if contents.trim().is_empty() {
            return Ok(config);
        }
        match serde_json::from_str::<Self>(&contents) {
            Ok(loaded) => Ok(loaded),
            Err(err) if strict => {
                Err(err).with_context(|| format!("failed to parse config at '{}'", path.display()))
            }
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "ignoring malformed config, using defaults");
                Ok(config)
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create config dir '{}'", parent.display()))?;
        }
        let contents = serde_json::to_string_pretty(self).context("failed to serialize config")?;
        std::fs::write(path, contents)
            .with_context(|| format!("failed to write config at '{}'", path.display()))
    }

    /// Apply the environment-variable overrides enumerated in SPEC_FULL §6.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(value) = std::env::var("BISH_DEFAULT_TO_YES") {
            self.default_to_yes = matches!(value.as_str(), "1" | "true" | "yes");
        }
        if let Ok(value) = std::env::var("BISH_COMPLETION_COMMAND") {
            self.completion_fallback_command = Some(value);
        }
    }

    pub fn provider_settings(&self) -> Option<&ProviderSettings> {
        self.providers.get(&self.default_provider)
    }
}

/// Default persisted-state locations (SPEC_FULL §6, XDG-like with a home
/// lookup override for tests).
pub struct DataPaths {
    pub history_db: PathBuf,
    pub analytics_db: PathBuf,
    pub log_file: PathBuf,
    pub latest_version_file: PathBuf,
}

impl DataPaths {
    pub fn under_home(home: &Path) -> Self {
        let base = home.join(".local").join("share").join("bish");
        Self {
            history_db: base.join("history.db"),
            analytics_db: base.join("analytics.db"),
            log_file: base.join("gsh.log"),
            latest_version_file: base.join("latest_version.txt"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let config = BishConfig::load(Path::new("/nonexistent/bish/config.json"), false).unwrap();
        assert_eq!(config.default_provider, "openai");
        assert_eq!(config.token_budget, 8_000);
    }

    #[test]
    fn loads_overrides_from_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"default_provider":"anthropic","providers":{},"token_budget":4000,"completion_fallback_command":null,"default_to_yes":true}"#,
        )
        .unwrap();
        let config = BishConfig::load(&path, false).unwrap();
        assert_eq!(config.default_provider, "anthropic");
        assert_eq!(config.token_budget, 4000);
        assert!(config.default_to_yes);
    }

    #[test]
    fn malformed_config_is_fatal_only_in_strict_mode() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "not json").unwrap();

        let lenient = BishConfig::load(&path, false).unwrap();
        assert_eq!(lenient.default_provider, "openai");

        assert!(BishConfig::load(&path, true).is_err());
    }

    #[test]
    fn env_override_parses_truthy_values() {
        std::env::set_var("BISH_DEFAULT_TO_YES", "true");
        std::env::set_var("BISH_COMPLETION_COMMAND", "carapace");
        let mut config = BishConfig::default();
        config.apply_env_overrides();
        assert!(config.default_to_yes);
        assert_eq!(config.completion_fallback_command.as_deref(), Some("carapace"));
        std::env::remove_var("BISH_DEFAULT_TO_YES");
        std::env::remove_var("BISH_COMPLETION_COMMAND");
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let config = BishConfig::default();
        config.save(&path).unwrap();
        let loaded = BishConfig::load(&path, true).unwrap();
        assert_eq!(loaded.token_budget, config.token_budget);
    }
}
