//! TOML-based application configuration.
//!
//! Stores:
//! - The declared experience level
//! - Per-level safety limits
//! - Timer tick rate and stall tolerance
//! - Audio cue preferences
//!
//! Configuration is stored at `<data dir>/config.toml`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::data_dir;
use crate::engine::RunnerConfig;
use crate::error::ConfigError;
use crate::safety::{ExperienceLevel, LevelLimits, SafetyPolicy};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileConfig {
    #[serde(default)]
    pub experience_level: ExperienceLevel,
}

/// Limits for one experience level, in config-friendly units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelLimitsConfig {
    pub max_safe_hold_secs: u64,
    pub min_rest_between_sessions_min: u64,
    pub daily_session_limit: u32,
}

impl LevelLimitsConfig {
    pub fn defaults_for(level: ExperienceLevel) -> Self {
        let limits = LevelLimits::defaults_for(level);
        Self {
            max_safe_hold_secs: limits.max_safe_hold.as_secs(),
            min_rest_between_sessions_min: limits.min_rest_between_sessions.as_secs() / 60,
            daily_session_limit: limits.daily_session_limit,
        }
    }

    pub fn to_limits(&self) -> LevelLimits {
        LevelLimits {
            max_safe_hold: Duration::from_secs(self.max_safe_hold_secs),
            min_rest_between_sessions: Duration::from_secs(
                self.min_rest_between_sessions_min.saturating_mul(60),
            ),
            daily_session_limit: self.daily_session_limit,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SafetyConfig {
    #[serde(default = "default_beginner")]
    pub beginner: LevelLimitsConfig,
    #[serde(default = "default_intermediate")]
    pub intermediate: LevelLimitsConfig,
    #[serde(default = "default_advanced")]
    pub advanced: LevelLimitsConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimerConfig {
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    /// A tick gap beyond interval + tolerance ends the session as a timer fault.
    #[serde(default = "default_stall_tolerance_ms")]
    pub stall_tolerance_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_true")]
    pub countdown_cues: bool,
}

/// Application configuration.
///
/// Serialized to/from TOML at `<data dir>/config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub profile: ProfileConfig,
    #[serde(default)]
    pub safety: SafetyConfig,
    #[serde(default)]
    pub timer: TimerConfig,
    #[serde(default)]
    pub audio: AudioConfig,
}

// Default functions
fn default_beginner() -> LevelLimitsConfig {
    LevelLimitsConfig::defaults_for(ExperienceLevel::Beginner)
}
fn default_intermediate() -> LevelLimitsConfig {
    LevelLimitsConfig::defaults_for(ExperienceLevel::Intermediate)
}
fn default_advanced() -> LevelLimitsConfig {
    LevelLimitsConfig::defaults_for(ExperienceLevel::Advanced)
}
fn default_tick_interval_ms() -> u64 {
    100
}
fn default_stall_tolerance_ms() -> u64 {
    2000
}
fn default_true() -> bool {
    true
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            beginner: default_beginner(),
            intermediate: default_intermediate(),
            advanced: default_advanced(),
        }
    }
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
            stall_tolerance_ms: default_stall_tolerance_ms(),
        }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            countdown_cues: true,
        }
    }
}

impl Config {
    fn get_json_value_by_path<'a>(
        root: &'a serde_json::Value,
        key: &str,
    ) -> Option<&'a serde_json::Value> {
        if key.is_empty() {
            return None;
        }

        let mut current = root;
        for part in key.split('.') {
            current = current.get(part)?;
        }
        Some(current)
    }

    fn set_json_value_by_path(
        root: &mut serde_json::Value,
        key: &str,
        value: &str,
    ) -> Result<(), ConfigError> {
        let unknown = || ConfigError::UnknownKey(key.to_string());
        let invalid = |message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };

        let mut parts = key.split('.').peekable();
        if key.is_empty() {
            return Err(unknown());
        }

        let mut current = root;
        while let Some(part) = parts.next() {
            if parts.peek().is_none() {
                let obj = current.as_object_mut().ok_or_else(unknown)?;
                let existing = obj.get(part).ok_or_else(unknown)?;

                let new_value = match existing {
                    serde_json::Value::Bool(_) => serde_json::Value::Bool(
                        value
                            .parse::<bool>()
                            .map_err(|e| invalid(e.to_string()))?,
                    ),
                    serde_json::Value::Number(_) => serde_json::Value::Number(
                        value
                            .parse::<u64>()
                            .map_err(|_| invalid(format!("cannot parse '{value}' as a whole number")))?
                            .into(),
                    ),
                    serde_json::Value::Object(_) => return Err(invalid(
                        "is a section; set one of its keys instead".to_string(),
                    )),
                    _ => serde_json::Value::String(value.into()),
                };

                obj.insert(part.to_string(), new_value);
                return Ok(());
            }

            current = current.get_mut(part).ok_or_else(unknown)?;
        }

        Err(unknown())
    }

    fn collect_keys(prefix: &str, value: &serde_json::Value, out: &mut Vec<(String, String)>) {
        match value {
            serde_json::Value::Object(map) => {
                for (k, v) in map {
                    let key = if prefix.is_empty() {
                        k.clone()
                    } else {
                        format!("{prefix}.{k}")
                    };
                    Self::collect_keys(&key, v, out);
                }
            }
            serde_json::Value::String(s) => out.push((prefix.to_string(), s.clone())),
            other => out.push((prefix.to_string(), other.to_string())),
        }
    }

    pub fn path() -> Result<PathBuf, ConfigError> {
        Ok(data_dir()?.join("config.toml"))
    }

    /// Load from the data directory, writing defaults on first use.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed,
    /// or if the default config cannot be written to disk.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_at(&Self::path()?)
    }

    /// Same as [`load`](Self::load) for an explicit file.
    pub fn load_at(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => {
                let cfg: Config = toml::from_str(&content).map_err(|e| ConfigError::LoadFailed {
                    path: path.to_path_buf(),
                    message: e.to_string(),
                })?;
                cfg.validate()?;
                Ok(cfg)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let cfg = Self::default();
                cfg.save_at(path)?;
                Ok(cfg)
            }
            Err(e) => Err(ConfigError::LoadFailed {
                path: path.to_path_buf(),
                message: e.to_string(),
            }),
        }
    }

    /// Load from disk, returning default on error.
    /// This is a convenience method that never fails.
    pub fn load_or_default() -> Self {
        match Self::load() {
            Ok(cfg) => cfg,
            Err(e) => {
                tracing::warn!(error = %e, "using default configuration");
                Self::default()
            }
        }
    }

    /// Persist to the data directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the config cannot be serialized or written to disk.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_at(&Self::path()?)
    }

    pub fn save_at(&self, path: &Path) -> Result<(), ConfigError> {
        let save_failed = |message: String| ConfigError::SaveFailed {
            path: path.to_path_buf(),
            message,
        };
        let content = toml::to_string_pretty(self).map_err(|e| save_failed(e.to_string()))?;
        std::fs::write(path, content).map_err(|e| save_failed(e.to_string()))
    }

    /// Get a config value as string by dot-separated key.
    pub fn get(&self, key: &str) -> Option<String> {
        let json = serde_json::to_value(self).ok()?;
        let val = Self::get_json_value_by_path(&json, key)?;
        match val {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Object(_) => None,
            other => Some(other.to_string()),
        }
    }

    /// Set a value by dot-separated key, keeping the existing value's type.
    /// Does not save.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is unknown or the value does not parse
    /// or breaks a limit. The config is left unchanged on error.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let invalid = |message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };
        let mut json = serde_json::to_value(&*self).map_err(|e| invalid(e.to_string()))?;
        Self::set_json_value_by_path(&mut json, key, value)?;
        let updated: Config = serde_json::from_value(json).map_err(|e| invalid(e.to_string()))?;
        updated.validate()?;
        *self = updated;
        Ok(())
    }

    /// Every leaf key with its current value, in dot-path form.
    pub fn entries(&self) -> Vec<(String, String)> {
        let mut out = Vec::new();
        if let Ok(json) = serde_json::to_value(self) {
            Self::collect_keys("", &json, &mut out);
        }
        out
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |key: &str, message: &str| -> Result<(), ConfigError> {
            Err(ConfigError::InvalidValue {
                key: key.to_string(),
                message: message.to_string(),
            })
        };

        if self.timer.tick_interval_ms == 0 || self.timer.tick_interval_ms > 1000 {
            return invalid("timer.tick_interval_ms", "must be between 1 and 1000");
        }
        for level in ExperienceLevel::ALL {
            let limits = self.level_limits(level);
            if limits.max_safe_hold_secs == 0 {
                return invalid(
                    &format!("safety.{level}.max_safe_hold_secs"),
                    "must be greater than zero",
                );
            }
            if limits.daily_session_limit == 0 {
                return invalid(
                    &format!("safety.{level}.daily_session_limit"),
                    "must be greater than zero",
                );
            }
            let defaults = LevelLimitsConfig::defaults_for(level);
            if limits.max_safe_hold_secs > defaults.max_safe_hold_secs {
                return invalid(
                    &format!("safety.{level}.max_safe_hold_secs"),
                    &format!("may not exceed {}", defaults.max_safe_hold_secs),
                );
            }
            if limits.min_rest_between_sessions_min < defaults.min_rest_between_sessions_min {
                return invalid(
                    &format!("safety.{level}.min_rest_between_sessions_min"),
                    &format!(
                        "may not be less than {}",
                        defaults.min_rest_between_sessions_min
                    ),
                );
            }
            if limits.daily_session_limit > defaults.daily_session_limit {
                return invalid(
                    &format!("safety.{level}.daily_session_limit"),
                    &format!("may not exceed {}", defaults.daily_session_limit),
                );
            }
        }
        Ok(())
    }

    fn level_limits(&self, level: ExperienceLevel) -> &LevelLimitsConfig {
        match level {
            ExperienceLevel::Beginner => &self.safety.beginner,
            ExperienceLevel::Intermediate => &self.safety.intermediate,
            ExperienceLevel::Advanced => &self.safety.advanced,
        }
    }

    pub fn experience_level(&self) -> ExperienceLevel {
        self.profile.experience_level
    }

    pub fn safety_policy(&self) -> SafetyPolicy {
        SafetyPolicy::new(
            self.safety.beginner.to_limits(),
            self.safety.intermediate.to_limits(),
            self.safety.advanced.to_limits(),
        )
    }

    pub fn runner_config(&self) -> RunnerConfig {
        RunnerConfig {
            tick_interval: Duration::from_millis(self.timer.tick_interval_ms),
            stall_tolerance: Duration::from_millis(self.timer.stall_tolerance_ms),
            ..RunnerConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_roundtrip() {
        let cfg = Config::default();
        let toml_str = toml::to_string_pretty(&cfg).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed, cfg);
    }

    #[test]
    fn missing_sections_fall_back_to_defaults() {
        let cfg: Config = toml::from_str("[timer]\ntick_interval_ms = 50\n").unwrap();
        assert_eq!(cfg.timer.tick_interval_ms, 50);
        assert_eq!(cfg.timer.stall_tolerance_ms, 2000);
        assert_eq!(cfg.safety.intermediate.max_safe_hold_secs, 90);
        assert_eq!(cfg.profile.experience_level, ExperienceLevel::Beginner);
    }

    #[test]
    fn config_default_values() {
        let cfg = Config::default();
        assert_eq!(cfg.safety.beginner.max_safe_hold_secs, 30);
        assert_eq!(cfg.safety.beginner.min_rest_between_sessions_min, 240);
        assert_eq!(cfg.safety.beginner.daily_session_limit, 2);
        assert_eq!(cfg.safety.advanced.max_safe_hold_secs, 180);
        assert_eq!(cfg.safety.advanced.daily_session_limit, 4);
        assert!(cfg.audio.enabled);
        assert!(cfg.audio.countdown_cues);
    }

    #[test]
    fn get_supports_dot_path_keys() {
        let cfg = Config::default();
        assert_eq!(cfg.get("timer.tick_interval_ms").as_deref(), Some("100"));
        assert_eq!(cfg.get("audio.enabled").as_deref(), Some("true"));
        assert_eq!(
            cfg.get("profile.experience_level").as_deref(),
            Some("beginner")
        );
        assert!(cfg.get("timer.missing").is_none());
        assert!(cfg.get("safety").is_none());
    }

    #[test]
    fn set_keeps_value_types() {
        let mut cfg = Config::default();
        cfg.set("audio.countdown_cues", "false").unwrap();
        cfg.set("safety.advanced.daily_session_limit", "3").unwrap();
        cfg.set("profile.experience_level", "intermediate").unwrap();
        assert!(!cfg.audio.countdown_cues);
        assert_eq!(cfg.safety.advanced.daily_session_limit, 3);
        assert_eq!(cfg.experience_level(), ExperienceLevel::Intermediate);
    }

    #[test]
    fn set_rejects_unknown_keys_and_bad_values() {
        let mut cfg = Config::default();
        assert!(matches!(
            cfg.set("audio.volume", "3"),
            Err(ConfigError::UnknownKey(_))
        ));
        assert!(matches!(
            cfg.set("audio.enabled", "loud"),
            Err(ConfigError::InvalidValue { .. })
        ));
        assert!(cfg.set("profile.experience_level", "expert").is_err());
        assert!(cfg.set("safety.beginner", "1").is_err());
        assert_eq!(cfg, Config::default());
    }

    #[test]
    fn set_rejects_values_that_break_limits() {
        let mut cfg = Config::default();
        assert!(cfg.set("timer.tick_interval_ms", "0").is_err());
        assert!(cfg.set("safety.beginner.max_safe_hold_secs", "0").is_err());
        assert_eq!(cfg.timer.tick_interval_ms, 100);
    }

    #[test]
    fn set_refuses_to_loosen_safety_limits() {
        let mut cfg = Config::default();
        assert!(matches!(
            cfg.set("safety.beginner.max_safe_hold_secs", "3600"),
            Err(ConfigError::InvalidValue { .. })
        ));
        assert!(cfg
            .set("safety.beginner.min_rest_between_sessions_min", "0")
            .is_err());
        assert!(cfg.set("safety.advanced.daily_session_limit", "10").is_err());
        assert_eq!(cfg, Config::default());

        let program = crate::program::TrainingProgram::builder("long", "Long")
            .max_hold(Duration::from_secs(600))
            .build();
        assert_eq!(
            cfg.safety_policy()
                .max_allowed_hold(ExperienceLevel::Beginner, &program),
            Duration::from_secs(30)
        );
    }

    #[test]
    fn load_at_rejects_a_file_with_loosened_limits() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[safety.beginner]\nmax_safe_hold_secs = 3600\nmin_rest_between_sessions_min = 240\ndaily_session_limit = 2\n",
        )
        .unwrap();
        assert!(matches!(
            Config::load_at(&path),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn safety_policy_uses_configured_limits() {
        let mut cfg = Config::default();
        cfg.set("safety.beginner.max_safe_hold_secs", "20").unwrap();
        cfg.set("safety.beginner.min_rest_between_sessions_min", "300")
            .unwrap();
        let policy = cfg.safety_policy();
        let limits = policy.limits(ExperienceLevel::Beginner);
        assert_eq!(limits.max_safe_hold, Duration::from_secs(20));
        assert_eq!(limits.min_rest_between_sessions, Duration::from_secs(18_000));
        assert_eq!(
            policy.limits(ExperienceLevel::Advanced),
            &LevelLimits::defaults_for(ExperienceLevel::Advanced)
        );
    }

    #[test]
    fn entries_lists_every_leaf() {
        let entries = Config::default().entries();
        assert!(entries
            .iter()
            .any(|(k, v)| k == "timer.stall_tolerance_ms" && v == "2000"));
        assert!(entries
            .iter()
            .any(|(k, _)| k == "safety.intermediate.daily_session_limit"));
        assert!(entries.iter().all(|(k, _)| k.contains('.')));
    }

    #[test]
    fn load_at_writes_defaults_then_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let cfg = Config::load_at(&path).unwrap();
        assert_eq!(cfg, Config::default());
        assert!(path.exists());

        let mut changed = cfg.clone();
        changed.set("timer.stall_tolerance_ms", "500").unwrap();
        changed.save_at(&path).unwrap();
        assert_eq!(Config::load_at(&path).unwrap().timer.stall_tolerance_ms, 500);
    }

    #[test]
    fn load_at_reports_parse_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "timer = 3").unwrap();
        assert!(matches!(
            Config::load_at(&path),
            Err(ConfigError::LoadFailed { .. })
        ));
    }
}
