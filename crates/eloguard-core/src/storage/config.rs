//! TOML-based guard settings.
//!
//! Stores the user-facing settings:
//! - Player name and active game mode
//! - Per-mode stop-loss, target and loss-streak thresholds
//! - Guard, cooldown and challenge toggles
//! - Poll intervals
//!
//! Settings are stored at `~/.config/eloguard/config.toml`. The engine never
//! reads them directly; [`Settings::resolve`] projects the active mode into a
//! validated [`Config`] once per change.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::data_dir;
use crate::guard::MAX_CHALLENGE_LENGTH;
use crate::error::ConfigError;

/// Rating pool a threshold applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GameMode {
    Bullet,
    #[default]
    Blitz,
    Rapid,
    Daily,
}

impl GameMode {
    pub const ALL: [GameMode; 4] = [
        GameMode::Bullet,
        GameMode::Blitz,
        GameMode::Rapid,
        GameMode::Daily,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            GameMode::Bullet => "bullet",
            GameMode::Blitz => "blitz",
            GameMode::Rapid => "rapid",
            GameMode::Daily => "daily",
        }
    }
}

impl fmt::Display for GameMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GameMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bullet" => Ok(GameMode::Bullet),
            "blitz" => Ok(GameMode::Blitz),
            "rapid" => Ok(GameMode::Rapid),
            "daily" => Ok(GameMode::Daily),
            other => Err(ConfigError::InvalidValue {
                key: "game_mode".into(),
                message: format!("unknown mode '{other}'"),
            }),
        }
    }
}

/// One integer per game mode. Zero means "disabled".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerMode {
    #[serde(default)]
    pub bullet: i64,
    #[serde(default)]
    pub blitz: i64,
    #[serde(default)]
    pub rapid: i64,
    #[serde(default)]
    pub daily: i64,
}

impl PerMode {
    pub fn get(&self, mode: GameMode) -> i64 {
        match mode {
            GameMode::Bullet => self.bullet,
            GameMode::Blitz => self.blitz,
            GameMode::Rapid => self.rapid,
            GameMode::Daily => self.daily,
        }
    }

    pub fn set(&mut self, mode: GameMode, value: i64) {
        match mode {
            GameMode::Bullet => self.bullet = value,
            GameMode::Blitz => self.blitz = value,
            GameMode::Rapid => self.rapid = value,
            GameMode::Daily => self.daily = value,
        }
    }
}

/// Poll loop cadence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollingConfig {
    #[serde(default = "default_rating_secs")]
    pub rating_secs: u64,
    #[serde(default = "default_completion_ms")]
    pub completion_ms: u64,
    #[serde(default = "default_reassert_ms")]
    pub reassert_ms: u64,
    #[serde(default = "default_cooldown_tick_ms")]
    pub cooldown_tick_ms: u64,
}

impl PollingConfig {
    pub fn rating(&self) -> Duration {
        Duration::from_secs(self.rating_secs.max(1))
    }

    pub fn completion(&self) -> Duration {
        Duration::from_millis(self.completion_ms.max(10))
    }

    pub fn reassert(&self) -> Duration {
        Duration::from_millis(self.reassert_ms.max(10))
    }

    pub fn cooldown_tick(&self) -> Duration {
        Duration::from_millis(self.cooldown_tick_ms.max(10))
    }
}

/// Synced guard settings.
///
/// Serialized to/from TOML at `~/.config/eloguard/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub game_mode: GameMode,
    #[serde(default)]
    pub stop_loss: PerMode,
    #[serde(default)]
    pub target_rating: PerMode,
    #[serde(default)]
    pub loss_streak: PerMode,
    #[serde(default)]
    pub guard_active: bool,
    #[serde(default)]
    pub cooldown_active: bool,
    #[serde(default)]
    pub cooldown_seconds: u64,
    #[serde(default)]
    pub challenge_unlock: bool,
    #[serde(default = "default_challenge_length")]
    pub challenge_length: usize,
    /// Owned by the presentation layer; carried so it round-trips.
    #[serde(default)]
    pub hide_ratings: bool,
    #[serde(default)]
    pub polling: PollingConfig,
}

/// The engine's read-only view of the settings for the active mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    pub player: String,
    pub mode: GameMode,
    pub stop_loss_rating: Option<i64>,
    pub target_rating: Option<i64>,
    pub loss_streak_threshold: Option<u32>,
    pub guard_enabled: bool,
    pub cooldown_enabled: bool,
    pub cooldown_seconds: u64,
    pub challenge_enabled: bool,
    pub challenge_length: usize,
}

// Default functions
fn default_challenge_length() -> usize {
    10
}
fn default_rating_secs() -> u64 {
    30
}
fn default_completion_ms() -> u64 {
    100
}
fn default_reassert_ms() -> u64 {
    200
}
fn default_cooldown_tick_ms() -> u64 {
    1000
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            rating_secs: default_rating_secs(),
            completion_ms: default_completion_ms(),
            reassert_ms: default_reassert_ms(),
            cooldown_tick_ms: default_cooldown_tick_ms(),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            username: String::new(),
            game_mode: GameMode::default(),
            stop_loss: PerMode::default(),
            target_rating: PerMode::default(),
            loss_streak: PerMode::default(),
            guard_active: false,
            cooldown_active: false,
            cooldown_seconds: 0,
            challenge_unlock: false,
            challenge_length: default_challenge_length(),
            hide_ratings: false,
            polling: PollingConfig::default(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Settings::default().resolve()
    }
}

fn positive(value: i64) -> Option<i64> {
    (value > 0).then_some(value)
}

fn check_challenge_length(length: usize) -> Result<(), ConfigError> {
    if (1..=MAX_CHALLENGE_LENGTH).contains(&length) {
        Ok(())
    } else {
        Err(ConfigError::InvalidValue {
            key: "challenge_length".into(),
            message: format!("must be between 1 and {MAX_CHALLENGE_LENGTH}, got {length}"),
        })
    }
}

impl Config {
    /// Check the fields the engine cannot work without.
    ///
    /// # Errors
    /// Returns `MissingKey("username")` when no player is configured, and
    /// `InvalidValue` when an enabled challenge could never be generated.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.player.trim().is_empty() {
            return Err(ConfigError::MissingKey("username".into()));
        }
        if self.challenge_enabled {
            check_challenge_length(self.challenge_length)?;
        }
        Ok(())
    }

    /// Guard switched on and enough configured to make lock decisions.
    pub fn is_armable(&self) -> bool {
        self.guard_enabled && self.validate().is_ok()
    }

    /// A cooldown would actually run after a safe match.
    pub fn cooldown_configured(&self) -> bool {
        self.cooldown_enabled && self.cooldown_seconds > 0
    }

    /// Player and mode identify the same rating pool.
    pub fn same_pool(&self, other: &Config) -> bool {
        self.player == other.player && self.mode == other.mode
    }

    /// Any field that feeds a lock decision differs.
    pub fn thresholds_differ(&self, other: &Config) -> bool {
        self.stop_loss_rating != other.stop_loss_rating
            || self.target_rating != other.target_rating
            || self.loss_streak_threshold != other.loss_streak_threshold
    }
}

impl Settings {
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
        let unknown = || ConfigError::InvalidValue {
            key: key.to_string(),
            message: "unknown config key".into(),
        };
        let invalid = |message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };

        let mut parts = key.split('.').peekable();
        if parts.peek().map_or(true, |p| p.is_empty()) {
            return Err(ConfigError::MissingKey("config key is empty".into()));
        }

        let mut current = root;
        while let Some(part) = parts.next() {
            let is_leaf = parts.peek().is_none();
            if is_leaf {
                let obj = current.as_object_mut().ok_or_else(unknown)?;
                let existing = obj.get(part).ok_or_else(unknown)?;

                let new_value = match existing {
                    serde_json::Value::Bool(_) => serde_json::Value::Bool(
                        value
                            .parse::<bool>()
                            .map_err(|e| invalid(e.to_string()))?,
                    ),
                    serde_json::Value::Number(_) => {
                        // Blank clears a threshold, matching an emptied input field.
                        let trimmed = value.trim();
                        let n = if trimmed.is_empty() {
                            0
                        } else {
                            trimmed
                                .parse::<i64>()
                                .map_err(|_| invalid(format!("cannot parse '{value}' as integer")))?
                        };
                        serde_json::Value::Number(n.into())
                    }
                    serde_json::Value::Object(_) | serde_json::Value::Array(_) => {
                        serde_json::from_str(value).map_err(|e| invalid(e.to_string()))?
                    }
                    _ => serde_json::Value::String(value.into()),
                };

                obj.insert(part.to_string(), new_value);
                return Ok(());
            }

            current = current.get_mut(part).ok_or_else(unknown)?;
        }

        Err(unknown())
    }

    fn path() -> Result<PathBuf, ConfigError> {
        data_dir()
            .map(|d| d.join("config.toml"))
            .map_err(|e| ConfigError::LoadFailed {
                path: PathBuf::from("~/.config/eloguard"),
                message: e.to_string(),
            })
    }

    /// Load from the default location, writing defaults on first use.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be parsed,
    /// or if the default settings cannot be written to disk.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::path()?)
    }

    /// Load from an explicit path, writing defaults if the file is missing.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => Ok(toml::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let settings = Self::default();
                settings.save_to(path)?;
                Ok(settings)
            }
            Err(e) => Err(ConfigError::LoadFailed {
                path: path.to_path_buf(),
                message: e.to_string(),
            }),
        }
    }

    /// Persist to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::path()?)
    }

    /// Persist to an explicit path.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let save_failed = |message: String| ConfigError::SaveFailed {
            path: path.to_path_buf(),
            message,
        };
        let content = toml::to_string_pretty(self).map_err(|e| save_failed(e.to_string()))?;
        std::fs::write(path, content).map_err(|e| save_failed(e.to_string()))?;
        Ok(())
    }

    /// Load from disk, returning default on error.
    pub fn load_or_default() -> Self {
        Self::load().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "falling back to default settings");
            Self::default()
        })
    }

    /// Get a value as string by dot-separated key (e.g. `stop_loss.blitz`).
    pub fn get(&self, key: &str) -> Option<String> {
        let json = serde_json::to_value(self).ok()?;
        let val = Self::get_json_value_by_path(&json, key)?;
        match val {
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Set a value by key in memory. Returns error if the key is unknown or
    /// the value does not fit the field's type.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let mut json =
            serde_json::to_value(&*self).map_err(|e| ConfigError::ParseFailed(e.to_string()))?;
        Self::set_json_value_by_path(&mut json, key, value)?;
        let updated: Settings =
            serde_json::from_value(json).map_err(|e| ConfigError::InvalidValue {
                key: key.to_string(),
                message: e.to_string(),
            })?;
        if key == "challenge_length" {
            check_challenge_length(updated.challenge_length)?;
        }
        *self = updated;
        Ok(())
    }

    /// Project the active mode's values into the engine's config.
    ///
    /// Zero or negative thresholds become `None`.
    pub fn resolve(&self) -> Config {
        let mode = self.game_mode;
        Config {
            player: self.username.trim().to_string(),
            mode,
            stop_loss_rating: positive(self.stop_loss.get(mode)),
            target_rating: positive(self.target_rating.get(mode)),
            loss_streak_threshold: positive(self.loss_streak.get(mode))
                .and_then(|v| u32::try_from(v).ok()),
            guard_enabled: self.guard_active,
            cooldown_enabled: self.cooldown_active,
            cooldown_seconds: self.cooldown_seconds,
            challenge_enabled: self.challenge_unlock,
            challenge_length: self.challenge_length.clamp(1, MAX_CHALLENGE_LENGTH),
        }
    }
}
