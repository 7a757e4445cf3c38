mod config;
pub mod database;
pub mod store;

pub use config::{Config, GameMode, PerMode, PollingConfig, Settings};
pub use database::SqliteStore;
pub use store::{load_json, remove_logged, save_json, MemoryStore, Store, StoreChange};

use std::path::PathBuf;

/// Returns `~/.config/eloguard[-dev]/` based on ELOGUARD_ENV.
///
/// Set ELOGUARD_ENV=dev to use development data directory.
///
/// # Errors
/// Returns an error if creating the config directory fails.
pub fn data_dir() -> Result<PathBuf, std::io::Error> {
    let base_dir = dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config");

    let env = std::env::var("ELOGUARD_ENV").unwrap_or_else(|_| "production".to_string());

    let dir = if env == "dev" {
        base_dir.join("eloguard-dev")
    } else {
        base_dir.join("eloguard")
    };

    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

/// Persisted key layout shared by every session.
pub mod keys {
    use super::GameMode;

    /// Session-scoped random token.
    pub const INSTANCE_ID: &str = "instanceId";

    /// Absolute cooldown end (epoch ms), one per instance.
    pub fn cooldown_end(instance_id: &str) -> String {
        format!("cooldownEnd:{instance_id}")
    }

    /// Consecutive-loss counter for a player/mode pair.
    pub fn loss_streak(player: &str, mode: GameMode) -> String {
        format!("lossStreak:{player}:{mode}")
    }

    /// Last observed rating for a player/mode pair.
    pub fn last_rating(player: &str, mode: GameMode) -> String {
        format!("lastRating:{player}:{mode}")
    }
}
