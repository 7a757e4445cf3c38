pub mod bracket;
pub mod config;
pub mod guard;
pub mod rating;
pub mod run;
pub mod streak;

use eloguard_core::{Config, Result, Settings};

pub type CommandResult = Result<()>;

/// Settings from disk, resolved and checked for a player.
pub fn load_armable() -> Result<(Settings, Config)> {
    let settings = Settings::load()?;
    let config = settings.resolve();
    config.validate()?;
    Ok((settings, config))
}
