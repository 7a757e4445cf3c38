use clap::Subcommand;
use eloguard_core::{CoreError, Settings};

use super::CommandResult;

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Get a config value
    Get {
        /// Config key (e.g. "username", "stop_loss.blitz")
        key: String,
    },
    /// Set a config value
    Set {
        /// Config key
        key: String,
        /// New value (empty clears a threshold)
        value: String,
    },
    /// List all config values
    List,
    /// Reset config to defaults
    Reset,
}

pub fn run(action: ConfigAction) -> CommandResult {
    match action {
        ConfigAction::Get { key } => {
            let settings = Settings::load()?;
            match settings.get(&key) {
                Some(value) => println!("{value}"),
                None => return Err(CoreError::Custom(format!("unknown key: {key}"))),
            }
        }
        ConfigAction::Set { key, value } => {
            let mut settings = Settings::load()?;
            settings.set(&key, &value)?;
            settings.save()?;
            println!("ok");
        }
        ConfigAction::List => {
            let settings = Settings::load()?;
            let json = serde_json::to_string_pretty(&settings)?;
            println!("{json}");
        }
        ConfigAction::Reset => {
            Settings::default().save()?;
            println!("config reset to defaults");
        }
    }
    Ok(())
}
