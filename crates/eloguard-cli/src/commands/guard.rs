use std::sync::Arc;

use clap::Subcommand;
use eloguard_core::guard::LossStreakTracker;
use eloguard_core::{Settings, SqliteStore};
use serde_json::json;

use super::CommandResult;

#[derive(Subcommand)]
pub enum GuardAction {
    /// Arm the guard
    On,
    /// Disarm the guard and forget the current loss streak
    Off,
    /// Show what the guard is configured to do
    Status,
}

pub async fn run(action: GuardAction) -> CommandResult {
    match action {
        GuardAction::On => {
            let mut settings = Settings::load()?;
            settings.guard_active = true;
            settings.save()?;
            if let Err(e) = settings.resolve().validate() {
                eprintln!("warning: guard will not arm yet: {e}");
            }
            println!("guard on");
        }
        GuardAction::Off => {
            let mut settings = Settings::load()?;
            settings.guard_active = false;
            settings.save()?;

            let config = settings.resolve();
            if config.validate().is_ok() {
                let mut tracker = LossStreakTracker::new(Arc::new(SqliteStore::open()?));
                tracker.reset(&config.player, config.mode).await;
            }
            println!("guard off");
        }
        GuardAction::Status => {
            let settings = Settings::load()?;
            let config = settings.resolve();
            let record = if config.validate().is_ok() {
                let mut tracker = LossStreakTracker::new(Arc::new(SqliteStore::open()?));
                Some(tracker.load(&config.player, config.mode).await)
            } else {
                None
            };

            let status = json!({
                "armed": config.is_armable(),
                "config": config,
                "loss_streak": record,
            });
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
    }
    Ok(())
}
