use std::sync::Arc;

use clap::Subcommand;
use eloguard_core::guard::LossStreakTracker;
use eloguard_core::SqliteStore;

use super::{load_armable, CommandResult};

#[derive(Subcommand)]
pub enum StreakAction {
    /// Print the persisted loss-streak record
    Show,
    /// Forget the loss streak and last known rating
    Reset,
}

pub async fn run(action: StreakAction) -> CommandResult {
    let (_settings, config) = load_armable()?;
    let mut tracker = LossStreakTracker::new(Arc::new(SqliteStore::open()?));

    match action {
        StreakAction::Show => {
            let record = tracker.load(&config.player, config.mode).await;
            println!("{}", serde_json::to_string_pretty(&record)?);
        }
        StreakAction::Reset => {
            tracker.reset(&config.player, config.mode).await;
            println!("loss streak reset for {} ({})", config.player, config.mode);
        }
    }
    Ok(())
}
