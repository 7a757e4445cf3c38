use clap::Args;
use eloguard_core::source::RatingSource;
use eloguard_core::ChessComSource;
use serde_json::json;

use super::{load_armable, CommandResult};

#[derive(Args)]
pub struct RatingArgs {
    /// Show every game mode, not just the configured one
    #[arg(long)]
    pub all: bool,
}

pub async fn run(args: RatingArgs) -> CommandResult {
    let (_settings, config) = load_armable()?;
    let source = ChessComSource::new()?;

    if args.all {
        let ratings = source.fetch_all(&config.player).await?;
        println!("{}", serde_json::to_string_pretty(&ratings)?);
    } else {
        let snapshot = source.fetch_rating(&config.player, config.mode).await?;
        let out = json!({
            "player": config.player,
            "mode": config.mode,
            "rating": snapshot.rating,
            "observed_at": snapshot.observed_at,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
    }
    Ok(())
}
