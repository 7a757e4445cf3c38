use clap::Args;
use eloguard_core::source::RatingSource;
use eloguard_core::{bracket, ChessComSource, ValidationError};

use super::{load_armable, CommandResult};

#[derive(Args)]
pub struct BracketArgs {
    /// Points below and above the live rating
    pub range: i64,
}

pub async fn run(args: BracketArgs) -> CommandResult {
    if args.range <= 0 {
        return Err(ValidationError::InvalidValue {
            field: "range".into(),
            message: format!("must be positive, got {}", args.range),
        }
        .into());
    }

    let (mut settings, config) = load_armable()?;
    let snapshot = ChessComSource::new()?
        .fetch_rating(&config.player, config.mode)
        .await?;
    let bracket = bracket(snapshot.rating, args.range)?;

    settings.stop_loss.set(config.mode, bracket.stop_loss);
    settings.target_rating.set(config.mode, bracket.target);
    settings.save()?;

    tracing::info!(
        rating = snapshot.rating,
        stop_loss = bracket.stop_loss,
        target = bracket.target,
        mode = %config.mode,
        "bracket applied"
    );
    println!("{}", serde_json::to_string_pretty(&bracket)?);
    Ok(())
}
