//! External inputs the engine consumes: rating snapshots and match-end signals.

mod chess_com;
mod completion;

pub use chess_com::{ChessComSource, ModeRatings, DEFAULT_BASE_URL};
pub use completion::{CompletionEdge, GameCompletionSignal, ManualCompletionSignal, MatchStatus};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DataSourceError;
use crate::storage::GameMode;

/// One observed rating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RatingSnapshot {
    pub rating: i64,
    pub observed_at: DateTime<Utc>,
}

impl RatingSnapshot {
    pub fn new(rating: i64, observed_at: DateTime<Utc>) -> Self {
        Self {
            rating,
            observed_at,
        }
    }

    pub fn now(rating: i64) -> Self {
        Self::new(rating, Utc::now())
    }
}

/// Anything that can report a player's current rating for a mode.
#[async_trait]
pub trait RatingSource: Send + Sync {
    async fn fetch_rating(
        &self,
        player: &str,
        mode: GameMode,
    ) -> Result<RatingSnapshot, DataSourceError>;
}
