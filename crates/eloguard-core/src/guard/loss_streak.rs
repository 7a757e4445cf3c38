//! Consecutive-loss tracking.
//!
//! A loss is any snapshot whose rating is strictly below the previous one.
//! A strictly higher rating resets the counter; an equal rating (or the very
//! first snapshot) leaves it alone.
//!
//! Records are keyed by player and mode only, not by instance. Two sessions
//! watching the same pool share (and can overwrite) one record; the tracker
//! narrows that window by dropping its cache whenever the store reports a
//! foreign write to its keys.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::storage::{keys, load_json, remove_logged, save_json, GameMode, Store, StoreChange};

/// Persisted per (player, mode).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LossStreakRecord {
    pub consecutive_losses: u32,
    pub last_known_rating: Option<i64>,
}

impl LossStreakRecord {
    /// Fold one rating into the record. Returns `rating - last_known_rating`,
    /// or 0 when there was no prior rating.
    pub fn apply(&mut self, rating: i64) -> i64 {
        let diff = match self.last_known_rating {
            Some(last) => rating - last,
            None => 0,
        };

        if diff < 0 {
            self.consecutive_losses = self.consecutive_losses.saturating_add(1);
        } else if diff > 0 {
            self.consecutive_losses = 0;
        }

        self.last_known_rating = Some(rating);
        diff
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Cached {
    player: String,
    mode: GameMode,
    record: LossStreakRecord,
}

impl Cached {
    fn is_for(&self, player: &str, mode: GameMode) -> bool {
        self.player == player && self.mode == mode
    }
}

pub struct LossStreakTracker {
    store: Arc<dyn Store>,
    cached: Option<Cached>,
}

impl LossStreakTracker {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            cached: None,
        }
    }

    /// Current streak for the pair, if it is the cached one.
    pub fn streak(&self, player: &str, mode: GameMode) -> u32 {
        self.cached
            .as_ref()
            .filter(|c| c.is_for(player, mode))
            .map_or(0, |c| c.record.consecutive_losses)
    }

    /// Record for the pair, reading the store on a cache miss.
    ///
    /// Unreadable values count as "no record yet".
    pub async fn load(&mut self, player: &str, mode: GameMode) -> LossStreakRecord {
        if let Some(cached) = self.cached.as_ref().filter(|c| c.is_for(player, mode)) {
            return cached.record;
        }

        let streak_key = keys::loss_streak(player, mode);
        let rating_key = keys::last_rating(player, mode);

        let consecutive_losses = load_json::<u32>(self.store.as_ref(), &streak_key)
            .await
            .unwrap_or_else(|e| {
                tracing::warn!(key = %streak_key, error = %e, "ignoring unreadable loss streak");
                None
            })
            .unwrap_or(0);
        let last_known_rating = load_json::<Option<i64>>(self.store.as_ref(), &rating_key)
            .await
            .unwrap_or_else(|e| {
                tracing::warn!(key = %rating_key, error = %e, "ignoring unreadable last rating");
                None
            })
            .flatten();

        let record = LossStreakRecord {
            consecutive_losses,
            last_known_rating,
        };
        self.cached = Some(Cached {
            player: player.to_string(),
            mode,
            record,
        });
        record
    }

    /// Fold a new rating in, persist, and return the diff against the
    /// previous rating.
    pub async fn update(&mut self, player: &str, mode: GameMode, rating: i64) -> i64 {
        let mut record = self.load(player, mode).await;
        let diff = record.apply(rating);

        self.cached = Some(Cached {
            player: player.to_string(),
            mode,
            record,
        });
        self.persist(player, mode, record).await;

        tracing::debug!(
            player,
            mode = %mode,
            rating,
            diff,
            streak = record.consecutive_losses,
            "loss streak updated"
        );
        diff
    }

    /// Forget the pair, in memory and in the store.
    pub async fn reset(&mut self, player: &str, mode: GameMode) {
        if self.cached.as_ref().is_some_and(|c| c.is_for(player, mode)) {
            self.cached = None;
        }
        if player.is_empty() {
            return;
        }
        remove_logged(self.store.as_ref(), &keys::loss_streak(player, mode)).await;
        remove_logged(self.store.as_ref(), &keys::last_rating(player, mode)).await;
    }

    /// Drop the cache if someone else rewrote one of our keys.
    pub fn observe_change(&mut self, change: &StoreChange) {
        let Some(cached) = self.cached.as_ref() else {
            return;
        };

        let ours = if change.key == keys::loss_streak(&cached.player, cached.mode) {
            Some(cached.record.consecutive_losses.to_string())
        } else if change.key == keys::last_rating(&cached.player, cached.mode) {
            Some(
                cached
                    .record
                    .last_known_rating
                    .map_or_else(|| "null".to_string(), |r| r.to_string()),
            )
        } else {
            None
        };

        if let Some(ours) = ours {
            if change.new_value.as_deref() != Some(ours.as_str()) {
                tracing::debug!(key = %change.key, "loss streak changed elsewhere, reloading");
                self.cached = None;
            }
        }
    }

    async fn persist(&self, player: &str, mode: GameMode, record: LossStreakRecord) {
        let streak_key = keys::loss_streak(player, mode);
        if let Err(e) = save_json(self.store.as_ref(), &streak_key, &record.consecutive_losses).await
        {
            tracing::warn!(key = %streak_key, error = %e, "failed to persist loss streak");
        }
        let rating_key = keys::last_rating(player, mode);
        if let Err(e) = save_json(self.store.as_ref(), &rating_key, &record.last_known_rating).await
        {
            tracing::warn!(key = %rating_key, error = %e, "failed to persist last rating");
        }
    }
}
