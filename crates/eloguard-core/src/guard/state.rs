use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::storage::Config;

/// Why play is blocked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LockKind {
    /// Stop-loss rating or loss-streak threshold reached.
    Stop,
    /// Target rating reached.
    Target,
}

/// Exactly one of these is current. Only the engine mutates it.
///
/// ```text
/// Disengaged -> Armed -> Locked{kind, rating}    (held until override)
///                     -> Cooldown{ends_at} -> Armed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum GuardState {
    #[default]
    Disengaged,
    Armed,
    Locked { kind: LockKind, rating: i64 },
    Cooldown { ends_at: DateTime<Utc> },
}

impl GuardState {
    pub fn is_locked(&self) -> bool {
        matches!(self, GuardState::Locked { .. })
    }

    pub fn is_cooldown(&self) -> bool {
        matches!(self, GuardState::Cooldown { .. })
    }

    /// Play is currently blocked.
    pub fn is_blocking(&self) -> bool {
        self.is_locked() || self.is_cooldown()
    }

    pub fn label(&self) -> &'static str {
        match self {
            GuardState::Disengaged => "disengaged",
            GuardState::Armed => "armed",
            GuardState::Locked { .. } => "locked",
            GuardState::Cooldown { .. } => "cooldown",
        }
    }
}

/// Threshold decision for one snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Safe,
    Lock(LockKind),
}

/// Apply the thresholds in priority order: stop-loss or loss streak first,
/// then target. Absent thresholds never fire.
pub fn judge(config: &Config, rating: i64, loss_streak: u32) -> Verdict {
    let stop_hit = config
        .stop_loss_rating
        .is_some_and(|threshold| rating <= threshold);
    let streak_hit = config
        .loss_streak_threshold
        .is_some_and(|threshold| loss_streak >= threshold);

    if stop_hit || streak_hit {
        Verdict::Lock(LockKind::Stop)
    } else if config
        .target_rating
        .is_some_and(|threshold| rating >= threshold)
    {
        Verdict::Lock(LockKind::Target)
    } else {
        Verdict::Safe
    }
}
