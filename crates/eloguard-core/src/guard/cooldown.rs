//! Post-match cooldown.
//!
//! The countdown is always derived from an absolute end time, never from a
//! decrementing counter, so timer jitter or a suspended process cannot make
//! it drift. The end time is persisted per instance so a restarted session
//! picks up where it left off.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use super::InstanceIdentity;
use crate::storage::{keys, load_json, remove_logged, save_json, Store};

const MAX_COOLDOWN_SECS: i64 = 7 * 24 * 60 * 60;

/// Whole seconds left, rounded up. Zero once the end time is reached.
pub fn secs_until(ends_at: DateTime<Utc>, now: DateTime<Utc>) -> u64 {
    let ms = (ends_at - now).num_milliseconds();
    if ms <= 0 {
        0
    } else {
        ((ms + 999) / 1000) as u64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CooldownTick {
    /// Seconds left, always at least 1.
    Remaining(u64),
    /// The cooldown just ended and its record is gone.
    Expired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeOutcome {
    Resumed {
        ends_at: DateTime<Utc>,
        remaining_secs: u64,
    },
    /// A record was found but already in the past; it has been deleted.
    Expired,
    /// Nothing persisted for this instance.
    Idle,
}

pub struct CooldownScheduler {
    store: Arc<dyn Store>,
    key: String,
    ends_at: Option<DateTime<Utc>>,
}

impl CooldownScheduler {
    pub fn new(store: Arc<dyn Store>, instance: &InstanceIdentity) -> Self {
        Self {
            store,
            key: keys::cooldown_end(instance.as_str()),
            ends_at: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.ends_at.is_some()
    }

    pub fn ends_at(&self) -> Option<DateTime<Utc>> {
        self.ends_at
    }

    pub fn remaining_secs(&self, now: DateTime<Utc>) -> Option<u64> {
        self.ends_at.map(|ends_at| secs_until(ends_at, now))
    }

    /// Start a cooldown of `duration_secs`, or keep the one already going.
    ///
    /// An active end time, or a persisted one still in the future, is reused
    /// as is. The end time of a running cooldown never moves.
    pub async fn start(&mut self, duration_secs: u64, now: DateTime<Utc>) -> DateTime<Utc> {
        if let Some(ends_at) = self.ends_at.filter(|e| *e > now) {
            return ends_at;
        }

        if let Some(ends_at) = self.read_persisted(now).await.filter(|e| *e > now) {
            tracing::debug!(%ends_at, "reusing persisted cooldown");
            self.ends_at = Some(ends_at);
            return ends_at;
        }

        let secs = i64::try_from(duration_secs)
            .unwrap_or(MAX_COOLDOWN_SECS)
            .min(MAX_COOLDOWN_SECS);
        let ends_at = now + Duration::seconds(secs);
        self.ends_at = Some(ends_at);
        if let Err(e) = save_json(self.store.as_ref(), &self.key, &ends_at.timestamp_millis()).await
        {
            tracing::warn!(key = %self.key, error = %e, "failed to persist cooldown");
        }
        tracing::info!(%ends_at, duration_secs, "cooldown started");
        ends_at
    }

    /// One countdown step. `None` when no cooldown is running.
    pub async fn tick(&mut self, now: DateTime<Utc>) -> Option<CooldownTick> {
        let ends_at = self.ends_at?;
        match secs_until(ends_at, now) {
            0 => {
                self.ends_at = None;
                remove_logged(self.store.as_ref(), &self.key).await;
                tracing::info!("cooldown expired");
                Some(CooldownTick::Expired)
            }
            remaining => Some(CooldownTick::Remaining(remaining)),
        }
    }

    /// Stop ticking and delete the persisted record.
    pub async fn cancel(&mut self) {
        if self.ends_at.take().is_some() {
            tracing::info!("cooldown cancelled");
        }
        remove_logged(self.store.as_ref(), &self.key).await;
    }

    /// Pick up a persisted cooldown after a restart.
    pub async fn resume(&mut self, now: DateTime<Utc>) -> ResumeOutcome {
        let Some(ends_at) = self.read_persisted(now).await else {
            return ResumeOutcome::Idle;
        };

        match secs_until(ends_at, now) {
            0 => {
                self.ends_at = None;
                remove_logged(self.store.as_ref(), &self.key).await;
                ResumeOutcome::Expired
            }
            remaining_secs => {
                self.ends_at = Some(ends_at);
                tracing::info!(%ends_at, remaining_secs, "cooldown resumed");
                ResumeOutcome::Resumed {
                    ends_at,
                    remaining_secs,
                }
            }
        }
    }

    /// Stop ticking but leave the record for the next session.
    pub fn suspend(&mut self) {
        self.ends_at = None;
    }

    /// The persisted end time, pulled in to at most the longest cooldown
    /// from `now`.
    async fn read_persisted(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let ends_at = match load_json::<i64>(self.store.as_ref(), &self.key).await {
            Ok(Some(ms)) => DateTime::from_timestamp_millis(ms)?,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!(key = %self.key, error = %e, "ignoring unreadable cooldown record");
                return None;
            }
        };

        let latest = now + Duration::seconds(MAX_COOLDOWN_SECS);
        if ends_at <= latest {
            return Some(ends_at);
        }
        tracing::warn!(%ends_at, %latest, "persisted cooldown too long, capping");
        if let Err(e) = save_json(self.store.as_ref(), &self.key, &latest.timestamp_millis()).await {
            tracing::warn!(key = %self.key, error = %e, "failed to persist cooldown");
        }
        Some(latest)
    }
}
