use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::guard::LockKind;

/// Every instruction the engine sends to the presentation layer.
/// Terminal bindings print them; tests record them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    LockApplied {
        kind: LockKind,
        rating: i64,
        at: DateTime<Utc>,
    },
    CooldownApplied {
        remaining_secs: u64,
        at: DateTime<Utc>,
    },
    LockCleared {
        at: DateTime<Utc>,
    },
    /// Play controls held while a finished match is being checked.
    ControlsFrozen {
        at: DateTime<Utc>,
    },
    FreezeReleased {
        at: DateTime<Utc>,
    },
}

/// The presentation layer. Calls may repeat; implementations must be
/// idempotent because locks and cooldowns are re-asserted on a fast interval.
pub trait UiBinding: Send + Sync {
    fn apply_lock(&self, kind: LockKind, rating: i64);

    fn apply_cooldown(&self, remaining_secs: u64);

    fn clear_lock(&self);

    fn freeze_controls(&self);

    fn release_freeze(&self);
}

/// A [`UiBinding`] that only records what it was told.
#[derive(Debug, Default)]
pub struct EventLog {
    events: Mutex<Vec<Event>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, event: Event) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }

    pub fn events(&self) -> Vec<Event> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    /// Drain everything recorded so far.
    pub fn take(&self) -> Vec<Event> {
        self.events
            .lock()
            .map(|mut events| std::mem::take(&mut *events))
            .unwrap_or_default()
    }

    pub fn last(&self) -> Option<Event> {
        self.events
            .lock()
            .ok()
            .and_then(|events| events.last().cloned())
    }
}

impl UiBinding for EventLog {
    fn apply_lock(&self, kind: LockKind, rating: i64) {
        self.push(Event::LockApplied {
            kind,
            rating,
            at: Utc::now(),
        });
    }

    fn apply_cooldown(&self, remaining_secs: u64) {
        self.push(Event::CooldownApplied {
            remaining_secs,
            at: Utc::now(),
        });
    }

    fn clear_lock(&self) {
        self.push(Event::LockCleared { at: Utc::now() });
    }

    fn freeze_controls(&self) {
        self.push(Event::ControlsFrozen { at: Utc::now() });
    }

    fn release_freeze(&self) {
        self.push(Event::FreezeReleased { at: Utc::now() });
    }
}
