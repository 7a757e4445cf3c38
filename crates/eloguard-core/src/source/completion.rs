//! Match-end detection.
//!
//! The host reports a level ("a match-over screen is showing"); the engine
//! wants an edge ("a match just ended"). [`CompletionEdge`] turns one into
//! the other.

use std::sync::Mutex;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    /// Playing, or no match on screen.
    #[default]
    InProgress,
    /// The match ended with a result.
    Completed,
    /// The match ended without a result (no rating change, no cooldown).
    Aborted,
}

impl MatchStatus {
    pub fn is_over(self) -> bool {
        !matches!(self, MatchStatus::InProgress)
    }
}

/// Polled roughly ten times a second by the runner.
pub trait GameCompletionSignal: Send + Sync {
    fn poll_status(&self) -> MatchStatus;
}

/// Rising-edge detector over [`MatchStatus`].
#[derive(Debug, Default)]
pub struct CompletionEdge {
    over: bool,
}

impl CompletionEdge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the end status once per transition into "over".
    pub fn observe(&mut self, status: MatchStatus) -> Option<MatchStatus> {
        let was_over = self.over;
        self.over = status.is_over();
        (!was_over && self.over).then_some(status)
    }
}

/// A latch fed by hand: each marked status is reported to exactly one poll,
/// after which the signal falls back to `InProgress`.
#[derive(Debug, Default)]
pub struct ManualCompletionSignal {
    pending: Mutex<Option<MatchStatus>>,
}

impl ManualCompletionSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark(&self, status: MatchStatus) {
        if let Ok(mut pending) = self.pending.lock() {
            *pending = Some(status);
        }
    }
}

impl GameCompletionSignal for ManualCompletionSignal {
    fn poll_status(&self) -> MatchStatus {
        self.pending
            .lock()
            .ok()
            .and_then(|mut pending| pending.take())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn edge_fires_once_per_match() {
        let mut edge = CompletionEdge::new();
        assert_eq!(edge.observe(MatchStatus::InProgress), None);
        assert_eq!(
            edge.observe(MatchStatus::Completed),
            Some(MatchStatus::Completed)
        );
        // Game-over screen still showing.
        assert_eq!(edge.observe(MatchStatus::Completed), None);
        assert_eq!(edge.observe(MatchStatus::Completed), None);

        assert_eq!(edge.observe(MatchStatus::InProgress), None);
        assert_eq!(
            edge.observe(MatchStatus::Completed),
            Some(MatchStatus::Completed)
        );
    }

    #[test]
    fn aborted_is_an_edge_too() {
        let mut edge = CompletionEdge::new();
        assert_eq!(
            edge.observe(MatchStatus::Aborted),
            Some(MatchStatus::Aborted)
        );
        // Switching from aborted to completed without leaving the screen is not a new edge.
        assert_eq!(edge.observe(MatchStatus::Completed), None);
    }

    #[test]
    fn manual_signal_reports_each_mark_once() {
        let signal = ManualCompletionSignal::new();
        assert_eq!(signal.poll_status(), MatchStatus::InProgress);

        signal.mark(MatchStatus::Completed);
        assert_eq!(signal.poll_status(), MatchStatus::Completed);
        assert_eq!(signal.poll_status(), MatchStatus::InProgress);
    }
}
