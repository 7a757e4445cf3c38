//! The guard state machine.
//!
//! [`GuardEngine`] owns the cached [`Config`], the current [`GuardState`] and
//! every collaborator that persists something. It never sleeps and never
//! reads the clock: callers pass `now` in, and rating fetches are split into
//! [`GuardEngine::begin_check`] / [`GuardEngine::apply_check`] so a fetch can
//! run elsewhere while configuration changes land in between.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;

use super::challenge::UnlockChallenge;
use super::cooldown::{secs_until, CooldownScheduler, CooldownTick, ResumeOutcome};
use super::loss_streak::LossStreakTracker;
use super::state::{judge, GuardState, LockKind, Verdict};
use super::InstanceIdentity;
use crate::error::DataSourceError;
use crate::events::UiBinding;
use crate::source::{RatingSnapshot, RatingSource};
use crate::storage::{Config, GameMode, Store, StoreChange};

/// What asked for a rating check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckOrigin {
    /// Regular background poll.
    Poll,
    /// Guard switched on or thresholds changed.
    Configured,
    /// Session start.
    Resume,
    /// A match just ended; controls are frozen until this check lands.
    MatchCompleted,
}

/// A rating check in flight. Carries the pool and config generation it was
/// issued for, so a result that outlived a config change can be dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckTicket {
    pub player: String,
    pub mode: GameMode,
    pub origin: CheckOrigin,
    generation: u64,
}

impl CheckTicket {
    /// A safe result must not clear anything on screen.
    pub fn prevents_unlock(&self) -> bool {
        self.origin == CheckOrigin::MatchCompleted
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckOutcome {
    Safe,
    Locked(LockKind),
    /// The fetch failed; state left as it was.
    Failed,
    /// The result arrived after the guard was switched off or reconfigured.
    Discarded,
}

pub struct GuardEngine {
    config: Config,
    state: GuardState,
    store: Arc<dyn Store>,
    ui: Arc<dyn UiBinding>,
    instance: InstanceIdentity,
    streak: LossStreakTracker,
    cooldown: CooldownScheduler,
    challenge: Option<UnlockChallenge>,
    frozen: bool,
    generation: u64,
    disposed: bool,
}

impl GuardEngine {
    /// Build an engine. Does no I/O; call [`resume`](Self::resume) next to
    /// pick up a cooldown left behind by an earlier run of this instance.
    pub fn new(
        config: Config,
        store: Arc<dyn Store>,
        instance: InstanceIdentity,
        ui: Arc<dyn UiBinding>,
    ) -> Self {
        let state = if config.is_armable() {
            GuardState::Armed
        } else {
            GuardState::Disengaged
        };
        if let Err(e) = config.validate() {
            tracing::info!(error = %e, "guard stays disengaged until configured");
        }

        Self {
            streak: LossStreakTracker::new(store.clone()),
            cooldown: CooldownScheduler::new(store.clone(), &instance),
            config,
            state,
            store,
            ui,
            instance,
            challenge: None,
            frozen: false,
            generation: 0,
            disposed: false,
        }
    }

    pub fn state(&self) -> GuardState {
        self.state
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn instance(&self) -> &InstanceIdentity {
        &self.instance
    }

    /// Consecutive losses for the configured pool, as last seen.
    pub fn loss_streak(&self) -> u32 {
        self.streak.streak(&self.config.player, self.config.mode)
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    pub fn challenge_open(&self) -> bool {
        self.challenge.is_some()
    }

    /// Session start: re-enter a persisted cooldown and ask for a first
    /// rating check.
    pub async fn resume(&mut self, now: DateTime<Utc>) -> Option<CheckTicket> {
        if !self.config.is_armable() || self.disposed {
            return None;
        }

        self.resume_cooldown(now).await;
        self.begin_check(CheckOrigin::Resume)
    }

    /// Replace the cached config.
    ///
    /// Returns a ticket when the change calls for an immediate rating check.
    pub async fn configure(&mut self, config: Config, now: DateTime<Utc>) -> Option<CheckTicket> {
        let previous = std::mem::replace(&mut self.config, config);
        let was_armable = previous.is_armable();
        let armable = self.config.is_armable();
        let pool_changed = !previous.same_pool(&self.config);
        let thresholds_changed = previous.thresholds_differ(&self.config);

        if pool_changed || thresholds_changed || was_armable != armable {
            self.generation += 1;
        }
        if pool_changed {
            tracing::info!(
                player = %self.config.player,
                mode = %self.config.mode,
                "rating pool changed"
            );
        }

        if !armable {
            if previous.guard_enabled && !self.config.guard_enabled {
                self.streak.reset(&previous.player, previous.mode).await;
            }
            if self.state != GuardState::Disengaged || self.frozen {
                self.disengage().await;
            }
            return None;
        }

        if !was_armable {
            self.transition(GuardState::Armed);
            // A record could only survive from a session that ended mid-cooldown.
            self.resume_cooldown(now).await;
            return self.begin_check(CheckOrigin::Configured);
        }

        if pool_changed || thresholds_changed {
            return self.begin_check(CheckOrigin::Configured);
        }
        None
    }

    /// Issue a ticket for a rating check, unless the guard is off.
    pub fn begin_check(&self, origin: CheckOrigin) -> Option<CheckTicket> {
        if self.disposed || !self.config.is_armable() {
            return None;
        }
        Some(CheckTicket {
            player: self.config.player.clone(),
            mode: self.config.mode,
            origin,
            generation: self.generation,
        })
    }

    /// Apply a finished rating fetch.
    pub async fn apply_check(
        &mut self,
        ticket: CheckTicket,
        result: Result<RatingSnapshot, DataSourceError>,
        now: DateTime<Utc>,
    ) -> CheckOutcome {
        let completion = ticket.origin == CheckOrigin::MatchCompleted;

        if self.disposed || !self.config.is_armable() || ticket.generation != self.generation {
            tracing::debug!(origin = ?ticket.origin, "discarding stale rating check");
            if completion {
                self.release_speculative_freeze();
            }
            return CheckOutcome::Discarded;
        }

        let snapshot = match result {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::warn!(
                    player = %ticket.player,
                    mode = %ticket.mode,
                    error = %e,
                    "rating check failed"
                );
                if completion {
                    self.release_speculative_freeze();
                }
                return CheckOutcome::Failed;
            }
        };

        let state = self.evaluate(snapshot, ticket.prevents_unlock(), now).await;

        match state {
            GuardState::Locked { kind, .. } => CheckOutcome::Locked(kind),
            GuardState::Armed if completion => {
                self.after_safe_match(now).await;
                CheckOutcome::Safe
            }
            _ => CheckOutcome::Safe,
        }
    }

    /// Fold one snapshot in and apply the thresholds.
    ///
    /// A lock replaces any running cooldown. A safe result never lifts an
    /// existing lock or cooldown.
    pub async fn evaluate(
        &mut self,
        snapshot: RatingSnapshot,
        prevent_unlock: bool,
        now: DateTime<Utc>,
    ) -> GuardState {
        let player = self.config.player.clone();
        let mode = self.config.mode;
        let rating = snapshot.rating;

        self.streak.update(&player, mode, rating).await;
        let streak = self.streak.streak(&player, mode);

        match judge(&self.config, rating, streak) {
            Verdict::Lock(kind) => {
                if self.cooldown.is_running() {
                    self.cooldown.cancel().await;
                }
                let locked = GuardState::Locked { kind, rating };
                if self.state != locked {
                    tracing::info!(?kind, rating, streak, "locking play");
                    self.transition(locked);
                }
                self.ui.apply_lock(kind, rating);
            }
            Verdict::Safe => match self.state {
                GuardState::Locked { .. } | GuardState::Cooldown { .. } => {}
                GuardState::Disengaged | GuardState::Armed => {
                    self.transition(GuardState::Armed);
                    if !prevent_unlock {
                        self.ui.clear_lock();
                    }
                }
            },
        }

        tracing::debug!(rating, streak, state = self.state.label(), at = %now, "snapshot evaluated");
        self.state
    }

    /// Fetch and apply in one go. Handy outside the runner.
    pub async fn fetch_and_apply(
        &mut self,
        source: &dyn RatingSource,
        ticket: CheckTicket,
        now: DateTime<Utc>,
    ) -> CheckOutcome {
        let result = source.fetch_rating(&ticket.player, ticket.mode).await;
        self.apply_check(ticket, result, now).await
    }

    /// Background poll.
    pub async fn check_rating(&mut self, source: &dyn RatingSource, now: DateTime<Utc>) -> CheckOutcome {
        match self.begin_check(CheckOrigin::Poll) {
            Some(ticket) => self.fetch_and_apply(source, ticket, now).await,
            None => CheckOutcome::Discarded,
        }
    }

    /// First half of match-end handling: freeze controls and issue a check.
    ///
    /// `None` when there is nothing to decide: guard off, or play already
    /// blocked.
    pub fn begin_match_completed(&mut self) -> Option<CheckTicket> {
        if self.state.is_blocking() {
            tracing::debug!(state = self.state.label(), "match ended while blocked");
            return None;
        }
        let ticket = self.begin_check(CheckOrigin::MatchCompleted)?;
        if !self.frozen {
            self.frozen = true;
            self.ui.freeze_controls();
        }
        Some(ticket)
    }

    pub async fn on_match_completed(
        &mut self,
        source: &dyn RatingSource,
        now: DateTime<Utc>,
    ) -> CheckOutcome {
        match self.begin_match_completed() {
            Some(ticket) => self.fetch_and_apply(source, ticket, now).await,
            None => CheckOutcome::Discarded,
        }
    }

    /// Aborted matches change no rating and earn no cooldown.
    pub fn on_match_aborted(&mut self) {
        tracing::info!("match aborted, no cooldown");
    }

    /// Advance the cooldown countdown.
    pub async fn on_cooldown_tick(&mut self, now: DateTime<Utc>) -> Option<CooldownTick> {
        if !self.state.is_cooldown() {
            return None;
        }
        let tick = self.cooldown.tick(now).await?;
        match tick {
            CooldownTick::Remaining(secs) => self.ui.apply_cooldown(secs),
            CooldownTick::Expired => {
                self.transition(GuardState::Armed);
                self.ui.clear_lock();
                self.release_freeze();
            }
        }
        Some(tick)
    }

    /// Re-render the current state. Never changes it.
    pub fn reassert(&self, now: DateTime<Utc>) {
        match self.state {
            GuardState::Locked { kind, rating } => self.ui.apply_lock(kind, rating),
            GuardState::Cooldown { ends_at } => {
                self.ui.apply_cooldown(secs_until(ends_at, now).max(1));
            }
            GuardState::Disengaged | GuardState::Armed => {}
        }
    }

    /// Open a fresh challenge. `None` unless play is blocked and challenges
    /// are enabled.
    pub fn request_challenge(&mut self) -> Option<String> {
        if !self.config.challenge_enabled || !self.state.is_blocking() {
            return None;
        }
        match UnlockChallenge::generate(self.config.challenge_length) {
            Ok(challenge) => {
                let text = challenge.text().to_string();
                self.challenge = Some(challenge);
                Some(text)
            }
            Err(e) => {
                tracing::warn!(error = %e, "cannot build unlock challenge");
                None
            }
        }
    }

    /// Check an answer against the open challenge. A match overrides the
    /// block; a miss leaves the challenge open for another try.
    pub async fn submit_challenge_answer(&mut self, answer: &str) -> bool {
        let Some(challenge) = self.challenge.as_ref() else {
            return false;
        };
        if !challenge.verify(answer) {
            tracing::info!("challenge answer rejected");
            return false;
        }
        self.challenge = None;
        self.apply_override().await;
        true
    }

    async fn apply_override(&mut self) {
        tracing::info!(from = self.state.label(), "block overridden");
        self.cooldown.cancel().await;
        self.transition(GuardState::Armed);
        self.ui.clear_lock();
        self.release_freeze();
    }

    pub fn on_store_change(&mut self, change: &StoreChange) {
        self.streak.observe_change(change);
    }

    pub fn subscribe_store(&self) -> broadcast::Receiver<StoreChange> {
        self.store.subscribe()
    }

    /// Stop acting on anything. The persisted cooldown is left in place for
    /// the next session of this instance.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        self.generation += 1;
        self.cooldown.suspend();
        self.challenge = None;
        tracing::info!(instance = %self.instance, "guard engine disposed");
    }

    async fn disengage(&mut self) {
        self.cooldown.cancel().await;
        self.challenge = None;
        if self.state.is_blocking() {
            self.ui.clear_lock();
        }
        self.release_freeze();
        self.transition(GuardState::Disengaged);
    }

    /// Re-enter a persisted cooldown. Records are left alone while
    /// cooldowns are switched off.
    async fn resume_cooldown(&mut self, now: DateTime<Utc>) {
        if !self.config.cooldown_enabled {
            return;
        }
        match self.cooldown.resume(now).await {
            ResumeOutcome::Resumed {
                ends_at,
                remaining_secs,
            } => {
                self.transition(GuardState::Cooldown { ends_at });
                self.ui.apply_cooldown(remaining_secs);
            }
            ResumeOutcome::Expired => {
                tracing::debug!("cooldown ran out while away");
            }
            ResumeOutcome::Idle => {}
        }
    }

    async fn after_safe_match(&mut self, now: DateTime<Utc>) {
        if self.config.cooldown_configured() {
            let ends_at = self.cooldown.start(self.config.cooldown_seconds, now).await;
            self.transition(GuardState::Cooldown { ends_at });
            self.ui.apply_cooldown(secs_until(ends_at, now).max(1));
        } else {
            self.release_freeze();
        }
    }

    /// Drop a freeze that is not backed by a lock or cooldown.
    fn release_speculative_freeze(&mut self) {
        if !self.state.is_blocking() {
            self.release_freeze();
        }
    }

    fn release_freeze(&mut self) {
        if self.frozen {
            self.frozen = false;
            self.ui.release_freeze();
        }
    }

    /// Any change of state ends the block an open challenge was issued for.
    fn transition(&mut self, next: GuardState) {
        if self.state != next {
            tracing::info!(from = self.state.label(), to = next.label(), "guard transition");
            self.state = next;
            if self.challenge.take().is_some() {
                tracing::debug!("open challenge dropped");
            }
        }
    }
}
