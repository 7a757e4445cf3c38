//! Poll loops around a [`GuardEngine`].
//!
//! One task owns the engine; everything that touches it arrives through a
//! single `select!`, so engine calls never interleave. Rating fetches are the
//! exception: they run on a [`JoinSet`] and report back, which lets a config
//! change slip in while a fetch is still out.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{interval, interval_at, Instant, MissedTickBehavior};

use super::engine::{CheckOrigin, CheckTicket, GuardEngine};
use super::state::GuardState;
use crate::error::DataSourceError;
use crate::source::{CompletionEdge, GameCompletionSignal, MatchStatus, RatingSnapshot, RatingSource};
use crate::storage::{Config, PollingConfig};

const COMMAND_CHANNEL_CAPACITY: usize = 16;

/// Point-in-time view of a running guard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuardStatus {
    pub state: GuardState,
    pub loss_streak: u32,
    pub frozen: bool,
    pub challenge_open: bool,
}

enum RunnerCommand {
    Status(oneshot::Sender<GuardStatus>),
    RequestChallenge(oneshot::Sender<Option<String>>),
    SubmitAnswer(String, oneshot::Sender<bool>),
}

type FetchResult = (CheckTicket, Result<RatingSnapshot, DataSourceError>);

pub struct GuardRunner {
    engine: GuardEngine,
    source: Arc<dyn RatingSource>,
    completion: Arc<dyn GameCompletionSignal>,
    polling: PollingConfig,
    config_rx: watch::Receiver<Config>,
}

impl GuardRunner {
    pub fn new(
        engine: GuardEngine,
        source: Arc<dyn RatingSource>,
        completion: Arc<dyn GameCompletionSignal>,
        polling: PollingConfig,
        config_rx: watch::Receiver<Config>,
    ) -> Self {
        Self {
            engine,
            source,
            completion,
            polling,
            config_rx,
        }
    }

    /// Start the loops on the current runtime.
    pub fn spawn(self) -> RunnerHandle {
        let (commands, command_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let (shutdown, shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(self.run(command_rx, shutdown_rx));
        RunnerHandle {
            commands,
            shutdown: Some(shutdown),
            task,
        }
    }

    async fn run(
        mut self,
        mut commands: mpsc::Receiver<RunnerCommand>,
        mut shutdown: oneshot::Receiver<()>,
    ) {
        let mut fetches: JoinSet<FetchResult> = JoinSet::new();
        let mut store_rx = self.engine.subscribe_store();
        let mut store_open = true;
        let mut config_open = true;
        let mut edge = CompletionEdge::new();

        if let Some(ticket) = self.engine.resume(Utc::now()).await {
            self.spawn_fetch(&mut fetches, ticket);
        }

        // The resume check above stands in for the first rating poll.
        let rating_period = self.polling.rating();
        let mut rating_timer = interval_at(Instant::now() + rating_period, rating_period);
        let mut completion_timer = interval(self.polling.completion());
        let mut reassert_timer = interval(self.polling.reassert());
        let mut cooldown_timer = interval(self.polling.cooldown_tick());
        for timer in [
            &mut rating_timer,
            &mut completion_timer,
            &mut reassert_timer,
            &mut cooldown_timer,
        ] {
            timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
        }

        tracing::info!(instance = %self.engine.instance(), "guard runner started");

        loop {
            tokio::select! {
                _ = &mut shutdown => break,

                command = commands.recv() => match command {
                    Some(command) => self.handle(command).await,
                    None => break,
                },

                changed = self.config_rx.changed(), if config_open => match changed {
                    Ok(()) => {
                        let config = self.config_rx.borrow_and_update().clone();
                        if let Some(ticket) = self.engine.configure(config, Utc::now()).await {
                            self.spawn_fetch(&mut fetches, ticket);
                        }
                    }
                    Err(_) => {
                        tracing::debug!("config channel closed, keeping last config");
                        config_open = false;
                    }
                },

                change = store_rx.recv(), if store_open => match change {
                    Ok(change) => self.engine.on_store_change(&change),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "store change feed lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => store_open = false,
                },

                Some(joined) = fetches.join_next(), if !fetches.is_empty() => match joined {
                    Ok((ticket, result)) => {
                        self.engine.apply_check(ticket, result, Utc::now()).await;
                    }
                    Err(e) => tracing::warn!(error = %e, "rating fetch task failed"),
                },

                _ = rating_timer.tick() => {
                    if let Some(ticket) = self.engine.begin_check(CheckOrigin::Poll) {
                        self.spawn_fetch(&mut fetches, ticket);
                    }
                }

                _ = completion_timer.tick() => {
                    match edge.observe(self.completion.poll_status()) {
                        Some(MatchStatus::Completed) => {
                            if let Some(ticket) = self.engine.begin_match_completed() {
                                self.spawn_fetch(&mut fetches, ticket);
                            }
                        }
                        Some(MatchStatus::Aborted) => self.engine.on_match_aborted(),
                        Some(MatchStatus::InProgress) | None => {}
                    }
                }

                _ = cooldown_timer.tick() => {
                    self.engine.on_cooldown_tick(Utc::now()).await;
                }

                _ = reassert_timer.tick() => self.engine.reassert(Utc::now()),
            }
        }

        fetches.abort_all();
        self.engine.dispose();
        tracing::info!("guard runner stopped");
    }

    async fn handle(&mut self, command: RunnerCommand) {
        match command {
            RunnerCommand::Status(reply) => {
                let _ = reply.send(GuardStatus {
                    state: self.engine.state(),
                    loss_streak: self.engine.loss_streak(),
                    frozen: self.engine.is_frozen(),
                    challenge_open: self.engine.challenge_open(),
                });
            }
            RunnerCommand::RequestChallenge(reply) => {
                let _ = reply.send(self.engine.request_challenge());
            }
            RunnerCommand::SubmitAnswer(answer, reply) => {
                let accepted = self.engine.submit_challenge_answer(&answer).await;
                let _ = reply.send(accepted);
            }
        }
    }

    fn spawn_fetch(&self, fetches: &mut JoinSet<FetchResult>, ticket: CheckTicket) {
        let source = Arc::clone(&self.source);
        fetches.spawn(async move {
            let result = source.fetch_rating(&ticket.player, ticket.mode).await;
            (ticket, result)
        });
    }
}

/// Talks to a spawned [`GuardRunner`]. Dropping it stops the runner.
pub struct RunnerHandle {
    commands: mpsc::Sender<RunnerCommand>,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl RunnerHandle {
    /// `None` once the runner has stopped.
    pub async fn status(&self) -> Option<GuardStatus> {
        let (reply, rx) = oneshot::channel();
        self.commands.send(RunnerCommand::Status(reply)).await.ok()?;
        rx.await.ok()
    }

    pub async fn request_challenge(&self) -> Option<String> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(RunnerCommand::RequestChallenge(reply))
            .await
            .ok()?;
        rx.await.ok().flatten()
    }

    pub async fn submit_challenge_answer(&self, answer: impl Into<String>) -> bool {
        let (reply, rx) = oneshot::channel();
        if self
            .commands
            .send(RunnerCommand::SubmitAnswer(answer.into(), reply))
            .await
            .is_err()
        {
            return false;
        }
        rx.await.unwrap_or(false)
    }

    /// Stop the loops and wait for the engine to be torn down. A running
    /// cooldown stays persisted for the next session.
    pub async fn dispose(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Err(e) = self.task.await {
            tracing::warn!(error = %e, "guard runner ended abnormally");
        }
    }
}
