//! Integration tests for the tokio poll runner.
//!
//! Tokio time is paused, so the poll intervals advance instantly. Wall-clock
//! timestamps still come from `Utc::now()`, so nothing here waits for a
//! cooldown to expire.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;

use eloguard_core::events::{Event, EventLog};
use eloguard_core::storage::{keys, PollingConfig};
use eloguard_core::{
    Config, DataSourceError, GameMode, GuardEngine, GuardRunner, GuardState, InstanceIdentity,
    LockKind, ManualCompletionSignal, MatchStatus, MemoryStore, RatingSnapshot, RatingSource,
    RunnerHandle, Store,
};

/// Replays a fixed list of ratings, then repeats the last one.
struct Replay {
    ratings: Vec<i64>,
    calls: AtomicUsize,
}

impl Replay {
    fn new(ratings: &[i64]) -> Arc<Self> {
        Arc::new(Self {
            ratings: ratings.to_vec(),
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RatingSource for Replay {
    async fn fetch_rating(
        &self,
        _player: &str,
        _mode: GameMode,
    ) -> Result<RatingSnapshot, DataSourceError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        let rating = self
            .ratings
            .get(n)
            .or(self.ratings.last())
            .copied()
            .ok_or_else(|| DataSourceError::Request("no ratings".into()))?;
        Ok(RatingSnapshot::now(rating))
    }
}

struct Harness {
    store: Arc<MemoryStore>,
    ui: Arc<EventLog>,
    completion: Arc<ManualCompletionSignal>,
    config_tx: watch::Sender<Config>,
    instance: InstanceIdentity,
    handle: RunnerHandle,
}

fn base_config() -> Config {
    Config {
        player: "hikaru".into(),
        mode: GameMode::Blitz,
        guard_enabled: true,
        ..Config::default()
    }
}

fn start(config: Config, source: Arc<Replay>) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let ui = Arc::new(EventLog::new());
    let completion = Arc::new(ManualCompletionSignal::new());
    let instance = InstanceIdentity::generate();
    let engine = GuardEngine::new(config.clone(), store.clone(), instance.clone(), ui.clone());
    let (config_tx, config_rx) = watch::channel(config);

    let handle = GuardRunner::new(
        engine,
        source,
        completion.clone(),
        PollingConfig::default(),
        config_rx,
    )
    .spawn();

    Harness {
        store,
        ui,
        completion,
        config_tx,
        instance,
        handle,
    }
}

#[tokio::test(start_paused = true)]
async fn test_polls_until_stop_loss() {
    let source = Replay::new(&[1550, 1510, 1490]);
    let h = start(
        Config {
            stop_loss_rating: Some(1500),
            ..base_config()
        },
        source.clone(),
    );

    // Resume check at start, then one poll every 30s.
    tokio::time::sleep(Duration::from_secs(65)).await;

    let status = h.handle.status().await.unwrap();
    assert_eq!(
        status.state,
        GuardState::Locked {
            kind: LockKind::Stop,
            rating: 1490
        }
    );
    assert_eq!(status.loss_streak, 2);
    assert_eq!(source.calls(), 3);

    h.handle.dispose().await;
}

#[tokio::test(start_paused = true)]
async fn test_lock_is_reasserted() {
    let source = Replay::new(&[1650]);
    let h = start(
        Config {
            target_rating: Some(1600),
            ..base_config()
        },
        source,
    );

    tokio::time::sleep(Duration::from_secs(2)).await;

    let locks = h
        .ui
        .events()
        .iter()
        .filter(|e| {
            matches!(
                e,
                Event::LockApplied {
                    kind: LockKind::Target,
                    rating: 1650,
                    ..
                }
            )
        })
        .count();
    // One from the check plus one per 200ms re-assertion.
    assert!(locks >= 5, "expected repeated lock renders, got {locks}");

    h.handle.dispose().await;
}

#[tokio::test(start_paused = true)]
async fn test_completed_match_enters_cooldown() {
    let source = Replay::new(&[1550]);
    let h = start(
        Config {
            cooldown_enabled: true,
            cooldown_seconds: 600,
            ..base_config()
        },
        source,
    );
    tokio::time::sleep(Duration::from_millis(500)).await;

    h.completion.mark(MatchStatus::Completed);
    tokio::time::sleep(Duration::from_secs(1)).await;

    let status = h.handle.status().await.unwrap();
    assert!(status.state.is_cooldown());
    assert!(status.frozen);

    let events = h.ui.events();
    assert!(events
        .iter()
        .any(|e| matches!(e, Event::ControlsFrozen { .. })));
    assert!(events
        .iter()
        .any(|e| matches!(e, Event::CooldownApplied { .. })));

    let key = keys::cooldown_end(h.instance.as_str());
    h.handle.dispose().await;
    // Disposal leaves the record for the next session.
    assert!(h.store.get(&key).await.unwrap().is_some());
}

#[tokio::test(start_paused = true)]
async fn test_aborted_match_is_ignored() {
    let source = Replay::new(&[1550]);
    let h = start(
        Config {
            cooldown_enabled: true,
            cooldown_seconds: 600,
            ..base_config()
        },
        source.clone(),
    );
    tokio::time::sleep(Duration::from_millis(500)).await;

    h.completion.mark(MatchStatus::Aborted);
    tokio::time::sleep(Duration::from_secs(1)).await;

    let status = h.handle.status().await.unwrap();
    assert_eq!(status.state, GuardState::Armed);
    assert!(!status.frozen);
    assert_eq!(source.calls(), 1);
    assert!(!h
        .ui
        .events()
        .iter()
        .any(|e| matches!(e, Event::ControlsFrozen { .. })));

    h.handle.dispose().await;
}

#[tokio::test(start_paused = true)]
async fn test_config_change_disengages() {
    let source = Replay::new(&[1450]);
    let h = start(
        Config {
            stop_loss_rating: Some(1500),
            ..base_config()
        },
        source,
    );
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(h.handle.status().await.unwrap().state.is_locked());

    h.config_tx
        .send(Config {
            guard_enabled: false,
            stop_loss_rating: Some(1500),
            ..base_config()
        })
        .unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let status = h.handle.status().await.unwrap();
    assert_eq!(status.state, GuardState::Disengaged);
    assert_eq!(status.loss_streak, 0);
    assert!(h.store.entries().is_empty());

    h.handle.dispose().await;
}

#[tokio::test(start_paused = true)]
async fn test_challenge_through_handle() {
    let source = Replay::new(&[1450, 1550]);
    let h = start(
        Config {
            stop_loss_rating: Some(1500),
            challenge_enabled: true,
            challenge_length: 8,
            ..base_config()
        },
        source,
    );
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(h.handle.status().await.unwrap().state.is_locked());

    let text = h.handle.request_challenge().await.unwrap();
    assert_eq!(text.len(), 8);
    assert!(h.handle.status().await.unwrap().challenge_open);

    assert!(!h.handle.submit_challenge_answer(text.to_lowercase() + "x").await);
    assert!(h.handle.submit_challenge_answer(text.clone()).await);

    let status = h.handle.status().await.unwrap();
    assert_eq!(status.state, GuardState::Armed);
    assert!(!status.challenge_open);

    h.handle.dispose().await;
}

#[tokio::test(start_paused = true)]
async fn test_resume_picks_up_persisted_cooldown() {
    let store = Arc::new(MemoryStore::new());
    let instance = InstanceIdentity::generate();
    let ends_at = chrono::Utc::now() + chrono::Duration::seconds(300);
    store
        .set(
            &keys::cooldown_end(instance.as_str()),
            &ends_at.timestamp_millis().to_string(),
        )
        .await
        .unwrap();

    let config = Config {
        cooldown_enabled: true,
        cooldown_seconds: 300,
        ..base_config()
    };
    let ui = Arc::new(EventLog::new());
    let engine = GuardEngine::new(config.clone(), store.clone(), instance, ui.clone());
    let (_config_tx, config_rx) = watch::channel(config);
    let handle = GuardRunner::new(
        engine,
        Replay::new(&[1550]),
        Arc::new(ManualCompletionSignal::new()),
        PollingConfig::default(),
        config_rx,
    )
    .spawn();

    tokio::time::sleep(Duration::from_secs(1)).await;
    let status = handle.status().await.unwrap();
    assert_eq!(
        status_ends_at(&status.state).timestamp_millis(),
        ends_at.timestamp_millis()
    );
    assert!(matches!(
        ui.events().first(),
        Some(Event::CooldownApplied { remaining_secs, .. }) if *remaining_secs >= 299
    ));

    handle.dispose().await;
}

fn status_ends_at(state: &GuardState) -> chrono::DateTime<chrono::Utc> {
    match state {
        GuardState::Cooldown { ends_at } => *ends_at,
        other => panic!("expected cooldown, got {other:?}"),
    }
}
