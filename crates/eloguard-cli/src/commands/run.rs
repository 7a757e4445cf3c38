use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use clap::Args;
use eloguard_core::events::{Event, UiBinding};
use eloguard_core::{
    ChessComSource, Config, GuardEngine, GuardRunner, InstanceIdentity, LockKind,
    ManualCompletionSignal, MatchStatus, MemoryStore, RunnerHandle, Settings, SqliteStore, Store,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;

use super::CommandResult;

const SETTINGS_RELOAD_INTERVAL: Duration = Duration::from_secs(2);

#[derive(Args)]
pub struct RunArgs {
    /// Keep the instance identity across restarts under this label, so a
    /// cooldown survives the process being restarted
    #[arg(long)]
    pub session: Option<String>,
}

/// Prints every engine notification to stdout as one JSON line.
///
/// Locks and cooldowns are re-asserted several times a second; identical
/// consecutive renders are printed once.
pub struct TerminalUi {
    hide_ratings: AtomicBool,
    last: Mutex<Option<String>>,
}

impl TerminalUi {
    pub fn new(hide_ratings: bool) -> Self {
        Self {
            hide_ratings: AtomicBool::new(hide_ratings),
            last: Mutex::new(None),
        }
    }

    pub fn set_hide_ratings(&self, hide: bool) {
        self.hide_ratings.store(hide, Ordering::Relaxed);
    }

    /// The JSON line for `event`, or `None` if it repeats the previous one.
    pub fn render(&self, event: &Event) -> Option<String> {
        let mut value = serde_json::to_value(event).ok()?;
        if let Some(fields) = value.as_object_mut() {
            if self.hide_ratings.load(Ordering::Relaxed) {
                fields.remove("rating");
            }
            let at = fields.remove("at");
            let key = serde_json::Value::Object(fields.clone()).to_string();

            let mut last = self.last.lock().ok()?;
            if last.as_deref() == Some(key.as_str()) {
                return None;
            }
            *last = Some(key);

            if let Some(at) = at {
                fields.insert("at".into(), at);
            }
        }
        Some(value.to_string())
    }

    fn emit(&self, event: Event) {
        if let Some(line) = self.render(&event) {
            println!("{line}");
        }
    }
}

impl UiBinding for TerminalUi {
    fn apply_lock(&self, kind: LockKind, rating: i64) {
        self.emit(Event::LockApplied {
            kind,
            rating,
            at: Utc::now(),
        });
    }

    fn apply_cooldown(&self, remaining_secs: u64) {
        self.emit(Event::CooldownApplied {
            remaining_secs,
            at: Utc::now(),
        });
    }

    fn clear_lock(&self) {
        self.emit(Event::LockCleared { at: Utc::now() });
    }

    fn freeze_controls(&self) {
        self.emit(Event::ControlsFrozen { at: Utc::now() });
    }

    fn release_freeze(&self) {
        self.emit(Event::FreezeReleased { at: Utc::now() });
    }
}

/// Re-read the settings file and push changes to the runner and the terminal.
async fn reload_settings(config_tx: watch::Sender<Config>, ui: Arc<TerminalUi>) {
    let mut ticker = tokio::time::interval(SETTINGS_RELOAD_INTERVAL);
    loop {
        ticker.tick().await;
        if config_tx.is_closed() {
            break;
        }
        match Settings::load() {
            Ok(settings) => {
                ui.set_hide_ratings(settings.hide_ratings);
                let next = settings.resolve();
                let changed = config_tx.send_if_modified(|current| {
                    if *current == next {
                        false
                    } else {
                        *current = next;
                        true
                    }
                });
                if changed {
                    tracing::info!("settings changed on disk");
                }
            }
            Err(e) => tracing::warn!(error = %e, "failed to reload settings"),
        }
    }
}

async fn challenge_open(handle: &RunnerHandle) -> bool {
    handle.status().await.is_some_and(|s| s.challenge_open)
}

pub async fn run(args: RunArgs) -> CommandResult {
    let settings = Settings::load()?;
    let config = settings.resolve();
    if let Err(e) = config.validate() {
        eprintln!("warning: guard stays disengaged: {e}");
    }

    let local: Arc<dyn Store> = Arc::new(SqliteStore::open()?);
    let session: Arc<dyn Store> = match &args.session {
        Some(label) => Arc::new(SqliteStore::open_session(label)?),
        None => Arc::new(MemoryStore::new()),
    };
    let instance = InstanceIdentity::load_or_create(session.as_ref()).await;
    tracing::info!(%instance, "starting guard");

    let ui = Arc::new(TerminalUi::new(settings.hide_ratings));
    let engine = GuardEngine::new(config.clone(), local, instance, ui.clone());
    let completion = Arc::new(ManualCompletionSignal::new());
    let (config_tx, config_rx) = watch::channel(config);

    let handle = GuardRunner::new(
        engine,
        Arc::new(ChessComSource::new()?),
        completion.clone(),
        settings.polling.clone(),
        config_rx,
    )
    .spawn();
    let reloader = tokio::spawn(reload_settings(config_tx, ui));

    eprintln!("commands: done | abort | unlock | status | quit");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let raw = line.trim_end_matches('\r');
        match raw.trim() {
            "" => {}
            "done" => completion.mark(MatchStatus::Completed),
            "abort" => completion.mark(MatchStatus::Aborted),
            "unlock" => match handle.request_challenge().await {
                Some(text) => {
                    println!("{}", serde_json::json!({ "type": "challenge", "text": text }));
                }
                None => eprintln!("nothing to unlock"),
            },
            "status" => {
                if let Some(status) = handle.status().await {
                    println!("{}", serde_json::to_string(&status)?);
                }
            }
            "quit" | "exit" => break,
            other => {
                if !challenge_open(&handle).await {
                    eprintln!("unknown command: {other}");
                } else if handle.submit_challenge_answer(raw).await {
                    // Typed back verbatim: surrounding spaces count.
                    eprintln!("unlocked");
                } else {
                    eprintln!("wrong answer, try again");
                }
            }
        }
    }

    reloader.abort();
    handle.dispose().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_renders_are_suppressed() {
        let ui = TerminalUi::new(false);
        let lock = Event::LockApplied {
            kind: LockKind::Stop,
            rating: 1490,
            at: Utc::now(),
        };
        assert!(ui.render(&lock).is_some());
        assert!(ui.render(&lock).is_none());

        let cooldown = Event::CooldownApplied {
            remaining_secs: 9,
            at: Utc::now(),
        };
        assert!(ui.render(&cooldown).is_some());
        assert!(ui.render(&lock).is_some());
    }

    #[test]
    fn hide_ratings_can_change_while_running() {
        let ui = TerminalUi::new(false);
        let lock = |rating| Event::LockApplied {
            kind: LockKind::Stop,
            rating,
            at: Utc::now(),
        };
        let shown: serde_json::Value =
            serde_json::from_str(&ui.render(&lock(1490)).unwrap()).unwrap();
        assert_eq!(shown["rating"], 1490);

        ui.set_hide_ratings(true);
        let hidden: serde_json::Value =
            serde_json::from_str(&ui.render(&lock(1480)).unwrap()).unwrap();
        assert!(hidden.get("rating").is_none());
    }

    #[test]
    fn hidden_ratings_are_dropped() {
        let ui = TerminalUi::new(true);
        let line = ui
            .render(&Event::LockApplied {
                kind: LockKind::Target,
                rating: 1605,
                at: Utc::now(),
            })
            .unwrap();
        let value: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["type"], "lock_applied");
        assert_eq!(value["kind"], "target");
        assert!(value.get("rating").is_none());
        assert!(value.get("at").is_some());
    }
}
