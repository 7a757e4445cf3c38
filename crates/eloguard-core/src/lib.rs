//! # EloGuard Core Library
//!
//! Discipline guard for an online chess rating. Watches a player's rating,
//! locks play at a stop-loss, loss-streak or target threshold, enforces a
//! cooldown after every finished match, and only lets a block go early once
//! an unlock challenge has been typed back exactly.
//!
//! ## Architecture
//!
//! - **Guard Engine**: a wall-clock state machine. It never reads the clock
//!   itself; callers pass `now` and drive it through [`GuardRunner`]'s poll
//!   loops or directly in tests
//! - **Storage**: async key-value [`Store`] (in-memory or SQLite) and
//!   TOML-based [`Settings`]
//! - **Sources**: the rating service ([`ChessComSource`]) and match-end
//!   detection ([`GameCompletionSignal`])
//!
//! ## Key Components
//!
//! - [`GuardEngine`]: state machine and arbiter of locks and cooldowns
//! - [`GuardRunner`]: tokio task owning an engine and its timers
//! - [`Settings`] / [`Config`]: synced settings and the engine's view of them
//! - [`UiBinding`]: where lock and cooldown notifications go

pub mod bracket;
pub mod error;
pub mod events;
pub mod guard;
pub mod source;
pub mod storage;

pub use bracket::{bracket, Bracket};
pub use error::{
    ConfigError, CoreError, DataSourceError, PersistenceError, Result, ValidationError,
};
pub use events::{Event, EventLog, UiBinding};
pub use guard::{
    CheckOrigin, CheckOutcome, CheckTicket, CooldownTick, GuardEngine, GuardRunner, GuardState,
    GuardStatus, InstanceIdentity, LockKind, RunnerHandle, UnlockChallenge,
};
pub use source::{
    ChessComSource, GameCompletionSignal, ManualCompletionSignal, MatchStatus, RatingSnapshot,
    RatingSource,
};
pub use storage::{Config, GameMode, MemoryStore, Settings, SqliteStore, Store, StoreChange};
