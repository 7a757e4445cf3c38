mod challenge;
mod cooldown;
mod engine;
mod instance;
mod loss_streak;
mod runner;
mod state;

pub use challenge::{UnlockChallenge, CHALLENGE_ALPHABET, MAX_CHALLENGE_LENGTH};
pub use cooldown::{secs_until, CooldownScheduler, CooldownTick, ResumeOutcome};
pub use engine::{CheckOrigin, CheckOutcome, CheckTicket, GuardEngine};
pub use instance::InstanceIdentity;
pub use loss_streak::{LossStreakRecord, LossStreakTracker};
pub use runner::{GuardRunner, GuardStatus, RunnerHandle};
pub use state::{judge, GuardState, LockKind, Verdict};
