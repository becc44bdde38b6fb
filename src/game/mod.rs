//! Game Logic Module
//!
//! Match progression and everything it composes.
//!
//! ## Module Structure
//!
//! - `error`: Engine error taxonomy
//! - `roster`: Per-round lineup writes
//! - `matchmaking`: Same-round opponent draws
//! - `reward`: Tier -> pool -> item reward chain with duplicate protection
//! - `unlock`: Supervised cosmetic-unlock queue
//! - `progression`: Round submissions, revive grace, lobby operations

pub mod error;
pub mod matchmaking;
pub mod progression;
pub mod reward;
pub mod roster;
pub mod unlock;

#[cfg(test)]
pub(crate) mod testing;

// Re-export key types
pub use error::{EngineError, EngineResult, StateViolation};
pub use matchmaking::{MatchmakingSelector, OpponentLineup, OpponentPick};
pub use progression::{
    Collaborators, CurrentLineup, LoginOutcome, MatchStatus, OpponentProfile, ProgressionEngine,
    RosterAndMatch, RoundReport, StartOutcome,
};
pub use reward::{weighted_pick, RewardGrant, RewardResolver};
pub use roster::{validate_slots, SavedRoster, TeamRoster};
pub use unlock::{apply_unlocks, UnlockError, UnlockQueue, UnlockReport, UnlockTask, UnlockWorker};
