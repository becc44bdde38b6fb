//! # Trophy Run Engine
//!
//! Match progression and reward resolution for an asynchronous card battler.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     TROPHY RUN ENGINE                        │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/           - Primitives                                │
//! │  └── rng.rs      - Injected random sources (Xorshift128+)    │
//! │                                                              │
//! │  store/          - Persistence collaborator                  │
//! │  ├── model.rs    - Match, lineup, catalog, player rows       │
//! │  └── memory.rs   - In-memory transactional store             │
//! │                                                              │
//! │  external/       - Cache and identity oracle collaborators   │
//! │                                                              │
//! │  game/           - Engine                                    │
//! │  ├── roster.rs   - Lineup write path                         │
//! │  ├── matchmaking.rs - Opponent draws                         │
//! │  ├── reward.rs   - Weighted reward chain                     │
//! │  ├── unlock.rs   - Cosmetic unlock worker                    │
//! │  └── progression.rs - Round submissions and lobby ops        │
//! │                                                              │
//! │  config.rs       - Tunables from TROPHY_RUN_* variables      │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Atomicity
//!
//! The engine keeps no state between calls. Every operation opens one
//! store transaction, does all of its reads and writes through it and
//! commits; an error anywhere drops the scope and nothing is written.
//!
//! ## Randomness
//!
//! Reward and opponent draws go through [`RandomSource`]. Production uses
//! OS entropy; tests and replays inject a seeded or scripted source.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod config;
pub mod core;
pub mod external;
pub mod game;
pub mod store;

// Re-export commonly used types
pub use config::EngineConfig;
pub use core::rng::{DeterministicRng, EntropyRandom, RandomSource, SeededRandom};
pub use game::{Collaborators, EngineError, EngineResult, ProgressionEngine, RoundReport};
pub use store::{MatchId, MemoryStore, OwnerId, RoundOutcome, Store, StoreTx};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Health a match starts with
pub const MAX_HEALTH: u8 = 5;

/// Trophies that win a match
pub const TROPHIES_TO_WIN: u8 = 9;

/// Coin top-up written on match start and after every round
pub const STARTING_COIN: u64 = 10;

/// Board slots in a lineup
pub const MAX_LINEUP_SLOTS: usize = 5;

/// Position marking a saved empty lineup
pub const SENTINEL_POSITION: u16 = 999;
