//! Core primitives shared by every engine component.

pub mod rng;

// Re-export core types
pub use rng::{DeterministicRng, EntropyRandom, RandomSource, SeededRandom};
