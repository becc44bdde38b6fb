//! Random Sources
//!
//! Every draw the engine makes (reward pools, items, opponents) goes through
//! the [`RandomSource`] trait so callers decide where randomness comes from:
//!
//! - [`EntropyRandom`]: thread-local OS-seeded generator for production.
//! - [`SeededRandom`]: seeded Xorshift128+ for reproducible runs and tests.

use std::sync::Mutex;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Source of uniform integers for weighted and uniform draws.
pub trait RandomSource: Send + Sync {
    /// Uniform integer in `[0, bound)`. A bound of 0 yields 0.
    fn below(&self, bound: u64) -> u64;

    /// Pick a uniformly random element of a slice.
    fn choose<'a, T>(&self, slice: &'a [T]) -> Option<&'a T>
    where
        Self: Sized,
    {
        pick(self, slice)
    }
}

/// Pick a uniformly random element using any (possibly unsized) source.
pub fn pick<'a, T, R>(random: &R, slice: &'a [T]) -> Option<&'a T>
where
    R: RandomSource + ?Sized,
{
    if slice.is_empty() {
        None
    } else {
        let idx = random.below(slice.len() as u64) as usize;
        slice.get(idx)
    }
}

/// Production source backed by `rand::thread_rng`.
///
/// Holds no state of its own, so it is free to share across worker threads.
#[derive(Debug, Default, Clone, Copy)]
pub struct EntropyRandom;

impl RandomSource for EntropyRandom {
    fn below(&self, bound: u64) -> u64 {
        if bound == 0 {
            return 0;
        }
        rand::thread_rng().gen_range(0..bound)
    }
}

/// Deterministic PRNG using the Xorshift128+ algorithm.
///
/// Given the same seed, this RNG produces the exact same sequence on every
/// platform.
///
/// # Example
///
/// ```
/// use trophy_run::core::rng::DeterministicRng;
///
/// let mut a = DeterministicRng::new(12345);
/// let mut b = DeterministicRng::new(12345);
/// assert_eq!(a.next_u64(), b.next_u64());
/// ```
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeterministicRng {
    state: [u64; 2],
}

impl Default for DeterministicRng {
    fn default() -> Self {
        Self::new(0)
    }
}

impl DeterministicRng {
    /// Create a new RNG from a 64-bit seed.
    ///
    /// Uses SplitMix64 to initialize the internal state, ensuring
    /// good distribution even from weak seeds.
    pub fn new(seed: u64) -> Self {
        let mut s = seed;
        let state0 = splitmix64(&mut s);
        let state1 = splitmix64(&mut s);

        // Ensure state is never all zeros
        let state = if state0 == 0 && state1 == 0 {
            [1, 1]
        } else {
            [state0, state1]
        };

        Self { state }
    }

    /// Generate the next 64-bit random value.
    #[inline]
    pub fn next_u64(&mut self) -> u64 {
        let s0 = self.state[0];
        let mut s1 = self.state[1];
        let result = s0.wrapping_add(s1);

        s1 ^= s0;
        self.state[0] = s0.rotate_left(24) ^ s1 ^ (s1 << 16);
        self.state[1] = s1.rotate_left(37);

        result
    }

    /// Generate a random integer in range [0, max).
    ///
    /// Plain modulo reduction. The bias is negligible for the small bounds
    /// used by reward tables and matchmaking.
    #[inline]
    pub fn next_below(&mut self, max: u64) -> u64 {
        if max == 0 {
            return 0;
        }
        self.next_u64() % max
    }

    /// Get current state (for checkpointing/debugging).
    pub fn state(&self) -> [u64; 2] {
        self.state
    }

    /// Restore from saved state.
    pub fn set_state(&mut self, state: [u64; 2]) {
        self.state = state;
    }
}

/// SplitMix64 for seed initialization.
#[inline]
fn splitmix64(state: &mut u64) -> u64 {
    *state = state.wrapping_add(0x9E3779B97F4A7C15);
    let mut z = *state;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
    z ^ (z >> 31)
}

/// Shareable seeded source for reproducible runs.
#[derive(Debug)]
pub struct SeededRandom {
    rng: Mutex<DeterministicRng>,
}

impl SeededRandom {
    /// Create a source seeded with `seed`.
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Mutex::new(DeterministicRng::new(seed)),
        }
    }
}

impl RandomSource for SeededRandom {
    fn below(&self, bound: u64) -> u64 {
        // A poisoned lock still holds a valid generator state.
        let mut rng = match self.rng.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        rng.next_below(bound)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rng_determinism() {
        let mut rng1 = DeterministicRng::new(12345);
        let mut rng2 = DeterministicRng::new(12345);

        for _ in 0..1000 {
            assert_eq!(rng1.next_u64(), rng2.next_u64());
        }
    }

    #[test]
    fn test_rng_different_seeds() {
        let mut rng1 = DeterministicRng::new(12345);
        let mut rng2 = DeterministicRng::new(54321);

        assert_ne!(rng1.next_u64(), rng2.next_u64());
    }

    #[test]
    fn test_next_below() {
        let mut rng = DeterministicRng::new(1234);

        for _ in 0..1000 {
            assert!(rng.next_below(100) < 100);
        }

        assert_eq!(rng.next_below(0), 0);
        assert_eq!(rng.next_below(1), 0);
    }

    #[test]
    fn test_state_checkpoint() {
        let mut rng = DeterministicRng::new(5555);
        for _ in 0..50 {
            rng.next_u64();
        }

        let saved_state = rng.state();
        let next_values: Vec<u64> = (0..10).map(|_| rng.next_u64()).collect();

        rng.set_state(saved_state);
        for expected in next_values {
            assert_eq!(rng.next_u64(), expected);
        }
    }

    #[test]
    fn test_seeded_source_matches_rng() {
        let source = SeededRandom::new(77);
        let mut rng = DeterministicRng::new(77);

        for _ in 0..100 {
            assert_eq!(source.below(13), rng.next_below(13));
        }
    }

    #[test]
    fn test_entropy_source_in_range() {
        let source = EntropyRandom;
        for _ in 0..1000 {
            assert!(source.below(7) < 7);
        }
        assert_eq!(source.below(0), 0);
    }

    #[test]
    fn test_choose() {
        let source = SeededRandom::new(9);
        let empty: [u32; 0] = [];
        assert!(source.choose(&empty).is_none());

        let items = [10, 20, 30];
        for _ in 0..50 {
            let picked = source.choose(&items).copied();
            assert!(matches!(picked, Some(10 | 20 | 30)));
        }
    }
}
