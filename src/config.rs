//! Engine Configuration
//!
//! Tunables for match progression, read from `TROPHY_RUN_*` environment
//! variables with built-in defaults.

use tracing::warn;

use crate::store::CosmeticLoadout;
use crate::{MAX_HEALTH, STARTING_COIN, TROPHIES_TO_WIN};

/// Profile shown when matchmaking finds no opponent.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DefaultOpponent {
    /// Display name.
    pub nickname: String,
    /// Cosmetics.
    pub loadout: CosmeticLoadout,
}

impl Default for DefaultOpponent {
    fn default() -> Self {
        Self {
            nickname: "Wandering Bot".to_string(),
            loadout: CosmeticLoadout {
                avatar_id: 21000,
                ..CosmeticLoadout::default()
            },
        }
    }
}

/// Engine configuration.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Health a match starts with.
    pub max_health: u8,
    /// Trophies that win a match.
    pub trophies_to_win: u8,
    /// Coin top-up written on match start and after every round.
    pub starting_coin: u64,
    /// Local energy cap; also the energy of a new player.
    pub max_energy: u32,
    /// Health restored by the one-time revive.
    pub revive_health: u8,
    /// Character level that triggers cosmetic unlocks.
    pub unlock_level: u8,
    /// Prefix of generated nicknames.
    pub nickname_prefix: String,
    /// Stand-in opponent.
    pub default_opponent: DefaultOpponent,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_health: MAX_HEALTH,
            trophies_to_win: TROPHIES_TO_WIN,
            starting_coin: STARTING_COIN,
            max_energy: 5,
            revive_health: 1,
            unlock_level: 5,
            nickname_prefix: "Nameless_".to_string(),
            default_opponent: DefaultOpponent::default(),
        }
    }
}

impl EngineConfig {
    /// Create config from environment variables.
    ///
    /// Unset variables keep their defaults; unparsable or out-of-range
    /// values are ignored with a warning.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup (environment, test maps).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let mut config = defaults.clone();

        // Health and trophies may be lowered but never raised past the game's ranges.
        config.max_health = read(&lookup, "TROPHY_RUN_MAX_HEALTH", defaults.max_health, |v| {
            (1..=MAX_HEALTH).contains(v)
        });
        config.trophies_to_win =
            read(&lookup, "TROPHY_RUN_TROPHIES_TO_WIN", defaults.trophies_to_win, |v| {
                (1..=TROPHIES_TO_WIN).contains(v)
            });
        config.starting_coin =
            read(&lookup, "TROPHY_RUN_STARTING_COIN", defaults.starting_coin, |_| true);
        config.max_energy =
            read(&lookup, "TROPHY_RUN_MAX_ENERGY", defaults.max_energy, |v| *v > 0);
        config.unlock_level =
            read(&lookup, "TROPHY_RUN_UNLOCK_LEVEL", defaults.unlock_level, |v| *v > 0);
        let max_health = config.max_health;
        config.revive_health =
            read(&lookup, "TROPHY_RUN_REVIVE_HEALTH", defaults.revive_health, |v| {
                *v > 0 && *v <= max_health
            });
        if let Some(prefix) = lookup("TROPHY_RUN_NICKNAME_PREFIX") {
            config.nickname_prefix = prefix;
        }
        if let Some(nickname) = lookup("TROPHY_RUN_DEFAULT_OPPONENT") {
            config.default_opponent.nickname = nickname;
        }

        config
    }
}

fn read<T, L, V>(lookup: &L, key: &str, default: T, valid: V) -> T
where
    T: std::str::FromStr + Copy,
    L: Fn(&str) -> Option<String>,
    V: Fn(&T) -> bool,
{
    match lookup(key) {
        None => default,
        Some(raw) => match raw.trim().parse::<T>() {
            Ok(value) if valid(&value) => value,
            _ => {
                warn!(key, value = %raw, "ignoring invalid config value");
                default
            }
        },
    }
}
