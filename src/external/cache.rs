//! Fast-Lookup Cache Collaborator
//!
//! Small runtime-tunable values (repeat compensation, energy restore cost)
//! and the short-lived access token for the identity oracle.

use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};

use thiserror::Error;

/// Cache errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
    /// Key is not set.
    #[error("cache key missing: {0}")]
    Missing(&'static str),
    /// Stored value could not be parsed.
    #[error("cache value for {key} is malformed: {value}")]
    Malformed {
        /// Key read.
        key: &'static str,
        /// Raw value found.
        value: String,
    },
    /// Backend unreachable.
    #[error("cache unavailable: {0}")]
    Unavailable(String),
}

/// Fast-lookup collaborator consumed by the engine.
pub trait CacheLookup: Send + Sync {
    /// Currency granted instead of an item the owner already has.
    fn repeat_compensation(&self) -> Result<u64, CacheError>;

    /// External energy charged to restore one local energy.
    fn energy_restore_cost(&self) -> Result<u64, CacheError>;

    /// Current oracle access token, if still valid.
    fn access_token(&self) -> Option<String>;

    /// Store an oracle access token for `ttl`.
    fn set_access_token(&self, token: String, ttl: Duration) -> Result<(), CacheError>;
}

#[derive(Debug, Default)]
struct CacheValues {
    repeat_compensation: Option<String>,
    energy_restore_cost: Option<String>,
    token: Option<(String, Instant)>,
}

/// In-process cache. Values are kept as strings, as a key-value store would.
#[derive(Debug, Default)]
pub struct MemoryCache {
    values: RwLock<CacheValues>,
}

impl MemoryCache {
    /// Empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the repeat-compensation amount.
    pub fn set_repeat_compensation(&self, value: impl Into<String>) {
        self.write_values().repeat_compensation = Some(value.into());
    }

    /// Set the energy restore cost.
    pub fn set_energy_restore_cost(&self, value: impl Into<String>) {
        self.write_values().energy_restore_cost = Some(value.into());
    }

    // Values are plain strings, so a writer that panicked cannot leave them torn.
    fn read_values(&self) -> RwLockReadGuard<'_, CacheValues> {
        self.values.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_values(&self) -> RwLockWriteGuard<'_, CacheValues> {
        self.values.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn read_number(
        &self,
        key: &'static str,
        pick: fn(&CacheValues) -> Option<String>,
    ) -> Result<u64, CacheError> {
        let raw = pick(&*self.read_values()).ok_or(CacheError::Missing(key))?;
        raw.trim()
            .parse()
            .map_err(|_| CacheError::Malformed { key, value: raw })
    }
}

impl CacheLookup for MemoryCache {
    fn repeat_compensation(&self) -> Result<u64, CacheError> {
        self.read_number("game:repeat", |v| v.repeat_compensation.clone())
    }

    fn energy_restore_cost(&self) -> Result<u64, CacheError> {
        self.read_number("oracle:energy_cost", |v| v.energy_restore_cost.clone())
    }

    fn access_token(&self) -> Option<String> {
        match &self.read_values().token {
            Some((token, expires)) if Instant::now() < *expires => Some(token.clone()),
            _ => None,
        }
    }

    fn set_access_token(&self, token: String, ttl: Duration) -> Result<(), CacheError> {
        self.write_values().token = Some((token, Instant::now() + ttl));
        Ok(())
    }
}
