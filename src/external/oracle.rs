//! Identity / Ownership Oracle
//!
//! Opaque third-party service: login code exchange, qualifying-asset checks
//! and the external energy wallet. The engine only sees success or failure
//! plus a payload; any failure aborts the current operation.

use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::cache::CacheLookup;
use crate::store::OwnerId;

/// Oracle errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OracleError {
    /// Login code was rejected.
    #[error("login code rejected: {0}")]
    InvalidCode(String),
    /// The oracle answered with an empty identity.
    #[error("oracle returned an empty identity")]
    EmptyIdentity,
    /// External energy wallet cannot cover the charge.
    #[error("insufficient external energy: need {needed}, have {available}")]
    InsufficientEnergy {
        /// Amount requested.
        needed: u64,
        /// Amount available.
        available: u64,
    },
    /// Owner unknown to the oracle.
    #[error("unknown owner: {0}")]
    UnknownOwner(String),
    /// Transport or vendor failure.
    #[error("oracle unavailable: {0}")]
    Unavailable(String),
}

/// External energy balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EnergyBalance {
    /// Energy that regenerates on its own.
    pub natural: u64,
    /// Energy bought or fused.
    pub fusion: u64,
}

impl EnergyBalance {
    /// Total spendable energy.
    pub fn total(&self) -> u64 {
        self.natural + self.fusion
    }
}

/// Identity and ownership oracle consumed by the engine.
pub trait IdentityOracle: Send + Sync {
    /// Exchange a client login code for an owner identity.
    fn exchange_login_code(&self, code: &str) -> Result<OwnerId, OracleError>;

    /// Whether the owner holds the asset that permits starting matches.
    fn owns_qualifying_asset(&self, owner: &OwnerId) -> Result<bool, OracleError>;

    /// Current external energy balance.
    fn energy_balance(&self, owner: &OwnerId) -> Result<EnergyBalance, OracleError>;

    /// Deduct external energy.
    fn deduct_energy(&self, owner: &OwnerId, amount: u64) -> Result<(), OracleError>;
}

/// Return the cached access token, or refresh and cache a new one.
///
/// Used by oracle adapters that authenticate against the vendor API.
pub fn cached_access_token<F>(cache: &dyn CacheLookup, refresh: F) -> Result<String, OracleError>
where
    F: FnOnce() -> Result<(String, Duration), OracleError>,
{
    if let Some(token) = cache.access_token() {
        return Ok(token);
    }
    let (token, ttl) = refresh()?;
    cache
        .set_access_token(token.clone(), ttl)
        .map_err(|e| OracleError::Unavailable(e.to_string()))?;
    Ok(token)
}

#[derive(Debug, Default)]
struct OracleAccount {
    has_asset: bool,
    energy: EnergyBalance,
}

/// In-process oracle for tests and the demo binary.
///
/// Login codes map to owners as `code -> "owner-<code>"`; codes starting
/// with `bad` are rejected.
#[derive(Debug, Default)]
pub struct MemoryOracle {
    accounts: RwLock<BTreeMap<OwnerId, OracleAccount>>,
}

impl MemoryOracle {
    /// Empty oracle.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an account.
    pub fn set_account(&self, owner: OwnerId, has_asset: bool, energy: EnergyBalance) {
        let mut accounts = self.accounts.write().unwrap_or_else(PoisonError::into_inner);
        accounts.insert(owner, OracleAccount { has_asset, energy });
    }

    fn with_account<T>(
        &self,
        owner: &OwnerId,
        f: impl FnOnce(&mut OracleAccount) -> Result<T, OracleError>,
    ) -> Result<T, OracleError> {
        let mut accounts = self.accounts.write().unwrap_or_else(PoisonError::into_inner);
        let account = accounts
            .get_mut(owner)
            .ok_or_else(|| OracleError::UnknownOwner(owner.to_string()))?;
        f(account)
    }
}

impl IdentityOracle for MemoryOracle {
    fn exchange_login_code(&self, code: &str) -> Result<OwnerId, OracleError> {
        if code.starts_with("bad") {
            return Err(OracleError::InvalidCode(code.to_string()));
        }
        if code.is_empty() {
            return Err(OracleError::EmptyIdentity);
        }
        Ok(OwnerId::new(format!("owner-{}", code)))
    }

    fn owns_qualifying_asset(&self, owner: &OwnerId) -> Result<bool, OracleError> {
        self.with_account(owner, |a| Ok(a.has_asset))
    }

    fn energy_balance(&self, owner: &OwnerId) -> Result<EnergyBalance, OracleError> {
        self.with_account(owner, |a| Ok(a.energy))
    }

    fn deduct_energy(&self, owner: &OwnerId, amount: u64) -> Result<(), OracleError> {
        self.with_account(owner, |a| {
            let available = a.energy.total();
            if available < amount {
                return Err(OracleError::InsufficientEnergy { needed: amount, available });
            }
            // Natural energy is spent first.
            let from_natural = amount.min(a.energy.natural);
            a.energy.natural -= from_natural;
            a.energy.fusion -= amount - from_natural;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::external::cache::MemoryCache;
    use std::sync::Arc;

    #[test]
    fn test_login_code_exchange() {
        let oracle = MemoryOracle::new();
        assert_eq!(oracle.exchange_login_code("abc").unwrap(), OwnerId::from("owner-abc"));
        assert!(matches!(oracle.exchange_login_code("bad-1"), Err(OracleError::InvalidCode(_))));
        assert_eq!(oracle.exchange_login_code(""), Err(OracleError::EmptyIdentity));
    }

    #[test]
    fn test_deduct_spends_natural_first() {
        let oracle = MemoryOracle::new();
        let owner = OwnerId::from("p1");
        oracle.set_account(owner.clone(), true, EnergyBalance { natural: 100, fusion: 500 });

        oracle.deduct_energy(&owner, 150).unwrap();
        assert_eq!(oracle.energy_balance(&owner).unwrap(), EnergyBalance { natural: 0, fusion: 450 });

        let err = oracle.deduct_energy(&owner, 1000).unwrap_err();
        assert_eq!(err, OracleError::InsufficientEnergy { needed: 1000, available: 450 });
    }

    #[test]
    fn test_accounts_survive_poisoned_lock() {
        let oracle = Arc::new(MemoryOracle::new());
        let writer = oracle.clone();
        let _ = std::thread::spawn(move || {
            let _accounts = writer.accounts.write().unwrap();
            panic!("writer died holding the lock");
        })
        .join();
        assert!(oracle.accounts.is_poisoned());

        let owner = OwnerId::from("p1");
        oracle.set_account(owner.clone(), true, EnergyBalance { natural: 4, fusion: 0 });
        let balance = oracle.energy_balance(&owner).unwrap();
        assert_eq!(balance, EnergyBalance { natural: 4, fusion: 0 });
        assert!(oracle.owns_qualifying_asset(&owner).unwrap());
    }

    #[test]
    fn test_unknown_owner() {
        let oracle = MemoryOracle::new();
        assert!(matches!(
            oracle.owns_qualifying_asset(&OwnerId::from("ghost")),
            Err(OracleError::UnknownOwner(_))
        ));
    }

    #[test]
    fn test_cached_access_token_refreshes_once() {
        let cache = MemoryCache::new();
        let mut refreshes = 0;

        let token = cached_access_token(&cache, || {
            refreshes += 1;
            Ok(("tok-1".to_string(), Duration::from_secs(60)))
        })
        .unwrap();
        assert_eq!(token, "tok-1");

        let token = cached_access_token(&cache, || {
            refreshes += 1;
            Ok(("tok-2".to_string(), Duration::from_secs(60)))
        })
        .unwrap();
        assert_eq!(token, "tok-1");
        assert_eq!(refreshes, 1);
    }
}
