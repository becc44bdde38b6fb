//! Reward Resolution
//!
//! Rolls the tier -> pool -> item chain for a trophy count:
//!
//! 1. Tier: greatest threshold not above the trophy count.
//! 2. Pool entry: weighted draw over the tier's reward pool.
//! 3. Item: uniform draw over the entry's item pool.
//! 4. Duplicate check: an already-owned item becomes currency compensation.
//!
//! Concurrent resolutions for the same (owner, item) are not locked against
//! each other and may both grant the item.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::core::rng::{pick, RandomSource};
use crate::external::CacheLookup;
use crate::game::error::{EngineError, EngineResult};
use crate::store::{
    with_transaction, ItemDefinition, OwnedItem, OwnerId, PoolId, RewardPoolEntry, Store, StoreTx,
};

/// Outcome of one reward roll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RewardGrant {
    /// New item added to the owner's inventory.
    Item {
        /// Tier pool the roll came from.
        reward_pool_id: PoolId,
        /// Granted item.
        item: ItemDefinition,
    },
    /// Item was already owned; currency granted instead.
    Repeat {
        /// Tier pool the roll came from.
        reward_pool_id: PoolId,
        /// Item that was rolled.
        item: ItemDefinition,
        /// Currency credited.
        compensation: u64,
    },
}

impl RewardGrant {
    /// Rolled item, granted or not.
    pub fn item(&self) -> &ItemDefinition {
        match self {
            RewardGrant::Item { item, .. } | RewardGrant::Repeat { item, .. } => item,
        }
    }

    /// Whether this is a repeat compensation.
    pub fn is_repeat(&self) -> bool {
        matches!(self, RewardGrant::Repeat { .. })
    }
}

/// Weighted draw over pool entries in their given order.
///
/// Draws `r` in `[0, total)` and returns the first entry whose running
/// weight exceeds `r`, falling back to the last entry. `None` when there is
/// nothing to draw from.
pub fn weighted_pick<'a, R>(entries: &'a [RewardPoolEntry], random: &R) -> Option<&'a RewardPoolEntry>
where
    R: RandomSource + ?Sized,
{
    let total: u64 = entries.iter().map(|e| e.weight as u64).sum();
    if total == 0 {
        return None;
    }
    let roll = random.below(total);
    let mut running = 0u64;
    for entry in entries {
        running += entry.weight as u64;
        if running > roll {
            return Some(entry);
        }
    }
    entries.last()
}

/// Resolves trophy counts into item grants.
pub struct RewardResolver {
    store: Arc<dyn Store>,
    cache: Arc<dyn CacheLookup>,
    random: Arc<dyn RandomSource>,
}

impl RewardResolver {
    /// Create a resolver over the given collaborators.
    pub fn new(
        store: Arc<dyn Store>,
        cache: Arc<dyn CacheLookup>,
        random: Arc<dyn RandomSource>,
    ) -> Self {
        Self { store, cache, random }
    }

    /// Resolve a reward in its own transaction.
    pub fn resolve(&self, owner: &OwnerId, trophies: u8) -> EngineResult<RewardGrant> {
        with_transaction(self.store.as_ref(), |tx| self.resolve_in(tx, owner, trophies))
    }

    /// Resolve a reward inside the caller's transaction.
    pub fn resolve_in(
        &self,
        tx: &mut dyn StoreTx,
        owner: &OwnerId,
        trophies: u8,
    ) -> EngineResult<RewardGrant> {
        let tier = tx.reward_tier_for(trophies)?.ok_or_else(|| {
            EngineError::Configuration(format!("no reward tier for {} trophies", trophies))
        })?;
        let reward_pool_id = tier.reward_pool_id;

        let entries = tx.reward_pool_entries(reward_pool_id)?;
        let entry = weighted_pick(&entries, self.random.as_ref()).ok_or_else(|| {
            EngineError::Configuration(format!("reward pool {} has no drawable entries", reward_pool_id))
        })?;
        debug!(owner = %owner, reward_pool_id, item_pool = entry.related_pool_id, "reward pool entry drawn");

        let candidates = tx.item_pool(entry.related_pool_id)?;
        let item_id = *pick(self.random.as_ref(), &candidates).ok_or_else(|| {
            EngineError::Configuration(format!("item pool {} is empty", entry.related_pool_id))
        })?;
        let item = tx
            .item_definition(item_id)?
            .ok_or_else(|| EngineError::Configuration(format!("item {} is not defined", item_id)))?;

        if tx.owned_item(owner, item.id)?.is_some() {
            let compensation = self.cache.repeat_compensation()?;
            credit_balance(tx, owner, compensation)?;
            info!(owner = %owner, item_id = item.id, compensation, "repeat item compensated");
            return Ok(RewardGrant::Repeat {
                reward_pool_id,
                item,
                compensation,
            });
        }

        tx.insert_owned_item(OwnedItem {
            owner: owner.clone(),
            item_id: item.id,
            kind: item.kind,
            acquired_at: Utc::now(),
        })?;
        info!(owner = %owner, item_id = item.id, reward_pool_id, "reward item granted");

        Ok(RewardGrant::Item { reward_pool_id, item })
    }
}

/// Add currency to an owner's balance.
pub(crate) fn credit_balance(tx: &mut dyn StoreTx, owner: &OwnerId, amount: u64) -> EngineResult<()> {
    let mut profile = tx.get_profile(owner)?.ok_or_else(|| EngineError::NotFound {
        entity: "player",
        key: owner.to_string(),
    })?;
    profile.balance = profile.balance.saturating_add(amount);
    tx.put_profile(profile)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::rng::SeededRandom;
    use crate::external::MemoryCache;
    use crate::game::testing::{catalog, ScriptedRandom};
    use crate::store::{MemoryStore, PlayerProfile, RewardCatalog, RewardTier};

    fn entry(weight: u32, related_pool_id: PoolId) -> RewardPoolEntry {
        RewardPoolEntry {
            pool_id: 1,
            name: format!("w{}", weight),
            weight,
            related_pool_id,
        }
    }

    fn setup(random: Arc<dyn RandomSource>) -> (Arc<MemoryStore>, Arc<MemoryCache>, RewardResolver) {
        let store = Arc::new(MemoryStore::with_catalog(catalog()));
        let cache = Arc::new(MemoryCache::new());
        cache.set_repeat_compensation("200");
        with_transaction(store.as_ref(), |tx| {
            tx.put_profile(PlayerProfile::new(OwnerId::from("p1"), "p1", 5))
        })
        .unwrap();
        let resolver = RewardResolver::new(store.clone(), cache.clone(), random);
        (store, cache, resolver)
    }

    #[test]
    fn test_weighted_pick_boundaries() {
        let entries = vec![entry(70, 300), entry(20, 200), entry(10, 100)];

        let at = |roll: u64| {
            let random = ScriptedRandom::new(vec![roll]);
            weighted_pick(&entries, &random).unwrap().related_pool_id
        };
        assert_eq!(at(0), 300);
        assert_eq!(at(69), 300);
        assert_eq!(at(70), 200);
        assert_eq!(at(89), 200);
        assert_eq!(at(90), 100);
        assert_eq!(at(99), 100);
    }

    #[test]
    fn test_weighted_pick_empty_or_weightless() {
        let random = ScriptedRandom::new(vec![0]);
        assert!(weighted_pick(&[], &random).is_none());
        assert!(weighted_pick(&[entry(0, 1), entry(0, 2)], &random).is_none());
    }

    #[test]
    fn test_weighted_pick_frequencies() {
        let entries = vec![entry(70, 300), entry(20, 200), entry(10, 100)];
        let random = SeededRandom::new(2024);
        let trials = 20_000;
        let mut counts = [0usize; 3];

        for _ in 0..trials {
            match weighted_pick(&entries, &random).unwrap().related_pool_id {
                300 => counts[0] += 1,
                200 => counts[1] += 1,
                _ => counts[2] += 1,
            }
        }

        let expected = [0.70, 0.20, 0.10];
        for (count, want) in counts.iter().zip(expected) {
            let freq = *count as f64 / trials as f64;
            assert!((freq - want).abs() < 0.02, "frequency {} too far from {}", freq, want);
        }
    }

    #[test]
    fn test_resolve_grants_new_item() {
        let (store, _cache, resolver) = setup(Arc::new(ScriptedRandom::new(vec![0, 0])));

        let grant = resolver.resolve(&OwnerId::from("p1"), 9).unwrap();
        assert!(!grant.is_repeat());

        let tx = store.begin().unwrap();
        let owned = tx.owned_items(&OwnerId::from("p1")).unwrap();
        assert_eq!(owned.len(), 1);
        assert_eq!(owned[0].item_id, grant.item().id);
    }

    #[test]
    fn test_duplicate_grant_compensates() {
        let (store, _cache, resolver) = setup(Arc::new(ScriptedRandom::new(vec![0, 0, 0, 0])));
        let owner = OwnerId::from("p1");

        let first = resolver.resolve(&owner, 9).unwrap();
        let second = resolver.resolve(&owner, 9).unwrap();

        assert!(!first.is_repeat());
        match &second {
            RewardGrant::Repeat { compensation, item, .. } => {
                assert_eq!(*compensation, 200);
                assert_eq!(item.id, first.item().id);
            }
            other => panic!("expected repeat, got {:?}", other),
        }

        let tx = store.begin().unwrap();
        let owned: Vec<_> = tx
            .owned_items(&owner)
            .unwrap()
            .into_iter()
            .filter(|i| i.item_id == first.item().id)
            .collect();
        assert_eq!(owned.len(), 1);
        assert_eq!(tx.get_profile(&owner).unwrap().unwrap().balance, 200);
    }

    #[test]
    fn test_missing_tier_is_configuration_error() {
        let store = Arc::new(MemoryStore::with_catalog(RewardCatalog {
            tiers: vec![RewardTier { trophy_threshold: 3, reward_pool_id: 1 }],
            ..Default::default()
        }));
        let resolver = RewardResolver::new(
            store,
            Arc::new(MemoryCache::new()),
            Arc::new(ScriptedRandom::new(vec![0])),
        );
        let err = resolver.resolve(&OwnerId::from("p1"), 2).unwrap_err();
        assert!(matches!(err, EngineError::Configuration(_)));
    }

    #[test]
    fn test_missing_compensation_rolls_back() {
        let (store, cache, resolver) = setup(Arc::new(ScriptedRandom::new(vec![0, 0, 0, 0])));
        let owner = OwnerId::from("p1");
        resolver.resolve(&owner, 9).unwrap();

        // Unparsable compensation turns the repeat path into a dependency failure.
        cache.set_repeat_compensation("n/a");
        let err = resolver.resolve(&owner, 9).unwrap_err();
        assert!(matches!(err, EngineError::Dependency(_)));

        let tx = store.begin().unwrap();
        assert_eq!(tx.get_profile(&owner).unwrap().unwrap().balance, 0);
    }
}
