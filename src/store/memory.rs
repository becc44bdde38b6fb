//! In-Memory Store
//!
//! Reference [`Store`] backed by plain collections behind a mutex. A
//! transaction holds the lock for its whole lifetime. Reads go to the locked
//! tables until the first write, which takes a private copy; `commit` swaps
//! the copy in, dropping discards it.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::debug;

use super::model::*;
use super::{Store, StoreError, StoreTx};

#[derive(Clone, Debug, Default)]
struct Tables {
    matches: BTreeMap<MatchId, MatchRecord>,
    round_results: Vec<RoundResultRecord>,
    revives: Vec<ReviveRecord>,
    profiles: BTreeMap<OwnerId, PlayerProfile>,
    tiers: Vec<RewardTier>,
    pools: Vec<RewardPoolEntry>,
    item_pools: Vec<ItemPoolEntry>,
    items: BTreeMap<ItemId, ItemDefinition>,
    owned_items: Vec<OwnedItem>,
    snapshots: Vec<TeamSlotSnapshot>,
    coins: BTreeMap<MatchId, CoinRecord>,
    characters: BTreeMap<CharacterId, CharacterDefinition>,
    unlocks: Vec<CosmeticUnlock>,
}

/// Mutex-guarded in-process store.
#[derive(Debug)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    next_id: AtomicU64,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Empty store; match ids start at 1.
    pub fn new() -> Self {
        Self {
            tables: Mutex::new(Tables::default()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Store preloaded with a reward/character catalog.
    pub fn with_catalog(catalog: RewardCatalog) -> Self {
        let store = Self::new();
        {
            let mut tables = store.tables.lock().unwrap_or_else(PoisonError::into_inner);
            tables.tiers = catalog.tiers;
            tables.pools = catalog.pools;
            tables.item_pools = catalog.item_pools;
            tables.items = catalog.items.into_iter().map(|i| (i.id, i)).collect();
            tables.characters = catalog.characters.into_iter().map(|c| (c.id, c)).collect();
        }
        store
    }

    fn lock(&self) -> Result<MutexGuard<'_, Tables>, StoreError> {
        self.tables
            .lock()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".into()))
    }
}

impl Store for MemoryStore {
    fn begin(&self) -> Result<Box<dyn StoreTx + '_>, StoreError> {
        let guard = self.lock()?;
        Ok(Box::new(MemoryTx {
            guard,
            working: None,
        }))
    }

    fn next_match_id(&self) -> Result<MatchId, StoreError> {
        Ok(MatchId(self.next_id.fetch_add(1, Ordering::SeqCst)))
    }
}

struct MemoryTx<'a> {
    guard: MutexGuard<'a, Tables>,
    /// Copy of the tables, taken on the first write.
    working: Option<Tables>,
}

impl MemoryTx<'_> {
    fn tables(&self) -> &Tables {
        self.working.as_ref().unwrap_or(&*self.guard)
    }

    fn tables_mut(&mut self) -> &mut Tables {
        let MemoryTx { guard, working } = self;
        working.get_or_insert_with(|| Tables::clone(&**guard))
    }
}

impl StoreTx for MemoryTx<'_> {
    fn get_match(&self, id: MatchId) -> Result<Option<MatchRecord>, StoreError> {
        Ok(self.tables().matches.get(&id).cloned())
    }

    fn insert_match(&mut self, record: MatchRecord) -> Result<(), StoreError> {
        if self.tables().matches.contains_key(&record.id) {
            return Err(StoreError::Duplicate {
                entity: "match",
                key: record.id.to_string(),
            });
        }
        self.tables_mut().matches.insert(record.id, record);
        Ok(())
    }

    fn update_match(&mut self, record: &MatchRecord) -> Result<(), StoreError> {
        match self.tables_mut().matches.get_mut(&record.id) {
            Some(existing) => {
                *existing = record.clone();
                Ok(())
            }
            None => Err(StoreError::Missing {
                entity: "match",
                key: record.id.to_string(),
            }),
        }
    }

    fn count_matches(&self, owner: &OwnerId) -> Result<u64, StoreError> {
        Ok(self.tables().matches.values().filter(|m| &m.owner == owner).count() as u64)
    }

    fn last_round_result(
        &self,
        owner: &OwnerId,
        match_id: MatchId,
    ) -> Result<Option<RoundResultRecord>, StoreError> {
        // Later insertions win ties on round.
        Ok(self
            .tables()
            .round_results
            .iter()
            .filter(|r| &r.owner == owner && r.match_id == match_id)
            .fold(None::<&RoundResultRecord>, |best, r| match best {
                Some(b) if b.round > r.round => Some(b),
                _ => Some(r),
            })
            .cloned())
    }

    fn round_result_exists(&self, match_id: MatchId, round: u32) -> Result<bool, StoreError> {
        Ok(self
            .tables()
            .round_results
            .iter()
            .any(|r| r.match_id == match_id && r.round == round))
    }

    fn insert_round_result(&mut self, record: RoundResultRecord) -> Result<(), StoreError> {
        self.tables_mut().round_results.push(record);
        Ok(())
    }

    fn revive_record(
        &self,
        owner: &OwnerId,
        match_id: MatchId,
    ) -> Result<Option<ReviveRecord>, StoreError> {
        Ok(self
            .tables()
            .revives
            .iter()
            .find(|r| &r.owner == owner && r.match_id == match_id)
            .cloned())
    }

    fn insert_revive(&mut self, record: ReviveRecord) -> Result<(), StoreError> {
        self.tables_mut().revives.push(record);
        Ok(())
    }

    fn get_profile(&self, owner: &OwnerId) -> Result<Option<PlayerProfile>, StoreError> {
        Ok(self.tables().profiles.get(owner).cloned())
    }

    fn put_profile(&mut self, profile: PlayerProfile) -> Result<(), StoreError> {
        self.tables_mut().profiles.insert(profile.owner.clone(), profile);
        Ok(())
    }

    fn reward_tier_for(&self, trophies: u8) -> Result<Option<RewardTier>, StoreError> {
        Ok(self
            .tables()
            .tiers
            .iter()
            .filter(|t| t.trophy_threshold <= trophies)
            .max_by_key(|t| t.trophy_threshold)
            .cloned())
    }

    fn reward_pool_entries(&self, pool_id: PoolId) -> Result<Vec<RewardPoolEntry>, StoreError> {
        let mut entries: Vec<RewardPoolEntry> = self
            .tables()
            .pools
            .iter()
            .filter(|p| p.pool_id == pool_id)
            .cloned()
            .collect();
        // Stable: equal weights keep insertion order.
        entries.sort_by(|a, b| b.weight.cmp(&a.weight));
        Ok(entries)
    }

    fn item_pool(&self, related_pool_id: PoolId) -> Result<Vec<ItemId>, StoreError> {
        Ok(self
            .tables()
            .item_pools
            .iter()
            .filter(|e| e.related_pool_id == related_pool_id)
            .map(|e| e.item_id)
            .collect())
    }

    fn item_definition(&self, item_id: ItemId) -> Result<Option<ItemDefinition>, StoreError> {
        Ok(self.tables().items.get(&item_id).cloned())
    }

    fn owned_item(&self, owner: &OwnerId, item_id: ItemId) -> Result<Option<OwnedItem>, StoreError> {
        Ok(self
            .tables()
            .owned_items
            .iter()
            .find(|i| &i.owner == owner && i.item_id == item_id)
            .cloned())
    }

    fn owned_items(&self, owner: &OwnerId) -> Result<Vec<OwnedItem>, StoreError> {
        Ok(self
            .tables()
            .owned_items
            .iter()
            .filter(|i| &i.owner == owner)
            .cloned()
            .collect())
    }

    fn insert_owned_item(&mut self, item: OwnedItem) -> Result<(), StoreError> {
        self.tables_mut().owned_items.push(item);
        Ok(())
    }

    fn delete_snapshots(
        &mut self,
        owner: &OwnerId,
        match_id: MatchId,
        round: u32,
    ) -> Result<usize, StoreError> {
        let snapshots = &mut self.tables_mut().snapshots;
        let before = snapshots.len();
        snapshots.retain(|s| !(&s.owner == owner && s.match_id == match_id && s.round == round));
        Ok(before - snapshots.len())
    }

    fn insert_snapshot(&mut self, snapshot: TeamSlotSnapshot) -> Result<(), StoreError> {
        self.tables_mut().snapshots.push(snapshot);
        Ok(())
    }

    fn snapshots_for_round(&self, round: u32) -> Result<Vec<TeamSlotSnapshot>, StoreError> {
        Ok(self
            .tables()
            .snapshots
            .iter()
            .filter(|s| s.round == round)
            .cloned()
            .collect())
    }

    fn snapshots_for(
        &self,
        owner: &OwnerId,
        match_id: MatchId,
        round: u32,
    ) -> Result<Vec<TeamSlotSnapshot>, StoreError> {
        Ok(self
            .tables()
            .snapshots
            .iter()
            .filter(|s| &s.owner == owner && s.match_id == match_id && s.round == round)
            .cloned()
            .collect())
    }

    fn latest_snapshot_round(
        &self,
        owner: &OwnerId,
        match_id: MatchId,
    ) -> Result<Option<u32>, StoreError> {
        Ok(self
            .tables()
            .snapshots
            .iter()
            .filter(|s| &s.owner == owner && s.match_id == match_id)
            .map(|s| s.round)
            .max())
    }

    fn coin_record(&self, match_id: MatchId) -> Result<Option<CoinRecord>, StoreError> {
        Ok(self.tables().coins.get(&match_id).cloned())
    }

    fn upsert_coin(&mut self, record: CoinRecord) -> Result<(), StoreError> {
        self.tables_mut().coins.insert(record.match_id, record);
        Ok(())
    }

    fn character(&self, id: CharacterId) -> Result<Option<CharacterDefinition>, StoreError> {
        Ok(self.tables().characters.get(&id).cloned())
    }

    fn has_cosmetic_unlock(&self, unlock: &CosmeticUnlock) -> Result<bool, StoreError> {
        Ok(self.tables().unlocks.contains(unlock))
    }

    fn insert_cosmetic_unlock(&mut self, unlock: CosmeticUnlock) -> Result<(), StoreError> {
        self.tables_mut().unlocks.push(unlock);
        Ok(())
    }

    fn cosmetic_unlocks(&self, owner: &OwnerId) -> Result<Vec<CosmeticUnlock>, StoreError> {
        Ok(self
            .tables()
            .unlocks
            .iter()
            .filter(|u| &u.owner == owner)
            .cloned()
            .collect())
    }

    fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let MemoryTx { mut guard, working } = *self;
        match working {
            Some(tables) => {
                *guard = tables;
                debug!("memory store transaction committed");
            }
            None => debug!("read-only memory store transaction closed"),
        }
        Ok(())
    }
}
