//! Shared fixtures for engine unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};

use crate::core::rng::RandomSource;
use crate::store::{
    CharacterDefinition, ItemDefinition, ItemKind, ItemPoolEntry, RewardCatalog, RewardPoolEntry,
    RewardTier,
};

/// Replays a fixed script of draws, cycling when exhausted.
pub(crate) struct ScriptedRandom {
    script: Vec<u64>,
    cursor: AtomicUsize,
}

impl ScriptedRandom {
    pub(crate) fn new(script: Vec<u64>) -> Self {
        Self {
            script,
            cursor: AtomicUsize::new(0),
        }
    }
}

impl RandomSource for ScriptedRandom {
    fn below(&self, bound: u64) -> u64 {
        if bound == 0 || self.script.is_empty() {
            return 0;
        }
        let i = self.cursor.fetch_add(1, Ordering::SeqCst) % self.script.len();
        self.script[i] % bound
    }
}

fn item(id: u32, kind: ItemKind) -> ItemDefinition {
    ItemDefinition {
        id,
        kind,
        name: format!("item-{}", id),
        description: String::new(),
        resource_url: String::new(),
        price_type: 0,
        price: 0,
    }
}

fn entry(pool_id: u32, weight: u32, related_pool_id: u32) -> RewardPoolEntry {
    RewardPoolEntry {
        pool_id,
        name: format!("pool-{}-{}", pool_id, related_pool_id),
        weight,
        related_pool_id,
    }
}

/// Two tiers (0 and 9 trophies) over three item pools and five items.
pub(crate) fn catalog() -> RewardCatalog {
    let item_pools = [(100, 1), (100, 2), (200, 3), (300, 4), (300, 5)]
        .into_iter()
        .map(|(related_pool_id, item_id)| ItemPoolEntry { related_pool_id, item_id })
        .collect();

    RewardCatalog {
        tiers: vec![
            RewardTier { trophy_threshold: 0, reward_pool_id: 1 },
            RewardTier { trophy_threshold: 9, reward_pool_id: 2 },
        ],
        pools: vec![
            entry(1, 10, 100),
            // Stored lightest first; the store must order them heaviest first.
            entry(2, 10, 100),
            entry(2, 20, 200),
            entry(2, 70, 300),
        ],
        item_pools,
        items: vec![
            item(1, ItemKind::Stand),
            item(2, ItemKind::Background),
            item(3, ItemKind::Expression),
            item(4, ItemKind::Appearance),
            item(5, ItemKind::Stand),
        ],
        characters: vec![
            CharacterDefinition {
                id: 7,
                name: "Ember".into(),
                avatar_unlock_type: 2,
                portrait_unlock_type: 2,
            },
            CharacterDefinition {
                id: 8,
                name: "Frost".into(),
                avatar_unlock_type: 2,
                portrait_unlock_type: 1,
            },
            CharacterDefinition {
                id: 9,
                name: "Moss".into(),
                avatar_unlock_type: 0,
                portrait_unlock_type: 0,
            },
        ],
    }
}
