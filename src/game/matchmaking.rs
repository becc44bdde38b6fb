//! Asynchronous Opponent Selection
//!
//! Opponents are lineups other players saved for the same round. Only
//! owners with more than one real (non-sentinel) slot that round are
//! eligible, so a half-saved or empty lineup is never served.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::rng::{pick, RandomSource};
use crate::game::error::EngineResult;
use crate::store::{MatchId, OwnerId, Store, StoreTx, TeamSlotSnapshot};

/// A lineup served as an opponent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpponentLineup {
    /// Lineup owner.
    pub owner: OwnerId,
    /// Match the lineup was saved in.
    pub match_id: MatchId,
    /// Round the lineup was saved for.
    pub round: u32,
    /// Every row saved for (owner, match, round).
    pub slots: Vec<TeamSlotSnapshot>,
}

/// Result of an opponent draw.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OpponentPick {
    /// An eligible lineup was drawn.
    Found(OpponentLineup),
    /// Nobody else has a usable lineup for the round.
    NoOpponent,
}

impl OpponentPick {
    /// The drawn lineup, if any.
    pub fn lineup(&self) -> Option<&OpponentLineup> {
        match self {
            OpponentPick::Found(lineup) => Some(lineup),
            OpponentPick::NoOpponent => None,
        }
    }
}

/// Draws opponent lineups from saved snapshots.
pub struct MatchmakingSelector {
    store: Arc<dyn Store>,
    random: Arc<dyn RandomSource>,
}

impl MatchmakingSelector {
    /// Create a selector.
    pub fn new(store: Arc<dyn Store>, random: Arc<dyn RandomSource>) -> Self {
        Self { store, random }
    }

    /// Pick an opponent for `round`, never one owned by `exclude`.
    pub fn pick_opponent(&self, round: u32, exclude: &OwnerId) -> EngineResult<OpponentPick> {
        let tx = self.store.begin()?;
        self.pick_opponent_in(tx.as_ref(), round, exclude)
    }

    /// Same as [`pick_opponent`](Self::pick_opponent) inside an open scope.
    pub fn pick_opponent_in(
        &self,
        tx: &dyn StoreTx,
        round: u32,
        exclude: &OwnerId,
    ) -> EngineResult<OpponentPick> {
        let rows = tx.snapshots_for_round(round)?;

        // owner -> match ids with real slots, plus the owner's real-slot count.
        let mut candidates: BTreeMap<&OwnerId, (usize, BTreeSet<MatchId>)> = BTreeMap::new();
        for row in rows.iter().filter(|r| &r.owner != exclude && !r.is_sentinel()) {
            let entry = candidates.entry(&row.owner).or_default();
            entry.0 += 1;
            entry.1.insert(row.match_id);
        }

        let eligible: Vec<(&OwnerId, Vec<MatchId>)> = candidates
            .into_iter()
            .filter(|(_, (count, _))| *count > 1)
            .map(|(owner, (_, matches))| (owner, matches.into_iter().collect()))
            .collect();

        let Some((owner, matches)) = pick(self.random.as_ref(), &eligible) else {
            debug!(round, "no eligible opponent lineup");
            return Ok(OpponentPick::NoOpponent);
        };
        let Some(&match_id) = pick(self.random.as_ref(), matches) else {
            return Ok(OpponentPick::NoOpponent);
        };

        let slots = tx.snapshots_for(owner, match_id, round)?;
        debug!(round, opponent = %owner, match_id = %match_id, slots = slots.len(), "opponent drawn");

        Ok(OpponentPick::Found(OpponentLineup {
            owner: (*owner).clone(),
            match_id,
            round,
            slots,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::rng::SeededRandom;
    use crate::game::testing::ScriptedRandom;
    use crate::store::{with_transaction, MemoryStore, StoreError, TeamSlot};

    fn slot(position: u16) -> TeamSlot {
        TeamSlot {
            position,
            character_id: 100 + position as u32,
            level: 1,
            base_attack: 2,
            base_hp: 3,
            ..Default::default()
        }
    }

    fn save(store: &MemoryStore, owner: &str, match_id: u64, round: u32, slots: Vec<TeamSlot>) {
        with_transaction(store, |tx| -> Result<(), StoreError> {
            for slot in slots {
                tx.insert_snapshot(TeamSlotSnapshot {
                    match_id: MatchId(match_id),
                    owner: OwnerId::from(owner),
                    round,
                    trophies: 0,
                    slot,
                })?;
            }
            Ok(())
        })
        .unwrap();
    }

    fn selector(store: Arc<MemoryStore>, random: Arc<dyn RandomSource>) -> MatchmakingSelector {
        MatchmakingSelector::new(store, random)
    }

    #[test]
    fn test_no_opponent_when_empty() {
        let store = Arc::new(MemoryStore::new());
        let selector = selector(store, Arc::new(ScriptedRandom::new(vec![0])));
        let pick = selector.pick_opponent(1, &OwnerId::from("me")).unwrap();
        assert_eq!(pick, OpponentPick::NoOpponent);
    }

    #[test]
    fn test_excludes_self_sentinel_and_single_slot() {
        let store = Arc::new(MemoryStore::new());
        save(&store, "me", 1, 2, vec![slot(0), slot(1), slot(2)]);
        save(&store, "empty", 2, 2, vec![TeamSlot::sentinel()]);
        save(&store, "solo", 3, 2, vec![slot(0)]);
        save(&store, "other-round", 4, 3, vec![slot(0), slot(1)]);

        let selector = selector(store, Arc::new(ScriptedRandom::new(vec![0])));
        assert_eq!(
            selector.pick_opponent(2, &OwnerId::from("me")).unwrap(),
            OpponentPick::NoOpponent
        );
    }

    #[test]
    fn test_returns_full_lineup_of_drawn_match() {
        let store = Arc::new(MemoryStore::new());
        save(&store, "rival", 10, 4, vec![slot(0), slot(1), slot(3)]);
        save(&store, "rival", 11, 4, vec![slot(0), slot(2)]);

        // First draw picks the owner, second picks the second match id.
        let selector = selector(store, Arc::new(ScriptedRandom::new(vec![0, 1])));
        let pick = selector.pick_opponent(4, &OwnerId::from("me")).unwrap();
        let lineup = pick.lineup().expect("opponent expected");
        assert_eq!(lineup.owner, OwnerId::from("rival"));
        assert_eq!(lineup.match_id, MatchId(11));
        assert_eq!(lineup.slots.len(), 2);
        assert!(lineup.slots.iter().all(|s| s.round == 4 && s.match_id == MatchId(11)));
    }

    #[test]
    fn test_never_serves_excluded_or_sentinel() {
        let store = Arc::new(MemoryStore::new());
        save(&store, "me", 1, 1, vec![slot(0), slot(1)]);
        save(&store, "a", 2, 1, vec![slot(0), slot(1)]);
        save(&store, "b", 3, 1, vec![slot(0), slot(1), slot(2)]);
        save(&store, "b", 4, 1, vec![TeamSlot::sentinel()]);
        save(&store, "c", 5, 1, vec![TeamSlot::sentinel()]);

        let selector = selector(store, Arc::new(SeededRandom::new(31)));
        for _ in 0..200 {
            let pick = selector.pick_opponent(1, &OwnerId::from("me")).unwrap();
            let lineup = pick.lineup().expect("opponent expected");
            assert_ne!(lineup.owner, OwnerId::from("me"));
            assert!(!lineup.slots.is_empty());
            assert!(lineup.slots.iter().all(|s| !s.is_sentinel()));
        }
    }
}
