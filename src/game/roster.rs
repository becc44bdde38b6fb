//! Lineup Write Path
//!
//! A roster save replaces the (owner, match, round) snapshot set in one
//! transaction: old rows are deleted, then either one row per slot or a
//! single sentinel row for an empty lineup is inserted. Matchmaking reads
//! the same rows, so it only ever sees a complete lineup.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::{debug, info};

use crate::game::error::{EngineError, EngineResult, StateViolation};
use crate::store::{
    with_transaction, MatchId, MatchRecord, OwnerId, Store, StoreTx, TeamSlot, TeamSlotSnapshot,
};
use crate::MAX_LINEUP_SLOTS;

/// Result of a roster save.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedRoster {
    /// Match the lineup was saved for, as read inside the save.
    pub record: MatchRecord,
    /// Rows now stored for (owner, match, round).
    pub rows: Vec<TeamSlotSnapshot>,
}

/// Reject the operation unless the match can still be played.
pub(crate) fn ensure_playable(
    tx: &dyn StoreTx,
    record: &MatchRecord,
    trophies_to_win: u8,
) -> EngineResult<()> {
    let revive_consumed =
        record.health == 0 && tx.revive_record(&record.owner, record.id)?.is_some();
    if record.is_terminal(trophies_to_win, revive_consumed) {
        return Err(StateViolation::Finalized.into());
    }
    if record.health == 0 {
        return Err(StateViolation::RevivePending.into());
    }
    Ok(())
}

/// Check slot positions and levels before anything is written.
pub fn validate_slots(slots: &[TeamSlot]) -> EngineResult<()> {
    if slots.len() > MAX_LINEUP_SLOTS {
        return Err(EngineError::Validation(format!(
            "lineup has {} slots, at most {} allowed",
            slots.len(),
            MAX_LINEUP_SLOTS
        )));
    }
    let mut seen = BTreeSet::new();
    for slot in slots {
        if !slot.has_board_position() {
            return Err(EngineError::Validation(format!("invalid slot position {}", slot.position)));
        }
        if !seen.insert(slot.position) {
            return Err(EngineError::Validation(format!("duplicate slot position {}", slot.position)));
        }
        if slot.level == 0 {
            return Err(EngineError::Validation(format!(
                "character {} has level 0",
                slot.character_id
            )));
        }
    }
    Ok(())
}

/// Saves per-round lineups.
pub struct TeamRoster {
    store: Arc<dyn Store>,
    trophies_to_win: u8,
}

impl TeamRoster {
    /// Create a roster writer.
    pub fn new(store: Arc<dyn Store>, trophies_to_win: u8) -> Self {
        Self { store, trophies_to_win }
    }

    /// Replace the lineup of `match_id` for `round`.
    ///
    /// `round` must be the match's current round.
    pub fn save_roster(&self, match_id: MatchId, round: u32, slots: &[TeamSlot]) -> EngineResult<SavedRoster> {
        self.save(None, match_id, round, slots)
    }

    /// Like [`save_roster`](Self::save_roster), but also rejects a match
    /// not owned by `owner`.
    pub fn save_owned_roster(
        &self,
        owner: &OwnerId,
        match_id: MatchId,
        round: u32,
        slots: &[TeamSlot],
    ) -> EngineResult<SavedRoster> {
        self.save(Some(owner), match_id, round, slots)
    }

    fn save(
        &self,
        owner: Option<&OwnerId>,
        match_id: MatchId,
        round: u32,
        slots: &[TeamSlot],
    ) -> EngineResult<SavedRoster> {
        validate_slots(slots)?;

        let saved = with_transaction(self.store.as_ref(), |tx| -> EngineResult<SavedRoster> {
            let record = tx
                .get_match(match_id)?
                .ok_or_else(|| EngineError::match_not_found(match_id))?;
            if owner.is_some_and(|o| o != &record.owner) {
                return Err(EngineError::Ownership(match_id));
            }
            ensure_playable(tx, &record, self.trophies_to_win)?;
            if record.round != round {
                return Err(EngineError::Validation(format!(
                    "round {} does not match current round {}",
                    round, record.round
                )));
            }

            let removed = tx.delete_snapshots(&record.owner, match_id, round)?;
            if removed > 0 {
                debug!(match_id = %match_id, round, removed, "replacing saved lineup");
            }

            let snapshot = |slot: TeamSlot| TeamSlotSnapshot {
                match_id,
                owner: record.owner.clone(),
                round,
                trophies: record.trophies,
                slot,
            };
            let rows: Vec<TeamSlotSnapshot> = if slots.is_empty() {
                vec![snapshot(TeamSlot::sentinel())]
            } else {
                slots.iter().cloned().map(snapshot).collect()
            };
            for row in &rows {
                tx.insert_snapshot(row.clone())?;
            }

            Ok(SavedRoster { record, rows })
        })?;

        info!(
            match_id = %match_id,
            owner = %saved.record.owner,
            round,
            slots = slots.len(),
            "lineup saved"
        );
        Ok(saved)
    }
}
