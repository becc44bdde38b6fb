//! Persistence Collaborator
//!
//! The engine never touches a database directly. It opens a transaction
//! scope through [`Store::begin`], reads and writes rows through
//! [`StoreTx`], and commits. Dropping a scope without committing rolls it
//! back, so an early `?` return leaves no partial state behind.
//!
//! [`MemoryStore`] is the in-process implementation used by tests and the
//! demo binary.

pub mod memory;
pub mod model;

pub use memory::MemoryStore;
pub use model::*;

/// Persistence errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// Backend unreachable or poisoned.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// Insert collided with an existing row.
    #[error("duplicate {entity} row: {key}")]
    Duplicate {
        /// Table name.
        entity: &'static str,
        /// Offending key.
        key: String,
    },

    /// Update targeted a row that does not exist.
    #[error("missing {entity} row: {key}")]
    Missing {
        /// Table name.
        entity: &'static str,
        /// Missing key.
        key: String,
    },
}

/// Source of transaction scopes and match ids.
pub trait Store: Send + Sync {
    /// Open a transaction scope.
    fn begin(&self) -> Result<Box<dyn StoreTx + '_>, StoreError>;

    /// Allocate a fresh, monotonically increasing match id.
    fn next_match_id(&self) -> Result<MatchId, StoreError>;
}

/// Reads and writes inside one atomic scope.
pub trait StoreTx {
    // ── Matches ────────────────────────────────────────────────

    /// Load a match by id.
    fn get_match(&self, id: MatchId) -> Result<Option<MatchRecord>, StoreError>;

    /// Insert a new match.
    fn insert_match(&mut self, record: MatchRecord) -> Result<(), StoreError>;

    /// Overwrite an existing match.
    fn update_match(&mut self, record: &MatchRecord) -> Result<(), StoreError>;

    /// Number of matches ever started by `owner`.
    fn count_matches(&self, owner: &OwnerId) -> Result<u64, StoreError>;

    // ── Round audit ────────────────────────────────────────────

    /// Most recent audit row for (owner, match).
    fn last_round_result(
        &self,
        owner: &OwnerId,
        match_id: MatchId,
    ) -> Result<Option<RoundResultRecord>, StoreError>;

    /// Whether an audit row exists for (match, round).
    fn round_result_exists(&self, match_id: MatchId, round: u32) -> Result<bool, StoreError>;

    /// Append an audit row.
    fn insert_round_result(&mut self, record: RoundResultRecord) -> Result<(), StoreError>;

    // ── Revive ─────────────────────────────────────────────────

    /// Revive marker for (owner, match), if consumed.
    fn revive_record(
        &self,
        owner: &OwnerId,
        match_id: MatchId,
    ) -> Result<Option<ReviveRecord>, StoreError>;

    /// Record a consumed revive.
    fn insert_revive(&mut self, record: ReviveRecord) -> Result<(), StoreError>;

    // ── Players ────────────────────────────────────────────────

    /// Load a player profile.
    fn get_profile(&self, owner: &OwnerId) -> Result<Option<PlayerProfile>, StoreError>;

    /// Insert or replace a player profile.
    fn put_profile(&mut self, profile: PlayerProfile) -> Result<(), StoreError>;

    // ── Reward catalog ─────────────────────────────────────────

    /// Tier with the greatest threshold not above `trophies`.
    fn reward_tier_for(&self, trophies: u8) -> Result<Option<RewardTier>, StoreError>;

    /// Entries of a reward pool, heaviest first, ties in stored order.
    fn reward_pool_entries(&self, pool_id: PoolId) -> Result<Vec<RewardPoolEntry>, StoreError>;

    /// Candidate item ids of an item pool.
    fn item_pool(&self, related_pool_id: PoolId) -> Result<Vec<ItemId>, StoreError>;

    /// Item definition by id.
    fn item_definition(&self, item_id: ItemId) -> Result<Option<ItemDefinition>, StoreError>;

    // ── Inventory ──────────────────────────────────────────────

    /// Existing grant of `item_id` to `owner`.
    fn owned_item(&self, owner: &OwnerId, item_id: ItemId) -> Result<Option<OwnedItem>, StoreError>;

    /// All items owned by `owner`.
    fn owned_items(&self, owner: &OwnerId) -> Result<Vec<OwnedItem>, StoreError>;

    /// Persist a grant.
    fn insert_owned_item(&mut self, item: OwnedItem) -> Result<(), StoreError>;

    // ── Lineups ────────────────────────────────────────────────

    /// Delete every snapshot row for (owner, match, round). Returns rows removed.
    fn delete_snapshots(
        &mut self,
        owner: &OwnerId,
        match_id: MatchId,
        round: u32,
    ) -> Result<usize, StoreError>;

    /// Insert one snapshot row.
    fn insert_snapshot(&mut self, snapshot: TeamSlotSnapshot) -> Result<(), StoreError>;

    /// Every snapshot row saved for `round`, across all owners.
    fn snapshots_for_round(&self, round: u32) -> Result<Vec<TeamSlotSnapshot>, StoreError>;

    /// Snapshot rows for (owner, match, round).
    fn snapshots_for(
        &self,
        owner: &OwnerId,
        match_id: MatchId,
        round: u32,
    ) -> Result<Vec<TeamSlotSnapshot>, StoreError>;

    /// Highest round with saved snapshots for (owner, match).
    fn latest_snapshot_round(
        &self,
        owner: &OwnerId,
        match_id: MatchId,
    ) -> Result<Option<u32>, StoreError>;

    // ── Coins ──────────────────────────────────────────────────

    /// Coin record of a match.
    fn coin_record(&self, match_id: MatchId) -> Result<Option<CoinRecord>, StoreError>;

    /// Insert or overwrite the coin record of a match.
    fn upsert_coin(&mut self, record: CoinRecord) -> Result<(), StoreError>;

    // ── Characters & cosmetics ─────────────────────────────────

    /// Character definition by id.
    fn character(&self, id: CharacterId) -> Result<Option<CharacterDefinition>, StoreError>;

    /// Whether `unlock` is already recorded.
    fn has_cosmetic_unlock(&self, unlock: &CosmeticUnlock) -> Result<bool, StoreError>;

    /// Record a cosmetic unlock.
    fn insert_cosmetic_unlock(&mut self, unlock: CosmeticUnlock) -> Result<(), StoreError>;

    /// Every cosmetic unlock of `owner`.
    fn cosmetic_unlocks(&self, owner: &OwnerId) -> Result<Vec<CosmeticUnlock>, StoreError>;

    // ── Scope ──────────────────────────────────────────────────

    /// Atomically apply every write made in this scope.
    fn commit(self: Box<Self>) -> Result<(), StoreError>;
}

/// Run `f` inside a transaction scope.
///
/// Commits when `f` succeeds; any error drops the scope, which rolls it
/// back. `f` must not open a second scope on the same store.
pub fn with_transaction<T, E, F>(store: &dyn Store, f: F) -> Result<T, E>
where
    F: FnOnce(&mut dyn StoreTx) -> Result<T, E>,
    E: From<StoreError>,
{
    let mut tx = store.begin()?;
    let value = f(tx.as_mut())?;
    tx.commit()?;
    Ok(value)
}
