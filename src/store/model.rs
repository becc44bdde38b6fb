//! Persistent Entities
//!
//! Row types owned by the persistence collaborator. The engine reads and
//! writes them only through [`StoreTx`](super::StoreTx).

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{MAX_LINEUP_SLOTS, SENTINEL_POSITION};

// =============================================================================
// IDENTIFIERS
// =============================================================================

/// Opaque owner identity issued by the identity oracle.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerId(pub String);

impl OwnerId {
    /// Create from any string-like value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw identity string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for OwnerId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Unique match identifier, allocated monotonically by the store.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MatchId(pub u64);

impl fmt::Display for MatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Item catalog identifier.
pub type ItemId = u32;

/// Reward pool identifier (both tier pools and item pools).
pub type PoolId = u32;

/// Character catalog identifier.
pub type CharacterId = u32;

// =============================================================================
// MATCH RECORD
// =============================================================================

/// How a finalized match ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchOutcome {
    /// Reached the trophy target.
    Victory,
    /// Ran out of health after the revive was spent.
    Defeat,
}

/// Durable state of one play-through.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchRecord {
    /// Unique match id.
    pub id: MatchId,
    /// Owner of the match.
    pub owner: OwnerId,
    /// Remaining health (0..=max).
    pub health: u8,
    /// Trophies collected (0..=target).
    pub trophies: u8,
    /// Current round, advanced on every result submission.
    pub round: u32,
    /// Set once the match is over; no further submissions are accepted.
    pub finalized: bool,
    /// Final outcome, present once finalized.
    pub outcome: Option<MatchOutcome>,
    /// Coin balance the client carried out of the last roster save.
    pub last_balance: i64,
    /// Round in which `last_balance` was recorded.
    pub last_balance_round: u32,
}

impl MatchRecord {
    /// Fresh match at full health.
    pub fn new(id: MatchId, owner: OwnerId, health: u8) -> Self {
        Self {
            id,
            owner,
            health,
            trophies: 0,
            round: 0,
            finalized: false,
            outcome: None,
            last_balance: 0,
            last_balance_round: 0,
        }
    }

    /// Terminal once the trophy target is reached, or health is gone and
    /// the revive grace has already been used.
    pub fn is_terminal(&self, trophies_to_win: u8, revive_consumed: bool) -> bool {
        self.finalized
            || self.trophies >= trophies_to_win
            || (self.health == 0 && revive_consumed)
    }
}

// =============================================================================
// ROUND RESULTS
// =============================================================================

/// Result of one round as reported by the client.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundOutcome {
    /// Round won.
    Win,
    /// Round lost.
    Loss,
    /// Round drawn.
    Draw,
}

impl RoundOutcome {
    /// Code stored on the audit row.
    pub fn audit_code(self) -> i8 {
        match self {
            RoundOutcome::Win => 1,
            RoundOutcome::Loss => -1,
            RoundOutcome::Draw => 0,
        }
    }

    /// Parse an audit code back into an outcome.
    pub fn from_audit_code(code: i8) -> Option<Self> {
        match code {
            1 => Some(RoundOutcome::Win),
            -1 => Some(RoundOutcome::Loss),
            0 => Some(RoundOutcome::Draw),
            _ => None,
        }
    }
}

/// Audit row written for every submitted round.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundResultRecord {
    /// Submitting owner.
    pub owner: OwnerId,
    /// Match the round belongs to.
    pub match_id: MatchId,
    /// Round number at submission time.
    pub round: u32,
    /// Reported outcome, persisted as its audit code.
    #[serde(serialize_with = "serialize_audit_code", deserialize_with = "deserialize_audit_code")]
    pub outcome: RoundOutcome,
    /// Insert time.
    pub created_at: DateTime<Utc>,
}

fn serialize_audit_code<S>(outcome: &RoundOutcome, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_i8(outcome.audit_code())
}

fn deserialize_audit_code<'de, D>(deserializer: D) -> Result<RoundOutcome, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let code = i8::deserialize(deserializer)?;
    RoundOutcome::from_audit_code(code)
        .ok_or_else(|| serde::de::Error::custom(format!("unknown audit code: {}", code)))
}

/// One-time revive grace marker.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviveRecord {
    /// Owner who revived.
    pub owner: OwnerId,
    /// Match that was revived.
    pub match_id: MatchId,
    /// When the revive was consumed.
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// LINEUPS
// =============================================================================

/// One character placed in a lineup, as submitted by the client.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamSlot {
    /// Board position (0..5) or the "no lineup" sentinel.
    pub position: u16,
    /// Character catalog id.
    pub character_id: CharacterId,
    /// Character level.
    pub level: u8,
    /// Base attack.
    pub base_attack: i32,
    /// Attack buff lasting this round.
    pub temp_attack: i32,
    /// Permanent attack buff.
    pub perm_attack: i32,
    /// Base health.
    pub base_hp: i32,
    /// Health buff lasting this round.
    pub temp_hp: i32,
    /// Permanent health buff.
    pub perm_hp: i32,
    /// Whether the extra skill is active.
    pub extra_skill: bool,
}

impl TeamSlot {
    /// Placeholder row recorded when the owner saved an empty lineup.
    pub fn sentinel() -> Self {
        Self {
            position: SENTINEL_POSITION,
            ..Default::default()
        }
    }

    /// Whether this is the "no lineup" placeholder.
    pub fn is_sentinel(&self) -> bool {
        self.position == SENTINEL_POSITION
    }

    /// Whether the position is a real board slot.
    pub fn has_board_position(&self) -> bool {
        (self.position as usize) < MAX_LINEUP_SLOTS
    }
}

/// A saved lineup slot for one (owner, match, round).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamSlotSnapshot {
    /// Match the lineup belongs to.
    pub match_id: MatchId,
    /// Owner of the lineup.
    pub owner: OwnerId,
    /// Round the lineup was saved for.
    pub round: u32,
    /// Match trophies when the lineup was saved.
    pub trophies: u8,
    /// Slot contents.
    #[serde(flatten)]
    pub slot: TeamSlot,
}

impl TeamSlotSnapshot {
    /// Whether this row is the "no lineup" placeholder.
    pub fn is_sentinel(&self) -> bool {
        self.slot.is_sentinel()
    }
}

// =============================================================================
// REWARD CATALOG
// =============================================================================

/// Maps a trophy threshold to the reward pool drawn from.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardTier {
    /// Minimum trophies for this tier.
    pub trophy_threshold: u8,
    /// Reward pool drawn for this tier.
    pub reward_pool_id: PoolId,
}

/// Weighted entry inside a reward pool.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardPoolEntry {
    /// Owning reward pool.
    pub pool_id: PoolId,
    /// Display name of the entry.
    #[serde(default)]
    pub name: String,
    /// Relative draw weight.
    pub weight: u32,
    /// Item pool drawn from when this entry wins.
    pub related_pool_id: PoolId,
}

/// Membership of an item in an item pool.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemPoolEntry {
    /// Item pool id.
    pub related_pool_id: PoolId,
    /// Candidate item.
    pub item_id: ItemId,
}

/// Category of an ownable item.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    /// Emote.
    Expression,
    /// Character stand.
    Stand,
    /// Board background.
    Background,
    /// Entrance animation.
    Appearance,
    /// Profile avatar.
    Avatar,
    /// Character portrait.
    Portrait,
}

/// Catalog definition of an item.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemDefinition {
    /// Item id.
    pub id: ItemId,
    /// Item category.
    pub kind: ItemKind,
    /// Display name.
    pub name: String,
    /// Display description.
    #[serde(default)]
    pub description: String,
    /// Client resource reference.
    #[serde(default)]
    pub resource_url: String,
    /// How the item is unlocked outside of rewards.
    #[serde(default)]
    pub price_type: u8,
    /// Unlock price.
    #[serde(default)]
    pub price: u32,
}

/// Item owned by a player.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnedItem {
    /// Owner.
    pub owner: OwnerId,
    /// Item id.
    pub item_id: ItemId,
    /// Item category.
    pub kind: ItemKind,
    /// Grant time.
    pub acquired_at: DateTime<Utc>,
}

/// Unlock type meaning "unlocked by taking the character to max level".
pub const UNLOCK_BY_MAX_LEVEL: u8 = 2;

/// Character catalog row.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharacterDefinition {
    /// Character id.
    pub id: CharacterId,
    /// Display name.
    pub name: String,
    /// Unlock type of the character's avatar.
    #[serde(default)]
    pub avatar_unlock_type: u8,
    /// Unlock type of the character's portrait.
    #[serde(default)]
    pub portrait_unlock_type: u8,
}

/// Cosmetic unlocked for a character.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnlockKind {
    /// Character avatar.
    Avatar,
    /// Character portrait.
    Portrait,
}

/// Cosmetic unlock row.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CosmeticUnlock {
    /// Owner.
    pub owner: OwnerId,
    /// What was unlocked.
    pub kind: UnlockKind,
    /// Character the cosmetic belongs to.
    pub character_id: CharacterId,
}

/// Static catalog loaded into a store: tiers, pools, items, characters.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RewardCatalog {
    /// Trophy tiers.
    #[serde(default)]
    pub tiers: Vec<RewardTier>,
    /// Weighted reward pool entries.
    #[serde(default)]
    pub pools: Vec<RewardPoolEntry>,
    /// Item pool memberships.
    #[serde(default)]
    pub item_pools: Vec<ItemPoolEntry>,
    /// Item definitions.
    #[serde(default)]
    pub items: Vec<ItemDefinition>,
    /// Character definitions.
    #[serde(default)]
    pub characters: Vec<CharacterDefinition>,
}

impl RewardCatalog {
    /// Parse a catalog from JSON.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

// =============================================================================
// PLAYER
// =============================================================================

/// Equipped cosmetics.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CosmeticLoadout {
    /// Avatar id.
    pub avatar_id: u32,
    /// Portrait id.
    pub portrait_id: u32,
    /// Background id.
    pub background_id: u32,
    /// Stand id.
    pub stand_id: u32,
    /// Expression id.
    pub expression_id: u32,
    /// Appearance id.
    pub appearance_id: u32,
}

impl Default for CosmeticLoadout {
    fn default() -> Self {
        Self {
            avatar_id: 0,
            portrait_id: 10000,
            background_id: 22000,
            stand_id: 20000,
            expression_id: 21000,
            appearance_id: 0,
        }
    }
}

impl CosmeticLoadout {
    /// Items every new player owns, matching the default loadout.
    pub fn starter_items(&self) -> [(ItemId, ItemKind); 4] {
        [
            (self.expression_id, ItemKind::Expression),
            (self.stand_id, ItemKind::Stand),
            (self.background_id, ItemKind::Background),
            (self.appearance_id, ItemKind::Appearance),
        ]
    }
}

/// Lifetime player profile and counters.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerProfile {
    /// Owner identity.
    pub owner: OwnerId,
    /// Display name.
    pub nickname: String,
    /// Equipped cosmetics.
    pub loadout: CosmeticLoadout,
    /// Trophies banked from finalized matches.
    pub lifetime_trophies: u64,
    /// Currency balance.
    pub balance: u64,
    /// Matches started.
    pub games_played: u64,
    /// Rounds won.
    pub wins: u64,
    /// Current consecutive-win streak.
    pub win_streak: u32,
    /// Best streak so far.
    pub highest_win_streak: u32,
    /// Local energy spent to start matches.
    pub energy: u32,
}

impl PlayerProfile {
    /// New player with the default loadout and full energy.
    pub fn new(owner: OwnerId, nickname: impl Into<String>, energy: u32) -> Self {
        Self {
            owner,
            nickname: nickname.into(),
            loadout: CosmeticLoadout::default(),
            lifetime_trophies: 0,
            balance: 0,
            games_played: 0,
            wins: 0,
            win_streak: 0,
            highest_win_streak: 0,
            energy,
        }
    }
}

/// Coins carried inside a match, one row per match.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoinRecord {
    /// Match the coins belong to.
    pub match_id: MatchId,
    /// Owner of the match.
    pub owner: OwnerId,
    /// Coin amount.
    pub coin: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audit_codes() {
        for outcome in [RoundOutcome::Win, RoundOutcome::Loss, RoundOutcome::Draw] {
            assert_eq!(RoundOutcome::from_audit_code(outcome.audit_code()), Some(outcome));
        }
        assert_eq!(RoundOutcome::Win.audit_code(), 1);
        assert_eq!(RoundOutcome::Loss.audit_code(), -1);
        assert_eq!(RoundOutcome::Draw.audit_code(), 0);
        assert_eq!(RoundOutcome::from_audit_code(7), None);
    }

    #[test]
    fn test_round_result_row_stores_audit_code() {
        let mut row = RoundResultRecord {
            owner: OwnerId::from("p1"),
            match_id: MatchId(4),
            round: 2,
            outcome: RoundOutcome::Loss,
            created_at: Utc::now(),
        };
        let mut value = serde_json::to_value(&row).unwrap();
        assert_eq!(value["outcome"], -1);

        value["outcome"] = serde_json::json!(1);
        row.outcome = RoundOutcome::Win;
        let parsed: RoundResultRecord = serde_json::from_value(value.clone()).unwrap();
        assert_eq!(parsed, row);

        value["outcome"] = serde_json::json!(3);
        assert!(serde_json::from_value::<RoundResultRecord>(value).is_err());
    }

    #[test]
    fn test_match_terminal_rules() {
        let mut record = MatchRecord::new(MatchId(1), OwnerId::from("p1"), 5);
        assert!(!record.is_terminal(9, false));

        record.health = 0;
        assert!(!record.is_terminal(9, false));
        assert!(record.is_terminal(9, true));

        record.health = 2;
        record.trophies = 9;
        assert!(record.is_terminal(9, false));
    }

    #[test]
    fn test_sentinel_slot() {
        let slot = TeamSlot::sentinel();
        assert!(slot.is_sentinel());
        assert!(!slot.has_board_position());

        let real = TeamSlot { position: 4, character_id: 7, level: 1, ..Default::default() };
        assert!(!real.is_sentinel());
        assert!(real.has_board_position());
    }

    #[test]
    fn test_catalog_from_json() {
        let json = r#"{
            "tiers": [{"trophy_threshold": 0, "reward_pool_id": 1}],
            "pools": [{"pool_id": 1, "weight": 10, "related_pool_id": 100}],
            "item_pools": [{"related_pool_id": 100, "item_id": 5}],
            "items": [{"id": 5, "kind": "stand", "name": "Oak Stand"}]
        }"#;
        let catalog = RewardCatalog::from_json(json).unwrap();
        assert_eq!(catalog.tiers.len(), 1);
        assert_eq!(catalog.items[0].kind, ItemKind::Stand);
        assert!(catalog.characters.is_empty());
    }

    #[test]
    fn test_snapshot_serializes_flat() {
        let snapshot = TeamSlotSnapshot {
            match_id: MatchId(3),
            owner: OwnerId::from("p1"),
            round: 2,
            trophies: 1,
            slot: TeamSlot { position: 1, character_id: 40, level: 2, ..Default::default() },
        };
        let value = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(value["position"], 1);
        assert_eq!(value["character_id"], 40);
        assert_eq!(value["match_id"], 3);
    }
}
