//! Match Progression
//!
//! [`ProgressionEngine`] turns round-result submissions into trophy and
//! health transitions and decides when a match is over:
//!
//! ```text
//! submit WIN  -> trophies + 1 -> trophies == target ? finalize (victory) + reward
//! submit LOSS -> health - 1   -> health == 0 ? (revive unused ? offer revive
//!                                                            : finalize (defeat) + reward)
//! submit DRAW -> no change
//! always      -> audit row, round + 1, coin top-up
//! ```
//!
//! Every operation runs in one store transaction; any failure rolls all of
//! it back. Around that core sit the account and lobby operations: login,
//! match start, revive, lineup saves with opponent draws, coins and energy.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument, warn};

use crate::config::EngineConfig;
use crate::core::rng::RandomSource;
use crate::external::{CacheLookup, EnergyBalance, IdentityOracle};
use crate::game::error::{EngineError, EngineResult, StateViolation};
use crate::game::matchmaking::{MatchmakingSelector, OpponentLineup};
use crate::game::reward::{RewardGrant, RewardResolver};
use crate::game::roster::{ensure_playable, TeamRoster};
use crate::game::unlock::{UnlockQueue, UnlockTask};
use crate::store::{
    with_transaction, CoinRecord, CosmeticLoadout, MatchId, MatchOutcome, MatchRecord, OwnedItem,
    OwnerId, PlayerProfile, ReviveRecord, RoundOutcome, RoundResultRecord, Store, StoreTx,
    TeamSlot, TeamSlotSnapshot,
};

// =============================================================================
// RESULTS
// =============================================================================

/// Result of a round submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundReport {
    /// Trophies after the round.
    pub trophies: u8,
    /// Health after the round.
    pub health: u8,
    /// Round after advancing.
    pub round: u32,
    /// Whether the match is now over.
    pub finalized: bool,
    /// Health hit zero and the one-time revive is still available.
    pub revive_offered: bool,
    /// Reward rolled on finalize.
    pub reward: Option<RewardGrant>,
}

/// Result of a login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginOutcome {
    /// The player's profile.
    pub profile: PlayerProfile,
    /// Whether the profile was created by this login.
    pub created: bool,
}

/// Result of a match start request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StartOutcome {
    /// The owner lacks the qualifying asset; nothing was changed.
    NotPermitted,
    /// A new match was created.
    Started {
        /// New match id.
        match_id: MatchId,
        /// Starting health.
        health: u8,
        /// Local energy left.
        energy: u32,
    },
}

/// Snapshot of a match for the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchStatus {
    /// Match id.
    pub match_id: MatchId,
    /// Remaining health.
    pub health: u8,
    /// Trophies collected.
    pub trophies: u8,
    /// Current round.
    pub round: u32,
    /// Whether the match is over.
    pub finalized: bool,
    /// Coin balance carried over from the last submitted round, else 0.
    pub last_balance: i64,
}

/// Newest saved lineup of a match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentLineup {
    /// Match id.
    pub match_id: MatchId,
    /// Round the lineup was saved for, if any was saved.
    pub round: Option<u32>,
    /// Saved slots; empty-lineup placeholders are omitted.
    pub slots: Vec<TeamSlotSnapshot>,
    /// Outcome of the latest submitted round.
    pub last_outcome: Option<RoundOutcome>,
}

/// Profile shown next to an opponent lineup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpponentProfile {
    /// Opponent owner; `None` for the stand-in profile.
    pub owner: Option<OwnerId>,
    /// Display name.
    pub nickname: String,
    /// Cosmetics.
    pub loadout: CosmeticLoadout,
}

/// Result of saving a lineup and drawing the next opponent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterAndMatch {
    /// Round the lineup was saved for.
    pub round: u32,
    /// Rows written (1 for an empty lineup).
    pub saved_rows: usize,
    /// Drawn opponent lineup, `None` when nobody was eligible.
    pub opponent: Option<OpponentLineup>,
    /// Profile of the opponent, or the stand-in.
    pub opponent_profile: OpponentProfile,
}

// =============================================================================
// ENGINE
// =============================================================================

/// Everything the engine talks to, injected at construction.
pub struct Collaborators {
    /// Persistence.
    pub store: Arc<dyn Store>,
    /// Fast-lookup values.
    pub cache: Arc<dyn CacheLookup>,
    /// Identity and ownership oracle.
    pub oracle: Arc<dyn IdentityOracle>,
    /// Randomness for reward and opponent draws.
    pub random: Arc<dyn RandomSource>,
    /// Cosmetic unlock queue.
    pub unlocks: UnlockQueue,
}

/// Orchestrates match progression.
pub struct ProgressionEngine {
    config: EngineConfig,
    store: Arc<dyn Store>,
    cache: Arc<dyn CacheLookup>,
    oracle: Arc<dyn IdentityOracle>,
    unlocks: UnlockQueue,
    rewards: RewardResolver,
    matchmaking: MatchmakingSelector,
    roster: TeamRoster,
}

impl ProgressionEngine {
    /// Create an engine.
    pub fn new(config: EngineConfig, collaborators: Collaborators) -> Self {
        let Collaborators {
            store,
            cache,
            oracle,
            random,
            unlocks,
        } = collaborators;

        Self {
            rewards: RewardResolver::new(store.clone(), cache.clone(), random.clone()),
            matchmaking: MatchmakingSelector::new(store.clone(), random),
            roster: TeamRoster::new(store.clone(), config.trophies_to_win),
            config,
            store,
            cache,
            oracle,
            unlocks,
        }
    }

    /// Engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Reward resolver sharing this engine's collaborators.
    pub fn rewards(&self) -> &RewardResolver {
        &self.rewards
    }

    /// Roster writer sharing this engine's store.
    pub fn roster(&self) -> &TeamRoster {
        &self.roster
    }

    /// Opponent selector sharing this engine's store.
    pub fn matchmaking(&self) -> &MatchmakingSelector {
        &self.matchmaking
    }

    /// Run read-only queries in a scope that is dropped, not committed.
    fn read<T>(&self, f: impl FnOnce(&dyn StoreTx) -> EngineResult<T>) -> EngineResult<T> {
        let tx = self.store.begin()?;
        f(tx.as_ref())
    }

    // ── Round results ──────────────────────────────────────────

    /// Apply one round result.
    #[instrument(skip(self))]
    pub fn submit_round_result(
        &self,
        owner: &OwnerId,
        match_id: MatchId,
        outcome: RoundOutcome,
    ) -> EngineResult<RoundReport> {
        let trophies_to_win = self.config.trophies_to_win;

        let result = with_transaction(self.store.as_ref(), |tx| -> EngineResult<RoundReport> {
            let mut record = owned_match(tx, owner, match_id)?;
            ensure_playable(tx, &record, trophies_to_win)?;
            if tx.round_result_exists(match_id, record.round)? {
                return Err(StateViolation::RoundAlreadySubmitted(record.round).into());
            }
            let mut profile = profile_of(tx, owner)?;

            match outcome {
                RoundOutcome::Win => {
                    record.trophies = record.trophies.saturating_add(1);
                    profile.wins += 1;
                    let previous = tx.last_round_result(owner, match_id)?;
                    if previous.map(|r| r.outcome) == Some(RoundOutcome::Win) {
                        profile.win_streak =
                            if profile.win_streak == 0 { 2 } else { profile.win_streak + 1 };
                        profile.highest_win_streak =
                            profile.highest_win_streak.max(profile.win_streak);
                    } else {
                        profile.win_streak = 0;
                    }
                }
                RoundOutcome::Loss => record.health = record.health.saturating_sub(1),
                RoundOutcome::Draw => {}
            }

            tx.insert_round_result(RoundResultRecord {
                owner: owner.clone(),
                match_id,
                round: record.round,
                outcome,
                created_at: Utc::now(),
            })?;

            let finish = if record.trophies >= trophies_to_win {
                Some(MatchOutcome::Victory)
            } else if record.health == 0 && tx.revive_record(owner, match_id)?.is_some() {
                Some(MatchOutcome::Defeat)
            } else {
                None
            };
            let revive_offered = record.health == 0 && finish.is_none();

            if let Some(result) = finish {
                record.finalized = true;
                record.outcome = Some(result);
                profile.lifetime_trophies += u64::from(record.trophies);
            }
            // Written before the reward roll, which may credit compensation.
            tx.put_profile(profile)?;

            let reward = if record.finalized {
                Some(self.rewards.resolve_in(tx, owner, record.trophies)?)
            } else {
                None
            };

            record.round += 1;
            tx.update_match(&record)?;
            tx.upsert_coin(CoinRecord {
                match_id,
                owner: owner.clone(),
                coin: self.config.starting_coin,
            })?;

            Ok(RoundReport {
                trophies: record.trophies,
                health: record.health,
                round: record.round,
                finalized: record.finalized,
                revive_offered,
                reward,
            })
        });

        let report = observe("submit_round_result", result)?;
        info!(
            match_id = %match_id,
            owner = %owner,
            round = report.round,
            trophies = report.trophies,
            health = report.health,
            "round result recorded"
        );
        if report.finalized {
            info!(
                match_id = %match_id,
                owner = %owner,
                trophies = report.trophies,
                "match finalized"
            );
        } else if report.revive_offered {
            info!(match_id = %match_id, owner = %owner, "revive offered");
        }
        Ok(report)
    }

    /// Spend the one-time revive of a match whose health reached zero.
    #[instrument(skip(self))]
    pub fn consume_revive(&self, owner: &OwnerId, match_id: MatchId) -> EngineResult<MatchStatus> {
        let result = with_transaction(self.store.as_ref(), |tx| -> EngineResult<MatchStatus> {
            let mut record = owned_match(tx, owner, match_id)?;
            if record.is_terminal(self.config.trophies_to_win, false) {
                return Err(StateViolation::Finalized.into());
            }
            if record.health > 0 {
                return Err(StateViolation::ReviveNotNeeded.into());
            }
            if tx.revive_record(owner, match_id)?.is_some() {
                return Err(StateViolation::ReviveUsed.into());
            }

            tx.insert_revive(ReviveRecord {
                owner: owner.clone(),
                match_id,
                created_at: Utc::now(),
            })?;
            record.health = self.config.revive_health;
            tx.update_match(&record)?;
            status_of(tx, &record)
        });

        let status = observe("consume_revive", result)?;
        info!(match_id = %match_id, owner = %owner, health = status.health, "revive consumed");
        Ok(status)
    }

    // ── Account & lobby ────────────────────────────────────────

    /// Exchange a login code for an owner and make sure a profile exists.
    #[instrument(skip(self, code))]
    pub fn login(&self, code: &str) -> EngineResult<LoginOutcome> {
        let result = self
            .oracle
            .exchange_login_code(code)
            .map_err(EngineError::from)
            .and_then(|owner| {
                with_transaction(self.store.as_ref(), |tx| -> EngineResult<LoginOutcome> {
                    if let Some(profile) = tx.get_profile(&owner)? {
                        return Ok(LoginOutcome { profile, created: false });
                    }

                    let nickname = format!(
                        "{}{}",
                        self.config.nickname_prefix,
                        Utc::now().timestamp_millis()
                    );
                    let profile =
                        PlayerProfile::new(owner.clone(), nickname, self.config.max_energy);
                    let now = Utc::now();
                    for (item_id, kind) in profile.loadout.starter_items() {
                        tx.insert_owned_item(OwnedItem {
                            owner: owner.clone(),
                            item_id,
                            kind,
                            acquired_at: now,
                        })?;
                    }
                    tx.put_profile(profile.clone())?;
                    Ok(LoginOutcome { profile, created: true })
                })
            });

        let outcome = observe("login", result)?;
        if outcome.created {
            info!(owner = %outcome.profile.owner, nickname = %outcome.profile.nickname, "player created");
        }
        Ok(outcome)
    }

    /// Start a new match for `owner`.
    #[instrument(skip(self))]
    pub fn start_match(&self, owner: &OwnerId) -> EngineResult<StartOutcome> {
        let result = self.start_match_inner(owner);
        let outcome = observe("start_match", result)?;
        match &outcome {
            StartOutcome::Started { match_id, energy, .. } => {
                info!(match_id = %match_id, owner = %owner, energy, "match started")
            }
            StartOutcome::NotPermitted => info!(owner = %owner, "match start not permitted"),
        }
        Ok(outcome)
    }

    fn start_match_inner(&self, owner: &OwnerId) -> EngineResult<StartOutcome> {
        if !self.oracle.owns_qualifying_asset(owner)? {
            return Ok(StartOutcome::NotPermitted);
        }

        with_transaction(self.store.as_ref(), |tx| -> EngineResult<StartOutcome> {
            let mut profile = profile_of(tx, owner)?;
            if profile.energy == 0 {
                return Err(StateViolation::OutOfEnergy.into());
            }
            profile.energy -= 1;

            let match_id = self.store.next_match_id()?;
            let record = MatchRecord::new(match_id, owner.clone(), self.config.max_health);
            let health = record.health;
            tx.insert_match(record)?;
            profile.games_played = tx.count_matches(owner)?;
            let energy = profile.energy;
            tx.put_profile(profile)?;
            tx.upsert_coin(CoinRecord {
                match_id,
                owner: owner.clone(),
                coin: self.config.starting_coin,
            })?;

            Ok(StartOutcome::Started { match_id, health, energy })
        })
    }

    /// Health, trophies, round and carried balance of a match.
    #[instrument(skip(self))]
    pub fn match_status(&self, owner: &OwnerId, match_id: MatchId) -> EngineResult<MatchStatus> {
        let result = self.read(|tx| {
            let record = owned_match(tx, owner, match_id)?;
            status_of(tx, &record)
        });
        observe("match_status", result)
    }

    /// Newest saved lineup of a match and the latest round outcome.
    #[instrument(skip(self))]
    pub fn current_lineup(
        &self,
        owner: &OwnerId,
        match_id: MatchId,
    ) -> EngineResult<CurrentLineup> {
        let result = self.read(|tx| {
            owned_match(tx, owner, match_id)?;

            let round = tx.latest_snapshot_round(owner, match_id)?;
            let slots = match round {
                Some(round) => tx
                    .snapshots_for(owner, match_id, round)?
                    .into_iter()
                    .filter(|row| !row.is_sentinel())
                    .collect(),
                None => Vec::new(),
            };
            let last_outcome = tx.last_round_result(owner, match_id)?.map(|r| r.outcome);

            Ok(CurrentLineup {
                match_id,
                round,
                slots,
                last_outcome,
            })
        });
        observe("current_lineup", result)
    }

    /// Save the lineup for `round`, queue cosmetic unlocks and draw the
    /// next opponent.
    ///
    /// `last_balance` is the coin balance the client carries out of the
    /// round; failing to record it is logged and does not fail the call.
    #[instrument(skip(self, slots), fields(slots = slots.len()))]
    pub fn save_roster_and_match(
        &self,
        owner: &OwnerId,
        match_id: MatchId,
        round: u32,
        slots: &[TeamSlot],
        last_balance: i64,
    ) -> EngineResult<RosterAndMatch> {
        let result = self.save_roster_and_match_inner(owner, match_id, round, slots, last_balance);
        observe("save_roster_and_match", result)
    }

    fn save_roster_and_match_inner(
        &self,
        owner: &OwnerId,
        match_id: MatchId,
        round: u32,
        slots: &[TeamSlot],
        last_balance: i64,
    ) -> EngineResult<RosterAndMatch> {
        let saved = self.roster.save_owned_roster(owner, match_id, round, slots)?;

        if !slots.is_empty() {
            self.unlocks.dispatch(UnlockTask {
                owner: owner.clone(),
                match_id,
                fielded: slots.iter().map(|s| (s.character_id, s.level)).collect(),
            });
        }

        let (opponent, opponent_profile) = {
            let tx = self.store.begin()?;
            let pick = self.matchmaking.pick_opponent_in(tx.as_ref(), round, owner)?;
            let opponent = pick.lineup().cloned();
            let profile = match &opponent {
                Some(lineup) => tx.get_profile(&lineup.owner)?,
                None => None,
            };
            (opponent, self.opponent_profile(profile))
        };

        if let Err(err) = self.record_last_balance(match_id, round, last_balance) {
            warn!(match_id = %match_id, round, error = %err, "failed to record last balance");
        }

        Ok(RosterAndMatch {
            round,
            saved_rows: saved.rows.len(),
            opponent,
            opponent_profile,
        })
    }

    fn opponent_profile(&self, profile: Option<PlayerProfile>) -> OpponentProfile {
        match profile {
            Some(profile) => OpponentProfile {
                owner: Some(profile.owner),
                nickname: profile.nickname,
                loadout: profile.loadout,
            },
            None => {
                let stand_in = &self.config.default_opponent;
                OpponentProfile {
                    owner: None,
                    nickname: stand_in.nickname.clone(),
                    loadout: stand_in.loadout.clone(),
                }
            }
        }
    }

    fn record_last_balance(
        &self,
        match_id: MatchId,
        round: u32,
        last_balance: i64,
    ) -> EngineResult<()> {
        with_transaction(self.store.as_ref(), |tx| -> EngineResult<()> {
            let mut record = tx
                .get_match(match_id)?
                .ok_or_else(|| EngineError::match_not_found(match_id))?;
            record.last_balance = last_balance;
            record.last_balance_round = round;
            tx.update_match(&record)?;
            Ok(())
        })
    }

    // ── Coins & energy ─────────────────────────────────────────

    /// In-match coins of a match.
    #[instrument(skip(self))]
    pub fn match_coin(&self, match_id: MatchId) -> EngineResult<u64> {
        let result = self.read(|tx| {
            let record = tx.coin_record(match_id)?.ok_or_else(|| EngineError::NotFound {
                entity: "coin",
                key: match_id.to_string(),
            })?;
            Ok(record.coin)
        });
        observe("match_coin", result)
    }

    /// Overwrite the in-match coins of an owned match.
    #[instrument(skip(self))]
    pub fn save_match_coin(
        &self,
        owner: &OwnerId,
        match_id: MatchId,
        coin: u64,
    ) -> EngineResult<()> {
        let result = with_transaction(self.store.as_ref(), |tx| -> EngineResult<()> {
            owned_match(tx, owner, match_id)?;
            tx.upsert_coin(CoinRecord {
                match_id,
                owner: owner.clone(),
                coin,
            })?;
            Ok(())
        });
        observe("save_match_coin", result)?;
        debug!(match_id = %match_id, coin, "match coin saved");
        Ok(())
    }

    /// Buy one local energy with external energy. Returns the new energy.
    #[instrument(skip(self))]
    pub fn restore_energy(&self, owner: &OwnerId) -> EngineResult<u32> {
        let result = with_transaction(self.store.as_ref(), |tx| -> EngineResult<u32> {
            let mut profile = profile_of(tx, owner)?;
            if profile.energy >= self.config.max_energy {
                return Err(StateViolation::EnergyFull.into());
            }
            let cost = self.cache.energy_restore_cost()?;
            self.oracle.deduct_energy(owner, cost)?;

            profile.energy += 1;
            let energy = profile.energy;
            tx.put_profile(profile)?;
            Ok(energy)
        });

        let energy = observe("restore_energy", result)?;
        info!(owner = %owner, energy, "energy restored");
        Ok(energy)
    }

    /// External energy balance of `owner`.
    #[instrument(skip(self))]
    pub fn external_energy(&self, owner: &OwnerId) -> EngineResult<EnergyBalance> {
        observe("external_energy", self.oracle.energy_balance(owner).map_err(EngineError::from))
    }
}

// =============================================================================
// HELPERS
// =============================================================================

/// Load a match and check it belongs to `owner`.
fn owned_match(tx: &dyn StoreTx, owner: &OwnerId, match_id: MatchId) -> EngineResult<MatchRecord> {
    let record = tx
        .get_match(match_id)?
        .ok_or_else(|| EngineError::match_not_found(match_id))?;
    if &record.owner != owner {
        return Err(EngineError::Ownership(match_id));
    }
    Ok(record)
}

fn profile_of(tx: &dyn StoreTx, owner: &OwnerId) -> EngineResult<PlayerProfile> {
    tx.get_profile(owner)?.ok_or_else(|| EngineError::NotFound {
        entity: "player",
        key: owner.to_string(),
    })
}

fn status_of(tx: &dyn StoreTx, record: &MatchRecord) -> EngineResult<MatchStatus> {
    // The carried balance belongs to the round whose result came in last.
    let latest_round = tx.last_round_result(&record.owner, record.id)?.map(|r| r.round);
    let last_balance = if latest_round == Some(record.last_balance_round) {
        record.last_balance
    } else {
        0
    };

    Ok(MatchStatus {
        match_id: record.id,
        health: record.health,
        trophies: record.trophies,
        round: record.round,
        finalized: record.finalized,
        last_balance,
    })
}

/// Log failed operations: internal failures at error level with full
/// context, caller errors at debug.
fn observe<T>(operation: &'static str, result: EngineResult<T>) -> EngineResult<T> {
    if let Err(err) = &result {
        if err.is_internal() {
            error!(operation, error = %err, "operation failed");
        } else {
            debug!(operation, error = %err, "operation rejected");
        }
    }
    result
}

// =============================================================================
// TESTS
// =============================================================================
