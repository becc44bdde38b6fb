//! End-to-end progression scenarios against the in-memory collaborators.

use std::sync::Arc;

use proptest::prelude::*;

use trophy_run::{
    external::{EnergyBalance, MemoryCache, MemoryOracle},
    game::{RewardGrant, StartOutcome, StateViolation, UnlockQueue},
    store::{RewardCatalog, TeamSlot},
    Collaborators, EngineConfig, EngineError, MatchId, MemoryStore, OwnerId, ProgressionEngine,
    RoundOutcome, SeededRandom, Store, StoreTx,
};

const CATALOG: &str = r#"{
    "tiers": [
        {"trophy_threshold": 0, "reward_pool_id": 1},
        {"trophy_threshold": 9, "reward_pool_id": 2}
    ],
    "pools": [
        {"pool_id": 1, "weight": 1, "related_pool_id": 10},
        {"pool_id": 2, "weight": 1, "related_pool_id": 20}
    ],
    "item_pools": [
        {"related_pool_id": 10, "item_id": 501},
        {"related_pool_id": 20, "item_id": 901}
    ],
    "items": [
        {"id": 501, "kind": "stand", "name": "Pine Stand"},
        {"id": 901, "kind": "background", "name": "Champion Hall"}
    ]
}"#;

struct Harness {
    engine: ProgressionEngine,
    store: Arc<MemoryStore>,
    oracle: Arc<MemoryOracle>,
}

fn harness(seed: u64) -> Harness {
    let catalog = RewardCatalog::from_json(CATALOG).unwrap();
    let store = Arc::new(MemoryStore::with_catalog(catalog));
    let cache = Arc::new(MemoryCache::new());
    cache.set_repeat_compensation("75");
    cache.set_energy_restore_cost("1");
    let oracle = Arc::new(MemoryOracle::new());
    // No worker: unlock tasks are dropped with a warning.
    let (unlocks, _worker, _reports) = UnlockQueue::channel(store.clone(), 5);

    let engine = ProgressionEngine::new(
        EngineConfig::default(),
        Collaborators {
            store: store.clone(),
            cache,
            oracle: oracle.clone(),
            random: Arc::new(SeededRandom::new(seed)),
            unlocks,
        },
    );
    Harness { engine, store, oracle }
}

impl Harness {
    fn player(&self, code: &str) -> OwnerId {
        let owner = self.engine.login(code).unwrap().profile.owner;
        self.oracle
            .set_account(owner.clone(), true, EnergyBalance { natural: 10, fusion: 0 });
        owner
    }

    fn start(&self, owner: &OwnerId) -> MatchId {
        match self.engine.start_match(owner).unwrap() {
            StartOutcome::Started { match_id, .. } => match_id,
            StartOutcome::NotPermitted => panic!("start not permitted"),
        }
    }
}

fn outcome_from(code: u8) -> RoundOutcome {
    match code % 3 {
        0 => RoundOutcome::Win,
        1 => RoundOutcome::Loss,
        _ => RoundOutcome::Draw,
    }
}

proptest! {
    /// Property: health and trophies stay in range whatever is submitted
    #[test]
    fn prop_health_and_trophies_bounded(codes in prop::collection::vec(0u8..3, 0..40), revive in any::<bool>()) {
        let h = harness(3);
        let owner = h.player("prop");
        let match_id = h.start(&owner);

        for code in codes {
            match h.engine.submit_round_result(&owner, match_id, outcome_from(code)) {
                Ok(report) => {
                    prop_assert!(report.health <= 5);
                    prop_assert!(report.trophies <= 9);
                    prop_assert!(!(report.finalized && report.revive_offered));
                    if report.revive_offered && revive {
                        h.engine.consume_revive(&owner, match_id).unwrap();
                    }
                }
                Err(EngineError::State(StateViolation::Finalized))
                | Err(EngineError::State(StateViolation::RevivePending)) => {}
                Err(other) => prop_assert!(false, "unexpected error {:?}", other),
            }
            let status = h.engine.match_status(&owner, match_id).unwrap();
            prop_assert!(status.health <= 5);
            prop_assert!(status.trophies <= 9);
        }
    }
}

#[test]
fn test_full_run_to_victory() {
    let h = harness(1);
    let owner = h.player("winner");
    let match_id = h.start(&owner);

    let mut last = None;
    for _ in 0..9 {
        last = Some(h.engine.submit_round_result(&owner, match_id, RoundOutcome::Win).unwrap());
    }
    let report = last.unwrap();
    assert!(report.finalized);
    assert_eq!(report.trophies, 9);
    assert_eq!(report.round, 9);
    match report.reward {
        Some(RewardGrant::Item { item, .. }) => assert_eq!(item.id, 901),
        other => panic!("expected item grant, got {:?}", other),
    }

    let tx = h.store.begin().unwrap();
    let profile = tx.get_profile(&owner).unwrap().unwrap();
    assert_eq!(profile.lifetime_trophies, 9);
    assert_eq!(profile.wins, 9);
    assert_eq!(profile.highest_win_streak, 9);
}

#[test]
fn test_second_victory_pays_compensation() {
    let h = harness(1);
    let owner = h.player("repeat");

    for _ in 0..2 {
        let match_id = h.start(&owner);
        for _ in 0..9 {
            h.engine.submit_round_result(&owner, match_id, RoundOutcome::Win).unwrap();
        }
    }

    let tx = h.store.begin().unwrap();
    let owned: Vec<_> = tx
        .owned_items(&owner)
        .unwrap()
        .into_iter()
        .filter(|i| i.item_id == 901)
        .collect();
    assert_eq!(owned.len(), 1);
    assert_eq!(tx.get_profile(&owner).unwrap().unwrap().balance, 75);
}

#[test]
fn test_defeat_after_revive_still_rewards() {
    let h = harness(1);
    let owner = h.player("loser");
    let match_id = h.start(&owner);

    h.engine.submit_round_result(&owner, match_id, RoundOutcome::Win).unwrap();
    let mut report = None;
    for _ in 0..5 {
        report = Some(h.engine.submit_round_result(&owner, match_id, RoundOutcome::Loss).unwrap());
    }
    let report = report.unwrap();
    assert!(report.revive_offered);
    assert!(!report.finalized);

    h.engine.consume_revive(&owner, match_id).unwrap();
    let report = h.engine.submit_round_result(&owner, match_id, RoundOutcome::Loss).unwrap();
    assert!(report.finalized);
    assert_eq!(report.trophies, 1);
    assert_eq!(report.reward.map(|r| r.item().id), Some(501));
}

#[test]
fn test_two_players_meet_in_matchmaking() {
    let h = harness(5);
    let alice = h.player("alice");
    let bob = h.player("bob");
    let alice_match = h.start(&alice);
    let bob_match = h.start(&bob);

    let lineup: Vec<TeamSlot> = (0..3)
        .map(|position| TeamSlot {
            position,
            character_id: 40 + position as u32,
            level: 1,
            base_attack: 1,
            base_hp: 1,
            ..Default::default()
        })
        .collect();

    let first = h.engine.save_roster_and_match(&alice, alice_match, 0, &lineup, 0).unwrap();
    assert!(first.opponent.is_none());

    let second = h.engine.save_roster_and_match(&bob, bob_match, 0, &lineup, 0).unwrap();
    let opponent = second.opponent.expect("alice expected");
    assert_eq!(opponent.owner, alice);
    assert_eq!(opponent.slots.len(), 3);

    // Saving the same lineup again leaves the same rows behind.
    h.engine.save_roster_and_match(&alice, alice_match, 0, &lineup, 0).unwrap();
    let again = h.engine.save_roster_and_match(&bob, bob_match, 0, &lineup, 0).unwrap();
    assert_eq!(again.opponent.map(|o| o.slots), Some(opponent.slots));
}
