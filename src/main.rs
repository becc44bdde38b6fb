//! Trophy Run Demo
//!
//! Plays a scripted match against in-memory collaborators and prints every
//! round report as JSON. Log level follows `RUST_LOG` (default `info`).

use std::sync::Arc;

use anyhow::{bail, Context};
use tracing::info;
use tracing_subscriber::EnvFilter;

use trophy_run::{
    external::{EnergyBalance, MemoryCache, MemoryOracle},
    game::{StartOutcome, UnlockQueue, UnlockReport},
    store::{RewardCatalog, TeamSlot},
    Collaborators, DeterministicRng, EngineConfig, MemoryStore, OwnerId, ProgressionEngine, RoundOutcome,
    SeededRandom, VERSION,
};

const DEMO_CATALOG: &str = r#"{
    "tiers": [
        {"trophy_threshold": 0, "reward_pool_id": 1},
        {"trophy_threshold": 5, "reward_pool_id": 2},
        {"trophy_threshold": 9, "reward_pool_id": 3}
    ],
    "pools": [
        {"pool_id": 1, "name": "common", "weight": 100, "related_pool_id": 10},
        {"pool_id": 2, "name": "common", "weight": 70, "related_pool_id": 10},
        {"pool_id": 2, "name": "rare", "weight": 30, "related_pool_id": 20},
        {"pool_id": 3, "name": "rare", "weight": 60, "related_pool_id": 20},
        {"pool_id": 3, "name": "epic", "weight": 40, "related_pool_id": 30}
    ],
    "item_pools": [
        {"related_pool_id": 10, "item_id": 20001},
        {"related_pool_id": 10, "item_id": 21001},
        {"related_pool_id": 20, "item_id": 22001},
        {"related_pool_id": 30, "item_id": 23001}
    ],
    "items": [
        {"id": 20001, "kind": "stand", "name": "Oak Stand"},
        {"id": 21001, "kind": "expression", "name": "Grin"},
        {"id": 22001, "kind": "background", "name": "Night Market"},
        {"id": 23001, "kind": "appearance", "name": "Thunder Entrance"}
    ],
    "characters": [
        {"id": 101, "name": "Ember", "avatar_unlock_type": 2, "portrait_unlock_type": 2},
        {"id": 102, "name": "Frost", "avatar_unlock_type": 2, "portrait_unlock_type": 1},
        {"id": 103, "name": "Moss"}
    ]
}"#;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Trophy Run Engine v{}", VERSION);

    let config = EngineConfig::from_env();
    info!(
        max_health = config.max_health,
        trophies_to_win = config.trophies_to_win,
        "engine configured"
    );

    let catalog = RewardCatalog::from_json(DEMO_CATALOG).context("demo catalog is invalid")?;
    let store = Arc::new(MemoryStore::with_catalog(catalog));
    let cache = Arc::new(MemoryCache::new());
    cache.set_repeat_compensation("150");
    cache.set_energy_restore_cost("1");
    let oracle = Arc::new(MemoryOracle::new());

    let (unlocks, worker, mut reports) = UnlockQueue::channel(store.clone(), config.unlock_level);
    let worker = worker.spawn();
    let reporter = tokio::spawn(async move {
        while let Some(report) = reports.recv().await {
            if let UnlockReport::Applied { owner, unlocked } = report {
                for unlock in unlocked {
                    info!(owner = %owner, character = unlock.character_id, kind = ?unlock.kind, "unlocked");
                }
            }
        }
    });

    let engine = ProgressionEngine::new(
        config,
        Collaborators {
            store,
            cache,
            oracle: oracle.clone(),
            random: Arc::new(SeededRandom::new(12345)),
            unlocks,
        },
    );

    // Engine calls block on the store; keep them off the async workers.
    tokio::task::spawn_blocking(move || demo_match(&engine, &oracle))
        .await
        .context("demo task panicked")??;

    worker.await.context("unlock worker panicked")?;
    reporter.await.context("report listener panicked")?;
    Ok(())
}

/// Play one match for a demo player against a recorded rival lineup.
fn demo_match(engine: &ProgressionEngine, oracle: &MemoryOracle) -> anyhow::Result<()> {
    info!("=== Starting Demo Match ===");

    let mut players: Vec<OwnerId> = Vec::new();
    for code in ["demo", "rival"] {
        let owner = engine.login(code)?.profile.owner;
        oracle.set_account(owner.clone(), true, EnergyBalance { natural: 5, fusion: 0 });
        players.push(owner);
    }
    let (player, rival) = (&players[0], &players[1]);

    let start = |owner: &OwnerId| -> anyhow::Result<_> {
        match engine.start_match(owner)? {
            StartOutcome::Started { match_id, .. } => Ok(match_id),
            StartOutcome::NotPermitted => bail!("{} may not start a match", owner),
        }
    };
    let player_match = start(player)?;
    let rival_match = start(rival)?;

    let mut outcomes = DeterministicRng::new(7);
    let mut round = 0;
    loop {
        let level = (round.min(4) + 1) as u8;
        let lineup: Vec<TeamSlot> = [101, 102, 103]
            .iter()
            .enumerate()
            .map(|(position, &character_id)| TeamSlot {
                position: position as u16,
                character_id,
                level,
                base_attack: 2 + level as i32,
                base_hp: 3 + level as i32,
                ..Default::default()
            })
            .collect();

        engine.save_roster_and_match(rival, rival_match, round, &lineup[..2], 0)?;
        let saved = engine.save_roster_and_match(player, player_match, round, &lineup, 10)?;
        let opponent = saved.opponent_profile.nickname;

        let outcome = match outcomes.next_below(10) {
            0..=5 => RoundOutcome::Win,
            6..=8 => RoundOutcome::Loss,
            _ => RoundOutcome::Draw,
        };
        // The rival's match only serves lineups; advance it alongside.
        engine.submit_round_result(rival, rival_match, RoundOutcome::Draw)?;
        let report = engine.submit_round_result(player, player_match, outcome)?;
        info!(round, opponent = %opponent, outcome = ?outcome, "round played");
        println!("{}", serde_json::to_string_pretty(&report)?);

        if report.finalized {
            break;
        }
        if report.revive_offered {
            engine.consume_revive(player, player_match)?;
        }
        round = report.round;
    }

    let status = engine.match_status(player, player_match)?;
    println!("{}", serde_json::to_string_pretty(&status)?);
    info!("=== Demo Match Complete ===");
    Ok(())
}
