//! Shared fixtures for the engine test suites.
#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use uuid::Uuid;

use everloom_core::clock::Clock;
use everloom_core::ports::TextCompletion;
use everloom_engine::{EngineConfig, TurnEngine};
use everloom_store::Store;
use everloom_test_support::SteppingClock;

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
}

pub struct TestWorld {
    pub store: Store,
    pub clock: Arc<SteppingClock>,
    pub campaign_id: Uuid,
    pub actor_id: Uuid,
}

impl TestWorld {
    /// Registers another actor with a player row in the seeded campaign.
    pub async fn add_actor(&self, display_name: &str) -> Uuid {
        let now = self.clock.now();
        let mut tx = self.store.begin().await.unwrap();
        let actor = tx.actors().create(Some(display_name), "human", now).await.unwrap();
        tx.players().create(self.campaign_id, actor.id, now).await.unwrap();
        tx.commit().await.unwrap();
        actor.id
    }

    pub async fn campaign_row_version(&self) -> i64 {
        let mut tx = self.store.begin().await.unwrap();
        let campaign = tx.campaigns().get(self.campaign_id).await.unwrap().unwrap();
        tx.rollback().await.unwrap();
        campaign.row_version
    }

    pub async fn turn_count(&self) -> i64 {
        let mut tx = self.store.begin().await.unwrap();
        let count = tx.turns().count_by_campaign(self.campaign_id).await.unwrap();
        tx.rollback().await.unwrap();
        count
    }
}

/// One actor, one campaign at `row_version = 1`, one player.
pub async fn seed_world() -> TestWorld {
    let store = Store::in_memory().await.unwrap();
    let clock = Arc::new(SteppingClock::new(t0()));
    let now = clock.now();

    let mut tx = store.begin().await.unwrap();
    let actor = tx.actors().create(Some("Tester"), "human", now).await.unwrap();
    let campaign = tx
        .campaigns()
        .create("default", "main", Some(actor.id), now)
        .await
        .unwrap();
    tx.players().create(campaign.id, actor.id, now).await.unwrap();
    tx.commit().await.unwrap();

    TestWorld {
        store,
        clock,
        campaign_id: campaign.id,
        actor_id: actor.id,
    }
}

pub fn engine(world: &TestWorld, completion: Arc<dyn TextCompletion>) -> TurnEngine {
    engine_with_config(world, completion, EngineConfig::default())
}

pub fn engine_with_config(
    world: &TestWorld,
    completion: Arc<dyn TextCompletion>,
    config: EngineConfig,
) -> TurnEngine {
    TurnEngine::new(world.store.clone(), completion, world.clock.clone(), config)
}
