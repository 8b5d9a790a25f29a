//! Rewind and memory-visibility flows against in-memory SQLite.

mod common;

use std::sync::Arc;

use async_trait::async_trait;
use everloom_core::clock::Clock;
use serde_json::json;
use uuid::Uuid;

use everloom_core::error::PortError;
use everloom_core::ports::MemorySearch;
use everloom_core::types::{ResolveTurnInput, RewindResult};
use everloom_engine::EngineError;
use everloom_test_support::ScriptedCompletion;

use common::{engine, seed_world, TestWorld};

fn input(world: &TestWorld, action: &str) -> ResolveTurnInput {
    ResolveTurnInput {
        campaign_id: world.campaign_id,
        actor_id: world.actor_id,
        action: action.to_owned(),
        session_id: None,
    }
}

/// Resolves three turns with distinct state markers and returns the three
/// narration turn ids in order.
async fn play_three_turns(world: &TestWorld) -> Vec<i64> {
    let completion = Arc::new(ScriptedCompletion::new(vec![
        json!({ "narration": "step one", "state_update": { "step": 1 } }),
        json!({ "narration": "step two", "state_update": { "step": 2 } }),
        json!({ "narration": "step three", "state_update": { "step": 3 } }),
    ]));
    let engine = engine(world, completion);

    let mut narration_ids = Vec::new();
    for action in ["go north", "go south", "go east"] {
        let result = engine.resolve_turn(input(world, action)).await.unwrap();
        narration_ids.push(result.narration_turn_id);
    }
    narration_ids
}

#[tokio::test]
async fn test_rewind_restores_snapshot_and_prunes_suffix() {
    // Arrange — three committed turns, an embedding on the pruned suffix.
    let world = seed_world().await;
    let narration_ids = play_three_turns(&world).await;
    let target = narration_ids[1];
    {
        let mut tx = world.store.begin().await.unwrap();
        tx.embeddings()
            .add(narration_ids[2], world.campaign_id, "narration", "step three", &[1], world.clock.now())
            .await
            .unwrap();
        tx.commit().await.unwrap();
    }
    assert_eq!(world.campaign_row_version().await, 4);

    let completion = Arc::new(ScriptedCompletion::new(Vec::new()));
    let engine = engine(&world, completion);

    // Act
    let result = engine.rewind_to_turn(world.campaign_id, target).await.unwrap();

    // Assert — the suffix (one user turn, one narration turn, its snapshot,
    // its embedding) is gone and the campaign is back at step two.
    assert_eq!(
        result,
        RewindResult {
            target_turn_id: target,
            deleted_turns: 2,
            deleted_snapshots: 1,
        }
    );

    let mut tx = world.store.begin().await.unwrap();
    let campaign = tx.campaigns().get(world.campaign_id).await.unwrap().unwrap();
    assert_eq!(campaign.row_version, 5);
    assert_eq!(campaign.memory_visible_max_turn_id, Some(target));
    assert_eq!(campaign.last_narration.as_deref(), Some("step two"));
    let state: serde_json::Value = serde_json::from_str(&campaign.state_json).unwrap();
    assert_eq!(state["step"], 2);

    let turns = tx.turns().recent(world.campaign_id, 10).await.unwrap();
    assert_eq!(turns.len(), 4);
    assert!(turns.iter().all(|t| t.id <= target));
    assert_eq!(tx.embeddings().count_by_campaign(world.campaign_id).await.unwrap(), 0);

    let events = tx.outbox().list_by_campaign(world.campaign_id).await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type, "memory_prune_requested");
    assert_eq!(events[0].idempotency_key, target.to_string());
    tx.rollback().await.unwrap();
}

#[tokio::test]
async fn test_rewind_twice_deletes_nothing_more_and_adds_no_duplicate_event() {
    // Arrange
    let world = seed_world().await;
    let narration_ids = play_three_turns(&world).await;
    let target = narration_ids[1];
    let completion = Arc::new(ScriptedCompletion::new(Vec::new()));
    let engine = engine(&world, completion);

    // Act
    let first = engine.rewind_to_turn(world.campaign_id, target).await.unwrap();
    let second = engine.rewind_to_turn(world.campaign_id, target).await.unwrap();

    // Assert
    assert_eq!(first.deleted_turns, 2);
    assert_eq!(second, RewindResult { target_turn_id: target, deleted_turns: 0, deleted_snapshots: 0 });

    let mut tx = world.store.begin().await.unwrap();
    let campaign = tx.campaigns().get(world.campaign_id).await.unwrap().unwrap();
    assert_eq!(campaign.memory_visible_max_turn_id, Some(target));
    let state: serde_json::Value = serde_json::from_str(&campaign.state_json).unwrap();
    assert_eq!(state["step"], 2);

    let events = tx.outbox().list_by_campaign(world.campaign_id).await.unwrap();
    assert_eq!(events.len(), 1);
    tx.rollback().await.unwrap();
}

#[tokio::test]
async fn test_rewind_restores_player_projection() {
    // Arrange — xp grows across turns; rewind must roll it back.
    let world = seed_world().await;
    let completion = Arc::new(ScriptedCompletion::new(vec![
        json!({ "narration": "step one", "xp_awarded": 10 }),
        json!({ "narration": "step two", "xp_awarded": 10 }),
    ]));
    let engine = engine(&world, completion);
    let first = engine.resolve_turn(input(&world, "go")).await.unwrap();
    engine.resolve_turn(input(&world, "go again")).await.unwrap();

    // Act
    engine
        .rewind_to_turn(world.campaign_id, first.narration_turn_id)
        .await
        .unwrap();

    // Assert
    let mut tx = world.store.begin().await.unwrap();
    let player = tx.players().get(world.campaign_id, world.actor_id).await.unwrap().unwrap();
    assert_eq!(player.xp, 10);
    tx.rollback().await.unwrap();
}

#[tokio::test]
async fn test_rewind_requires_a_snapshot_from_the_same_campaign() {
    // Arrange — a second campaign with its own narration turn.
    let world = seed_world().await;
    play_three_turns(&world).await;

    let now = world.clock.now();
    let mut tx = world.store.begin().await.unwrap();
    let other_actor = tx.actors().create(Some("Other"), "human", now).await.unwrap();
    let other_campaign = tx
        .campaigns()
        .create("default", "side", Some(other_actor.id), now)
        .await
        .unwrap();
    tx.players().create(other_campaign.id, other_actor.id, now).await.unwrap();
    tx.commit().await.unwrap();

    let completion = Arc::new(ScriptedCompletion::new(vec![
        json!({ "narration": "elsewhere" }),
    ]));
    let engine = engine(&world, completion);
    let other_result = engine
        .resolve_turn(ResolveTurnInput {
            campaign_id: other_campaign.id,
            actor_id: other_actor.id,
            action: "go".to_owned(),
            session_id: None,
        })
        .await
        .unwrap();

    // Act — rewinding the first campaign to the other campaign's turn.
    let result = engine
        .rewind_to_turn(world.campaign_id, other_result.narration_turn_id)
        .await;

    // Assert
    assert!(matches!(result, Err(EngineError::NoSnapshot(_))));
}

#[tokio::test]
async fn test_rewind_unknown_campaign_is_not_found() {
    let world = seed_world().await;
    let completion = Arc::new(ScriptedCompletion::new(Vec::new()));
    let engine = engine(&world, completion);

    let result = engine.rewind_to_turn(Uuid::new_v4(), 1).await;

    assert!(matches!(result, Err(EngineError::NotFound("campaign"))));
}

#[tokio::test]
async fn test_rewind_by_external_message_resolves_through_both_bindings() {
    // Arrange
    let world = seed_world().await;
    let narration_ids = play_three_turns(&world).await;
    let target = narration_ids[1];
    {
        let mut tx = world.store.begin().await.unwrap();
        tx.turns()
            .bind_external_messages(target, Some("narr-77"), Some("user-77"))
            .await
            .unwrap();
        tx.commit().await.unwrap();
    }
    let completion = Arc::new(ScriptedCompletion::new(Vec::new()));
    let engine = engine(&world, completion);

    // Act / Assert — the narration binding resolves.
    let result = engine
        .rewind_to_message(world.campaign_id, "narr-77")
        .await
        .unwrap();
    assert_eq!(result.target_turn_id, target);

    // The user-message binding also resolves; the turn is already the tip
    // so nothing further is deleted.
    let again = engine
        .rewind_to_message(world.campaign_id, "user-77")
        .await
        .unwrap();
    assert_eq!(again.deleted_turns, 0);

    // An unknown message id is a missing turn.
    let missing = engine.rewind_to_message(world.campaign_id, "nope").await;
    assert!(matches!(missing, Err(EngineError::NotFound("turn"))));
}

/// A memory index that returns a fixed hit list regardless of the query.
struct FixedMemorySearch(Vec<serde_json::Value>);

#[async_trait]
impl MemorySearch for FixedMemorySearch {
    async fn search(
        &self,
        _campaign_id: Uuid,
        _query: &str,
        _limit: usize,
    ) -> Result<Vec<serde_json::Value>, PortError> {
        Ok(self.0.clone())
    }
}

#[tokio::test]
async fn test_search_visible_memories_applies_the_watermark() {
    // Arrange
    let world = seed_world().await;
    let narration_ids = play_three_turns(&world).await;
    let target = narration_ids[1];

    let hits = vec![
        json!({ "turn_id": target, "content": "kept" }),
        json!({ "turn_id": target + 5, "content": "pruned" }),
    ];
    let completion = Arc::new(ScriptedCompletion::new(Vec::new()));
    let engine = engine(&world, completion)
        .with_memory_search(Arc::new(FixedMemorySearch(hits)));

    engine.rewind_to_turn(world.campaign_id, target).await.unwrap();

    // Act
    let visible = engine
        .search_visible_memories(world.campaign_id, "what happened", 10)
        .await
        .unwrap();

    // Assert
    assert_eq!(visible, vec![json!({ "turn_id": target, "content": "kept" })]);
}

#[tokio::test]
async fn test_memory_filter_is_transparent_before_rewind_and_caps_after() {
    // Arrange
    let world = seed_world().await;
    let narration_ids = play_three_turns(&world).await;
    let target = narration_ids[1];
    let completion = Arc::new(ScriptedCompletion::new(Vec::new()));
    let engine = engine(&world, completion);

    let hits = vec![
        json!({ "turn_id": target - 1, "content": "older" }),
        json!({ "turn_id": target + 10, "content": "future" }),
    ];

    // Act / Assert — fresh campaign, no watermark: everything is visible.
    let before = engine
        .filter_memory_hits_by_visibility(world.campaign_id, hits.clone())
        .await
        .unwrap();
    assert_eq!(before.len(), 2);

    // After the rewind only hits at or below the watermark survive.
    engine.rewind_to_turn(world.campaign_id, target).await.unwrap();
    let after = engine
        .filter_memory_hits_by_visibility(world.campaign_id, hits)
        .await
        .unwrap();
    assert_eq!(after, vec![json!({ "turn_id": target - 1, "content": "older" })]);

    // An unknown campaign is an error rather than an empty result.
    let missing = engine
        .filter_memory_hits_by_visibility(Uuid::new_v4(), Vec::new())
        .await;
    assert!(matches!(missing, Err(EngineError::NotFound("campaign"))));
}
