//! End-to-end turn-resolution flows against in-memory SQLite.

mod common;

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Duration;
use everloom_core::clock::Clock;
use serde_json::json;
use tokio::sync::Barrier;
use uuid::Uuid;

use everloom_core::types::{ClaimToken, ResolveTurnInput, TurnContext};
use everloom_engine::{EngineConfig, EngineError, LeaseManager, TurnProbe};
use everloom_store::Store;
use everloom_test_support::{FailingCompletion, ScriptedCompletion, StaticActorResolver, SteppingClock};

use common::{engine, engine_with_config, seed_world, TestWorld};

fn look_input(world: &TestWorld) -> ResolveTurnInput {
    ResolveTurnInput {
        campaign_id: world.campaign_id,
        actor_id: world.actor_id,
        action: "look".to_owned(),
        session_id: None,
    }
}

#[tokio::test]
async fn test_happy_path_commits_turn_pair_snapshot_and_version_bump() {
    // Arrange
    let world = seed_world().await;
    let completion = Arc::new(ScriptedCompletion::new(vec![
        json!({ "narration": "You see a lamp." }),
    ]));
    let engine = engine(&world, completion);

    // Act
    let result = engine.resolve_turn(look_input(&world)).await.unwrap();

    // Assert
    assert_eq!(result.narration, "You see a lamp.");
    assert_eq!(result.row_version_new, 2);
    assert!(result.emitted_events.is_empty());

    let mut tx = world.store.begin().await.unwrap();
    let campaign = tx.campaigns().get(world.campaign_id).await.unwrap().unwrap();
    assert_eq!(campaign.row_version, 2);
    assert_eq!(campaign.last_narration.as_deref(), Some("You see a lamp."));
    assert_eq!(campaign.memory_visible_max_turn_id, None);

    let turns = tx.turns().recent(world.campaign_id, 10).await.unwrap();
    assert_eq!(turns.len(), 2);
    assert_eq!((turns[0].kind.as_str(), turns[0].content.as_str()), ("user", "look"));
    assert_eq!(
        (turns[1].kind.as_str(), turns[1].content.as_str()),
        ("narration", "You see a lamp.")
    );
    assert_eq!(turns[1].id, result.narration_turn_id);

    let snapshot = tx
        .snapshots()
        .get_by_campaign_turn(world.campaign_id, result.narration_turn_id)
        .await
        .unwrap();
    assert!(snapshot.is_some());

    assert!(tx.timers().active(world.campaign_id).await.unwrap().is_none());
    assert!(tx.outbox().list_by_campaign(world.campaign_id).await.unwrap().is_empty());
    // The lease was released inside the commit.
    assert!(tx.inflight().get(world.campaign_id, world.actor_id).await.unwrap().is_none());
    tx.rollback().await.unwrap();
}

#[tokio::test]
async fn test_second_submission_while_inflight_returns_lease_held() {
    // Arrange — another worker already holds the claim.
    let world = seed_world().await;
    let leases = LeaseManager::new(world.store.clone(), world.clock.clone(), 90);
    let token = leases.claim(world.campaign_id, world.actor_id).await.unwrap().unwrap();

    let completion = Arc::new(ScriptedCompletion::new(vec![json!({ "narration": "nope" })]));
    let engine = engine(&world, completion);

    // Act
    let result = engine.resolve_turn(look_input(&world)).await;

    // Assert
    assert!(matches!(result, Err(EngineError::LeaseHeld { .. })));
    assert_eq!(world.turn_count().await, 0);
    assert_eq!(world.campaign_row_version().await, 1);

    let mut tx = world.store.begin().await.unwrap();
    let lease = tx.inflight().get(world.campaign_id, world.actor_id).await.unwrap().unwrap();
    assert_eq!(lease.claim_token, token.as_uuid());
    tx.rollback().await.unwrap();
}

#[tokio::test]
async fn test_unknown_campaign_is_not_found() {
    let world = seed_world().await;
    let completion = Arc::new(ScriptedCompletion::new(vec![json!({ "narration": "x" })]));
    let engine = engine(&world, completion);

    let result = engine
        .resolve_turn(ResolveTurnInput {
            campaign_id: Uuid::new_v4(),
            actor_id: world.actor_id,
            action: "look".to_owned(),
            session_id: None,
        })
        .await;

    assert!(matches!(result, Err(EngineError::NotFound("campaign"))));
}

/// Commits a conflicting campaign update from "another worker" while the
/// probed turn sits between Phase B and Phase C.
struct BumpProbe {
    store: Store,
    campaign_id: Uuid,
    clock: Arc<SteppingClock>,
    only_attempt: Option<u32>,
    calls: Mutex<Vec<u32>>,
}

impl BumpProbe {
    fn new(world: &TestWorld, only_attempt: Option<u32>) -> Self {
        Self {
            store: world.store.clone(),
            campaign_id: world.campaign_id,
            clock: world.clock.clone(),
            only_attempt,
            calls: Mutex::new(Vec::new()),
        }
    }

    fn calls(&self) -> Vec<u32> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl TurnProbe for BumpProbe {
    async fn before_phase_c(&self, _context: &TurnContext, attempt: u32) {
        self.calls.lock().unwrap().push(attempt);
        if self.only_attempt.is_some_and(|only| only != attempt) {
            return;
        }
        let now = self.clock.now();
        let mut tx = self.store.begin().await.unwrap();
        let campaign = tx.campaigns().get(self.campaign_id).await.unwrap().unwrap();
        tx.campaigns()
            .commit_turn_state(
                campaign.id,
                campaign.row_version,
                &campaign.summary,
                &campaign.state_json,
                &campaign.characters_json,
                campaign.last_narration.as_deref().unwrap_or(""),
                now,
            )
            .await
            .unwrap();
        tx.commit().await.unwrap();
    }
}

#[tokio::test]
async fn test_cas_conflict_rolls_back_every_phase_c_write() {
    // Arrange — no retry budget, conflict on every attempt.
    let world = seed_world().await;
    let completion = Arc::new(ScriptedCompletion::new(vec![json!({
        "narration": "A scene happens.",
        "state_update": { "k": "v" },
        "scene_image_prompt": "describe scene",
        "timer": { "op": "schedule", "delay_seconds": 60, "event_text": "Boom" },
    })]));
    let config = EngineConfig {
        max_conflict_retries: 0,
        ..EngineConfig::default()
    };
    let engine = engine_with_config(&world, completion, config);
    let probe = BumpProbe::new(&world, None);

    // Act
    let result = engine
        .resolve_turn_with_probe(look_input(&world), Some(&probe))
        .await;

    // Assert — the conflict surfaced and nothing escaped the rollback.
    assert!(matches!(result, Err(EngineError::CasConflict { expected: 1, .. })));
    assert_eq!(world.turn_count().await, 0);

    let mut tx = world.store.begin().await.unwrap();
    assert_eq!(tx.snapshots().count_by_campaign(world.campaign_id).await.unwrap(), 0);
    assert!(tx.timers().active(world.campaign_id).await.unwrap().is_none());
    assert!(tx.outbox().list_by_campaign(world.campaign_id).await.unwrap().is_empty());
    // The claim was released so the caller can resubmit immediately.
    assert!(tx.inflight().get(world.campaign_id, world.actor_id).await.unwrap().is_none());
    tx.rollback().await.unwrap();
}

#[tokio::test]
async fn test_cas_conflict_retries_from_phase_a_and_commits() {
    // Arrange — conflict injected only on the first attempt.
    let world = seed_world().await;
    let completion = Arc::new(ScriptedCompletion::new(vec![
        json!({ "narration": "first try" }),
        json!({ "narration": "second try" }),
    ]));
    let engine = engine(&world, completion);
    let probe = BumpProbe::new(&world, Some(0));

    // Act
    let result = engine
        .resolve_turn_with_probe(look_input(&world), Some(&probe))
        .await
        .unwrap();

    // Assert — the retry observed the bumped version and committed on it.
    assert_eq!(probe.calls(), vec![0, 1]);
    assert_eq!(result.narration, "second try");
    assert_eq!(result.row_version_new, 3);
    assert_eq!(world.campaign_row_version().await, 3);
    // Only the committed attempt's turn pair exists.
    assert_eq!(world.turn_count().await, 2);
}

#[tokio::test]
async fn test_concurrent_turns_on_one_campaign_serialize_by_row_version() {
    // Arrange — two actors race; a shared barrier holds both inside
    // Phase B until each has loaded row_version 1.
    let world = seed_world().await;
    let other_actor = world.add_actor("Rival").await;
    let barrier = Arc::new(Barrier::new(2));

    let completion_a = Arc::new(
        ScriptedCompletion::new(vec![
            json!({ "narration": "a first" }),
            json!({ "narration": "a retry" }),
        ])
        .with_barrier(barrier.clone()),
    );
    let completion_b = Arc::new(
        ScriptedCompletion::new(vec![
            json!({ "narration": "b first" }),
            json!({ "narration": "b retry" }),
        ])
        .with_barrier(barrier),
    );
    let engine_a = engine(&world, completion_a);
    let engine_b = engine(&world, completion_b);

    let input_a = look_input(&world);
    let input_b = ResolveTurnInput {
        campaign_id: world.campaign_id,
        actor_id: other_actor,
        action: "listen".to_owned(),
        session_id: None,
    };

    // Act
    let (result_a, result_b) =
        tokio::join!(engine_a.resolve_turn(input_a), engine_b.resolve_turn(input_b));

    // Assert — exactly one commit per version: one turn won version 2, the
    // other retried and won version 3.
    let result_a = result_a.unwrap();
    let result_b = result_b.unwrap();
    let mut versions = vec![result_a.row_version_new, result_b.row_version_new];
    versions.sort_unstable();
    assert_eq!(versions, vec![2, 3]);
    assert_eq!(world.campaign_row_version().await, 3);
    assert_eq!(world.turn_count().await, 4);
}

/// Expires the holder's lease and steals it from a second worker while the
/// first sits between Phase B and Phase C.
struct StealProbe {
    leases: LeaseManager,
    clock: Arc<SteppingClock>,
    stolen: Mutex<Option<ClaimToken>>,
}

#[async_trait]
impl TurnProbe for StealProbe {
    async fn before_phase_c(&self, context: &TurnContext, _attempt: u32) {
        self.clock.advance(Duration::seconds(91));
        let token = self
            .leases
            .claim(context.campaign_id, context.actor_id)
            .await
            .unwrap()
            .expect("expired lease should be stealable");
        *self.stolen.lock().unwrap() = Some(token);
    }
}

#[tokio::test]
async fn test_stolen_lease_fails_commit_with_zero_writes() {
    // Arrange
    let world = seed_world().await;
    let completion = Arc::new(ScriptedCompletion::new(vec![json!({ "narration": "late" })]));
    let engine = engine(&world, completion);
    let probe = StealProbe {
        leases: LeaseManager::new(world.store.clone(), world.clock.clone(), 90),
        clock: world.clock.clone(),
        stolen: Mutex::new(None),
    };

    // Act
    let result = engine
        .resolve_turn_with_probe(look_input(&world), Some(&probe))
        .await;

    // Assert
    assert!(matches!(result, Err(EngineError::LeaseLost)));
    assert_eq!(world.turn_count().await, 0);
    assert_eq!(world.campaign_row_version().await, 1);

    // The thief's lease is untouched.
    let stolen = probe.stolen.lock().unwrap().unwrap();
    let mut tx = world.store.begin().await.unwrap();
    let lease = tx.inflight().get(world.campaign_id, world.actor_id).await.unwrap().unwrap();
    assert_eq!(lease.claim_token, stolen.as_uuid());
    tx.rollback().await.unwrap();
}

#[tokio::test]
async fn test_unparseable_model_output_surfaces_with_no_writes() {
    // Arrange — payload lacks the required narration field.
    let world = seed_world().await;
    let completion = Arc::new(ScriptedCompletion::new(vec![json!({ "xp_awarded": 5 })]));
    let engine = engine(&world, completion);

    // Act
    let result = engine.resolve_turn(look_input(&world)).await;

    // Assert
    assert!(matches!(result, Err(EngineError::BadModelOutput(_))));
    assert_eq!(world.turn_count().await, 0);

    // The claim is left to expire by TTL rather than released.
    let mut tx = world.store.begin().await.unwrap();
    assert!(tx.inflight().get(world.campaign_id, world.actor_id).await.unwrap().is_some());
    tx.rollback().await.unwrap();
}

#[tokio::test]
async fn test_completion_port_failure_surfaces_with_no_writes() {
    let world = seed_world().await;
    let engine = engine(&world, Arc::new(FailingCompletion));

    let result = engine.resolve_turn(look_input(&world)).await;

    assert!(matches!(result, Err(EngineError::Port(_))));
    assert_eq!(world.turn_count().await, 0);
    assert_eq!(world.campaign_row_version().await, 1);
}

#[tokio::test]
async fn test_blank_narration_falls_back_to_stock_line() {
    let world = seed_world().await;
    let completion = Arc::new(ScriptedCompletion::new(vec![json!({ "narration": "   " })]));
    let engine = engine(&world, completion);

    let result = engine.resolve_turn(look_input(&world)).await.unwrap();

    assert_eq!(result.narration, "The world shifts, but nothing clear emerges.");
}

#[tokio::test]
async fn test_model_updates_patch_state_summary_and_xp() {
    // Arrange
    let world = seed_world().await;
    let completion = Arc::new(ScriptedCompletion::new(vec![json!({
        "narration": "You pocket the coin.",
        "state_update": { "lamp": "lit", "fog": null },
        "player_state_update": { "coins": 3 },
        "summary_update": "  The coin is found.  ",
        "xp_awarded": 25,
    })]));
    let engine = engine(&world, completion);

    // Seed prior campaign state so the null-delete is observable.
    {
        let mut tx = world.store.begin().await.unwrap();
        let campaign = tx.campaigns().get(world.campaign_id).await.unwrap().unwrap();
        tx.campaigns()
            .commit_turn_state(
                world.campaign_id,
                campaign.row_version,
                "An opening scene.",
                r#"{"fog":"thick"}"#,
                "{}",
                "",
                world.clock.now(),
            )
            .await
            .unwrap();
        tx.commit().await.unwrap();
    }

    // Act
    let result = engine.resolve_turn(look_input(&world)).await.unwrap();
    assert_eq!(result.row_version_new, 3);

    // Assert
    let mut tx = world.store.begin().await.unwrap();
    let campaign = tx.campaigns().get(world.campaign_id).await.unwrap().unwrap();
    let state: serde_json::Value = serde_json::from_str(&campaign.state_json).unwrap();
    assert_eq!(state["lamp"], "lit");
    assert!(state.get("fog").is_none());
    assert_eq!(campaign.summary, "An opening scene.\nThe coin is found.");

    let player = tx.players().get(world.campaign_id, world.actor_id).await.unwrap().unwrap();
    assert_eq!(player.xp, 25);
    let player_state: serde_json::Value = serde_json::from_str(&player.state_json).unwrap();
    assert_eq!(player_state["coins"], 3);
    tx.rollback().await.unwrap();
}

#[tokio::test]
async fn test_timer_schedule_then_bind_then_noop_rebind() {
    // Arrange
    let world = seed_world().await;
    let completion = Arc::new(ScriptedCompletion::new(vec![json!({
        "narration": "The sky pales.",
        "timer": {
            "op": "schedule",
            "delay_seconds": 60,
            "event_text": "dawn",
            "interruptible": true,
        },
    })]));
    let engine = engine(&world, completion);

    // Act
    let result = engine.resolve_turn(look_input(&world)).await.unwrap();

    // Assert — one unbound timer due in exactly sixty seconds.
    let mut tx = world.store.begin().await.unwrap();
    let timer = tx.timers().active(world.campaign_id).await.unwrap().unwrap();
    assert_eq!(timer.status, "scheduled_unbound");
    assert_eq!(timer.event_text, "dawn");
    assert_eq!(timer.due_at, world.clock.now() + Duration::seconds(60));
    tx.rollback().await.unwrap();

    assert!(result
        .emitted_events
        .iter()
        .any(|e| e.event_type == "timer_scheduled"));

    // Binding transitions it once; the second bind is a no-op.
    assert!(engine
        .attach_timer_message(world.campaign_id, "M42", None, None)
        .await
        .unwrap());
    assert!(!engine
        .attach_timer_message(world.campaign_id, "M43", None, None)
        .await
        .unwrap());

    let mut tx = world.store.begin().await.unwrap();
    let timer = tx.timers().active(world.campaign_id).await.unwrap().unwrap();
    assert_eq!(timer.status, "scheduled_bound");
    assert_eq!(timer.external_message_id.as_deref(), Some("M42"));
    tx.rollback().await.unwrap();
}

#[tokio::test]
async fn test_new_schedule_supersedes_active_timer() {
    // Arrange
    let world = seed_world().await;
    let completion = Arc::new(ScriptedCompletion::new(vec![
        json!({
            "narration": "A fuse hisses.",
            "timer": { "op": "schedule", "delay_seconds": 60, "event_text": "boom" },
        }),
        json!({
            "narration": "You stamp it out and light another.",
            "timer": { "op": "schedule", "delay_seconds": 120, "event_text": "bigger boom" },
        }),
    ]));
    let engine = engine(&world, completion);

    // Act
    engine.resolve_turn(look_input(&world)).await.unwrap();
    let first = {
        let mut tx = world.store.begin().await.unwrap();
        let timer = tx.timers().active(world.campaign_id).await.unwrap().unwrap();
        tx.rollback().await.unwrap();
        timer
    };
    engine.resolve_turn(look_input(&world)).await.unwrap();

    // Assert — the replacement is the single active timer; the first one
    // was cancelled inside the same commit.
    let mut tx = world.store.begin().await.unwrap();
    let active = tx.timers().active(world.campaign_id).await.unwrap().unwrap();
    assert_eq!(active.event_text, "bigger boom");
    let cancelled = tx.timers().get(first.id).await.unwrap().unwrap();
    assert_eq!(cancelled.status, "cancelled");
    tx.rollback().await.unwrap();
}

#[tokio::test]
async fn test_short_timer_delays_are_clamped_to_the_floor() {
    let world = seed_world().await;
    let completion = Arc::new(ScriptedCompletion::new(vec![json!({
        "narration": "It ticks.",
        "timer": { "op": "schedule", "delay_seconds": 5, "event_text": "tick" },
    })]));
    let engine = engine(&world, completion);

    engine.resolve_turn(look_input(&world)).await.unwrap();

    let mut tx = world.store.begin().await.unwrap();
    let timer = tx.timers().active(world.campaign_id).await.unwrap().unwrap();
    assert_eq!(timer.due_at, world.clock.now() + Duration::seconds(30));
    tx.rollback().await.unwrap();
}

#[tokio::test]
async fn test_give_item_with_resolved_target_moves_inventory() {
    // Arrange — the acting player holds a rusty key; a rival awaits it.
    let world = seed_world().await;
    let rival = world.add_actor("Rival").await;
    {
        let mut tx = world.store.begin().await.unwrap();
        let player = tx.players().get(world.campaign_id, world.actor_id).await.unwrap().unwrap();
        tx.players()
            .set_state(
                player.id,
                r#"{"inventory":[{"name":"rusty key","origin":""}]}"#,
                world.clock.now(),
            )
            .await
            .unwrap();
        tx.commit().await.unwrap();
    }

    let completion = Arc::new(ScriptedCompletion::new(vec![json!({
        "narration": "You hand it over.",
        "give_items": [{ "item": "Rusty Key", "to_actor_id": rival.to_string() }],
    })]));
    let engine = engine(&world, completion);

    // Act
    let result = engine.resolve_turn(look_input(&world)).await.unwrap();
    assert!(result.emitted_events.is_empty());

    // Assert
    let mut tx = world.store.begin().await.unwrap();
    let source = tx.players().get(world.campaign_id, world.actor_id).await.unwrap().unwrap();
    let source_state: serde_json::Value = serde_json::from_str(&source.state_json).unwrap();
    assert_eq!(source_state["inventory"].as_array().unwrap().len(), 0);

    let target = tx.players().get(world.campaign_id, rival).await.unwrap().unwrap();
    let target_state: serde_json::Value = serde_json::from_str(&target.state_json).unwrap();
    let target_inv = target_state["inventory"].as_array().unwrap();
    assert_eq!(target_inv.len(), 1);
    assert_eq!(target_inv[0]["name"], "rusty key");
    assert_eq!(
        target_inv[0]["origin"],
        format!("Received from {}", world.actor_id)
    );
    tx.rollback().await.unwrap();
}

#[tokio::test]
async fn test_give_item_mention_resolves_through_the_actor_resolver() {
    // Arrange — the target is named by a surface mention only.
    let world = seed_world().await;
    let rival = world.add_actor("Rival").await;
    {
        let mut tx = world.store.begin().await.unwrap();
        let player = tx.players().get(world.campaign_id, world.actor_id).await.unwrap().unwrap();
        tx.players()
            .set_state(player.id, r#"{"inventory":["lantern"]}"#, world.clock.now())
            .await
            .unwrap();
        tx.commit().await.unwrap();
    }

    let completion = Arc::new(ScriptedCompletion::new(vec![json!({
        "narration": "You pass the lantern across.",
        "give_items": [{ "item": "lantern", "to_mention": "<@42>" }],
    })]));
    let resolver = Arc::new(StaticActorResolver::new([("<@42>".to_owned(), rival)]));
    let engine = engine(&world, completion).with_actor_resolver(resolver);

    // Act
    engine.resolve_turn(look_input(&world)).await.unwrap();

    // Assert — resolved through the port, so the item moved and nothing
    // landed in the outbox.
    let mut tx = world.store.begin().await.unwrap();
    let target = tx.players().get(world.campaign_id, rival).await.unwrap().unwrap();
    let target_state: serde_json::Value = serde_json::from_str(&target.state_json).unwrap();
    assert_eq!(target_state["inventory"][0]["name"], "lantern");
    assert!(tx.outbox().list_by_campaign(world.campaign_id).await.unwrap().is_empty());
    tx.rollback().await.unwrap();
}

#[tokio::test]
async fn test_timer_cancel_instruction_clears_the_active_timer() {
    // Arrange — first turn schedules, second turn cancels.
    let world = seed_world().await;
    let completion = Arc::new(ScriptedCompletion::new(vec![
        json!({
            "narration": "A fuse hisses.",
            "timer": { "op": "schedule", "delay_seconds": 60, "event_text": "boom" },
        }),
        json!({
            "narration": "You snuff the fuse.",
            "timer": { "op": "cancel" },
        }),
    ]));
    let engine = engine(&world, completion);

    // Act
    engine.resolve_turn(look_input(&world)).await.unwrap();
    engine.resolve_turn(look_input(&world)).await.unwrap();

    // Assert
    let mut tx = world.store.begin().await.unwrap();
    assert!(tx.timers().active(world.campaign_id).await.unwrap().is_none());
    tx.rollback().await.unwrap();

    // Cancelling again from the engine surface is a no-op.
    assert!(!engine.cancel_timer(world.campaign_id).await.unwrap());
}

#[tokio::test]
async fn test_give_item_with_unresolvable_target_is_nonfatal() {
    // Arrange — no actor resolver is configured, so the mention dangles.
    let world = seed_world().await;
    let completion = Arc::new(ScriptedCompletion::new(vec![json!({
        "narration": "You try to hand it over.",
        "give_items": [{ "item": "rusty key", "to_mention": "<@999999>" }],
    })]));
    let engine = engine(&world, completion);

    // Act
    let result = engine.resolve_turn(look_input(&world)).await.unwrap();

    // Assert — the turn committed and the failure went to the outbox.
    let mut tx = world.store.begin().await.unwrap();
    let events = tx.outbox().list_by_campaign(world.campaign_id).await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type, "give_item_unresolved");
    assert!(events[0]
        .idempotency_key
        .starts_with(&format!("give_item_unresolved:{}", result.narration_turn_id)));
    let payload: serde_json::Value = serde_json::from_str(&events[0].payload_json).unwrap();
    assert_eq!(payload["issue"], "unresolved_target");
    tx.rollback().await.unwrap();

    assert_eq!(
        result.emitted_events.iter().map(|e| e.event_type.as_str()).collect::<Vec<_>>(),
        vec!["give_item_unresolved"]
    );
}

#[tokio::test]
async fn test_scene_image_request_is_emitted_with_room_key() {
    // Arrange
    let world = seed_world().await;
    let completion = Arc::new(ScriptedCompletion::new(vec![json!({
        "narration": "The cavern glitters.",
        "player_state_update": { "location": "Moss Cavern" },
        "scene_image_prompt": "a glittering moss cavern",
    })]));
    let engine = engine(&world, completion);

    // Act
    let result = engine.resolve_turn(look_input(&world)).await.unwrap();

    // Assert
    let mut tx = world.store.begin().await.unwrap();
    let events = tx.outbox().list_by_campaign(world.campaign_id).await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type, "scene_image_requested");
    assert_eq!(
        events[0].idempotency_key,
        format!("scene_image:{}:moss cavern", result.narration_turn_id)
    );
    let payload: serde_json::Value = serde_json::from_str(&events[0].payload_json).unwrap();
    assert_eq!(payload["room_key"], "moss cavern");
    assert_eq!(payload["scene_image_prompt"], "a glittering moss cavern");
    tx.rollback().await.unwrap();
}
