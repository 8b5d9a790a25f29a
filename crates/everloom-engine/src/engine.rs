//! The three-phase turn resolver.
//!
//! Phase A claims the inflight lease and loads the campaign context in one
//! short transaction. Phase B calls the completion port with no transaction
//! open, heartbeating the lease while it waits. Phase C revalidates the
//! lease, commits the new campaign state behind the `row_version` CAS
//! fence, and appends the turn pair, snapshot, timer transitions, and
//! outbox events atomically.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde_json::json;
use uuid::Uuid;

use everloom_core::clock::Clock;
use everloom_core::normalize::{apply_patch, dump_json, parse_json_object, room_key_from_state};
use everloom_core::ports::{ActorResolver, MemorySearch, TextCompletion};
use everloom_core::types::{
    ActiveTimer, ClaimToken, EmittedEvent, PlayerProjection, PlayerRoster, RecentTurn,
    ResolveTurnInput, ResolveTurnResult, TimerInstruction, TurnContext, TurnKind, TurnOutput,
};
use everloom_store::{Store, StoreTx};

use crate::error::EngineError;
use crate::items::{self, GiveItemOutcome};
use crate::lease::LeaseManager;
use crate::prompt;

/// Narration used when the model returns an empty one.
const FALLBACK_NARRATION: &str = "The world shifts, but nothing clear emerges.";

/// Model-requested timer delays are clamped to this floor.
const MIN_TIMER_DELAY_SECONDS: i64 = 30;

/// Tunables of the resolver.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Lease TTL in seconds; the liveness bound when a holder crashes.
    pub lease_ttl_seconds: i64,
    /// How many times a turn restarts from Phase A after a CAS mismatch.
    pub max_conflict_retries: u32,
    /// How many recent turns Phase A loads into the prompt context.
    pub recent_turn_limit: i64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            lease_ttl_seconds: 90,
            max_conflict_retries: 1,
            recent_turn_limit: 24,
        }
    }
}

/// Observation hook invoked between Phase B and Phase C.
///
/// Tests use this to interleave conflicting work at the commit boundary.
/// The hook observes the context; it must not mutate it.
#[async_trait]
pub trait TurnProbe: Send + Sync {
    async fn before_phase_c(&self, context: &TurnContext, attempt: u32);
}

/// The turn-resolution engine. Safe to share across tasks; every operation
/// opens its own transactions against the store.
pub struct TurnEngine {
    pub(crate) store: Store,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) completion: Arc<dyn TextCompletion>,
    pub(crate) actor_resolver: Option<Arc<dyn ActorResolver>>,
    pub(crate) memory_search: Option<Arc<dyn MemorySearch>>,
    pub(crate) leases: LeaseManager,
    pub(crate) config: EngineConfig,
}

impl TurnEngine {
    /// Creates an engine over `store` with the given completion backend.
    #[must_use]
    pub fn new(
        store: Store,
        completion: Arc<dyn TextCompletion>,
        clock: Arc<dyn Clock>,
        config: EngineConfig,
    ) -> Self {
        let leases = LeaseManager::new(store.clone(), clock.clone(), config.lease_ttl_seconds);
        Self {
            store,
            clock,
            completion,
            actor_resolver: None,
            memory_search: None,
            leases,
            config,
        }
    }

    /// Attaches the actor-resolver port used for give-item targets.
    #[must_use]
    pub fn with_actor_resolver(mut self, resolver: Arc<dyn ActorResolver>) -> Self {
        self.actor_resolver = Some(resolver);
        self
    }

    /// Attaches the memory-search port used by
    /// [`TurnEngine::search_visible_memories`].
    #[must_use]
    pub fn with_memory_search(mut self, search: Arc<dyn MemorySearch>) -> Self {
        self.memory_search = Some(search);
        self
    }

    /// The engine's lease manager, for operator tooling (early release of a
    /// stuck claim, inspection).
    #[must_use]
    pub fn leases(&self) -> &LeaseManager {
        &self.leases
    }

    /// Resolves one turn. See the module docs for the phase protocol.
    ///
    /// # Errors
    ///
    /// `LeaseHeld` when the actor already has a turn in flight, `LeaseLost`
    /// when the claim was stolen before commit, `CasConflict` when the
    /// campaign moved concurrently and retries are exhausted,
    /// `BadModelOutput`/`Port` for completion failures, `NotFound` for a
    /// missing campaign, and `Storage` for database failures.
    pub async fn resolve_turn(
        &self,
        input: ResolveTurnInput,
    ) -> Result<ResolveTurnResult, EngineError> {
        self.resolve_turn_with_probe(input, None).await
    }

    /// [`TurnEngine::resolve_turn`] with a test probe at the Phase-B/C
    /// boundary.
    ///
    /// # Errors
    ///
    /// As [`TurnEngine::resolve_turn`].
    pub async fn resolve_turn_with_probe(
        &self,
        input: ResolveTurnInput,
        probe: Option<&dyn TurnProbe>,
    ) -> Result<ResolveTurnResult, EngineError> {
        let mut attempt: u32 = 0;
        loop {
            let claim = ClaimToken::random();
            let context = self.phase_a(&input, claim).await?;
            // A Phase-B failure leaves no durable writes; the lease is left
            // to expire by TTL.
            let output = self.phase_b(&context, claim).await?;
            let give_items =
                items::resolve_give_items(self.actor_resolver.as_deref(), &output.give_items)
                    .await;

            if let Some(probe) = probe {
                probe.before_phase_c(&context, attempt).await;
            }

            match self.phase_c(&input, &context, claim, &output, &give_items).await {
                Ok(result) => return Ok(result),
                Err(err @ EngineError::CasConflict { .. }) => {
                    self.release_best_effort(input.campaign_id, input.actor_id, claim)
                        .await;
                    if attempt < self.config.max_conflict_retries {
                        attempt += 1;
                        tracing::warn!(
                            campaign_id = %input.campaign_id,
                            attempt,
                            "retrying turn after row-version conflict"
                        );
                        continue;
                    }
                    return Err(err);
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Phase A: claim the lease and snapshot the campaign context.
    async fn phase_a(
        &self,
        input: &ResolveTurnInput,
        claim: ClaimToken,
    ) -> Result<TurnContext, EngineError> {
        let now = self.clock.now();
        let expires_at = now + Duration::seconds(self.config.lease_ttl_seconds);

        let mut tx = self.store.begin().await?;
        let Some(campaign) = tx.campaigns().get(input.campaign_id).await? else {
            tx.rollback().await?;
            return Err(EngineError::NotFound("campaign"));
        };

        let claimed = tx
            .inflight()
            .claim(
                input.campaign_id,
                input.actor_id,
                claim.as_uuid(),
                now,
                expires_at,
            )
            .await?;
        if !claimed {
            tx.rollback().await?;
            return Err(EngineError::LeaseHeld {
                campaign_id: input.campaign_id,
                actor_id: input.actor_id,
            });
        }

        let player = tx
            .players()
            .get_or_create(input.campaign_id, input.actor_id, now)
            .await?;
        let turns = tx
            .turns()
            .recent(input.campaign_id, self.config.recent_turn_limit)
            .await?;
        let active_timer = tx.timers().active(input.campaign_id).await?;
        tx.commit().await?;

        Ok(TurnContext {
            campaign_id: input.campaign_id,
            actor_id: input.actor_id,
            session_id: input.session_id,
            action: input.action.clone(),
            campaign_state: parse_json_object(&campaign.state_json),
            campaign_summary: campaign.summary,
            campaign_characters: parse_json_object(&campaign.characters_json),
            player_id: player.id,
            player_state: parse_json_object(&player.state_json),
            player_level: player.level,
            player_xp: player.xp,
            recent_turns: turns
                .into_iter()
                .map(|t| RecentTurn {
                    id: t.id,
                    kind: t.kind,
                    actor_id: t.actor_id,
                    content: t.content,
                    created_at: t.created_at,
                })
                .collect(),
            active_timer: active_timer.map(|t| ActiveTimer {
                id: t.id,
                event_text: t.event_text,
                due_at: t.due_at,
                interruptible: t.interruptible,
            }),
            start_row_version: campaign.row_version,
            now,
        })
    }

    /// Phase B: call the completion port with no transaction open,
    /// heartbeating the lease at a cadence of ttl/3 while it runs.
    async fn phase_b(
        &self,
        context: &TurnContext,
        claim: ClaimToken,
    ) -> Result<TurnOutput, EngineError> {
        let prompt = prompt::assemble(context);

        let cadence = u64::try_from((self.config.lease_ttl_seconds / 3).max(1)).unwrap_or(30);
        let mut ticker = tokio::time::interval(StdDuration::from_secs(cadence));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // An interval's first tick completes immediately; consume it so the
        // first heartbeat lands one cadence in.
        ticker.tick().await;

        let mut completion = self.completion.complete(&prompt);
        let raw = loop {
            tokio::select! {
                result = &mut completion => break result?,
                _ = ticker.tick() => {
                    match self
                        .leases
                        .heartbeat(context.campaign_id, context.actor_id, claim)
                        .await
                    {
                        Ok(true) => {}
                        Ok(false) => tracing::warn!(
                            campaign_id = %context.campaign_id,
                            "heartbeat rejected; lease no longer owned"
                        ),
                        Err(err) => tracing::warn!(
                            campaign_id = %context.campaign_id,
                            error = %err,
                            "heartbeat failed"
                        ),
                    }
                }
            }
        };

        serde_json::from_value(raw).map_err(|err| EngineError::BadModelOutput(err.to_string()))
    }

    /// Phase C: revalidate the lease and commit everything atomically.
    /// Write order: campaign CAS, turn pair, player updates, snapshot,
    /// timer transitions, outbox events, lease release.
    async fn phase_c(
        &self,
        input: &ResolveTurnInput,
        context: &TurnContext,
        claim: ClaimToken,
        output: &TurnOutput,
        give_items: &[GiveItemOutcome],
    ) -> Result<ResolveTurnResult, EngineError> {
        let now = self.clock.now();
        let mut tx = self.store.begin().await?;

        let owned = tx
            .inflight()
            .validate(input.campaign_id, input.actor_id, claim.as_uuid(), now)
            .await?;
        if !owned {
            tx.rollback().await?;
            return Err(EngineError::LeaseLost);
        }

        let Some(campaign) = tx.campaigns().get(input.campaign_id).await? else {
            tx.rollback().await?;
            return Err(EngineError::NotFound("campaign"));
        };
        let Some(player) = tx.players().get(input.campaign_id, input.actor_id).await? else {
            tx.rollback().await?;
            return Err(EngineError::NotFound("player"));
        };

        let campaign_state =
            apply_patch(&parse_json_object(&campaign.state_json), &output.state_update);
        let campaign_characters = apply_patch(
            &parse_json_object(&campaign.characters_json),
            &output.character_updates,
        );
        let mut player_state = apply_patch(
            &parse_json_object(&player.state_json),
            &output.player_state_update,
        );

        let mut summary = campaign.summary.clone();
        if let Some(update) = output
            .summary_update
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
        {
            if !summary.is_empty() {
                summary.push('\n');
            }
            summary.push_str(update);
        }

        let narration = {
            let trimmed = output.narration.trim();
            if trimmed.is_empty() {
                FALLBACK_NARRATION.to_owned()
            } else {
                trimmed.to_owned()
            }
        };

        let state_json = dump_json(&campaign_state);
        let characters_json = dump_json(&campaign_characters);

        let committed = tx
            .campaigns()
            .commit_turn_state(
                input.campaign_id,
                context.start_row_version,
                &summary,
                &state_json,
                &characters_json,
                &narration,
                now,
            )
            .await?;
        if !committed {
            tx.rollback().await?;
            return Err(EngineError::CasConflict {
                campaign_id: input.campaign_id,
                expected: context.start_row_version,
            });
        }

        // The turn pair is indivisible: no observer may see a user turn
        // without its narration.
        let _user_turn_id = tx
            .turns()
            .append(
                input.campaign_id,
                input.session_id,
                Some(input.actor_id),
                TurnKind::User.as_str(),
                &input.action,
                now,
            )
            .await?;
        let narration_turn_id = tx
            .turns()
            .append(
                input.campaign_id,
                input.session_id,
                Some(input.actor_id),
                TurnKind::Narration.as_str(),
                &narration,
                now,
            )
            .await?;

        let mut emitted = Vec::new();
        let mut unresolved = Vec::new();
        for outcome in give_items {
            match outcome {
                GiveItemOutcome::Transfer { item, to_actor_id } => {
                    items::apply_transfer(
                        &mut tx,
                        input.campaign_id,
                        input.actor_id,
                        &mut player_state,
                        *to_actor_id,
                        item,
                        now,
                    )
                    .await?;
                }
                GiveItemOutcome::Unresolved { instruction, issue } => {
                    unresolved.push((instruction, *issue));
                }
            }
        }

        let xp = player.xp + output.xp_awarded.max(0);
        tx.players()
            .update_progress(player.id, xp, &dump_json(&player_state), now)
            .await?;

        let roster = PlayerRoster {
            players: tx
                .players()
                .list_by_campaign(input.campaign_id)
                .await?
                .into_iter()
                .map(|p| PlayerProjection {
                    player_id: p.id,
                    actor_id: p.actor_id,
                    level: p.level,
                    xp: p.xp,
                    attributes_json: p.attributes_json,
                    state_json: p.state_json,
                })
                .collect(),
        };
        let players_json = serde_json::to_string(&roster)
            .unwrap_or_else(|_| r#"{"players":[]}"#.to_owned());

        tx.snapshots()
            .add(
                narration_turn_id,
                input.campaign_id,
                &state_json,
                &characters_json,
                &summary,
                Some(&narration),
                &players_json,
                now,
            )
            .await?;

        if let Some(instruction) = &output.timer {
            self.apply_timer_instruction(&mut tx, input, instruction, now, &mut emitted)
                .await?;
        }

        for (index, (instruction, issue)) in unresolved.iter().enumerate() {
            let key = format!("give_item_unresolved:{narration_turn_id}:{index}");
            let payload = json!({
                "campaign_id": input.campaign_id,
                "actor_id": input.actor_id,
                "issue": issue,
                "item": instruction.item,
                "to_actor_id": instruction.to_actor_id,
                "to_mention": instruction.to_mention,
            })
            .to_string();
            if tx
                .outbox()
                .add(
                    input.campaign_id,
                    input.session_id,
                    "give_item_unresolved",
                    &key,
                    &payload,
                    now,
                )
                .await?
            {
                emitted.push(EmittedEvent {
                    event_type: "give_item_unresolved".to_owned(),
                    idempotency_key: key,
                });
            }
        }

        if let Some(image_prompt) = output
            .scene_image_prompt
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
        {
            let room_key = room_key_from_state(&player_state);
            let key = format!("scene_image:{narration_turn_id}:{room_key}");
            let payload = json!({
                "campaign_id": input.campaign_id,
                "session_id": input.session_id,
                "actor_id": input.actor_id,
                "turn_id": narration_turn_id,
                "room_key": room_key,
                "scene_image_prompt": image_prompt,
            })
            .to_string();
            if tx
                .outbox()
                .add(
                    input.campaign_id,
                    input.session_id,
                    "scene_image_requested",
                    &key,
                    &payload,
                    now,
                )
                .await?
            {
                emitted.push(EmittedEvent {
                    event_type: "scene_image_requested".to_owned(),
                    idempotency_key: key,
                });
            }
        }

        tx.inflight()
            .release(input.campaign_id, input.actor_id, claim.as_uuid())
            .await?;
        tx.commit().await?;

        tracing::info!(
            campaign_id = %input.campaign_id,
            narration_turn_id,
            row_version = context.start_row_version + 1,
            "turn committed"
        );

        Ok(ResolveTurnResult {
            narration,
            narration_turn_id,
            row_version_new: context.start_row_version + 1,
            emitted_events: emitted,
        })
    }

    /// Applies a model timer directive inside the Phase-C transaction. A
    /// schedule supersedes whatever timer is active; cancelling with none
    /// active and binding with none active are no-ops.
    async fn apply_timer_instruction(
        &self,
        tx: &mut StoreTx,
        input: &ResolveTurnInput,
        instruction: &TimerInstruction,
        now: DateTime<Utc>,
        emitted: &mut Vec<EmittedEvent>,
    ) -> Result<(), EngineError> {
        match instruction {
            TimerInstruction::Schedule {
                delay_seconds,
                event_text,
                interruptible,
                interrupt_action,
            } => {
                tx.timers().cancel_active(input.campaign_id, now).await?;
                let due_at = now + Duration::seconds((*delay_seconds).max(MIN_TIMER_DELAY_SECONDS));
                let timer = tx
                    .timers()
                    .schedule(
                        input.campaign_id,
                        input.session_id,
                        due_at,
                        event_text,
                        *interruptible,
                        interrupt_action.as_deref(),
                        now,
                    )
                    .await?;
                let key = format!("timer_scheduled:{}", timer.id);
                let payload = json!({
                    "timer_id": timer.id,
                    "campaign_id": input.campaign_id,
                    "session_id": input.session_id,
                    "due_at": due_at.to_rfc3339(),
                    "event_text": event_text,
                    "interruptible": interruptible,
                })
                .to_string();
                if tx
                    .outbox()
                    .add(
                        input.campaign_id,
                        input.session_id,
                        "timer_scheduled",
                        &key,
                        &payload,
                        now,
                    )
                    .await?
                {
                    emitted.push(EmittedEvent {
                        event_type: "timer_scheduled".to_owned(),
                        idempotency_key: key,
                    });
                }
            }
            TimerInstruction::Cancel => {
                tx.timers().cancel_active(input.campaign_id, now).await?;
            }
            TimerInstruction::Bind {
                message_id,
                channel_id,
                thread_id,
            } => {
                if let Some(active) = tx.timers().active(input.campaign_id).await? {
                    tx.timers()
                        .attach_message(
                            active.id,
                            message_id,
                            channel_id.as_deref(),
                            thread_id.as_deref(),
                            now,
                        )
                        .await?;
                }
            }
        }
        Ok(())
    }

    /// Releases the claim outside any phase transaction, logging instead of
    /// failing: a leaked lease self-heals at TTL.
    pub(crate) async fn release_best_effort(
        &self,
        campaign_id: Uuid,
        actor_id: Uuid,
        claim: ClaimToken,
    ) {
        if let Err(err) = self.leases.release(campaign_id, actor_id, claim).await {
            tracing::warn!(campaign_id = %campaign_id, error = %err, "lease release failed");
        }
    }
}
