//! Value types exchanged between the engine, its ports, and its callers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Opaque structured blob carried by campaigns, characters, and players.
/// The engine merges and forwards these; it never interprets their keys.
pub type JsonObject = serde_json::Map<String, serde_json::Value>;

/// Opaque nonce asserting ownership of an inflight-turn lease.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClaimToken(Uuid);

impl ClaimToken {
    /// Mints a fresh token.
    #[must_use]
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the underlying nonce.
    #[must_use]
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for ClaimToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Author role of a persisted turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnKind {
    /// An action submitted by a player.
    User,
    /// The narrated outcome of a user action.
    Narration,
    /// Engine-generated bookkeeping (timer firings and the like).
    System,
}

impl TurnKind {
    /// Stable string form used at rest.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Narration => "narration",
            Self::System => "system",
        }
    }
}

impl fmt::Display for TurnKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Names the campaign, acting actor, action text, and optional surface
/// session for one turn resolution.
#[derive(Debug, Clone)]
pub struct ResolveTurnInput {
    pub campaign_id: Uuid,
    pub actor_id: Uuid,
    pub action: String,
    pub session_id: Option<Uuid>,
}

/// One line of recent history carried into the prompt, oldest first.
#[derive(Debug, Clone)]
pub struct RecentTurn {
    pub id: i64,
    pub kind: String,
    pub actor_id: Option<Uuid>,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// The active timer observed while assembling a turn context.
#[derive(Debug, Clone)]
pub struct ActiveTimer {
    pub id: Uuid,
    pub event_text: String,
    pub due_at: DateTime<Utc>,
    pub interruptible: bool,
}

/// Read-only snapshot assembled by Phase A and carried across the
/// completion call. `start_row_version` is the concurrency fence Phase C
/// commits against.
#[derive(Debug, Clone)]
pub struct TurnContext {
    pub campaign_id: Uuid,
    pub actor_id: Uuid,
    pub session_id: Option<Uuid>,
    pub action: String,
    pub campaign_state: JsonObject,
    pub campaign_summary: String,
    pub campaign_characters: JsonObject,
    pub player_id: Uuid,
    pub player_state: JsonObject,
    pub player_level: i64,
    pub player_xp: i64,
    pub recent_turns: Vec<RecentTurn>,
    pub active_timer: Option<ActiveTimer>,
    pub start_row_version: i64,
    pub now: DateTime<Utc>,
}

/// Prompt pair handed to the completion port.
#[derive(Debug, Clone)]
pub struct TurnPrompt {
    pub system: String,
    pub user: String,
}

/// Timer directive parsed from model output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum TimerInstruction {
    /// Replace any active timer with a new one firing after `delay_seconds`.
    Schedule {
        delay_seconds: i64,
        event_text: String,
        #[serde(default = "default_interruptible")]
        interruptible: bool,
        #[serde(default)]
        interrupt_action: Option<String>,
    },
    /// Cancel the active timer, if any.
    Cancel,
    /// Bind the active timer to an already-sent surface message.
    Bind {
        message_id: String,
        #[serde(default)]
        channel_id: Option<String>,
        #[serde(default)]
        thread_id: Option<String>,
    },
}

fn default_interruptible() -> bool {
    true
}

/// Item hand-off parsed from model output. The target is either a literal
/// actor id or a surface mention resolved through the `ActorResolver` port;
/// unresolved targets are non-fatal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GiveItemInstruction {
    pub item: String,
    #[serde(default)]
    pub to_actor_id: Option<String>,
    #[serde(default)]
    pub to_mention: Option<String>,
}

/// Structured output of one completion call.
///
/// Only `narration` is required; everything else defaults to "no effect".
/// Deserialization failure of the raw model payload is a `BadModelOutput`.
#[derive(Debug, Clone, Deserialize)]
pub struct TurnOutput {
    pub narration: String,
    #[serde(default)]
    pub state_update: JsonObject,
    #[serde(default)]
    pub character_updates: JsonObject,
    #[serde(default)]
    pub player_state_update: JsonObject,
    #[serde(default)]
    pub summary_update: Option<String>,
    #[serde(default)]
    pub xp_awarded: i64,
    #[serde(default)]
    pub scene_image_prompt: Option<String>,
    #[serde(default)]
    pub timer: Option<TimerInstruction>,
    #[serde(default)]
    pub give_items: Vec<GiveItemInstruction>,
}

/// An outbox row written during a commit, reported back to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmittedEvent {
    pub event_type: String,
    pub idempotency_key: String,
}

/// Successful turn resolution.
#[derive(Debug, Clone)]
pub struct ResolveTurnResult {
    pub narration: String,
    pub narration_turn_id: i64,
    pub row_version_new: i64,
    pub emitted_events: Vec<EmittedEvent>,
}

/// Outcome of a rewind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewindResult {
    pub target_turn_id: i64,
    pub deleted_turns: u64,
    pub deleted_snapshots: u64,
}

/// Per-player state captured inside a snapshot, used to restore player rows
/// on rewind.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerProjection {
    pub player_id: Uuid,
    pub actor_id: Uuid,
    pub level: i64,
    pub xp: i64,
    pub attributes_json: String,
    pub state_json: String,
}

/// Envelope for the players blob persisted with each snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlayerRoster {
    pub players: Vec<PlayerProjection>,
}

/// An expired timer handed to the `TimerEffects` port.
#[derive(Debug, Clone)]
pub struct ExpiredTimer {
    pub id: Uuid,
    pub campaign_id: Uuid,
    pub session_id: Option<Uuid>,
    pub event_text: String,
    pub interruptible: bool,
    pub interrupt_action: Option<String>,
    pub due_at: DateTime<Utc>,
}
