//! Row models mapped from the Everloom schema.

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

/// A human or NPC identity.
#[derive(Debug, Clone, FromRow)]
pub struct ActorRow {
    pub id: Uuid,
    pub display_name: Option<String>,
    pub kind: String,
    pub metadata_json: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A game world. `row_version` is the CAS fence.
#[derive(Debug, Clone, FromRow)]
pub struct CampaignRow {
    pub id: Uuid,
    pub namespace: String,
    pub name: String,
    pub name_normalized: String,
    pub created_by_actor_id: Option<Uuid>,
    pub summary: String,
    pub state_json: String,
    pub characters_json: String,
    pub last_narration: Option<String>,
    pub memory_visible_max_turn_id: Option<i64>,
    pub row_version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A surface binding, unique by `surface_key`.
#[derive(Debug, Clone, FromRow)]
pub struct SessionRow {
    pub id: Uuid,
    pub campaign_id: Uuid,
    pub surface: String,
    pub surface_key: String,
    pub surface_channel_id: Option<String>,
    pub surface_thread_id: Option<String>,
    pub enabled: bool,
    pub metadata_json: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// An actor's standing within one campaign.
#[derive(Debug, Clone, FromRow)]
pub struct PlayerRow {
    pub id: Uuid,
    pub campaign_id: Uuid,
    pub actor_id: Uuid,
    pub level: i64,
    pub xp: i64,
    pub attributes_json: String,
    pub state_json: String,
    pub last_active_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One line of append-only history.
#[derive(Debug, Clone, FromRow)]
pub struct TurnRow {
    pub id: i64,
    pub campaign_id: Uuid,
    pub session_id: Option<Uuid>,
    pub actor_id: Option<Uuid>,
    pub kind: String,
    pub content: String,
    pub meta_json: String,
    pub external_message_id: Option<String>,
    pub external_user_message_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// State capture bound to a narration turn.
#[derive(Debug, Clone, FromRow)]
pub struct SnapshotRow {
    pub id: Uuid,
    pub turn_id: i64,
    pub campaign_id: Uuid,
    pub campaign_state_json: String,
    pub campaign_characters_json: String,
    pub campaign_summary: String,
    pub campaign_last_narration: Option<String>,
    pub players_json: String,
    pub created_at: DateTime<Utc>,
}

/// Lifecycle states of a timer. At most one timer per campaign may be in an
/// active state; the partial unique index enforces it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerStatus {
    ScheduledUnbound,
    ScheduledBound,
    Cancelled,
    Expired,
    Consumed,
}

impl TimerStatus {
    /// Stable string form used at rest.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ScheduledUnbound => "scheduled_unbound",
            Self::ScheduledBound => "scheduled_bound",
            Self::Cancelled => "cancelled",
            Self::Expired => "expired",
            Self::Consumed => "consumed",
        }
    }

    /// Whether the status counts against the one-active-timer invariant.
    #[must_use]
    pub fn is_active(self) -> bool {
        matches!(self, Self::ScheduledUnbound | Self::ScheduledBound)
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct TimerRow {
    pub id: Uuid,
    pub campaign_id: Uuid,
    pub session_id: Option<Uuid>,
    pub status: String,
    pub event_text: String,
    pub interruptible: bool,
    pub interrupt_action: Option<String>,
    pub due_at: DateTime<Utc>,
    pub fired_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub external_message_id: Option<String>,
    pub external_channel_id: Option<String>,
    pub external_thread_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A lease asserting exclusive right to resolve a turn for
/// `(campaign, actor)` until `expires_at`.
#[derive(Debug, Clone, FromRow)]
pub struct InflightTurnRow {
    pub id: Uuid,
    pub campaign_id: Uuid,
    pub actor_id: Uuid,
    pub claim_token: Uuid,
    pub claimed_at: DateTime<Utc>,
    pub heartbeat_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// One opaque vector per turn.
#[derive(Debug, Clone, FromRow)]
pub struct EmbeddingRow {
    pub turn_id: i64,
    pub campaign_id: Uuid,
    pub kind: String,
    pub content: String,
    pub embedding: Vec<u8>,
    pub created_at: DateTime<Utc>,
}

/// Generated media associated with a room or player.
#[derive(Debug, Clone, FromRow)]
pub struct MediaRefRow {
    pub id: Uuid,
    pub campaign_id: Uuid,
    pub player_id: Option<Uuid>,
    pub ref_type: String,
    pub room_key: Option<String>,
    pub url: String,
    pub prompt: Option<String>,
    pub metadata_json: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Delivery states of an outbox event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutboxStatus {
    Pending,
    Sent,
    Failed,
}

impl OutboxStatus {
    /// Stable string form used at rest.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Sent => "sent",
            Self::Failed => "failed",
        }
    }
}

/// An externally-visible effect awaiting delivery.
#[derive(Debug, Clone, FromRow)]
pub struct OutboxEventRow {
    pub id: Uuid,
    pub campaign_id: Uuid,
    pub session_id: Option<Uuid>,
    pub session_scope: String,
    pub event_type: String,
    pub idempotency_key: String,
    pub payload_json: String,
    pub status: String,
    pub attempts: i64,
    pub next_attempt_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
