//! Capability ports consumed by the engine.
//!
//! Each port is an external collaborator reached through a narrow trait.
//! The engine only ever calls `TextCompletion` inline during Phase B and
//! `ActorResolver` while normalizing give-item targets; the remaining ports
//! are driven by the background workers or by outbox consumers.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::PortError;
use crate::types::{ExpiredTimer, TurnPrompt};

/// Language-model completion backend invoked during Phase B.
///
/// Returns the raw structured payload; the engine deserializes it into a
/// [`crate::types::TurnOutput`] and maps failures to `BadModelOutput`.
#[async_trait]
pub trait TextCompletion: Send + Sync {
    /// Produces the structured output for an assembled prompt. This is the
    /// only long-running suspension point in a turn.
    async fn complete(&self, prompt: &TurnPrompt) -> Result<serde_json::Value, PortError>;
}

/// Resolves a chat-surface mention (for example `<@1234>`) to an actor id.
#[async_trait]
pub trait ActorResolver: Send + Sync {
    async fn resolve(&self, mention: &str) -> Result<Option<Uuid>, PortError>;
}

/// External similarity index over turn-derived memories.
#[async_trait]
pub trait MemorySearch: Send + Sync {
    /// Returns raw hits; each hit is expected to carry a `turn_id` field
    /// used by the visibility filter.
    async fn search(
        &self,
        campaign_id: Uuid,
        query: &str,
        limit: usize,
    ) -> Result<Vec<serde_json::Value>, PortError>;
}

/// Applies the narrative effect of an expired timer.
#[async_trait]
pub trait TimerEffects: Send + Sync {
    async fn apply(&self, timer: &ExpiredTimer) -> Result<(), PortError>;
}

/// Generates media for a scene or a player portrait and returns its URL.
/// Outbox consumers call this; the engine never invokes it inline.
#[async_trait]
pub trait MediaGeneration: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, PortError>;
}
