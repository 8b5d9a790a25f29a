//! Engine error taxonomy.

use thiserror::Error;
use uuid::Uuid;

use everloom_core::error::PortError;
use everloom_store::StoreError;

/// Errors surfaced by the engine entry points.
///
/// Only `CasConflict` is ever recovered locally, by restarting from Phase A
/// up to the configured retry budget. Everything else aborts the turn with
/// all Phase-C writes rolled back.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Another non-expired lease exists for this `(campaign, actor)` pair.
    /// The user-facing meaning is "a turn is already in progress".
    #[error("turn already in flight for actor {actor_id} in campaign {campaign_id}")]
    LeaseHeld { campaign_id: Uuid, actor_id: Uuid },

    /// The lease was stolen or expired before Phase C could commit. No
    /// writes escape; the caller may resubmit.
    #[error("turn lease was lost before commit")]
    LeaseLost,

    /// The campaign `row_version` moved mid-turn and the retry budget is
    /// exhausted.
    #[error("campaign {campaign_id} changed concurrently at row version {expected}")]
    CasConflict { campaign_id: Uuid, expected: i64 },

    /// The completion payload did not match the structured turn schema.
    #[error("model output could not be parsed: {0}")]
    BadModelOutput(String),

    /// A capability port failed.
    #[error(transparent)]
    Port(#[from] PortError),

    /// The rewind target has no snapshot.
    #[error("no snapshot exists for turn {0}")]
    NoSnapshot(i64),

    /// A referenced entity does not exist.
    #[error("{0} not found")]
    NotFound(&'static str),

    /// Persistence failure.
    #[error(transparent)]
    Storage(#[from] StoreError),
}
