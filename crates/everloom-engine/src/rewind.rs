//! Rewind controller.
//!
//! Restores a snapshot, prunes the history suffix (turns, snapshots,
//! embeddings), moves the memory-visibility watermark to the target, bumps
//! `row_version`, and enqueues the prune request for the external memory
//! index. Everything happens in one transaction; running the same rewind
//! twice deletes nothing further and adds no duplicate outbox row.

use serde_json::json;
use uuid::Uuid;

use everloom_core::types::{PlayerRoster, RewindResult};

use crate::engine::TurnEngine;
use crate::error::EngineError;

impl TurnEngine {
    /// Rewinds a campaign to the state captured at `target_turn_id`.
    ///
    /// # Errors
    ///
    /// `NotFound` when the campaign does not exist, `NoSnapshot` when the
    /// target turn has no snapshot, `CasConflict` when a concurrent commit
    /// moved the campaign mid-rewind, and `Storage` for database failures.
    pub async fn rewind_to_turn(
        &self,
        campaign_id: Uuid,
        target_turn_id: i64,
    ) -> Result<RewindResult, EngineError> {
        let now = self.clock.now();
        let mut tx = self.store.begin().await?;

        let Some(campaign) = tx.campaigns().get(campaign_id).await? else {
            tx.rollback().await?;
            return Err(EngineError::NotFound("campaign"));
        };
        let Some(snapshot) = tx
            .snapshots()
            .get_by_campaign_turn(campaign_id, target_turn_id)
            .await?
        else {
            tx.rollback().await?;
            return Err(EngineError::NoSnapshot(target_turn_id));
        };

        let restored = tx
            .campaigns()
            .restore_snapshot_state(
                campaign_id,
                campaign.row_version,
                &snapshot.campaign_summary,
                &snapshot.campaign_state_json,
                &snapshot.campaign_characters_json,
                snapshot.campaign_last_narration.as_deref(),
                target_turn_id,
                now,
            )
            .await?;
        if !restored {
            tx.rollback().await?;
            return Err(EngineError::CasConflict {
                campaign_id,
                expected: campaign.row_version,
            });
        }

        // Restore each player's projected state. Players that joined after
        // the snapshot keep their current row; the roster blob is parsed
        // tolerantly because it crossed a serialization boundary.
        let roster: PlayerRoster =
            serde_json::from_str(&snapshot.players_json).unwrap_or_default();
        for projection in &roster.players {
            let Some(player) = tx
                .players()
                .get(campaign_id, projection.actor_id)
                .await?
            else {
                continue;
            };
            tx.players()
                .restore(
                    player.id,
                    projection.level,
                    projection.xp,
                    &projection.attributes_json,
                    &projection.state_json,
                    now,
                )
                .await?;
        }

        // Prune dependents before the turns so the counts are exact even
        // where foreign keys would cascade.
        let deleted_snapshots = tx
            .snapshots()
            .delete_after(campaign_id, target_turn_id)
            .await?;
        tx.embeddings()
            .delete_after(campaign_id, target_turn_id)
            .await?;
        let deleted_turns = tx.turns().delete_after(campaign_id, target_turn_id).await?;

        let payload = json!({
            "campaign_id": campaign_id,
            "after_turn_id": target_turn_id,
        })
        .to_string();
        tx.outbox()
            .add(
                campaign_id,
                None,
                "memory_prune_requested",
                &target_turn_id.to_string(),
                &payload,
                now,
            )
            .await?;

        tx.commit().await?;

        tracing::info!(
            campaign_id = %campaign_id,
            target_turn_id,
            deleted_turns,
            deleted_snapshots,
            "campaign rewound"
        );

        Ok(RewindResult {
            target_turn_id,
            deleted_turns,
            deleted_snapshots,
        })
    }

    /// Rewind addressed by a surface message instead of a turn id: the
    /// message is resolved through the `(campaign, external_message_id)`
    /// index, falling back to the user-message binding.
    ///
    /// # Errors
    ///
    /// `NotFound` when no turn carries the message id; otherwise as
    /// [`TurnEngine::rewind_to_turn`].
    pub async fn rewind_to_message(
        &self,
        campaign_id: Uuid,
        external_message_id: &str,
    ) -> Result<RewindResult, EngineError> {
        let mut tx = self.store.begin().await?;
        let turn_id = tx
            .turns()
            .find_by_external_message(campaign_id, external_message_id)
            .await?;
        tx.rollback().await?;

        let Some(turn_id) = turn_id else {
            return Err(EngineError::NotFound("turn"));
        };
        self.rewind_to_turn(campaign_id, turn_id).await
    }
}
