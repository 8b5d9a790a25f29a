//! Memory visibility filter.
//!
//! After a rewind, memories derived from pruned turns may still live in the
//! external similarity index until the prune request drains. The watermark
//! on the campaign caps what callers may see in the meantime.

use serde_json::Value;
use uuid::Uuid;

use crate::engine::TurnEngine;
use crate::error::EngineError;

/// Keeps only hits whose `turn_id` is at or below the watermark. With no
/// watermark set the input passes through untouched. Hits without a
/// parseable `turn_id` are dropped.
#[must_use]
pub fn filter_hits(watermark: Option<i64>, hits: Vec<Value>) -> Vec<Value> {
    let Some(max_turn_id) = watermark else {
        return hits;
    };
    hits.into_iter()
        .filter(|hit| hit_turn_id(hit).is_some_and(|id| id <= max_turn_id))
        .collect()
}

fn hit_turn_id(hit: &Value) -> Option<i64> {
    match hit.get("turn_id")? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

impl TurnEngine {
    /// Applies the campaign's visibility watermark to externally-fetched
    /// memory hits.
    ///
    /// # Errors
    ///
    /// `NotFound` when the campaign does not exist; `Storage` for database
    /// failures.
    pub async fn filter_memory_hits_by_visibility(
        &self,
        campaign_id: Uuid,
        hits: Vec<Value>,
    ) -> Result<Vec<Value>, EngineError> {
        let mut tx = self.store.begin().await?;
        let Some(campaign) = tx.campaigns().get(campaign_id).await? else {
            tx.rollback().await?;
            return Err(EngineError::NotFound("campaign"));
        };
        tx.rollback().await?;
        Ok(filter_hits(campaign.memory_visible_max_turn_id, hits))
    }

    /// Queries the memory-search port and filters the hits by visibility.
    /// Returns no hits when the port is not configured.
    ///
    /// # Errors
    ///
    /// `Port` when the search backend fails; otherwise as
    /// [`TurnEngine::filter_memory_hits_by_visibility`].
    pub async fn search_visible_memories(
        &self,
        campaign_id: Uuid,
        query: &str,
        limit: usize,
    ) -> Result<Vec<Value>, EngineError> {
        let Some(search) = &self.memory_search else {
            return Ok(Vec::new());
        };
        let hits = search.search(campaign_id, query, limit).await?;
        self.filter_memory_hits_by_visibility(campaign_id, hits).await
    }
}
