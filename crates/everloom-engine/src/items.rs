//! Give-item normalization and inventory transfer.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use everloom_core::normalize::{
    dump_json, inventory_to_value, normalize_inventory, parse_json_object, InventoryItem,
};
use everloom_core::ports::ActorResolver;
use everloom_core::types::{GiveItemInstruction, JsonObject};
use everloom_store::{StoreError, StoreTx};

/// A give-item instruction after target resolution.
#[derive(Debug, Clone)]
pub(crate) enum GiveItemOutcome {
    /// Target resolved; Phase C moves the item between inventories.
    Transfer { item: String, to_actor_id: Uuid },
    /// Target missing or unresolvable. Non-fatal: Phase C records it in the
    /// outbox instead of failing the turn.
    Unresolved {
        instruction: GiveItemInstruction,
        issue: &'static str,
    },
}

/// Resolves each instruction's target, consulting the `ActorResolver` port
/// for surface mentions. Resolver failures degrade to unresolved targets.
pub(crate) async fn resolve_give_items(
    resolver: Option<&dyn ActorResolver>,
    instructions: &[GiveItemInstruction],
) -> Vec<GiveItemOutcome> {
    let mut outcomes = Vec::with_capacity(instructions.len());
    for instruction in instructions {
        let item = instruction.item.trim().to_owned();
        if item.is_empty() {
            outcomes.push(GiveItemOutcome::Unresolved {
                instruction: instruction.clone(),
                issue: "missing_item",
            });
            continue;
        }

        if let Some(raw) = instruction.to_actor_id.as_deref() {
            if let Ok(actor_id) = raw.trim().parse::<Uuid>() {
                outcomes.push(GiveItemOutcome::Transfer {
                    item,
                    to_actor_id: actor_id,
                });
                continue;
            }
        }

        let mention = instruction
            .to_mention
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty());
        let resolved = match (mention, resolver) {
            (Some(mention), Some(resolver)) => match resolver.resolve(mention).await {
                Ok(actor_id) => actor_id,
                Err(err) => {
                    tracing::warn!(mention, error = %err, "actor resolution failed");
                    None
                }
            },
            _ => None,
        };

        match resolved {
            Some(to_actor_id) => outcomes.push(GiveItemOutcome::Transfer { item, to_actor_id }),
            None => outcomes.push(GiveItemOutcome::Unresolved {
                instruction: instruction.clone(),
                issue: "unresolved_target",
            }),
        }
    }
    outcomes
}

/// Moves `item` from the acting player's (already patched, not yet
/// persisted) state into the target player's stored state. Self-transfers,
/// unknown targets, and missing items are silent no-ops. Returns whether
/// the item moved.
pub(crate) async fn apply_transfer(
    tx: &mut StoreTx,
    campaign_id: Uuid,
    source_actor_id: Uuid,
    source_state: &mut JsonObject,
    to_actor_id: Uuid,
    item: &str,
    now: DateTime<Utc>,
) -> Result<bool, StoreError> {
    if source_actor_id == to_actor_id {
        return Ok(false);
    }
    let Some(target) = tx.players().get(campaign_id, to_actor_id).await? else {
        return Ok(false);
    };

    let mut source_inv = normalize_inventory(source_state);
    let Some(position) = source_inv
        .iter()
        .position(|entry| entry.name.eq_ignore_ascii_case(item))
    else {
        return Ok(false);
    };
    let moved = source_inv.remove(position);

    let mut target_state = parse_json_object(&target.state_json);
    let mut target_inv = normalize_inventory(&target_state);
    if !target_inv
        .iter()
        .any(|entry| entry.name.eq_ignore_ascii_case(item))
    {
        target_inv.push(InventoryItem {
            name: moved.name,
            origin: format!("Received from {source_actor_id}"),
        });
    }

    source_state.insert("inventory".to_owned(), inventory_to_value(&source_inv));
    target_state.insert("inventory".to_owned(), inventory_to_value(&target_inv));
    tx.players()
        .set_state(target.id, &dump_json(&target_state), now)
        .await?;
    Ok(true)
}
