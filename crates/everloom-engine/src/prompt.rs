//! Prompt assembly for the completion port.

use std::fmt::Write as _;

use everloom_core::types::{TurnContext, TurnPrompt};

const SYSTEM: &str = "\
You are the narrator of a persistent multi-player text adventure. Resolve \
the player's action against the campaign state and respond with a single \
JSON object. Fields: \"narration\" (required, second person, present \
tense), \"state_update\", \"character_updates\", \"player_state_update\" \
(objects merged key-by-key into the stored state; null deletes a key), \
\"summary_update\" (a sentence appended to the running summary), \
\"xp_awarded\" (non-negative integer), \"scene_image_prompt\" (only when \
the scene changes visually), \"timer\" (an object with \"op\" of \
\"schedule\", \"cancel\", or \"bind\"), and \"give_items\" (a list of \
{item, to_actor_id, to_mention}). Omit any field you do not need.";

/// Flattens a turn context into the prompt pair sent to the completion
/// port.
#[must_use]
pub fn assemble(context: &TurnContext) -> TurnPrompt {
    let mut user = String::new();

    if !context.campaign_summary.is_empty() {
        let _ = writeln!(user, "Story so far:\n{}\n", context.campaign_summary);
    }

    if !context.recent_turns.is_empty() {
        let _ = writeln!(user, "Recent turns:");
        for turn in &context.recent_turns {
            let _ = writeln!(user, "- [{}] {}", turn.kind, turn.content);
        }
        let _ = writeln!(user);
    }

    if let Some(timer) = &context.active_timer {
        let _ = writeln!(
            user,
            "A timer is pending: \"{}\" (due {}).\n",
            timer.event_text,
            timer.due_at.to_rfc3339()
        );
    }

    let _ = writeln!(
        user,
        "The acting player is level {} with {} xp.",
        context.player_level, context.player_xp
    );
    let _ = write!(user, "Their action: {}", context.action);

    TurnPrompt {
        system: SYSTEM.to_owned(),
        user,
    }
}
