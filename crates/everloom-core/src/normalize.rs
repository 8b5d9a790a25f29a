//! Pure normalization helpers.
//!
//! Everything in this module is deterministic and side-effect free: campaign
//! name canonicalization, tolerant JSON-blob parsing, top-level patch
//! merging, and inventory cleanup.

use crate::types::JsonObject;
use serde_json::Value;

/// Canonical form of a campaign name used in the `(namespace,
/// name_normalized)` uniqueness key: whitespace collapsed, characters
/// outside `[a-zA-Z0-9 _-]` stripped, lowercased, capped at 64 chars,
/// falling back to `main` when nothing survives.
#[must_use]
pub fn normalize_campaign_name(value: &str) -> String {
    let collapsed = value.split_whitespace().collect::<Vec<_>>().join(" ");
    let cleaned: String = collapsed
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, ' ' | '_' | '-'))
        .collect();
    let lowered: String = cleaned.to_lowercase().chars().take(64).collect();
    if lowered.is_empty() {
        "main".to_owned()
    } else {
        lowered
    }
}

/// Parses a stored JSON blob, treating anything that is not a JSON object
/// (including invalid JSON and the empty string) as the empty object.
#[must_use]
pub fn parse_json_object(text: &str) -> JsonObject {
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(map)) => map,
        _ => JsonObject::new(),
    }
}

/// Compact serialized form of a JSON object.
#[must_use]
pub fn dump_json(object: &JsonObject) -> String {
    serde_json::to_string(&Value::Object(object.clone())).unwrap_or_else(|_| "{}".to_owned())
}

/// Merges a top-level patch into a base object. A `null` value deletes the
/// key; any other value replaces it. Nested objects are replaced wholesale.
#[must_use]
pub fn apply_patch(base: &JsonObject, patch: &JsonObject) -> JsonObject {
    let mut merged = base.clone();
    for (key, value) in patch {
        if value.is_null() {
            merged.remove(key);
        } else {
            merged.insert(key.clone(), value.clone());
        }
    }
    merged
}

/// A normalized inventory entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InventoryItem {
    pub name: String,
    pub origin: String,
}

/// Extracts a player's inventory from their state blob, tolerating both
/// string entries and object entries, dropping empties, and deduplicating
/// case-insensitively on the item name (first occurrence wins).
#[must_use]
pub fn normalize_inventory(state: &JsonObject) -> Vec<InventoryItem> {
    let Some(Value::Array(raw)) = state.get("inventory") else {
        return Vec::new();
    };

    let mut seen = std::collections::HashSet::new();
    let mut items = Vec::new();
    for entry in raw {
        let (name, origin) = match entry {
            Value::Object(map) => {
                let name = ["name", "item", "title"]
                    .iter()
                    .find_map(|key| map.get(*key).and_then(Value::as_str))
                    .unwrap_or("")
                    .trim()
                    .to_owned();
                let origin = map
                    .get("origin")
                    .and_then(Value::as_str)
                    .unwrap_or("")
                    .trim()
                    .to_owned();
                (name, origin)
            }
            Value::String(s) => (s.trim().to_owned(), String::new()),
            _ => continue,
        };
        if name.is_empty() || !seen.insert(name.to_lowercase()) {
            continue;
        }
        items.push(InventoryItem { name, origin });
    }
    items
}

/// Serializes a normalized inventory back into the value stored under the
/// `inventory` key.
#[must_use]
pub fn inventory_to_value(items: &[InventoryItem]) -> Value {
    Value::Array(
        items
            .iter()
            .map(|item| {
                serde_json::json!({
                    "name": item.name,
                    "origin": item.origin,
                })
            })
            .collect(),
    )
}

/// Derives the scene-image room key from a player state blob: the first
/// non-empty of `room_id`, `location`, `room_title`, `room_summary`,
/// lowercased and capped at 120 chars, with an `unknown-room` fallback.
#[must_use]
pub fn room_key_from_state(state: &JsonObject) -> String {
    for key in ["room_id", "location", "room_title", "room_summary"] {
        let raw = match state.get(key) {
            Some(Value::String(s)) => s.trim().to_lowercase(),
            Some(Value::Number(n)) => n.to_string(),
            _ => continue,
        };
        if !raw.is_empty() {
            return raw.chars().take(120).collect();
        }
    }
    "unknown-room".to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(value: Value) -> JsonObject {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    #[test]
    fn test_normalize_campaign_name_collapses_and_lowercases() {
        assert_eq!(normalize_campaign_name("  The   Iron  Keep "), "the iron keep");
        assert_eq!(normalize_campaign_name("Dragon's Hoard!"), "dragons hoard");
    }

    #[test]
    fn test_normalize_campaign_name_falls_back_to_main() {
        assert_eq!(normalize_campaign_name(""), "main");
        assert_eq!(normalize_campaign_name("@#$%"), "main");
    }

    #[test]
    fn test_normalize_campaign_name_caps_length() {
        let long = "a".repeat(100);
        assert_eq!(normalize_campaign_name(&long).len(), 64);
    }

    #[test]
    fn test_parse_json_object_tolerates_garbage() {
        assert!(parse_json_object("").is_empty());
        assert!(parse_json_object("not json").is_empty());
        assert!(parse_json_object("[1,2]").is_empty());
        assert_eq!(
            parse_json_object(r#"{"k":"v"}"#).get("k"),
            Some(&json!("v"))
        );
    }

    #[test]
    fn test_apply_patch_merges_and_null_deletes() {
        let base = object(json!({ "keep": 1, "replace": "old", "drop": true }));
        let patch = object(json!({ "replace": "new", "drop": null, "add": 2 }));

        let merged = apply_patch(&base, &patch);

        assert_eq!(merged.get("keep"), Some(&json!(1)));
        assert_eq!(merged.get("replace"), Some(&json!("new")));
        assert_eq!(merged.get("add"), Some(&json!(2)));
        assert!(!merged.contains_key("drop"));
    }

    #[test]
    fn test_normalize_inventory_dedupes_case_insensitively() {
        let state = object(json!({
            "inventory": [
                "Lantern",
                { "name": "lantern", "origin": "duplicate" },
                { "item": "Rope" },
                { "name": "  " },
                42,
            ]
        }));

        let items = normalize_inventory(&state);

        assert_eq!(
            items,
            vec![
                InventoryItem { name: "Lantern".into(), origin: String::new() },
                InventoryItem { name: "Rope".into(), origin: String::new() },
            ]
        );
    }

    #[test]
    fn test_room_key_prefers_room_id_then_falls_back() {
        let state = object(json!({ "location": "Moss Cavern", "room_id": "Cell-9" }));
        assert_eq!(room_key_from_state(&state), "cell-9");

        let state = object(json!({ "location": "Moss Cavern" }));
        assert_eq!(room_key_from_state(&state), "moss cavern");

        assert_eq!(room_key_from_state(&JsonObject::new()), "unknown-room");
    }
}
