use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

/// Decodes a field leniently: a missing field and a field that fails to
/// decode both come back as the type's default. A snapshot written by a
/// different build must never lose the whole registry over one damaged
/// field; only a blob that is not valid JSON at all aborts the load.
fn lenient<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(T::deserialize(value).unwrap_or_default())
}

/// Flat snapshot of an entire session registry.
///
/// Every field is optional and decodes leniently: missing fields and
/// wrong-typed fields both come back as their empty defaults, and unknown
/// fields are ignored. Round-tripping a registry through [`Snapshot`] must
/// be exact — every resolve, reverse-resolve, artifact get, and ledger
/// query answers identically before and after.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Snapshot {
    /// Id of the session this snapshot belongs to.
    #[serde(default, deserialize_with = "lenient")]
    pub session_id: Uuid,
    /// When the session was created.
    #[serde(default, deserialize_with = "lenient")]
    pub created_at: Option<DateTime<Utc>>,
    /// When the session last mutated.
    #[serde(default, deserialize_with = "lenient")]
    pub updated_at: Option<DateTime<Utc>>,
    /// The session's current turn number.
    #[serde(default, deserialize_with = "lenient")]
    pub turn: u64,
    /// Allocator counters, one per (entity type, kind).
    #[serde(default, deserialize_with = "lenient")]
    pub counters: Vec<CounterState>,
    /// Identity and ledger state, one entry per live ref.
    #[serde(default, deserialize_with = "lenient")]
    pub entries: Vec<EntryState>,
    /// Staged content for pending generated refs.
    #[serde(default, deserialize_with = "lenient")]
    pub artifacts: Vec<ArtifactState>,
    /// Declared table schemas for the translator.
    #[serde(default, deserialize_with = "lenient")]
    pub tables: Vec<TableState>,
}

/// One allocator counter: the last number issued for a (type, kind) pair.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CounterState {
    /// Entity type the counter belongs to.
    #[serde(default, deserialize_with = "lenient")]
    pub entity_type: String,
    /// Whether this is the generated-ref counter for the type.
    #[serde(default, deserialize_with = "lenient")]
    pub generated: bool,
    /// Last value issued; the next mint uses `last + 1`.
    #[serde(default, deserialize_with = "lenient")]
    pub last: u64,
}

/// Identity binding plus ledger metadata for a single ref.
///
/// `action` travels as its wire string so an unrecognized action from a
/// different build degrades to the default instead of failing the load.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EntryState {
    /// The ref string.
    #[serde(rename = "ref", default, deserialize_with = "lenient")]
    pub ref_id: String,
    /// Bound backing id, or `None` while pending.
    #[serde(default, deserialize_with = "lenient")]
    pub backing_id: Option<String>,
    /// Entity type recorded for the ref.
    #[serde(default, deserialize_with = "lenient")]
    pub entity_type: String,
    /// Human label recorded for the ref, if any.
    #[serde(default, deserialize_with = "lenient")]
    pub label: Option<String>,
    /// Last lifecycle action, as its wire name.
    #[serde(default, deserialize_with = "lenient")]
    pub action: String,
    /// Turn the ref was minted on.
    #[serde(default, deserialize_with = "lenient")]
    pub turn_created: u64,
    /// Turn the ref was last touched on.
    #[serde(default, deserialize_with = "lenient")]
    pub turn_last_ref: u64,
    /// Orchestrator step that produced the ref, if recorded.
    #[serde(default, deserialize_with = "lenient")]
    pub source_step: Option<String>,
    /// Insertion sequence number, the explicit creation-order tie-break.
    #[serde(default, deserialize_with = "lenient")]
    pub seq: u64,
}

/// Staged content for one pending generated ref, stored verbatim.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArtifactState {
    /// The generated ref the content belongs to.
    #[serde(rename = "ref", default, deserialize_with = "lenient")]
    pub ref_id: String,
    /// The staged content, exactly as the caller supplied it.
    #[serde(default)]
    pub content: serde_json::Value,
}

/// Declared schema for one table the translator rewrites.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TableState {
    /// Table name as it appears in read/write calls.
    #[serde(default, deserialize_with = "lenient")]
    pub name: String,
    /// Entity type used when minting refs for this table's rows.
    #[serde(default, deserialize_with = "lenient")]
    pub entity_type: String,
    /// Field holding the row's primary identifier.
    #[serde(default, deserialize_with = "lenient")]
    pub primary_key: String,
    /// Fields holding foreign-key references to other tables' rows.
    #[serde(default, deserialize_with = "lenient")]
    pub fk_fields: Vec<String>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_loads_as_default() {
        let snap: Snapshot = serde_json::from_str("{}").unwrap();
        assert_eq!(snap.turn, 0);
        assert!(snap.entries.is_empty());
        assert!(snap.counters.is_empty());
        assert!(snap.created_at.is_none());
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let snap: Snapshot =
            serde_json::from_str(r#"{"turn": 4, "some_future_field": {"a": 1}}"#).unwrap();
        assert_eq!(snap.turn, 4);
    }

    #[test]
    fn partial_entry_fills_defaults() {
        let entry: EntryState = serde_json::from_str(r#"{"ref": "item_1"}"#).unwrap();
        assert_eq!(entry.ref_id, "item_1");
        assert!(entry.backing_id.is_none());
        assert_eq!(entry.action, "");
        assert_eq!(entry.turn_created, 0);
    }

    #[test]
    fn wrong_typed_field_degrades_to_default() {
        // A damaged field must not abort the whole load.
        let snap: Snapshot =
            serde_json::from_str(r#"{"turn": 3, "entries": "oops"}"#).unwrap();
        assert_eq!(snap.turn, 3);
        assert!(snap.entries.is_empty());
    }

    #[test]
    fn wrong_typed_scalars_degrade_to_defaults() {
        let snap: Snapshot = serde_json::from_str(
            r#"{"turn": "not a number", "session_id": 12, "created_at": "yesterday"}"#,
        )
        .unwrap();
        assert_eq!(snap.turn, 0);
        assert!(snap.session_id.is_nil());
        assert!(snap.created_at.is_none());
    }

    #[test]
    fn wrong_typed_nested_entry_field_degrades() {
        let snap: Snapshot = serde_json::from_str(
            r#"{"entries": [{"ref": "item_1", "backing_id": "uuid-1", "turn_created": []}]}"#,
        )
        .unwrap();
        assert_eq!(snap.entries.len(), 1);
        assert_eq!(snap.entries[0].ref_id, "item_1");
        assert_eq!(snap.entries[0].backing_id.as_deref(), Some("uuid-1"));
        assert_eq!(snap.entries[0].turn_created, 0);
    }

    #[test]
    fn healthy_fields_survive_next_to_damaged_ones() {
        let snap: Snapshot = serde_json::from_str(
            r#"{
                "turn": 7,
                "counters": {"bad": "shape"},
                "entries": [{"ref": "item_1", "backing_id": "uuid-1", "action": "read", "seq": 0}]
            }"#,
        )
        .unwrap();
        assert_eq!(snap.turn, 7);
        assert!(snap.counters.is_empty());
        assert_eq!(snap.entries.len(), 1);
        assert_eq!(snap.entries[0].action, "read");
    }
}
