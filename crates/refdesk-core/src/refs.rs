use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Prefix marking a ref minted for generated, not-yet-persisted content.
pub const GENERATED_PREFIX: &str = "gen_";

/// A stable, human-legible identifier handed to the reasoning engine in
/// place of a raw backing id.
///
/// Persisted refs are formatted `{entity_type}_{n}` and generated refs
/// `gen_{entity_type}_{n}`; `n` is strictly increasing per (type, kind) for
/// the life of the session, so a ref never changes meaning once issued.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Ref(String);

impl Ref {
    /// Formats the ref for a persisted record: `{entity_type}_{n}`.
    pub fn persisted(entity_type: &str, n: u64) -> Self {
        Ref(format!("{entity_type}_{n}"))
    }

    /// Formats the ref for generated content: `gen_{entity_type}_{n}`.
    pub fn generated(entity_type: &str, n: u64) -> Self {
        Ref(format!("{GENERATED_PREFIX}{entity_type}_{n}"))
    }

    /// Wraps an already-formatted ref string, e.g. when loading a snapshot.
    pub fn from_string(s: impl Into<String>) -> Self {
        Ref(s.into())
    }

    /// The ref as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this ref was minted for generated (pending) content.
    pub fn is_generated(&self) -> bool {
        self.0.starts_with(GENERATED_PREFIX)
    }

    /// The entity type segment of the ref, if the ref is well formed.
    ///
    /// Entity types may themselves contain separators (`line_item_3`), so
    /// the type is everything between the optional `gen_` prefix and the
    /// final numeric segment.
    pub fn entity_type(&self) -> Option<&str> {
        let body = self.0.strip_prefix(GENERATED_PREFIX).unwrap_or(&self.0);
        let (head, tail) = body.rsplit_once('_')?;
        if head.is_empty() || tail.is_empty() || !tail.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        Some(head)
    }

    /// The numeric segment of the ref, if the ref is well formed.
    pub fn number(&self) -> Option<u64> {
        let (_, tail) = self.0.rsplit_once('_')?;
        tail.parse().ok()
    }
}

impl std::fmt::Display for Ref {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<Ref> for String {
    fn from(r: Ref) -> String {
        r.0
    }
}

/// Whether an arbitrary value looks like a ref this registry could have
/// minted.
///
/// A value is ref-shaped iff it splits on `_` into at least two segments
/// whose final segment is a non-negative integer, and it is not a canonical
/// backing id (36 characters in 8-4-4-4-12 UUID layout). This must stay
/// byte-for-byte consistent with [`Ref::persisted`] and [`Ref::generated`]
/// or translation silently stops firing.
pub fn is_ref_shaped(value: &str) -> bool {
    if value.len() == 36 && Uuid::parse_str(value).is_ok() {
        return false;
    }
    match value.rsplit_once('_') {
        Some((head, tail)) => {
            !head.is_empty() && !tail.is_empty() && tail.bytes().all(|b| b.is_ascii_digit())
        }
        None => false,
    }
}
