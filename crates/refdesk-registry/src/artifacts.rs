use refdesk_core::Ref;
use std::collections::HashMap;

/// Staged content for generated-but-unsaved artifacts, keyed by gen-ref.
///
/// Content is stored verbatim with no normalization until promotion or
/// discard clears it; this is what lets a draft be iterated on across turns
/// without ever touching the database.
#[derive(Debug, Default)]
pub struct ArtifactStore {
    contents: HashMap<Ref, serde_json::Value>,
}

impl ArtifactStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `content` for `r`, replacing any previous draft.
    pub fn put(&mut self, r: Ref, content: serde_json::Value) {
        self.contents.insert(r, content);
    }

    /// The staged content for `r`, if any.
    pub fn get(&self, r: &Ref) -> Option<&serde_json::Value> {
        self.contents.get(r)
    }

    /// Removes the staged content for `r`. Returns whether any existed.
    pub fn delete(&mut self, r: &Ref) -> bool {
        self.contents.remove(r).is_some()
    }

    /// Whether `r` has staged content.
    pub fn contains(&self, r: &Ref) -> bool {
        self.contents.contains_key(r)
    }

    /// Number of staged artifacts.
    pub fn len(&self) -> usize {
        self.contents.len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.contents.is_empty()
    }

    /// Iterates over all staged artifacts.
    pub fn iter(&self) -> impl Iterator<Item = (&Ref, &serde_json::Value)> {
        self.contents.iter()
    }
}
