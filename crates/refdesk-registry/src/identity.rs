use refdesk_core::{Ref, Resolution};
use std::collections::HashMap;

/// The binding state of a registered ref.
///
/// A sum type rather than a sentinel string, so pending can never be
/// mistaken for a real backing id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Binding {
    /// The ref stands in for this backing id.
    Bound(String),
    /// The ref is registered but no backing row exists yet.
    Pending,
}

/// Bidirectional ref ↔ backing-id table with an explicit pending state.
///
/// Invariant: for every `Bound` entry the forward and reverse maps are
/// exact inverses. Resolving an unknown or pending ref is not an error
/// here; callers branch on the [`Resolution`] they get back.
#[derive(Debug, Default)]
pub struct IdentityMap {
    forward: HashMap<Ref, Binding>,
    reverse: HashMap<String, Ref>,
}

impl IdentityMap {
    /// Creates an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `r` to `backing_id`, overwriting both directions.
    ///
    /// If `r` was previously bound to another id, that stale reverse entry
    /// is dropped. If `backing_id` was previously bound to another ref, the
    /// superseded ref is removed entirely so the maps stay exact inverses.
    pub fn bind(&mut self, r: Ref, backing_id: impl Into<String>) {
        let backing_id = backing_id.into();
        if let Some(Binding::Bound(old_id)) = self.forward.get(&r) {
            if *old_id != backing_id {
                self.reverse.remove(old_id);
            }
        }
        if let Some(old_ref) = self.reverse.get(&backing_id) {
            if *old_ref != r {
                let old_ref = old_ref.clone();
                self.forward.remove(&old_ref);
            }
        }
        self.reverse.insert(backing_id.clone(), r.clone());
        self.forward.insert(r, Binding::Bound(backing_id));
    }

    /// Registers `r` with no backing id yet. A previous binding for `r`, if
    /// any, is replaced and its reverse entry dropped.
    pub fn bind_pending(&mut self, r: Ref) {
        if let Some(Binding::Bound(old_id)) = self.forward.get(&r) {
            let old_id = old_id.clone();
            self.reverse.remove(&old_id);
        }
        self.forward.insert(r, Binding::Pending);
    }

    /// Resolves a ref to its backing id, pending state, or unknown.
    pub fn resolve(&self, r: &Ref) -> Resolution {
        match self.forward.get(r) {
            Some(Binding::Bound(id)) => Resolution::Found(id.clone()),
            Some(Binding::Pending) => Resolution::Pending,
            None => Resolution::Unknown,
        }
    }

    /// Looks up the ref already minted for a backing id, if any.
    pub fn resolve_reverse(&self, backing_id: &str) -> Option<&Ref> {
        self.reverse.get(backing_id)
    }

    /// Removes `r` from both directions. Returns whether it existed.
    pub fn unbind(&mut self, r: &Ref) -> bool {
        match self.forward.remove(r) {
            Some(Binding::Bound(id)) => {
                self.reverse.remove(&id);
                true
            }
            Some(Binding::Pending) => true,
            None => false,
        }
    }

    /// Whether `r` is registered, bound or pending.
    pub fn contains(&self, r: &Ref) -> bool {
        self.forward.contains_key(r)
    }

    /// Number of registered refs.
    pub fn len(&self) -> usize {
        self.forward.len()
    }

    /// Whether no refs are registered.
    pub fn is_empty(&self) -> bool {
        self.forward.is_empty()
    }

    /// Iterates over all registered refs and their bindings.
    pub fn iter(&self) -> impl Iterator<Item = (&Ref, &Binding)> {
        self.forward.iter()
    }
}
