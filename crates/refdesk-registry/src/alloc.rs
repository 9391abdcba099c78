use refdesk_core::snapshot::CounterState;
use refdesk_core::Ref;
use std::collections::HashMap;

/// Mints unique sequential refs per entity type.
///
/// Persisted and generated counters for the same type are independent; the
/// `gen_` prefix keeps their ref strings from ever colliding. Counters only
/// move forward and numbers are never reused, even after a ref is
/// discarded, so a ref stays a stable log identifier for the whole session.
///
/// Not internally synchronized: the allocator lives inside the session's
/// single critical section alongside the maps it feeds.
#[derive(Debug, Default)]
pub struct RefAllocator {
    persisted: HashMap<String, u64>,
    generated: HashMap<String, u64>,
}

impl RefAllocator {
    /// Creates an allocator with all counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Mints the next persisted ref for `entity_type`, starting at `{type}_1`.
    pub fn next_ref(&mut self, entity_type: &str) -> Ref {
        let counter = self.persisted.entry(entity_type.to_string()).or_insert(0);
        *counter += 1;
        Ref::persisted(entity_type, *counter)
    }

    /// Mints the next generated ref for `entity_type`, starting at `gen_{type}_1`.
    pub fn next_gen_ref(&mut self, entity_type: &str) -> Ref {
        let counter = self.generated.entry(entity_type.to_string()).or_insert(0);
        *counter += 1;
        Ref::generated(entity_type, *counter)
    }

    /// Counter state for snapshotting, sorted for a stable serialization.
    pub fn snapshot_counters(&self) -> Vec<CounterState> {
        let mut counters: Vec<CounterState> = self
            .persisted
            .iter()
            .map(|(entity_type, last)| CounterState {
                entity_type: entity_type.clone(),
                generated: false,
                last: *last,
            })
            .chain(self.generated.iter().map(|(entity_type, last)| CounterState {
                entity_type: entity_type.clone(),
                generated: true,
                last: *last,
            }))
            .collect();
        counters.sort_by(|a, b| {
            a.entity_type
                .cmp(&b.entity_type)
                .then(a.generated.cmp(&b.generated))
        });
        counters
    }

    /// Restores counters from a snapshot, keeping the highest value seen per
    /// (type, kind) so a damaged snapshot can never wind a counter backward.
    pub fn restore(&mut self, counters: &[CounterState]) {
        for state in counters {
            if state.entity_type.is_empty() {
                continue;
            }
            let map = if state.generated {
                &mut self.generated
            } else {
                &mut self.persisted
            };
            let entry = map.entry(state.entity_type.clone()).or_insert(0);
            *entry = (*entry).max(state.last);
        }
    }
}
