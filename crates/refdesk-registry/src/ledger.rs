use refdesk_core::{Ref, RefAction};
use std::collections::HashMap;

/// Per-ref bookkeeping consumed by upstream curation policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataRecord {
    /// Entity type the ref belongs to.
    pub entity_type: String,
    /// Human label recorded for the ref, if one was seen.
    pub label: Option<String>,
    /// Last lifecycle action taken against the ref.
    pub action: RefAction,
    /// Turn the ref was minted on.
    pub turn_created: u64,
    /// Turn the ref was last referenced on. Never below `turn_created`.
    pub turn_last_ref: u64,
    /// Orchestrator step that produced the ref, if recorded.
    pub source_step: Option<String>,
    /// Insertion sequence number; the explicit creation-order tie-break.
    pub seq: u64,
}

/// Registry of [`MetadataRecord`]s keyed by ref.
///
/// Ordering queries never rely on map iteration order: creation order is an
/// explicit per-record sequence number assigned at insert.
#[derive(Debug, Default)]
pub struct MetadataLedger {
    records: HashMap<Ref, MetadataRecord>,
    next_seq: u64,
}

impl MetadataLedger {
    /// Creates an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a newly minted ref. Returns the assigned sequence number.
    pub fn insert(
        &mut self,
        r: Ref,
        entity_type: &str,
        label: Option<String>,
        action: RefAction,
        turn: u64,
        source_step: Option<String>,
    ) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.records.insert(
            r,
            MetadataRecord {
                entity_type: entity_type.to_string(),
                label,
                action,
                turn_created: turn,
                turn_last_ref: turn,
                source_step,
                seq,
            },
        );
        seq
    }

    /// Reinserts a record from a snapshot, preserving its sequence number.
    pub fn restore(&mut self, r: Ref, record: MetadataRecord) {
        self.next_seq = self.next_seq.max(record.seq + 1);
        self.records.insert(r, record);
    }

    /// The record for `r`, if any.
    pub fn get(&self, r: &Ref) -> Option<&MetadataRecord> {
        self.records.get(r)
    }

    /// Sets the last action for `r`. Returns whether the ref is known.
    pub fn set_action(&mut self, r: &Ref, action: RefAction) -> bool {
        match self.records.get_mut(r) {
            Some(record) => {
                record.action = action;
                true
            }
            None => false,
        }
    }

    /// Replaces the label for `r`. Returns whether the ref is known.
    pub fn set_label(&mut self, r: &Ref, label: Option<String>) -> bool {
        match self.records.get_mut(r) {
            Some(record) => {
                record.label = label;
                true
            }
            None => false,
        }
    }

    /// Marks `r` as referenced on `turn`. `turn_last_ref` only moves
    /// forward, which keeps `turn_created <= turn_last_ref` intact.
    pub fn touch(&mut self, r: &Ref, turn: u64) -> bool {
        match self.records.get_mut(r) {
            Some(record) => {
                record.turn_last_ref = record.turn_last_ref.max(turn);
                true
            }
            None => false,
        }
    }

    /// Removes the record for `r`. Returns whether any existed.
    pub fn remove(&mut self, r: &Ref) -> bool {
        self.records.remove(r).is_some()
    }

    /// Refs whose last action is `action`, in creation order.
    pub fn query_by_action(&self, action: RefAction) -> Vec<Ref> {
        let mut matches: Vec<(&Ref, u64)> = self
            .records
            .iter()
            .filter(|(_, record)| record.action == action)
            .map(|(r, record)| (r, record.seq))
            .collect();
        matches.sort_by_key(|(_, seq)| *seq);
        matches.into_iter().map(|(r, _)| r.clone()).collect()
    }

    /// Up to `limit` refs sorted by (turn_last_ref desc, turn_created desc),
    /// newest insertion first on a full tie.
    pub fn query_recent(&self, limit: usize) -> Vec<Ref> {
        let mut all: Vec<(&Ref, &MetadataRecord)> = self.records.iter().collect();
        all.sort_by(|(_, a), (_, b)| {
            b.turn_last_ref
                .cmp(&a.turn_last_ref)
                .then_with(|| b.turn_created.cmp(&a.turn_created))
                .then_with(|| b.seq.cmp(&a.seq))
        });
        all.into_iter().take(limit).map(|(r, _)| r.clone()).collect()
    }

    /// Number of tracked refs.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the ledger is empty.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Iterates over all records.
    pub fn iter(&self) -> impl Iterator<Item = (&Ref, &MetadataRecord)> {
        self.records.iter()
    }
}
