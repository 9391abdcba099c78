use crate::alloc::RefAllocator;
use crate::artifacts::ArtifactStore;
use crate::identity::IdentityMap;
use crate::ledger::{MetadataLedger, MetadataRecord};
use crate::promote::find_promotion_candidate;
use crate::translate::{default_entity_type, TableConfig};
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, MutexGuard};
use refdesk_core::snapshot::{ArtifactState, CounterState, EntryState, Snapshot, TableState};
use refdesk_core::{Ref, RefAction, RefdeskError, RefdeskResult, Resolution};
use serde::Serialize;
use std::collections::HashMap;
use tracing::debug;
use uuid::Uuid;

/// All mutable registry state, guarded as one atomic unit.
///
/// Every mutating operation takes the session's single lock exactly once
/// and completes inside it, so concurrent steps can never interleave
/// between a counter increment and the corresponding map insert.
pub(crate) struct Inner {
    pub(crate) alloc: RefAllocator,
    pub(crate) identity: IdentityMap,
    pub(crate) artifacts: ArtifactStore,
    pub(crate) ledger: MetadataLedger,
    pub(crate) tables: HashMap<String, TableConfig>,
    pub(crate) turn: u64,
    pub(crate) updated_at: DateTime<Utc>,
}

impl Inner {
    fn new(updated_at: DateTime<Utc>) -> Self {
        Self {
            alloc: RefAllocator::new(),
            identity: IdentityMap::new(),
            artifacts: ArtifactStore::new(),
            ledger: MetadataLedger::new(),
            tables: HashMap::new(),
            turn: 0,
            updated_at,
        }
    }

    pub(crate) fn mutated(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Mints a persisted ref, refusing to hand out a string that is somehow
    /// already live. Unreachable under correct locking.
    pub(crate) fn mint_persisted(&mut self, entity_type: &str) -> RefdeskResult<Ref> {
        let r = self.alloc.next_ref(entity_type);
        if self.identity.contains(&r) {
            return Err(RefdeskError::RefCollision(r.to_string()));
        }
        Ok(r)
    }

    /// Mints a generated ref with the same collision guard.
    pub(crate) fn mint_generated(&mut self, entity_type: &str) -> RefdeskResult<Ref> {
        let r = self.alloc.next_gen_ref(entity_type);
        if self.identity.contains(&r) {
            return Err(RefdeskError::RefCollision(r.to_string()));
        }
        Ok(r)
    }

    /// Binds `backing_id` onto an existing ref: the identity entry flips to
    /// bound, the draft artifact is cleared, and the ledger records the save.
    fn promote(&mut self, r: &Ref, backing_id: &str, label: Option<&str>) {
        self.identity.bind(r.clone(), backing_id);
        self.artifacts.delete(r);
        self.ledger.set_action(r, RefAction::Created);
        if let Some(label) = label {
            self.ledger.set_label(r, Some(label.to_string()));
        }
        let turn = self.turn;
        self.ledger.touch(r, turn);
    }
}

/// Filter for [`SessionRegistry::list_refs`].
#[derive(Debug, Clone, Default)]
pub struct RefQuery {
    /// Restrict to refs of this entity type.
    pub entity_type: Option<String>,
    /// Restrict to refs whose last action matches.
    pub action: Option<RefAction>,
    /// Keep only the most recent `limit` refs.
    pub limit: Option<usize>,
}

/// One entry returned by [`SessionRegistry::list_refs`], carrying the data
/// upstream presentation needs. Rendering stays out of scope.
#[derive(Debug, Clone, Serialize)]
pub struct RefListing {
    /// The ref itself.
    #[serde(rename = "ref")]
    pub ref_id: Ref,
    /// Entity type of the ref.
    pub entity_type: String,
    /// Tracked label, if any.
    pub label: Option<String>,
    /// Last lifecycle action.
    pub action: RefAction,
    /// Whether the ref still awaits a backing id.
    pub pending: bool,
    /// Turn the ref was minted on.
    pub turn_created: u64,
    /// Turn the ref was last referenced on.
    pub turn_last_ref: u64,
}

/// The session reference and lifecycle registry.
///
/// One instance belongs to exactly one conversation and is passed by handle
/// through every call; there are no globals. Within a turn, independent
/// steps may call any method concurrently against the same instance: all
/// mutable state sits behind one lock, no method performs I/O, and every
/// critical section is short and bounded.
pub struct SessionRegistry {
    id: Uuid,
    created_at: DateTime<Utc>,
    inner: Mutex<Inner>,
}

impl SessionRegistry {
    /// Creates an empty registry for a new conversation.
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            created_at: now,
            inner: Mutex::new(Inner::new(now)),
        }
    }

    pub(crate) fn lock_inner(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock()
    }

    /// The session's id.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// When the session was created.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// When the registry last mutated.
    pub fn updated_at(&self) -> DateTime<Utc> {
        self.inner.lock().updated_at
    }

    /// The current turn number.
    pub fn current_turn(&self) -> u64 {
        self.inner.lock().turn
    }

    /// Advances the current turn. Called once per turn by the turn driver
    /// before any other call that turn; the value never moves backward, so
    /// a stale or duplicate call is harmless.
    pub fn set_turn(&self, turn: u64) {
        let mut inner = self.inner.lock();
        inner.turn = inner.turn.max(turn);
        inner.mutated();
    }

    // --- Lifecycle ---

    /// Registers generated content that has no backing row yet.
    ///
    /// Mints a `gen_{type}_{n}` ref, stages `content` verbatim, and records
    /// the `generated` action. The draft stays staged until it is promoted
    /// by a matching [`register_created`](Self::register_created) or
    /// explicitly [`discard`](Self::discard)ed.
    pub fn register_generated(
        &self,
        entity_type: &str,
        label: Option<&str>,
        content: serde_json::Value,
        source_step: Option<&str>,
    ) -> RefdeskResult<Ref> {
        let mut inner = self.inner.lock();
        let r = inner.mint_generated(entity_type)?;
        inner.identity.bind_pending(r.clone());
        inner.artifacts.put(r.clone(), content);
        let turn = inner.turn;
        inner.ledger.insert(
            r.clone(),
            entity_type,
            label.map(str::to_string),
            RefAction::Generated,
            turn,
            source_step.map(str::to_string),
        );
        inner.mutated();
        debug!(ref_id = %r, entity_type, "registered generated artifact");
        Ok(r)
    }

    /// Records that a row was persisted and returns the ref it now lives
    /// under.
    ///
    /// Resolution order: an explicitly supplied gen-ref wins; then a ref
    /// already minted for `backing_id`; then a promotion match against
    /// pending drafts of the same type and normalized label; finally a
    /// fresh persisted ref. Promotion preserves the ref string — only its
    /// binding and action change, and its staged artifact is cleared.
    pub fn register_created(
        &self,
        entity_type: &str,
        backing_id: &str,
        label: Option<&str>,
        gen_ref: Option<&Ref>,
    ) -> RefdeskResult<Ref> {
        let mut inner = self.inner.lock();

        if let Some(g) = gen_ref {
            if inner.identity.contains(g) {
                inner.promote(g, backing_id, label);
                inner.mutated();
                debug!(ref_id = %g, backing_id, "promoted explicitly supplied gen-ref");
                return Ok(g.clone());
            }
        }

        if let Some(existing) = inner.identity.resolve_reverse(backing_id).cloned() {
            inner.ledger.set_action(&existing, RefAction::Created);
            if let Some(label) = label {
                inner.ledger.set_label(&existing, Some(label.to_string()));
            }
            let turn = inner.turn;
            inner.ledger.touch(&existing, turn);
            inner.mutated();
            return Ok(existing);
        }

        if let Some(label) = label {
            if let Some(candidate) = find_promotion_candidate(
                &inner.identity,
                &inner.artifacts,
                &inner.ledger,
                entity_type,
                label,
            ) {
                inner.promote(&candidate, backing_id, Some(label));
                inner.mutated();
                debug!(ref_id = %candidate, backing_id, "promoted pending draft by label");
                return Ok(candidate);
            }
            // A rename between draft and save defeats promotion by design:
            // the pending ref stays pending and a fresh ref is minted.
            debug!(entity_type, label, "no pending draft matched; minting fresh ref");
        }

        let r = inner.mint_persisted(entity_type)?;
        inner.identity.bind(r.clone(), backing_id);
        let turn = inner.turn;
        inner.ledger.insert(
            r.clone(),
            entity_type,
            label.map(str::to_string),
            RefAction::Created,
            turn,
            None,
        );
        inner.mutated();
        debug!(ref_id = %r, backing_id, "registered created row");
        Ok(r)
    }

    /// Records that the row behind `r` was updated. Returns whether the ref
    /// is known.
    pub fn register_updated(&self, r: &Ref) -> bool {
        let mut inner = self.inner.lock();
        let turn = inner.turn;
        let known = inner.ledger.set_action(r, RefAction::Updated);
        if known {
            inner.ledger.touch(r, turn);
            inner.mutated();
        }
        known
    }

    /// Records that the row behind `r` was deleted. The ref itself stays
    /// registered; removal is always an explicit [`discard`](Self::discard).
    pub fn register_deleted(&self, r: &Ref) -> bool {
        let mut inner = self.inner.lock();
        let turn = inner.turn;
        let known = inner.ledger.set_action(r, RefAction::Deleted);
        if known {
            inner.ledger.touch(r, turn);
            inner.mutated();
        }
        known
    }

    /// Marks `r` as referenced on the current turn.
    pub fn touch(&self, r: &Ref) -> bool {
        let mut inner = self.inner.lock();
        let turn = inner.turn;
        let known = inner.ledger.touch(r, turn);
        if known {
            inner.mutated();
        }
        known
    }

    /// Removes `r` entirely: identity entry, staged artifact, and ledger
    /// record. Returns whether the ref existed. This is the only way a ref
    /// leaves the registry; there is no implicit expiry.
    pub fn discard(&self, r: &Ref) -> bool {
        let mut inner = self.inner.lock();
        let existed = inner.identity.unbind(r);
        inner.artifacts.delete(r);
        inner.ledger.remove(r);
        if existed {
            inner.mutated();
            debug!(ref_id = %r, "discarded ref");
        }
        existed
    }

    // --- Lookup ---

    /// Resolves `r` to its backing id, pending state, or unknown.
    pub fn resolve(&self, r: &Ref) -> Resolution {
        self.inner.lock().identity.resolve(r)
    }

    /// The ref already minted for `backing_id`, if any.
    pub fn resolve_reverse(&self, backing_id: &str) -> Option<Ref> {
        self.inner.lock().identity.resolve_reverse(backing_id).cloned()
    }

    /// The staged draft content for `r`, if any.
    pub fn artifact(&self, r: &Ref) -> Option<serde_json::Value> {
        self.inner.lock().artifacts.get(r).cloned()
    }

    /// Replaces the staged draft for `r`, letting a draft be iterated on
    /// across turns. Returns false if `r` is not a registered pending ref.
    pub fn update_artifact(&self, r: &Ref, content: serde_json::Value) -> bool {
        let mut inner = self.inner.lock();
        if !inner.identity.resolve(r).is_pending() {
            return false;
        }
        inner.artifacts.put(r.clone(), content);
        let turn = inner.turn;
        inner.ledger.touch(r, turn);
        inner.mutated();
        true
    }

    /// The ledger record for `r`, if any.
    pub fn metadata(&self, r: &Ref) -> Option<MetadataRecord> {
        self.inner.lock().ledger.get(r).cloned()
    }

    /// Refs whose last action is `generated`, in creation order.
    pub fn list_pending(&self) -> Vec<Ref> {
        self.inner.lock().ledger.query_by_action(RefAction::Generated)
    }

    /// Refs whose last action matches, in creation order.
    pub fn query_by_action(&self, action: RefAction) -> Vec<Ref> {
        self.inner.lock().ledger.query_by_action(action)
    }

    /// Up to `limit` refs by recency: (turn_last_ref desc, turn_created desc).
    pub fn query_recent(&self, limit: usize) -> Vec<Ref> {
        self.inner.lock().ledger.query_recent(limit)
    }

    /// Refs matching `query`, most recently referenced first.
    pub fn list_refs(&self, query: &RefQuery) -> Vec<RefListing> {
        let inner = self.inner.lock();
        let mut rows: Vec<(&Ref, &MetadataRecord)> = inner
            .ledger
            .iter()
            .filter(|(_, record)| {
                query
                    .entity_type
                    .as_ref()
                    .map_or(true, |t| record.entity_type == *t)
                    && query.action.map_or(true, |a| record.action == a)
            })
            .collect();
        rows.sort_by(|(_, a), (_, b)| {
            b.turn_last_ref
                .cmp(&a.turn_last_ref)
                .then_with(|| b.turn_created.cmp(&a.turn_created))
                .then_with(|| b.seq.cmp(&a.seq))
        });
        if let Some(limit) = query.limit {
            rows.truncate(limit);
        }
        rows.into_iter()
            .map(|(r, record)| RefListing {
                ref_id: r.clone(),
                entity_type: record.entity_type.clone(),
                label: record.label.clone(),
                action: record.action,
                pending: inner.identity.resolve(r).is_pending(),
                turn_created: record.turn_created,
                turn_last_ref: record.turn_last_ref,
            })
            .collect()
    }

    // --- Snapshot ---

    /// Serializes the whole registry for cross-turn persistence. The
    /// round-trip through [`from_snapshot`](Self::from_snapshot) is exact.
    pub fn to_snapshot(&self) -> Snapshot {
        let inner = self.inner.lock();

        let mut entries: Vec<EntryState> = inner
            .ledger
            .iter()
            .map(|(r, record)| EntryState {
                ref_id: r.as_str().to_string(),
                backing_id: match inner.identity.resolve(r) {
                    Resolution::Found(id) => Some(id),
                    _ => None,
                },
                entity_type: record.entity_type.clone(),
                label: record.label.clone(),
                action: record.action.as_str().to_string(),
                turn_created: record.turn_created,
                turn_last_ref: record.turn_last_ref,
                source_step: record.source_step.clone(),
                seq: record.seq,
            })
            .collect();
        entries.sort_by_key(|e| e.seq);

        let mut artifacts: Vec<ArtifactState> = inner
            .artifacts
            .iter()
            .map(|(r, content)| ArtifactState {
                ref_id: r.as_str().to_string(),
                content: content.clone(),
            })
            .collect();
        artifacts.sort_by(|a, b| a.ref_id.cmp(&b.ref_id));

        let mut tables: Vec<TableState> = inner
            .tables
            .iter()
            .map(|(name, config)| TableState {
                name: name.clone(),
                entity_type: config.entity_type.clone(),
                primary_key: config.primary_key.clone(),
                fk_fields: config.fk_fields.clone(),
            })
            .collect();
        tables.sort_by(|a, b| a.name.cmp(&b.name));

        Snapshot {
            session_id: self.id,
            created_at: Some(self.created_at),
            updated_at: Some(inner.updated_at),
            turn: inner.turn,
            counters: inner.alloc.snapshot_counters(),
            entries,
            artifacts,
            tables,
        }
    }

    /// Restores a registry from a snapshot. Missing fields come back as
    /// their defaults; entries with no ref string are skipped; an action
    /// name from an unknown build degrades to the default action.
    pub fn from_snapshot(snapshot: Snapshot) -> Self {
        let now = Utc::now();
        let id = if snapshot.session_id.is_nil() {
            Uuid::new_v4()
        } else {
            snapshot.session_id
        };
        let mut inner = Inner::new(snapshot.updated_at.unwrap_or(now));
        inner.turn = snapshot.turn;
        inner.alloc.restore(&snapshot.counters);

        for entry in &snapshot.entries {
            if entry.ref_id.is_empty() {
                continue;
            }
            let r = Ref::from_string(entry.ref_id.clone());
            match &entry.backing_id {
                Some(backing_id) => inner.identity.bind(r.clone(), backing_id.clone()),
                None => inner.identity.bind_pending(r.clone()),
            }
            inner.ledger.restore(
                r.clone(),
                MetadataRecord {
                    entity_type: entry.entity_type.clone(),
                    label: entry.label.clone(),
                    action: RefAction::parse(&entry.action).unwrap_or_default(),
                    turn_created: entry.turn_created,
                    turn_last_ref: entry.turn_last_ref.max(entry.turn_created),
                    source_step: entry.source_step.clone(),
                    seq: entry.seq,
                },
            );
            // Counters may be missing from an old snapshot; refs themselves
            // still carry enough to keep the allocator ahead of them.
            if let (Some(entity_type), Some(n)) = (r.entity_type(), r.number()) {
                inner.alloc.restore(&[CounterState {
                    entity_type: entity_type.to_string(),
                    generated: r.is_generated(),
                    last: n,
                }]);
            }
        }

        for artifact in snapshot.artifacts {
            if artifact.ref_id.is_empty() {
                continue;
            }
            inner
                .artifacts
                .put(Ref::from_string(artifact.ref_id), artifact.content);
        }

        for table in snapshot.tables {
            if table.name.is_empty() {
                continue;
            }
            let entity_type = if table.entity_type.is_empty() {
                default_entity_type(&table.name)
            } else {
                table.entity_type
            };
            let primary_key = if table.primary_key.is_empty() {
                "id".to_string()
            } else {
                table.primary_key
            };
            inner.tables.insert(
                table.name,
                TableConfig {
                    entity_type,
                    primary_key,
                    fk_fields: table.fk_fields,
                },
            );
        }

        Self {
            id,
            created_at: snapshot.created_at.unwrap_or(now),
            inner: Mutex::new(inner),
        }
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
