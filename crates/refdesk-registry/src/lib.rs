//! Session-scoped reference and lifecycle registry for database-backed
//! conversational agents.
//!
//! A reasoning engine should never see raw backing identifiers. This crate
//! mints stable, human-legible refs (`item_3`, `gen_note_1`) in their
//! place, tracks each ref's binding to its backing id (including an
//! explicit pending state for generated-but-unsaved drafts), stages draft
//! content, promotes a draft's ref onto the row it becomes once saved, and
//! rewrites identifiers in read results, write payloads, and filters — all
//! by deterministic lookup, never by inference.
//!
//! # Main types
//!
//! - [`SessionRegistry`] — One registry per conversation; every operation
//!   goes through its handle.
//! - [`TableConfig`] — Declared primary-key and FK fields per table.
//! - [`Translated`] — A rewritten filter/payload plus the values that
//!   looked like refs but did not resolve.
//! - [`SnapshotStore`] / [`FileSnapshotStore`] — Persistence boundary for
//!   cross-turn snapshots.

/// Per-(type, kind) sequential ref minting.
pub mod alloc;
/// Verbatim draft content keyed by gen-ref.
pub mod artifacts;
/// Bidirectional ref ↔ backing-id table with explicit pending state.
pub mod identity;
/// Per-ref action, label, and turn bookkeeping.
pub mod ledger;
mod promote;
/// The session facade owning all registry state behind one lock.
pub mod session;
/// Snapshot persistence boundary.
pub mod store;
/// Identifier rewriting for reads, filters, and write payloads.
pub mod translate;

pub use alloc::RefAllocator;
pub use artifacts::ArtifactStore;
pub use identity::{Binding, IdentityMap};
pub use ledger::{MetadataLedger, MetadataRecord};
pub use session::{RefListing, RefQuery, SessionRegistry};
pub use store::{FileSnapshotStore, SnapshotStore};
pub use translate::{TableConfig, Translated};

pub use refdesk_core::{Ref, RefAction, RefdeskError, RefdeskResult, Resolution, Snapshot};
