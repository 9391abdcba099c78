//! Core types and error definitions for the refdesk registry.
//!
//! This crate provides the vocabulary shared by every refdesk crate: the
//! [`Ref`] handle type, action and resolution enums, the unified error
//! type, and the snapshot wire structs used for cross-turn persistence.
//!
//! # Main types
//!
//! - [`RefdeskError`] — Unified error enum for all refdesk subsystems.
//! - [`RefdeskResult`] — Convenience alias for `Result<T, RefdeskError>`.
//! - [`Ref`] — Stable, human-legible handle standing in for a backing id.
//! - [`RefAction`] — The last lifecycle action recorded against a ref.
//! - [`Resolution`] — Outcome of resolving a ref to its backing id.

/// The [`Ref`](refs::Ref) handle type and its format helpers.
pub mod refs;
/// Flat, forward-compatible snapshot structs for cross-turn persistence.
pub mod snapshot;

use serde::{Deserialize, Serialize};

pub use refs::Ref;
pub use snapshot::Snapshot;

// --- Error types ---

/// Top-level error type for the refdesk registry.
///
/// Resolution misses are deliberately *not* errors: an unknown or
/// still-pending ref is an ordinary [`Resolution`] outcome that callers
/// branch on. The variants here are the failures that must propagate.
#[derive(Debug, thiserror::Error)]
pub enum RefdeskError {
    /// The allocator produced a ref string that is already live. Unreachable
    /// under correct locking; if it surfaces, two rows alias one ref and the
    /// current mutation must abort.
    #[error("ref collision: {0} is already registered")]
    RefCollision(String),

    /// A snapshot blob could not be decoded at all. Individual missing or
    /// malformed fields degrade to defaults instead of raising this.
    #[error("malformed snapshot: {0}")]
    MalformedSnapshot(String),

    /// An error from the snapshot persistence layer.
    #[error("snapshot store error: {0}")]
    Store(String),

    /// A JSON serialization or deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A convenience `Result` alias using [`RefdeskError`].
pub type RefdeskResult<T> = Result<T, RefdeskError>;

// --- Lifecycle types ---

/// The last lifecycle action recorded against a ref.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RefAction {
    /// The ref was minted while translating a read result.
    Read,
    /// The ref's record was inserted into the backing store.
    Created,
    /// The ref's record was modified in the backing store.
    Updated,
    /// The ref's record was removed from the backing store.
    Deleted,
    /// The ref was minted for generated content not yet persisted.
    Generated,
}

impl RefAction {
    /// The lowercase wire name of this action.
    pub fn as_str(&self) -> &'static str {
        match self {
            RefAction::Read => "read",
            RefAction::Created => "created",
            RefAction::Updated => "updated",
            RefAction::Deleted => "deleted",
            RefAction::Generated => "generated",
        }
    }

    /// Parses a wire name back into an action. Unknown names yield `None`;
    /// snapshot loading substitutes the default instead of failing.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "read" => Some(RefAction::Read),
            "created" => Some(RefAction::Created),
            "updated" => Some(RefAction::Updated),
            "deleted" => Some(RefAction::Deleted),
            "generated" => Some(RefAction::Generated),
            _ => None,
        }
    }
}

impl Default for RefAction {
    fn default() -> Self {
        RefAction::Read
    }
}

impl std::fmt::Display for RefAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of resolving a ref to its backing id.
///
/// A tagged enum rather than a bare `Option` so callers cannot silently
/// conflate "never seen" with "seen but not yet persisted".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// The ref is bound to this backing id.
    Found(String),
    /// The ref is registered but has no backing id yet.
    Pending,
    /// The ref has never been registered this session.
    Unknown,
}

impl Resolution {
    /// Returns the backing id if this resolution found one.
    pub fn found(&self) -> Option<&str> {
        match self {
            Resolution::Found(id) => Some(id),
            _ => None,
        }
    }

    /// Whether the ref is registered but still awaiting a backing id.
    pub fn is_pending(&self) -> bool {
        matches!(self, Resolution::Pending)
    }
}
