use crate::artifacts::ArtifactStore;
use crate::identity::IdentityMap;
use crate::ledger::MetadataLedger;
use refdesk_core::{Ref, RefAction};

/// Canonical form used for all promotion label comparisons.
pub(crate) fn normalize_label(label: &str) -> String {
    label.trim().to_lowercase()
}

/// Finds the pending gen-ref a newly persisted record should be promoted
/// onto, if any.
///
/// Candidates are pending generated refs of the same entity type, scanned
/// in insertion order so the earliest draft wins a tie. A candidate matches
/// when its tracked label normalizes equal to the query label, or, when no
/// label was tracked, when its artifact content's `name` or `title` field
/// does. Matching is exact on the normalized label; anything fuzzier would
/// break the registry's pure-lookup guarantee.
pub(crate) fn find_promotion_candidate(
    identity: &IdentityMap,
    artifacts: &ArtifactStore,
    ledger: &MetadataLedger,
    entity_type: &str,
    label: &str,
) -> Option<Ref> {
    let wanted = normalize_label(label);
    if wanted.is_empty() {
        return None;
    }

    let mut candidates: Vec<(u64, &Ref)> = ledger
        .iter()
        .filter(|(r, record)| {
            record.action == RefAction::Generated
                && record.entity_type == entity_type
                && r.is_generated()
                && identity.resolve(r).is_pending()
        })
        .map(|(r, record)| (record.seq, r))
        .collect();
    candidates.sort_by_key(|(seq, _)| *seq);

    for (_, r) in candidates {
        let record = ledger.get(r)?;
        let matched = match &record.label {
            Some(tracked) => normalize_label(tracked) == wanted,
            None => artifacts
                .get(r)
                .and_then(content_label)
                .map(|candidate| normalize_label(&candidate) == wanted)
                .unwrap_or(false),
        };
        if matched {
            return Some(r.clone());
        }
    }
    None
}

/// Pulls a display label out of draft content: `name` first, then `title`.
fn content_label(content: &serde_json::Value) -> Option<String> {
    let obj = content.as_object()?;
    obj.get("name")
        .or_else(|| obj.get("title"))
        .and_then(|v| v.as_str())
        .map(str::to_string)
}
