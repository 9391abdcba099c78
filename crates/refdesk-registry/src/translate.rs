use crate::session::{Inner, SessionRegistry};
use refdesk_core::refs::is_ref_shaped;
use refdesk_core::{RefAction, RefdeskResult, Resolution};
use serde_json::Value;
use tracing::warn;

/// Declared schema for one table the translator rewrites.
///
/// The registry does no schema introspection: the primary-identifier field
/// and the FK field set are declared up front by the record source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableConfig {
    /// Entity type used when minting refs for this table's rows.
    pub entity_type: String,
    /// Field holding the row's primary identifier.
    pub primary_key: String,
    /// Fields holding foreign-key references to other tables' rows.
    pub fk_fields: Vec<String>,
}

impl TableConfig {
    /// A config with primary key `id` and no FK fields.
    pub fn new(entity_type: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.into(),
            primary_key: "id".to_string(),
            fk_fields: Vec::new(),
        }
    }

    /// Sets the primary-identifier field.
    pub fn primary_key(mut self, field: impl Into<String>) -> Self {
        self.primary_key = field.into();
        self
    }

    /// Sets the FK field set.
    pub fn fk_fields(mut self, fields: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.fk_fields = fields.into_iter().map(Into::into).collect();
        self
    }
}

/// Fallback entity type for a table with no declared config, by trivial
/// English singularization: `items` → `item`, `categories` → `category`,
/// `addresses` → `address`. A declared [`TableConfig`] is always
/// authoritative; this only keeps unconfigured tables usable.
pub(crate) fn default_entity_type(table: &str) -> String {
    if let Some(stem) = table.strip_suffix("ies") {
        if !stem.is_empty() {
            return format!("{stem}y");
        }
    }
    for suffix in ["ches", "shes", "sses", "xes"] {
        if let Some(stem) = table.strip_suffix(suffix) {
            if !stem.is_empty() {
                return format!("{stem}{}", &suffix[..suffix.len() - 2]);
            }
        }
    }
    match table.strip_suffix('s') {
        Some(stem) if !stem.is_empty() && !stem.ends_with('s') => stem.to_string(),
        _ => table.to_string(),
    }
}

/// Result of a filter or payload translation pass.
///
/// Values that looked like refs but did not resolve are left exactly as
/// they were and reported here, so a bad reference fails visibly in a later
/// validation layer instead of being silently guessed at.
#[derive(Debug, Clone, Default)]
pub struct Translated {
    /// The rewritten value.
    pub value: Value,
    /// Ref-shaped values that could not be resolved, in encounter order.
    pub unresolved: Vec<String>,
}

impl SessionRegistry {
    /// Declares the schema for `table`. Rows read from or written to the
    /// table are translated using this config from now on.
    pub fn configure_table(&self, table: impl Into<String>, config: TableConfig) {
        let mut inner = self.lock_inner();
        inner.tables.insert(table.into(), config);
        inner.mutated();
    }

    /// The declared config for `table`, if any.
    pub fn table_config(&self, table: &str) -> Option<TableConfig> {
        self.lock_inner().tables.get(table).cloned()
    }

    /// Rewrites read results so the reasoning engine never sees a raw
    /// primary identifier.
    ///
    /// For each row's primary identifier: a backing id seen before reuses
    /// its existing ref, anything else mints one. Declared FK fields are
    /// substituted only when a reverse mapping already exists — an unknown
    /// FK value is left as the raw id rather than speculatively minted,
    /// accepting a partial leak over a failed read. The whole batch
    /// translates inside one critical section.
    pub fn translate_read_rows(&self, table: &str, rows: Vec<Value>) -> RefdeskResult<Vec<Value>> {
        let mut inner = self.lock_inner();
        let config = inner
            .tables
            .get(table)
            .cloned()
            .unwrap_or_else(|| TableConfig::new(default_entity_type(table)));
        let turn = inner.turn;

        let mut translated = Vec::with_capacity(rows.len());
        for mut row in rows {
            if let Some(obj) = row.as_object_mut() {
                if let Some(Value::String(backing_id)) = obj.get(&config.primary_key) {
                    let backing_id = backing_id.clone();
                    let r = match inner.identity.resolve_reverse(&backing_id).cloned() {
                        Some(existing) => {
                            inner.ledger.touch(&existing, turn);
                            existing
                        }
                        None => {
                            let r = inner.mint_persisted(&config.entity_type)?;
                            inner.identity.bind(r.clone(), backing_id);
                            let label = row_label(obj);
                            inner
                                .ledger
                                .insert(r.clone(), &config.entity_type, label, RefAction::Read, turn, None);
                            r
                        }
                    };
                    obj.insert(
                        config.primary_key.clone(),
                        Value::String(r.as_str().to_string()),
                    );
                }
                for field in &config.fk_fields {
                    if let Some(value) = obj.get_mut(field) {
                        substitute_known_ids(&mut inner, value, turn);
                    }
                }
            }
            translated.push(row);
        }
        inner.mutated();
        Ok(translated)
    }

    /// Rewrites ref-shaped values inside a filter structure to backing ids.
    ///
    /// Every string in the structure is checked against the ref-shape
    /// heuristic; matches resolve by pure lookup. A value that fails the
    /// heuristic is never mutated. A ref-shaped value with no binding is
    /// left untouched and flagged in [`Translated::unresolved`].
    pub fn translate_filter_values(&self, filters: Value) -> Translated {
        let mut inner = self.lock_inner();
        let mut out = Translated {
            value: filters,
            unresolved: Vec::new(),
        };
        rewrite_ref_values(&mut inner, &mut out.value, &mut out.unresolved);
        inner.mutated();
        if !out.unresolved.is_empty() {
            warn!(
                count = out.unresolved.len(),
                values = ?out.unresolved,
                "filter values looked like refs but did not resolve"
            );
        }
        out
    }

    /// Rewrites ref-shaped values in `payload`'s declared FK fields to
    /// backing ids before a write.
    ///
    /// Only the FK fields declared for `table` are considered; a table with
    /// no declared config has nothing rewritten. Unresolvable ref-shaped
    /// values are left unchanged and flagged, never raised.
    pub fn translate_payload_fks(&self, table: &str, payload: Value) -> Translated {
        let mut inner = self.lock_inner();
        let fk_fields = inner
            .tables
            .get(table)
            .map(|config| config.fk_fields.clone())
            .unwrap_or_default();

        let mut out = Translated {
            value: payload,
            unresolved: Vec::new(),
        };
        if let Some(obj) = out.value.as_object_mut() {
            for field in &fk_fields {
                if let Some(value) = obj.get_mut(field) {
                    rewrite_ref_values(&mut inner, value, &mut out.unresolved);
                }
            }
        }
        inner.mutated();
        if !out.unresolved.is_empty() {
            warn!(
                table,
                count = out.unresolved.len(),
                values = ?out.unresolved,
                "payload FK values looked like refs but did not resolve"
            );
        }
        out
    }
}

/// Best-effort label for a freshly minted row ref: `name`, then `title`.
fn row_label(row: &serde_json::Map<String, Value>) -> Option<String> {
    row.get("name")
        .or_else(|| row.get("title"))
        .and_then(|v| v.as_str())
        .map(str::to_string)
}

/// Replaces raw backing ids with refs, but only where a reverse mapping
/// already exists. Handles a bare string or an array of strings.
fn substitute_known_ids(inner: &mut Inner, value: &mut Value, turn: u64) {
    match value {
        Value::String(s) => {
            if let Some(r) = inner.identity.resolve_reverse(s).cloned() {
                inner.ledger.touch(&r, turn);
                *s = r.as_str().to_string();
            }
        }
        Value::Array(items) => {
            for item in items {
                substitute_known_ids(inner, item, turn);
            }
        }
        _ => {}
    }
}

/// Recursively resolves ref-shaped strings to backing ids in place.
/// Strings that fail the heuristic are never touched; ref-shaped strings
/// with no bound backing id are left as-is and recorded in `unresolved`.
fn rewrite_ref_values(inner: &mut Inner, value: &mut Value, unresolved: &mut Vec<String>) {
    match value {
        Value::String(s) => {
            if !is_ref_shaped(s) {
                return;
            }
            let r = refdesk_core::Ref::from_string(s.clone());
            match inner.identity.resolve(&r) {
                Resolution::Found(id) => {
                    let turn = inner.turn;
                    inner.ledger.touch(&r, turn);
                    *s = id;
                }
                Resolution::Pending | Resolution::Unknown => {
                    unresolved.push(s.clone());
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                rewrite_ref_values(inner, item, unresolved);
            }
        }
        Value::Object(map) => {
            for item in map.values_mut() {
                rewrite_ref_values(inner, item, unresolved);
            }
        }
        _ => {}
    }
}
