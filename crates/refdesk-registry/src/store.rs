use async_trait::async_trait;
use refdesk_core::{RefdeskError, RefdeskResult, Snapshot};
use std::path::PathBuf;
use uuid::Uuid;

/// Persistence boundary for registry snapshots.
///
/// The registry treats the snapshot as an opaque blob stored alongside the
/// rest of session state; when and whether to persist is the caller's
/// policy.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Persists a snapshot, replacing any previous one for its session.
    async fn save(&self, snapshot: &Snapshot) -> RefdeskResult<()>;
    /// Loads the snapshot for a session, or `None` if none was saved.
    async fn load(&self, session_id: Uuid) -> RefdeskResult<Option<Snapshot>>;
    /// Removes the snapshot for a session, if any.
    async fn delete(&self, session_id: Uuid) -> RefdeskResult<()>;
    /// Session ids with a stored snapshot.
    async fn list(&self) -> RefdeskResult<Vec<Uuid>>;
}

/// File-based snapshot store (one JSON file per session).
pub struct FileSnapshotStore {
    dir: PathBuf,
}

impl FileSnapshotStore {
    /// Creates the store, making the directory if needed.
    pub async fn new(dir: PathBuf) -> RefdeskResult<Self> {
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    fn snapshot_path(&self, session_id: Uuid) -> PathBuf {
        self.dir.join(format!("{session_id}.json"))
    }
}

#[async_trait]
impl SnapshotStore for FileSnapshotStore {
    async fn save(&self, snapshot: &Snapshot) -> RefdeskResult<()> {
        let path = self.snapshot_path(snapshot.session_id);
        let json = serde_json::to_string_pretty(snapshot)?;
        tokio::fs::write(path, json).await?;
        Ok(())
    }

    async fn load(&self, session_id: Uuid) -> RefdeskResult<Option<Snapshot>> {
        let path = self.snapshot_path(session_id);
        if !path.exists() {
            return Ok(None);
        }
        let data = tokio::fs::read_to_string(path).await?;
        // Field-level damage degrades to defaults inside Snapshot's lenient
        // decoding; only a blob that is not a JSON object at all is
        // rejected, as MalformedSnapshot rather than a generic JSON error
        // so callers can tell a broken snapshot from a broken write.
        let snapshot: Snapshot = serde_json::from_str(&data)
            .map_err(|e| RefdeskError::MalformedSnapshot(e.to_string()))?;
        Ok(Some(snapshot))
    }

    async fn delete(&self, session_id: Uuid) -> RefdeskResult<()> {
        let path = self.snapshot_path(session_id);
        if path.exists() {
            tokio::fs::remove_file(path).await?;
        }
        Ok(())
    }

    async fn list(&self) -> RefdeskResult<Vec<Uuid>> {
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        let mut ids = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if let Some(name) = entry.file_name().to_str() {
                if let Some(stem) = name.strip_suffix(".json") {
                    if let Ok(id) = Uuid::parse_str(stem) {
                        ids.push(id);
                    }
                }
            }
        }
        Ok(ids)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::session::SessionRegistry;
    use refdesk_core::Resolution;
    use serde_json::json;

    async fn temp_store() -> (FileSnapshotStore, tempfile::TempDir) {
        let tmp = tempfile::tempdir().unwrap();
        let store = FileSnapshotStore::new(tmp.path().join("snapshots"))
            .await
            .unwrap();
        (store, tmp)
    }

    #[tokio::test]
    async fn save_and_load_round_trip() {
        let (store, _tmp) = temp_store().await;
        let registry = SessionRegistry::new();
        registry.set_turn(2);
        let r = registry.register_created("item", "uuid-1", Some("Widget"), None).unwrap();
        registry
            .register_generated("note", Some("Draft"), json!({"title": "Draft"}), None)
            .unwrap();

        store.save(&registry.to_snapshot()).await.unwrap();

        let loaded = store.load(registry.id()).await.unwrap().unwrap();
        let restored = SessionRegistry::from_snapshot(loaded);
        assert_eq!(restored.id(), registry.id());
        assert_eq!(restored.resolve(&r), Resolution::Found("uuid-1".into()));
        assert_eq!(restored.list_pending().len(), 1);
    }

    #[tokio::test]
    async fn load_missing_returns_none() {
        let (store, _tmp) = temp_store().await;
        assert!(store.load(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn unreadable_blob_is_malformed_snapshot() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("snapshots");
        let store = FileSnapshotStore::new(dir.clone()).await.unwrap();
        let id = Uuid::new_v4();
        tokio::fs::write(dir.join(format!("{id}.json")), b"{not json")
            .await
            .unwrap();

        let err = store.load(id).await.unwrap_err();
        assert!(matches!(err, RefdeskError::MalformedSnapshot(_)));
    }

    #[tokio::test]
    async fn damaged_field_degrades_instead_of_rejecting_the_blob() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("snapshots");
        let store = FileSnapshotStore::new(dir.clone()).await.unwrap();

        let registry = SessionRegistry::new();
        registry.set_turn(3);
        let r = registry.register_created("item", "uuid-1", None, None).unwrap();
        store.save(&registry.to_snapshot()).await.unwrap();

        // Corrupt one field on disk; the rest of the registry must survive.
        let path = dir.join(format!("{}.json", registry.id()));
        let data = tokio::fs::read_to_string(&path).await.unwrap();
        let damaged = data.replace("\"turn\": 3", "\"turn\": \"three\"");
        assert_ne!(data, damaged);
        tokio::fs::write(&path, damaged).await.unwrap();

        let loaded = store.load(registry.id()).await.unwrap().unwrap();
        assert_eq!(loaded.turn, 0);
        let restored = SessionRegistry::from_snapshot(loaded);
        assert_eq!(restored.resolve(&r), Resolution::Found("uuid-1".into()));
    }

    #[tokio::test]
    async fn delete_and_list() {
        let (store, _tmp) = temp_store().await;
        let registry = SessionRegistry::new();
        store.save(&registry.to_snapshot()).await.unwrap();
        assert_eq!(store.list().await.unwrap(), vec![registry.id()]);

        store.delete(registry.id()).await.unwrap();
        assert!(store.list().await.unwrap().is_empty());
        // Deleting again is not an error.
        store.delete(registry.id()).await.unwrap();
    }
}
