#![allow(clippy::unwrap_used, clippy::expect_used)]

use refdesk_registry::{
    FileSnapshotStore, Ref, RefAction, RefQuery, Resolution, SessionRegistry, SnapshotStore,
    TableConfig,
};
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;

/// Helper: a registry configured with the tables the scenarios use.
fn shop_registry() -> SessionRegistry {
    let registry = SessionRegistry::new();
    registry.configure_table("items", TableConfig::new("item").fk_fields(["category_id"]));
    registry.configure_table("categories", TableConfig::new("category"));
    registry
}

#[test]
fn full_turn_lifecycle() {
    let registry = shop_registry();

    // Turn 1: a read comes back and is translated for the engine.
    registry.set_turn(1);
    let rows = registry
        .translate_read_rows(
            "items",
            vec![
                json!({"id": "id-1", "name": "Widget"}),
                json!({"id": "id-2", "name": "Gadget"}),
            ],
        )
        .unwrap();
    assert_eq!(rows[0]["id"], "item_1");
    assert_eq!(rows[1]["id"], "item_2");

    // The engine drafts a new item.
    let draft = registry
        .register_generated(
            "item",
            Some("Blue Widget"),
            json!({"name": "Blue Widget", "price": 10}),
            Some("step-2"),
        )
        .unwrap();
    assert_eq!(draft.as_str(), "gen_item_1");

    // Turn 2: the engine filters by a ref; lookup is pure and in place.
    registry.set_turn(2);
    let filters = registry.translate_filter_values(json!({"item_id": "item_1"}));
    assert_eq!(filters.value, json!({"item_id": "id-1"}));

    // Turn 3: the draft is saved. Its ref survives the save.
    registry.set_turn(3);
    let saved = registry
        .register_created("item", "uuid-9", Some("Blue Widget"), None)
        .unwrap();
    assert_eq!(saved, draft);
    assert_eq!(registry.resolve(&draft), Resolution::Found("uuid-9".into()));
    assert_eq!(registry.artifact(&draft), None);
    assert!(registry.list_pending().is_empty());

    // Re-reading the saved row reuses the promoted ref.
    let rows = registry
        .translate_read_rows("items", vec![json!({"id": "uuid-9", "name": "Blue Widget"})])
        .unwrap();
    assert_eq!(rows[0]["id"], "gen_item_1");
}

#[test]
fn rereading_backing_ids_never_renumbers() {
    let registry = shop_registry();
    registry
        .translate_read_rows("items", vec![json!({"id": "id-1"}), json!({"id": "id-2"})])
        .unwrap();
    let again = registry
        .translate_read_rows("items", vec![json!({"id": "id-1"}), json!({"id": "id-2"})])
        .unwrap();
    assert_eq!(again[0]["id"], "item_1");
    assert_eq!(again[1]["id"], "item_2");
}

#[test]
fn promotion_scenario_without_explicit_gen_ref() {
    let registry = shop_registry();
    let g = registry
        .register_generated("item", Some("Blue Widget"), json!({"name": "Blue Widget"}), None)
        .unwrap();
    assert_eq!(g.as_str(), "gen_item_1");

    let promoted = registry
        .register_created("item", "uuid-9", Some("Blue Widget"), None)
        .unwrap();
    assert_eq!(promoted, g);
    assert_eq!(registry.resolve(&g), Resolution::Found("uuid-9".into()));
}

#[test]
fn rename_between_draft_and_save_mints_new_ref() {
    let registry = shop_registry();
    let g = registry
        .register_generated("item", Some("Blue Widget"), json!({"name": "Blue Widget"}), None)
        .unwrap();

    let fresh = registry
        .register_created("item", "uuid-9", Some("Red Widget"), None)
        .unwrap();
    assert_eq!(fresh.as_str(), "item_1");
    assert_eq!(registry.resolve(&g), Resolution::Pending);
    assert!(registry.artifact(&g).is_some());
}

#[test]
fn unbind_removes_both_directions_and_artifact() {
    let registry = shop_registry();
    let g = registry
        .register_generated("item", Some("Draft"), json!({"name": "Draft"}), None)
        .unwrap();
    registry.register_created("item", "uuid-1", Some("Draft"), None).unwrap();

    assert!(registry.discard(&g));
    assert_eq!(registry.resolve(&g), Resolution::Unknown);
    assert_eq!(registry.resolve_reverse("uuid-1"), None);
    assert_eq!(registry.artifact(&g), None);
}

#[test]
fn payload_and_filter_translation_fail_soft() {
    let registry = shop_registry();

    let payload = registry.translate_payload_fks(
        "items",
        json!({"name": "Thing", "category_id": "category_7"}),
    );
    assert_eq!(payload.value["category_id"], "category_7");
    assert_eq!(payload.unresolved, vec!["category_7".to_string()]);

    let filters = registry.translate_filter_values(json!({"status": "active"}));
    assert_eq!(filters.value, json!({"status": "active"}));
    assert!(filters.unresolved.is_empty());
}

#[test]
fn listing_groups_by_type_action_and_recency() {
    let registry = shop_registry();
    registry.set_turn(1);
    registry
        .translate_read_rows("items", vec![json!({"id": "id-1", "name": "Widget"})])
        .unwrap();
    registry.set_turn(2);
    let g = registry
        .register_generated("item", Some("Draft"), json!({}), None)
        .unwrap();

    let generated = registry.list_refs(&RefQuery {
        action: Some(RefAction::Generated),
        ..RefQuery::default()
    });
    assert_eq!(generated.len(), 1);
    assert_eq!(generated[0].ref_id, g);
    assert!(generated[0].pending);

    let recent = registry.query_recent(10);
    assert_eq!(recent[0], g);
}

#[test]
fn concurrent_minting_produces_no_duplicates() {
    let registry = Arc::new(SessionRegistry::new());
    let threads = 8;
    let per_thread = 250;

    let mut handles = Vec::new();
    for t in 0..threads {
        let registry = Arc::clone(&registry);
        handles.push(std::thread::spawn(move || {
            let mut minted = Vec::with_capacity(per_thread * 2);
            for i in 0..per_thread {
                let r = registry
                    .register_created("item", &format!("uuid-{t}-{i}"), None, None)
                    .unwrap();
                minted.push(r);
                let g = registry
                    .register_generated("item", None, json!({"t": t, "i": i}), None)
                    .unwrap();
                minted.push(g);
            }
            minted
        }));
    }

    let mut all: Vec<Ref> = Vec::new();
    for handle in handles {
        all.extend(handle.join().unwrap());
    }
    let distinct: HashSet<&Ref> = all.iter().collect();
    assert_eq!(all.len(), threads * per_thread * 2);
    assert_eq!(distinct.len(), all.len(), "duplicate refs were minted");
}

#[test]
fn concurrent_translation_against_shared_registry() {
    let registry = Arc::new(shop_registry());
    let mut handles = Vec::new();
    for t in 0..4 {
        let registry = Arc::clone(&registry);
        handles.push(std::thread::spawn(move || {
            for i in 0..100 {
                // Several steps read overlapping rows at once; each backing
                // id must map to exactly one ref across all of them.
                let rows = registry
                    .translate_read_rows(
                        "items",
                        vec![json!({"id": format!("shared-{}", i % 10)}), json!({"id": format!("own-{t}-{i}")})],
                    )
                    .unwrap();
                assert!(rows[0]["id"].as_str().unwrap().starts_with("item_"));
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    for i in 0..10 {
        let backing = format!("shared-{i}");
        assert!(registry.resolve_reverse(&backing).is_some());
    }
}

#[tokio::test]
async fn snapshot_survives_store_round_trip() {
    let tmp = tempfile::tempdir().unwrap();
    let store = FileSnapshotStore::new(tmp.path().join("snapshots"))
        .await
        .unwrap();

    let registry = shop_registry();
    registry.set_turn(4);
    registry
        .translate_read_rows("items", vec![json!({"id": "id-1", "name": "Widget"})])
        .unwrap();
    let g = registry
        .register_generated("item", Some("Draft"), json!({"name": "Draft"}), None)
        .unwrap();
    store.save(&registry.to_snapshot()).await.unwrap();

    let restored =
        SessionRegistry::from_snapshot(store.load(registry.id()).await.unwrap().unwrap());

    // Every lookup answers identically after the round trip.
    assert_eq!(restored.current_turn(), 4);
    assert_eq!(
        restored.resolve(&Ref::from_string("item_1")),
        Resolution::Found("id-1".into())
    );
    assert_eq!(restored.resolve(&g), Resolution::Pending);
    assert_eq!(restored.artifact(&g), Some(json!({"name": "Draft"})));
    assert_eq!(
        restored.query_by_action(RefAction::Generated),
        registry.query_by_action(RefAction::Generated)
    );

    // Promotion still works against the restored registry.
    let promoted = restored
        .register_created("item", "uuid-9", Some("Draft"), None)
        .unwrap();
    assert_eq!(promoted, g);

    // Table configs survived: new reads translate with the declared schema.
    let rows = restored
        .translate_read_rows("items", vec![json!({"id": "id-2"})])
        .unwrap();
    assert_eq!(rows[0]["id"], "item_2");
}
