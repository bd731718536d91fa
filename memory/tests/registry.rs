use std::sync::Arc;

use memory_bank::ItemType;
use memory_bank::KnowledgeStore;
use memory_bank::NewItem;
use memory_bank::StoreRegistry;

#[test]
fn same_location_yields_same_handle() {
    let dir = tempfile::tempdir().unwrap();
    let registry = StoreRegistry::new();
    let path = dir.path().join("kb").join("knowledge.db");

    let a = registry.open(&path).unwrap();
    let b = registry
        .open(dir.path().join("kb").join(".").join("knowledge.db"))
        .unwrap();
    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(registry.len(), 1);

    let other = registry.open(dir.path().join("other.db")).unwrap();
    assert!(!Arc::ptr_eq(&a, &other));
    assert_eq!(registry.len(), 2);

    let id = a
        .add(NewItem::new("shared", "visible through b", ItemType::Memo), true)
        .unwrap();
    assert_eq!(b.content_exists("visible through b").unwrap(), Some(id));
}

#[test]
fn closing_the_store_retires_the_cached_handle() {
    let dir = tempfile::tempdir().unwrap();
    let registry = StoreRegistry::new();
    let path = dir.path().join("knowledge.db");

    let first = registry.open(&path).unwrap();
    first
        .add(NewItem::new("before", "written before close", ItemType::Memo), true)
        .unwrap();
    first.close().unwrap();
    assert!(registry.is_empty());

    let second = registry.open(&path).unwrap();
    assert!(!Arc::ptr_eq(&first, &second));
    assert!(!second.is_closed());
    second
        .add(NewItem::new("after", "written after reopen", ItemType::Memo), true)
        .unwrap();
    assert_eq!(second.get_stats().unwrap().total_items, 2);
}

#[test]
fn registry_close_evicts_and_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let registry = StoreRegistry::new();
    let path = dir.path().join("knowledge.db");

    let store = registry.open(&path).unwrap();
    assert!(registry.close(&path).unwrap());
    assert!(store.is_closed());
    assert!(!registry.close(&path).unwrap());
    store.close().unwrap();

    let reopened = registry.open(&path).unwrap();
    reopened
        .add(NewItem::new("t", "usable after registry close", ItemType::Memo), true)
        .unwrap();

    registry.close_all().unwrap();
    assert!(reopened.is_closed());
    assert!(registry.is_empty());
}

#[test]
fn concurrent_first_open_constructs_once() {
    let dir = tempfile::tempdir().unwrap();
    let registry = Arc::new(StoreRegistry::new());
    let path = dir.path().join("knowledge.db");

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let registry = Arc::clone(&registry);
            let path = path.clone();
            std::thread::spawn(move || registry.open(&path).unwrap())
        })
        .collect();
    let stores: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    for store in &stores[1..] {
        assert!(Arc::ptr_eq(&stores[0], store));
    }
    assert_eq!(registry.len(), 1);
}

#[test]
fn global_registry_is_process_wide() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("knowledge.db");

    let a = StoreRegistry::global().open(&path).unwrap();
    let b = StoreRegistry::global().open(&path).unwrap();
    assert!(Arc::ptr_eq(&a, &b));
    assert!(StoreRegistry::global().close(&path).unwrap());
}
