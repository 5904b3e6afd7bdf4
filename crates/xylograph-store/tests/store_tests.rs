//! Store persistence tests

use tempfile::tempdir;
use xylograph_store::*;

// ============================================================================
// Open / flush / reopen
// ============================================================================

#[test]
fn test_open_creates_directory() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("nested").join("store");

    let store = PersistentStore::open(&path).unwrap();
    assert!(path.is_dir());
    assert!(store.store().is_empty());
}

#[test]
fn test_reopen_preserves_triples() {
    let dir = tempdir().unwrap();
    let path = dir.path().to_path_buf();

    // Create, populate, flush
    {
        let mut store = PersistentStore::open(&path).unwrap();
        store
            .store_mut()
            .insert("s:1", RDF_TYPE, Object::iri("c:item"));
        store
            .store_mut()
            .insert("s:1", RDFS_LABEL, Object::literal("one"));
        store.flush().unwrap();
    }

    // Reopen and verify
    {
        let store = PersistentStore::open(&path).unwrap();
        assert_eq!(store.store().len(), 2);
        assert!(store
            .store()
            .contains("s:1", RDF_TYPE, &Object::iri("c:item")));
        assert_eq!(
            store.store().subjects_of_type("c:item"),
            vec!["s:1".to_string()]
        );
    }
}

#[test]
fn test_reopen_appends_across_runs() {
    let dir = tempdir().unwrap();
    let path = dir.path().to_path_buf();

    {
        let mut store = PersistentStore::open(&path).unwrap();
        store
            .store_mut()
            .insert("s:1", RDF_TYPE, Object::iri("c:item"));
        store.flush().unwrap();
    }

    // A second run appends to the same image; re-inserting is a no-op.
    {
        let mut store = PersistentStore::open(&path).unwrap();
        assert!(!store
            .store_mut()
            .insert("s:1", RDF_TYPE, Object::iri("c:item")));
        assert!(store
            .store_mut()
            .insert("s:2", RDF_TYPE, Object::iri("c:item")));
        store.flush().unwrap();
    }

    {
        let store = PersistentStore::open(&path).unwrap();
        assert_eq!(store.store().len(), 2);
        assert_eq!(store.store().subjects_of_type("c:item").len(), 2);
    }
}

#[test]
fn test_unflushed_changes_are_lost() {
    let dir = tempdir().unwrap();
    let path = dir.path().to_path_buf();

    {
        let mut store = PersistentStore::open(&path).unwrap();
        store
            .store_mut()
            .insert("s:1", RDF_TYPE, Object::iri("c:item"));
        // No flush.
    }

    let store = PersistentStore::open(&path).unwrap();
    assert!(store.store().is_empty());
}

#[test]
fn test_corrupt_image_is_an_error() {
    let dir = tempdir().unwrap();
    let path = dir.path().to_path_buf();

    {
        let store = PersistentStore::open(&path).unwrap();
        store.flush().unwrap();
    }
    std::fs::write(path.join(STORE_FILE), b"definitely not a store image").unwrap();

    assert!(PersistentStore::open(&path).is_err());
}

#[test]
fn test_torn_image_is_an_error_not_a_panic() {
    let dir = tempdir().unwrap();
    let path = dir.path().to_path_buf();

    {
        let mut store = PersistentStore::open(&path).unwrap();
        store
            .store_mut()
            .insert("s:1", RDF_TYPE, Object::iri("c:item"));
        store.flush().unwrap();
    }

    // Cut the flushed image short, as an interrupted write would.
    let image = path.join(STORE_FILE);
    let bytes = std::fs::read(&image).unwrap();
    std::fs::write(&image, &bytes[..bytes.len() - 4]).unwrap();
    assert!(PersistentStore::open(&path).is_err());

    // Header alone is not enough either.
    std::fs::write(&image, &bytes[..8]).unwrap();
    assert!(PersistentStore::open(&path).is_err());
}

// ============================================================================
// Image format
// ============================================================================

#[test]
fn test_image_starts_with_magic() {
    let mut store = TripleStore::new();
    store.insert("s:1", RDFS_LABEL, Object::literal("one"));
    let bytes = store.to_bytes().unwrap();
    assert_eq!(&bytes[0..4], b"XYGS");
    assert_eq!(u32::from_le_bytes(bytes[4..8].try_into().unwrap()), 1);
}

#[test]
fn test_round_trip_preserves_order_and_indexes() {
    let mut store = TripleStore::new();
    store.insert("s:tag", RDF_TYPE, Object::iri("c:tag"));
    store.insert("s:item", RDF_TYPE, Object::iri("c:item"));
    store.insert("s:item", "p:has_tag", Object::iri("s:tag"));

    let loaded = TripleStore::from_bytes(&store.to_bytes().unwrap()).unwrap();
    let original: Vec<TripleView> = store.iter().collect();
    let restored: Vec<TripleView> = loaded.iter().collect();
    assert_eq!(original, restored);
    assert_eq!(
        loaded.objects("s:item", "p:has_tag"),
        vec![Object::iri("s:tag")]
    );
}

#[test]
fn test_persist_store_file_constant() {
    let dir = tempdir().unwrap();
    let store = PersistentStore::open(dir.path()).unwrap();
    store.flush().unwrap();
    assert!(dir.path().join(STORE_FILE).is_file());
    assert_eq!(store.path(), dir.path());
}
