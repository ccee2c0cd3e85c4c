//! Filesystem artifact and input stores.

use sculpt::artifact::{ArtifactLocator, ArtifactStore, FsArtifactStore, FsInputStore, InputStore};
use sculpt::types::{ArtifactKind, ArtifactSet, TaskId};
use tempfile::TempDir;

fn id(raw: &str) -> TaskId {
    TaskId::parse(raw).unwrap()
}

#[test]
fn test_persist_all_writes_one_file_per_kind() {
    let temp = TempDir::new().unwrap();
    let store = FsArtifactStore::new(temp.path().join("outputs")).unwrap();
    let payloads = ArtifactSet::new(b"glb".to_vec(), b"ply".to_vec(), b"mp4".to_vec());

    let locators = store.persist_all(&id("t-1"), &payloads).unwrap();
    assert_eq!(locators.scene.as_str(), "t-1.glb");
    assert_eq!(locators.point_cloud.as_str(), "t-1.ply");
    assert_eq!(locators.preview.as_str(), "t-1.mp4");

    for (kind, locator) in locators.iter() {
        assert!(store.exists(locator));
        assert_eq!(store.read(locator).unwrap().unwrap(), *payloads.get(kind));
    }

    let mut names: Vec<_> = std::fs::read_dir(store.root())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    assert_eq!(names, vec!["t-1.glb", "t-1.mp4", "t-1.ply"]);
}

#[test]
fn test_tasks_do_not_share_files() {
    let temp = TempDir::new().unwrap();
    let store = FsArtifactStore::new(temp.path()).unwrap();
    store.persist(&id("a"), ArtifactKind::Scene, b"first").unwrap();
    store.persist(&id("b"), ArtifactKind::Scene, b"second").unwrap();

    let a = FsArtifactStore::locator_for(&id("a"), ArtifactKind::Scene);
    let b = FsArtifactStore::locator_for(&id("b"), ArtifactKind::Scene);
    assert_eq!(store.read(&a).unwrap().unwrap(), b"first");
    assert_eq!(store.read(&b).unwrap().unwrap(), b"second");
}

#[test]
fn test_missing_and_invalid_locators() {
    let temp = TempDir::new().unwrap();
    let store = FsArtifactStore::new(temp.path()).unwrap();
    assert!(store.read(&ArtifactLocator::new("nope.glb")).unwrap().is_none());
    assert!(!store.exists(&ArtifactLocator::new("nope.glb")));
    assert!(store.read(&ArtifactLocator::new("../escape.glb")).is_err());
}

#[test]
fn test_cleanup_removes_files() {
    let temp = TempDir::new().unwrap();
    let store = FsArtifactStore::new(temp.path()).unwrap();
    let payloads = ArtifactSet::new(b"g".to_vec(), b"p".to_vec(), b"v".to_vec());
    let locators = store.persist_all(&id("gone"), &payloads).unwrap();

    let all: Vec<_> = locators.iter().map(|(_, l)| l.clone()).collect();
    store.cleanup(&all);
    assert!(all.iter().all(|l| !store.exists(l)));
}

#[test]
fn test_input_store_sniffs_extension() {
    let temp = TempDir::new().unwrap();
    let store = FsInputStore::new(temp.path()).unwrap();

    let png = store
        .persist(&id("img-1"), b"\x89PNG\r\n\x1a\nrest")
        .unwrap();
    assert_eq!(png.as_str(), "img-1_input.png");

    let jpg = store.persist(&id("img-2"), b"\xff\xd8\xff\xe0rest").unwrap();
    assert_eq!(jpg.as_str(), "img-2_input.jpg");

    assert_eq!(
        store.read(&png).unwrap().unwrap(),
        b"\x89PNG\r\n\x1a\nrest".to_vec()
    );
}
