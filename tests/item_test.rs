//! Integration tests for the versioned remote item.

use std::sync::Arc;

use claimq::error::{Error, Result};
use claimq::project::Project;
use claimq::storage::{MemoryStore, ObjectStore, sha256_hex};

fn fixture() -> (Arc<MemoryStore>, Arc<Project>) {
    let store = Arc::new(MemoryStore::new());
    let project = Project::new(store.clone(), "P1");
    (store, project)
}

// ---------------------------------------------------------------------------
// Read
// ---------------------------------------------------------------------------

#[tokio::test]
async fn missing_object_stages_as_empty_scratch() {
    let (_store, project) = fixture();
    let item = project.acquire("absent.json");

    let len = item
        .read(|path| Ok(std::fs::read(path)?.len()))
        .await
        .unwrap();
    assert_eq!(len, 0);
}

#[tokio::test]
async fn read_returns_transform_result() {
    let (_store, project) = fixture();
    let item = project.acquire("notes.json");

    item.update(|path| Ok(std::fs::write(path, b"content")?))
        .await
        .unwrap();

    let text = item
        .read(|path| Ok(std::fs::read_to_string(path)?))
        .await
        .unwrap();
    assert_eq!(text, "content");
}

#[tokio::test]
async fn transform_failure_surfaces() {
    let (_store, project) = fixture();
    let item = project.acquire("notes.json");

    let result: Result<()> = item.read(|_| Err(Error::Other("boom".to_string()))).await;
    assert!(result.is_err());

    // The item stays usable afterwards.
    let len = item
        .read(|path| Ok(std::fs::read(path)?.len()))
        .await
        .unwrap();
    assert_eq!(len, 0);
}

// ---------------------------------------------------------------------------
// Update
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unchanged_content_is_never_pushed() {
    let (store, project) = fixture();
    let item = project.acquire("notes.json");

    item.update(|path| Ok(std::fs::write(path, b"hello")?))
        .await
        .unwrap();
    let v1 = store.head("P1/notes.json").await.unwrap().unwrap().version;

    // Byte-identical rewrite: zero pushes, version unchanged.
    item.update(|path| Ok(std::fs::write(path, b"hello")?))
        .await
        .unwrap();
    let v2 = store.head("P1/notes.json").await.unwrap().unwrap().version;
    assert_eq!(v1, v2);

    item.update(|path| Ok(std::fs::write(path, b"world")?))
        .await
        .unwrap();
    let v3 = store.head("P1/notes.json").await.unwrap().unwrap().version;
    assert_ne!(v1, v3);
}

#[tokio::test]
async fn mutator_failure_means_no_push() {
    let (store, project) = fixture();
    let item = project.acquire("doc.json");

    let result = item
        .update(|path| {
            std::fs::write(path, b"partial")?;
            Err(Error::Other("boom".to_string()))
        })
        .await;
    assert!(result.is_err());
    assert!(!store.exists("P1/doc.json").await.unwrap());
}

#[tokio::test]
async fn push_attaches_length_and_checksum() {
    let (store, project) = fixture();
    let item = project.acquire("doc.json");

    item.update(|path| Ok(std::fs::write(path, b"payload")?))
        .await
        .unwrap();

    let meta = store.head("P1/doc.json").await.unwrap().unwrap();
    assert_eq!(meta.length, 7);
    assert_eq!(meta.checksum, sha256_hex(b"payload"));
}

#[tokio::test]
async fn cancelled_project_skips_the_push() {
    let (store, project) = fixture();
    let item = project.acquire("doc.json");

    project.cancel_writes();
    item.update(|path| Ok(std::fs::write(path, b"too late")?))
        .await
        .unwrap();
    assert!(!store.exists("P1/doc.json").await.unwrap());
}
