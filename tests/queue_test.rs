//! Integration tests for the claims queue and its exclusive access.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use claimq::error::Error;
use claimq::model::ClaimDraft;
use claimq::project::Project;
use claimq::queue::Claims;
use claimq::storage::MemoryStore;

fn test_project() -> Arc<Project> {
    Project::new(Arc::new(MemoryStore::new()), "TESTPROJ")
}

// ---------------------------------------------------------------------------
// Posting and numbering
// ---------------------------------------------------------------------------

#[tokio::test]
async fn post_assigns_sequential_numbers() {
    let project = test_project();
    let guard = Claims::new(&project).lock().await.unwrap();

    let first = guard.post(ClaimDraft::new("ping")).await.unwrap();
    let second = guard.post(ClaimDraft::new("ping")).await.unwrap();
    let third = guard.post(ClaimDraft::new("pong")).await.unwrap();
    guard.release().await.unwrap();

    assert_eq!(first.number, 1);
    assert_eq!(second.number, 2);
    assert_eq!(third.number, 3);
}

#[tokio::test]
async fn numbers_are_never_reused_after_removal() {
    let project = test_project();
    let guard = Claims::new(&project).lock().await.unwrap();

    guard.post(ClaimDraft::new("a")).await.unwrap();
    let second = guard.post(ClaimDraft::new("b")).await.unwrap();
    guard.remove(second.number).await.unwrap();

    let third = guard.post(ClaimDraft::new("c")).await.unwrap();
    guard.release().await.unwrap();

    assert_eq!(third.number, 3);
}

#[tokio::test]
async fn iterate_preserves_insertion_order() {
    let project = test_project();
    let guard = Claims::new(&project).lock().await.unwrap();

    for kind in ["one", "two", "three"] {
        guard.post(ClaimDraft::new(kind)).await.unwrap();
    }
    let listed = guard.iterate().await.unwrap();
    guard.release().await.unwrap();

    let kinds: Vec<&str> = listed.iter().map(|c| c.kind.as_str()).collect();
    assert_eq!(kinds, vec!["one", "two", "three"]);
}

#[tokio::test]
async fn claim_params_and_token_round_trip() {
    let project = test_project();
    let guard = Claims::new(&project).lock().await.unwrap();

    guard
        .post(
            ClaimDraft::new("order-start")
                .token("t-42")
                .param("job", "gh:test/repo#17"),
        )
        .await
        .unwrap();
    let listed = guard.iterate().await.unwrap();
    guard.release().await.unwrap();

    let claim = &listed[0];
    assert_eq!(claim.token.as_deref(), Some("t-42"));
    assert_eq!(
        claim.param("job").and_then(|v| v.as_str()),
        Some("gh:test/repo#17")
    );
}

// ---------------------------------------------------------------------------
// Duplicates
// ---------------------------------------------------------------------------

#[tokio::test]
async fn post_unique_rejects_pending_duplicate() {
    let project = test_project();
    let guard = Claims::new(&project).lock().await.unwrap();

    guard
        .post_unique(ClaimDraft::new("assign").token("job-1"))
        .await
        .unwrap();
    let duplicate = guard
        .post_unique(ClaimDraft::new("assign").token("job-1"))
        .await;
    assert!(matches!(duplicate, Err(Error::Duplicate(_))));

    // A different token is different work.
    guard
        .post_unique(ClaimDraft::new("assign").token("job-2"))
        .await
        .unwrap();

    assert_eq!(guard.len().await.unwrap(), 2);
    guard.release().await.unwrap();
}

#[tokio::test]
async fn post_unique_allows_repost_after_removal() {
    let project = test_project();
    let guard = Claims::new(&project).lock().await.unwrap();

    let claim = guard
        .post_unique(ClaimDraft::new("assign").token("job-1"))
        .await
        .unwrap();
    guard.remove(claim.number).await.unwrap();

    guard
        .post_unique(ClaimDraft::new("assign").token("job-1"))
        .await
        .unwrap();
    guard.release().await.unwrap();
}

// ---------------------------------------------------------------------------
// Removal
// ---------------------------------------------------------------------------

#[tokio::test]
async fn removed_claims_do_not_resurface() {
    let project = test_project();
    let guard = Claims::new(&project).lock().await.unwrap();

    let first = guard.post(ClaimDraft::new("a")).await.unwrap();
    guard.post(ClaimDraft::new("b")).await.unwrap();
    guard.remove(first.number).await.unwrap();

    let listed = guard.iterate().await.unwrap();
    guard.release().await.unwrap();

    assert_eq!(listed.len(), 1);
    assert!(listed.iter().all(|c| c.number != first.number));
}

// ---------------------------------------------------------------------------
// Locking
// ---------------------------------------------------------------------------

#[tokio::test]
async fn second_lock_holder_blocks_until_release() {
    let project = test_project();
    let guard = Claims::new(&project).lock().await.unwrap();
    guard.post(ClaimDraft::new("held")).await.unwrap();

    let acquired = Arc::new(AtomicBool::new(false));
    let waiter = {
        let project = Arc::clone(&project);
        let acquired = Arc::clone(&acquired);
        tokio::spawn(async move {
            let guard = Claims::new(&project).lock().await.unwrap();
            acquired.store(true, Ordering::SeqCst);
            let listed = guard.iterate().await.unwrap();
            guard.release().await.unwrap();
            listed
        })
    };

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(!acquired.load(Ordering::SeqCst));

    guard.release().await.unwrap();
    let listed = waiter.await.unwrap();
    assert!(acquired.load(Ordering::SeqCst));
    assert_eq!(listed.len(), 1);
}
