//! Integration tests for the connection record store
//!
//! Exercises the repository against an in-memory database, covering the
//! pending-row lifecycle, single-use state consumption, refresh token
//! retention, and snippet verification bookkeeping.

use dualpilot_connect::crypto;
use dualpilot_connect::models::connection;
use dualpilot_connect::repositories::ConnectionRepository;
use sea_orm::{ActiveModelTrait, Set};
use std::sync::Arc;

#[path = "test_utils/mod.rs"]
mod test_utils;

async fn setup_repo() -> (sea_orm::DatabaseConnection, ConnectionRepository) {
    let db = test_utils::setup_test_db().await.unwrap();
    let repo = ConnectionRepository::new(Arc::new(db.clone()), test_utils::test_crypto_key());
    (db, repo)
}

#[tokio::test]
async fn create_pending_initializes_the_attempt_row() {
    let (_db, repo) = setup_repo().await;

    let row = repo
        .create_pending("user-1", Some("example.com"), "state-1", 15)
        .await
        .expect("pending row created");

    assert_eq!(row.owner_id, "user-1");
    assert_eq!(row.domain.as_deref(), Some("example.com"));
    assert_eq!(row.provider, "google_search_console");
    assert_eq!(row.status, "pending");
    assert_eq!(row.state_token, "state-1");
    assert!(row.state_expires_at > chrono::Utc::now());
    assert!(row.access_token_ciphertext.is_none());
    assert!(row.refresh_token_ciphertext.is_none());
    assert!(row.snippet_verified_at.is_none());
}

#[tokio::test]
async fn duplicate_state_tokens_are_rejected_by_the_store() {
    let (_db, repo) = setup_repo().await;

    repo.create_pending("user-1", None, "state-1", 15)
        .await
        .expect("first row created");

    let result = repo.create_pending("user-2", None, "state-1", 15).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn find_by_state_token_skips_expired_rows() {
    let (_db, repo) = setup_repo().await;

    repo.create_pending("user-1", None, "live-state", 15)
        .await
        .unwrap();
    repo.create_pending("user-1", None, "dead-state", -1)
        .await
        .unwrap();

    assert!(
        repo.find_by_state_token("live-state")
            .await
            .unwrap()
            .is_some()
    );
    assert!(
        repo.find_by_state_token("dead-state")
            .await
            .unwrap()
            .is_none()
    );
    assert!(
        repo.find_by_state_token("never-issued")
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn complete_exchange_consumes_the_state_exactly_once() {
    let (_db, repo) = setup_repo().await;

    let row = repo
        .create_pending("user-1", None, "state-1", 15)
        .await
        .unwrap();

    let first = repo
        .complete_exchange(&row, "at-123", Some("rt-456"), Some(3600))
        .await
        .expect("update runs");
    assert!(first);

    // The row is no longer pending; a second completion affects zero rows.
    let second = repo
        .complete_exchange(&row, "at-other", None, Some(3600))
        .await
        .expect("update runs");
    assert!(!second);

    let stored = repo.find_by_id(row.id).await.unwrap().unwrap();
    assert_eq!(stored.status, "connected");
    assert!(stored.token_expires_at.is_some());

    let (access, refresh) = repo.open_tokens(&stored).await.expect("tokens open");
    assert_eq!(access.as_deref(), Some("at-123"));
    assert_eq!(refresh.as_deref(), Some("rt-456"));
}

#[tokio::test]
async fn exchange_without_refresh_token_retains_the_stored_one() {
    let (db, repo) = setup_repo().await;

    let row = repo
        .create_pending("user-1", None, "state-1", 15)
        .await
        .unwrap();

    // Simulate a row that already carries a refresh token from an earlier
    // consent, as happens when Google omits refresh_token on re-auth.
    let aad = crypto::connection_aad(row.id, &row.owner_id, &row.provider);
    let sealed_refresh =
        crypto::seal_token(&test_utils::test_crypto_key(), &aad, "rt-original").unwrap();
    let mut active: connection::ActiveModel = row.clone().into();
    active.refresh_token_ciphertext = Set(Some(sealed_refresh));
    active.update(&db).await.expect("seed refresh token");

    let completed = repo
        .complete_exchange(&row, "at-fresh", None, Some(3600))
        .await
        .expect("update runs");
    assert!(completed);

    let stored = repo.find_by_id(row.id).await.unwrap().unwrap();
    let (access, refresh) = repo.open_tokens(&stored).await.expect("tokens open");
    assert_eq!(access.as_deref(), Some("at-fresh"));
    assert_eq!(refresh.as_deref(), Some("rt-original"));
}

#[tokio::test]
async fn mark_error_only_transitions_pending_rows() {
    let (_db, repo) = setup_repo().await;

    let row = repo
        .create_pending("user-1", None, "state-1", 15)
        .await
        .unwrap();

    assert!(repo.mark_error(row.id).await.unwrap());
    let stored = repo.find_by_id(row.id).await.unwrap().unwrap();
    assert_eq!(stored.status, "error");

    // Already consumed; a second transition is a no-op.
    assert!(!repo.mark_error(row.id).await.unwrap());

    let connected = repo
        .create_pending("user-1", None, "state-2", 15)
        .await
        .unwrap();
    repo.complete_exchange(&connected, "at-123", None, None)
        .await
        .unwrap();
    assert!(!repo.mark_error(connected.id).await.unwrap());
}

#[tokio::test]
async fn tokens_expiry_is_null_when_provider_omits_lifetime() {
    let (_db, repo) = setup_repo().await;

    let row = repo
        .create_pending("user-1", None, "state-1", 15)
        .await
        .unwrap();
    repo.complete_exchange(&row, "at-123", None, None)
        .await
        .unwrap();

    let stored = repo.find_by_id(row.id).await.unwrap().unwrap();
    assert_eq!(stored.status, "connected");
    assert!(stored.token_expires_at.is_none());
}

#[tokio::test]
async fn snippet_verification_touches_each_domain_once() {
    let (_db, repo) = setup_repo().await;

    repo.create_pending("user-1", Some("example.com"), "state-1", 15)
        .await
        .unwrap();
    repo.create_pending("user-2", Some("other.com"), "state-2", 15)
        .await
        .unwrap();

    let verified = repo.mark_snippet_verified("example.com").await.unwrap();
    assert_eq!(verified, 1);

    // Repeated beacons are no-ops once the domain is verified.
    let repeated = repo.mark_snippet_verified("example.com").await.unwrap();
    assert_eq!(repeated, 0);

    // Unknown domains are silently ignored.
    let unknown = repo.mark_snippet_verified("nowhere.test").await.unwrap();
    assert_eq!(unknown, 0);
}
