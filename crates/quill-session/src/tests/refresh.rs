//! Refresh coordinator scenarios.

use super::harness::{
    client_with, client_with_policy, logged_in_server, memory_store, test_policy, FakeServer,
    RefreshMode, TEST_USER_ID,
};
use crate::{CredentialState, Endpoint, SessionPhase};
use futures_util::future::join_all;
use std::time::Duration;

#[tokio::test]
async fn concurrent_refreshes_share_one_request() {
    let server = logged_in_server();
    server.set_refresh_delay(Duration::from_millis(50));
    let client = client_with(&server, memory_store());

    let outcomes = join_all((0..8).map(|_| client.refresh())).await;

    assert!(outcomes.iter().all(|ok| *ok));
    assert_eq!(server.count(Endpoint::Refresh), 1);
    assert!(!client.snapshot().refresh_in_flight);
}

#[tokio::test]
async fn concurrent_refreshes_share_failure() {
    let server = logged_in_server();
    server.set_refresh_delay(Duration::from_millis(50));
    server.set_refresh_mode(RefreshMode::Reject);
    let client = client_with(&server, memory_store());

    let outcomes = join_all((0..5).map(|_| client.refresh())).await;

    assert!(outcomes.iter().all(|ok| !*ok));
    assert_eq!(server.count(Endpoint::Refresh), 1);
}

#[tokio::test]
async fn sequential_refreshes_each_hit_the_server() {
    let server = logged_in_server();
    let client = client_with(&server, memory_store());

    assert!(client.refresh().await);
    assert!(client.refresh().await);
    assert_eq!(server.count(Endpoint::Refresh), 2);
}

#[tokio::test]
async fn missing_refresh_token_fails_without_network() {
    let server = FakeServer::new();
    let client = client_with(&server, memory_store());

    assert!(!client.refresh().await);
    assert_eq!(server.request_count(), 0);
    assert!(client.snapshot().last_refresh_at.is_some());
}

#[tokio::test]
async fn refresh_sends_refresh_scoped_headers() {
    let server = logged_in_server();
    let client = client_with(&server, memory_store());

    assert!(client.refresh().await);

    let sent = &server.requests_to("/refresh")[0];
    assert_eq!(sent.csrf_token.as_deref(), Some("refresh-1"));
    assert_eq!(sent.nonce.as_deref(), Some("00000001:1700000001"));
    assert_eq!(sent.fingerprint, Some(client.device_fingerprint()));
}

#[tokio::test]
async fn success_rotates_tokens_and_records_identity() {
    let server = logged_in_server();
    let store = memory_store();
    let client = client_with(&server, store.clone());
    let before = client.anti_forgery_pair();

    assert!(client.refresh().await);

    let after = client.anti_forgery_pair();
    assert_ne!(before, after);
    assert_eq!(after.access_token.as_deref(), Some("access-2"));
    assert_eq!(
        client.credential_state().user_id().map(|id| id.to_string()),
        Some(TEST_USER_ID.to_string())
    );

    let record = store.load_auth_record().unwrap().unwrap();
    assert_eq!(record.user_id, TEST_USER_ID.to_string());
    let lifetimes = store.lifetimes().unwrap();
    assert_eq!(lifetimes.token_lifetime, Some(1800));
    assert_eq!(lifetimes.refresh_token_lifetime, Some(1_296_000));
}

#[tokio::test]
async fn rejected_refresh_leaves_credentials_alone() {
    let server = logged_in_server();
    server.set_refresh_mode(RefreshMode::Reject);
    let client = client_with(&server, memory_store());
    client
        .credentials()
        .set(CredentialState::authenticated("42".into()));

    assert!(!client.refresh().await);
    assert!(client.credential_state().is_authenticated());
    assert_eq!(client.phase(), SessionPhase::Expired);
}

#[tokio::test]
async fn network_error_is_a_failed_refresh() {
    let server = logged_in_server();
    server.set_refresh_mode(RefreshMode::NetworkError);
    let client = client_with(&server, memory_store());

    assert!(!client.refresh().await);
    assert!(!client.snapshot().refresh_in_flight);
}

#[tokio::test]
async fn malformed_success_body_still_counts() {
    let server = logged_in_server();
    server.set_refresh_mode(RefreshMode::Malformed);
    let store = memory_store();
    let client = client_with(&server, store.clone());

    assert!(client.refresh().await);
    assert_eq!(client.anti_forgery_pair().refresh_token.as_deref(), Some("refresh-2"));
    // No identity in the body: the store is left as it was.
    assert_eq!(client.credential_state(), CredentialState::Unknown);
    assert!(store.load_auth_record().unwrap().is_none());
}

#[tokio::test]
async fn waiter_gives_up_after_throttle_window() {
    let server = logged_in_server();
    server.set_refresh_delay(Duration::from_millis(300));
    let mut policy = test_policy();
    policy.refresh_throttle = Duration::from_millis(30);
    let client = client_with_policy(&server, memory_store(), policy);

    let (leader, waiter) = tokio::join!(client.refresh(), async {
        tokio::time::sleep(Duration::from_millis(5)).await;
        client.refresh().await
    });

    assert!(leader);
    assert!(!waiter);
    assert_eq!(server.count(Endpoint::Refresh), 1);
}
