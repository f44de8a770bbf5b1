//! Integration tests for the account-level gateway operations
//!
//! The probe drives the cheap-pull optimization: a 304 answer lets the
//! whole pull pass be skipped.

use wiremock::matchers::{header, method, path};
use wiremock::{Mock, ResponseTemplate};

use deckhand_core::domain::Etag;
use deckhand_core::ports::{AccountGateway, AccountProbe, GatewayError};

use crate::common;

#[tokio::test]
async fn test_probe_with_current_etag_is_not_modified() {
    let (server, gateway, _) = common::setup().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/account"))
        .and(header("If-None-Match", "acct-v1"))
        .respond_with(ResponseTemplate::new(304))
        .mount(&server)
        .await;

    let etag = Etag::new("acct-v1").unwrap();
    let probe = gateway.probe(Some(&etag)).await.expect("Probe failed");

    assert_eq!(probe, AccountProbe::NotModified);
}

#[tokio::test]
async fn test_probe_returns_fresh_account_etag() {
    let (server, gateway, _) = common::setup().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/account"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({"userName": "alice"}))
                .append_header("ETag", "\"acct-v2\""),
        )
        .mount(&server)
        .await;

    let probe = gateway.probe(None).await.expect("Probe failed");

    match probe {
        AccountProbe::Modified(Some(etag)) => assert_eq!(etag.as_str(), "acct-v2"),
        other => panic!("Expected a fresh etag, got {:?}", other),
    }
}

#[tokio::test]
async fn test_probe_with_rejected_credentials_is_unauthorized() {
    let (server, gateway, _) = common::setup().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/account"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let result = gateway.probe(None).await;
    assert!(matches!(result, Err(GatewayError::Unauthorized)));
}

#[tokio::test]
async fn test_fetch_users_maps_documents() {
    let (server, gateway, account_id) = common::setup().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/users"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
            {"id": 1, "uid": "alice", "displayName": "Alice A."},
            {"id": 2, "uid": "bob", "displayName": "Bob B."},
        ])))
        .mount(&server)
        .await;

    let users = gateway.fetch_users().await.expect("Fetch users failed");

    assert_eq!(users.len(), 2);
    assert_eq!(users[0].head.remote_id.as_i64(), 1);
    assert_eq!(users[0].entity.uid, "alice");
    assert_eq!(users[0].entity.display_name, "Alice A.");
    assert_eq!(users[0].entity.account_id, account_id);
    assert!(users[0].head.etag.is_none());
}
