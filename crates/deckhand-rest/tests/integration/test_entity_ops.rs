//! Integration tests for entity CRUD through the gateway
//!
//! Covers path construction, conditional update headers, etag handling,
//! and the HTTP-status → [`GatewayError`] classification.

use wiremock::matchers::{header, method, path};
use wiremock::{Mock, ResponseTemplate};

use deckhand_core::domain::{Board, Etag, RemoteId, Stack};
use deckhand_core::ports::{EntityGateway, GatewayError, RemoteEntity};

use crate::common;

// ============================================================================
// Create
// ============================================================================

#[tokio::test]
async fn test_create_board_returns_server_head() {
    let (server, gateway, account_id) = common::setup().await;

    Mock::given(method("POST"))
        .and(path("/api/v1/boards"))
        .respond_with(ResponseTemplate::new(201).set_body_json(common::board_doc(42, "v1", "Roadmap")))
        .mount(&server)
        .await;

    let board = Board::new(account_id, "Roadmap", "0082c9");
    let head = gateway.create(None, &board).await.expect("Create failed");

    assert_eq!(head.remote_id.as_i64(), 42);
    assert_eq!(head.etag.unwrap().as_str(), "v1");
}

#[tokio::test]
async fn test_create_prefers_header_etag_over_body() {
    let (server, gateway, account_id) = common::setup().await;

    Mock::given(method("POST"))
        .and(path("/api/v1/boards"))
        .respond_with(
            ResponseTemplate::new(201)
                .set_body_json(common::board_doc(42, "body-etag", "Roadmap"))
                .append_header("ETag", "\"header-etag\""),
        )
        .mount(&server)
        .await;

    let board = Board::new(account_id, "Roadmap", "0082c9");
    let head = gateway.create(None, &board).await.expect("Create failed");

    assert_eq!(head.etag.unwrap().as_str(), "header-etag");
}

#[tokio::test]
async fn test_create_stack_posts_under_board_collection() {
    let (server, gateway, account_id) = common::setup().await;

    Mock::given(method("POST"))
        .and(path("/api/v1/boards/7/stacks"))
        .respond_with(ResponseTemplate::new(201).set_body_json(common::stack_doc(11, "s1", "To do", 0)))
        .mount(&server)
        .await;

    let board_local = deckhand_core::domain::LocalId::new();
    let stack = Stack::new(account_id, board_local, "To do", 0);
    let parent = RemoteId::new(7).unwrap();
    let head = gateway
        .create(Some(parent), &stack)
        .await
        .expect("Create failed");

    assert_eq!(head.remote_id.as_i64(), 11);
}

#[tokio::test]
async fn test_create_without_remote_id_in_response_is_protocol_error() {
    let (server, gateway, account_id) = common::setup().await;

    Mock::given(method("POST"))
        .and(path("/api/v1/boards"))
        .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
            "title": "Roadmap",
            "color": "0082c9"
        })))
        .mount(&server)
        .await;

    let board = Board::new(account_id, "Roadmap", "0082c9");
    let result = gateway.create(None, &board).await;

    assert!(matches!(result, Err(GatewayError::Protocol(_))));
}

// ============================================================================
// Update
// ============================================================================

#[tokio::test]
async fn test_update_sends_if_match_and_returns_fresh_etag() {
    let (server, gateway, account_id) = common::setup().await;

    Mock::given(method("PUT"))
        .and(path("/api/v1/boards/42"))
        .and(header("If-Match", "v1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(common::board_doc(42, "v2", "Roadmap")))
        .mount(&server)
        .await;

    let board = Board::new(account_id, "Roadmap", "0082c9");
    let remote_id = RemoteId::new(42).unwrap();
    let etag = Etag::new("v1").unwrap();
    let head = gateway
        .update(None, remote_id, Some(&etag), &board)
        .await
        .expect("Update failed");

    assert_eq!(head.remote_id, remote_id);
    assert_eq!(head.etag.unwrap().as_str(), "v2");
}

#[tokio::test]
async fn test_update_with_stale_etag_is_a_conflict() {
    let (server, gateway, account_id) = common::setup().await;

    Mock::given(method("PUT"))
        .and(path("/api/v1/boards/42"))
        .respond_with(ResponseTemplate::new(412))
        .mount(&server)
        .await;

    let board = Board::new(account_id, "Roadmap", "0082c9");
    let remote_id = RemoteId::new(42).unwrap();
    let etag = Etag::new("stale").unwrap();
    let result = gateway.update(None, remote_id, Some(&etag), &board).await;

    match result {
        Err(GatewayError::Conflict {
            remote_id: conflicted,
            stale_etag,
        }) => {
            assert_eq!(conflicted, remote_id);
            assert_eq!(stale_etag.unwrap().as_str(), "stale");
        }
        other => panic!("Expected a conflict, got {:?}", other.map(|_| ())),
    }
}

// ============================================================================
// Delete
// ============================================================================

#[tokio::test]
async fn test_delete_succeeds_on_204() {
    let (server, gateway, _) = common::setup().await;

    Mock::given(method("DELETE"))
        .and(path("/api/v1/boards/42"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    let remote_id = RemoteId::new(42).unwrap();
    let result: Result<(), _> =
        EntityGateway::<Board>::delete(&gateway, None, remote_id).await;
    assert!(result.is_ok());
}

#[tokio::test]
async fn test_delete_of_missing_object_is_not_found() {
    let (server, gateway, _) = common::setup().await;

    Mock::given(method("DELETE"))
        .and(path("/api/v1/boards/42"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let remote_id = RemoteId::new(42).unwrap();
    let result: Result<(), _> =
        EntityGateway::<Board>::delete(&gateway, None, remote_id).await;
    assert!(matches!(result, Err(GatewayError::NotFound(id)) if id == remote_id));
}

// ============================================================================
// List and fetch
// ============================================================================

#[tokio::test]
async fn test_list_stacks_under_board() {
    let (server, gateway, account_id) = common::setup().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/boards/7/stacks"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
            common::stack_doc(11, "s1", "To do", 0),
            common::stack_doc(12, "s2", "Doing", 1),
        ])))
        .mount(&server)
        .await;

    let parent = RemoteId::new(7).unwrap();
    let stacks: Vec<RemoteEntity<Stack>> =
        gateway.list(Some(parent)).await.expect("List failed");

    assert_eq!(stacks.len(), 2);
    assert_eq!(stacks[0].head.remote_id.as_i64(), 11);
    assert_eq!(stacks[0].parent_remote_id, Some(parent));
    assert_eq!(stacks[0].entity.account_id, account_id);
    assert_eq!(stacks[1].entity.title, "Doing");
}

#[tokio::test]
async fn test_fetch_board_by_remote_id() {
    let (server, gateway, _) = common::setup().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/boards/42"))
        .respond_with(ResponseTemplate::new(200).set_body_json(common::board_doc(42, "v3", "Roadmap")))
        .mount(&server)
        .await;

    let remote_id = RemoteId::new(42).unwrap();
    let board: RemoteEntity<Board> = gateway
        .fetch(None, remote_id)
        .await
        .expect("Fetch failed");

    assert_eq!(board.head.remote_id, remote_id);
    assert_eq!(board.head.etag.as_ref().unwrap().as_str(), "v3");
    assert_eq!(board.entity.title, "Roadmap");
}

// ============================================================================
// Error classification
// ============================================================================

#[tokio::test]
async fn test_rejected_credentials_classify_as_unauthorized() {
    let (server, gateway, _) = common::setup().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/boards"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let result: Result<Vec<RemoteEntity<Board>>, _> = gateway.list(None).await;
    assert!(matches!(result, Err(GatewayError::Unauthorized)));
}

#[tokio::test]
async fn test_server_error_classifies_as_retryable() {
    let (server, gateway, _) = common::setup().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/boards"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let result: Result<Vec<RemoteEntity<Board>>, _> = gateway.list(None).await;
    match result {
        Err(err) => {
            assert!(matches!(err, GatewayError::Server { status: 503 }));
            assert!(err.is_retryable());
        }
        Ok(_) => panic!("Expected a server error"),
    }
}

#[tokio::test]
async fn test_malformed_body_is_a_protocol_error() {
    let (server, gateway, _) = common::setup().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/boards"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;

    let result: Result<Vec<RemoteEntity<Board>>, _> = gateway.list(None).await;
    assert!(matches!(result, Err(GatewayError::Protocol(_))));
}

#[tokio::test]
async fn test_unreachable_server_classifies_as_unreachable() {
    let (_, gateway, _) = {
        let (server, gateway, account_id) = common::setup().await;
        drop(server);
        ((), gateway, account_id)
    };

    let result: Result<Vec<RemoteEntity<Board>>, _> = gateway.list(None).await;
    assert!(matches!(result, Err(GatewayError::Unreachable(_))));
}
