//! Shared test helpers for gateway integration tests
//!
//! Each test spins up a wiremock server and points a [`RestGateway`] at it.
//! Helpers here mount common endpoint shapes; tests mount their own mocks
//! for the specific behavior under test.

use std::time::Duration;

use wiremock::MockServer;

use deckhand_core::domain::AccountId;
use deckhand_rest::{DeckClient, RestGateway};

/// Starts a mock server and returns it together with a gateway pointed at it
///
/// Uses a dedicated (non-pooled) server so that dropping it actually closes
/// the socket; pooled servers keep listening after drop, which breaks tests
/// that rely on the server becoming unreachable.
pub async fn setup() -> (MockServer, RestGateway, AccountId) {
    let server = MockServer::builder().start().await;
    let client = DeckClient::new(server.uri(), "alice", "app-password", Duration::from_secs(5))
        .expect("Failed to build client");
    let account_id = AccountId::new();
    let gateway = RestGateway::new(client, account_id);
    (server, gateway, account_id)
}

/// A board document as the server would return it
pub fn board_doc(id: i64, etag: &str, title: &str) -> serde_json::Value {
    serde_json::json!({
        "id": id,
        "etag": etag,
        "title": title,
        "color": "0082c9",
        "archived": false
    })
}

/// A stack document as the server would return it
pub fn stack_doc(id: i64, etag: &str, title: &str, order: i32) -> serde_json::Value {
    serde_json::json!({
        "id": id,
        "etag": etag,
        "title": title,
        "order": order
    })
}
