//! Integration tests for deckhand-rest
//!
//! Uses wiremock to simulate the kanban server API and verifies
//! end-to-end behavior of the gateway: CRUD paths, conditional
//! headers, and error classification.

mod common;

mod test_account_ops;
mod test_entity_ops;
