//! Integration tests for SqliteStore
//!
//! These tests verify the store ports using an in-memory SQLite database.
//! Each test function creates a fresh database to ensure test isolation.

use chrono::Utc;

use deckhand_core::domain::{
    Account, AccountId, AccountState, Board, Card, CredentialRef, EntityKind, Etag, IdentityEntry,
    Label, LocalId, RemoteId, ServerUrl, Stack, SyncStatus, Syncable,
};
use deckhand_core::ports::{AccountStore, CardLinks, EntityStore, IdentityMap, StoreError};
use deckhand_store::{Change, ChangeEvent, ChangeScope, ChangeSignal, DatabasePool, SqliteStore};

// ============================================================================
// Test helpers
// ============================================================================

/// Create a fresh in-memory store for each test
async fn setup() -> SqliteStore {
    let pool = DatabasePool::in_memory()
        .await
        .expect("Failed to create in-memory database");
    SqliteStore::new(pool.pool().clone())
}

/// Create a test account and save it to the store
async fn create_test_account(store: &SqliteStore) -> Account {
    let account = Account::new(
        ServerUrl::new("https://cloud.example.com").unwrap(),
        "alice",
        CredentialRef::new("keyring:deckhand/alice").unwrap(),
    );
    store.save_account(&account).await.unwrap();
    account
}

fn test_board(account: AccountId) -> Board {
    Board::new(account, "Roadmap", "0082c9")
}

// ============================================================================
// Entity round trips
// ============================================================================

#[tokio::test]
async fn test_save_and_get_board() {
    let store = setup().await;
    let account = create_test_account(&store).await;
    let board = test_board(account.id());

    store.save(&board).await.unwrap();
    let loaded: Option<Board> = store.get(account.id(), board.local_id()).await.unwrap();

    assert_eq!(loaded, Some(board));
}

#[tokio::test]
async fn test_get_missing_returns_none() {
    let store = setup().await;
    let account = create_test_account(&store).await;

    let loaded: Option<Board> = store.get(account.id(), LocalId::new()).await.unwrap();
    assert!(loaded.is_none());
}

#[tokio::test]
async fn test_save_is_upsert() {
    let store = setup().await;
    let account = create_test_account(&store).await;
    let mut board = test_board(account.id());

    store.save(&board).await.unwrap();
    board.title = "Roadmap 2027".to_string();
    store.save(&board).await.unwrap();

    let loaded: Board = store
        .get(account.id(), board.local_id())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(loaded.title, "Roadmap 2027");
}

#[tokio::test]
async fn test_list_children_by_parent() {
    let store = setup().await;
    let account = create_test_account(&store).await;
    let board = test_board(account.id());
    store.save(&board).await.unwrap();

    let todo = Stack::new(account.id(), board.local_id(), "To do", 0);
    let done = Stack::new(account.id(), board.local_id(), "Done", 1);
    store.save(&todo).await.unwrap();
    store.save(&done).await.unwrap();

    // Stack under a different board must not appear.
    let other_board = test_board(account.id());
    store.save(&other_board).await.unwrap();
    let foreign = Stack::new(account.id(), other_board.local_id(), "Other", 0);
    store.save(&foreign).await.unwrap();

    let stacks: Vec<Stack> = store
        .list_children(account.id(), Some(board.local_id()))
        .await
        .unwrap();
    assert_eq!(stacks.len(), 2);
    assert!(stacks.iter().all(|s| s.board_local_id == board.local_id()));
}

#[tokio::test]
async fn test_list_boards_ignores_parent() {
    let store = setup().await;
    let account = create_test_account(&store).await;
    store.save(&test_board(account.id())).await.unwrap();
    store.save(&test_board(account.id())).await.unwrap();

    let boards: Vec<Board> = store.list_children(account.id(), None).await.unwrap();
    assert_eq!(boards.len(), 2);
}

#[tokio::test]
async fn test_remove_is_idempotent() {
    let store = setup().await;
    let account = create_test_account(&store).await;
    let board = test_board(account.id());
    store.save(&board).await.unwrap();

    <SqliteStore as EntityStore<Board>>::remove(&store, account.id(), board.local_id())
        .await
        .unwrap();
    // Second removal of a gone row must not fail.
    <SqliteStore as EntityStore<Board>>::remove(&store, account.id(), board.local_id())
        .await
        .unwrap();

    let loaded: Option<Board> = store.get(account.id(), board.local_id()).await.unwrap();
    assert!(loaded.is_none());
}

#[tokio::test]
async fn test_accounts_are_isolated() {
    let store = setup().await;
    let first = create_test_account(&store).await;
    let second = create_test_account(&store).await;

    store.save(&test_board(first.id())).await.unwrap();

    let boards: Vec<Board> = store.list_children(second.id(), None).await.unwrap();
    assert!(boards.is_empty());
}

// ============================================================================
// Entity + identity in one transaction
// ============================================================================

#[tokio::test]
async fn test_save_with_entry_persists_both() {
    let store = setup().await;
    let account = create_test_account(&store).await;
    let board = test_board(account.id());
    let entry = IdentityEntry::new_local(account.id(), EntityKind::Board, board.local_id());

    store.save_with_entry(&board, &entry).await.unwrap();

    let loaded: Option<Board> = store.get(account.id(), board.local_id()).await.unwrap();
    assert!(loaded.is_some());

    let stored = store
        .entry(account.id(), EntityKind::Board, board.local_id())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, SyncStatus::Dirty);
    assert!(stored.remote_id.is_none());
}

// ============================================================================
// Identity map
// ============================================================================

#[tokio::test]
async fn test_identity_lifecycle_to_clean() {
    let store = setup().await;
    let account = create_test_account(&store).await;
    let local = LocalId::new();
    let entry = IdentityEntry::new_local(account.id(), EntityKind::Card, local);
    store.insert(&entry).await.unwrap();

    store
        .mark_pushing(account.id(), EntityKind::Card, local)
        .await
        .unwrap();
    store
        .mark_synced(
            account.id(),
            EntityKind::Card,
            local,
            RemoteId::new(42).unwrap(),
            Some(Etag::new("v1").unwrap()),
        )
        .await
        .unwrap();

    let stored = store
        .entry(account.id(), EntityKind::Card, local)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, SyncStatus::Clean);
    assert_eq!(stored.remote_id.unwrap().as_i64(), 42);
    assert_eq!(stored.etag.as_ref().unwrap().as_str(), "v1");
}

#[tokio::test]
async fn test_mark_synced_without_pushing_fails() {
    let store = setup().await;
    let account = create_test_account(&store).await;
    let local = LocalId::new();
    let entry = IdentityEntry::new_local(account.id(), EntityKind::Card, local);
    store.insert(&entry).await.unwrap();

    let result = store
        .mark_synced(
            account.id(),
            EntityKind::Card,
            local,
            RemoteId::new(42).unwrap(),
            None,
        )
        .await;
    assert!(matches!(result, Err(StoreError::Domain(_))));

    // The stored entry must be untouched.
    let stored = store
        .entry(account.id(), EntityKind::Card, local)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, SyncStatus::Dirty);
    assert!(stored.remote_id.is_none());
}

#[tokio::test]
async fn test_mark_dirty_is_idempotent() {
    let store = setup().await;
    let account = create_test_account(&store).await;
    let local = LocalId::new();
    store
        .insert(&IdentityEntry::new_local(
            account.id(),
            EntityKind::Card,
            local,
        ))
        .await
        .unwrap();

    // Already dirty; a second edit must not error.
    store
        .mark_dirty(account.id(), EntityKind::Card, local)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_resolve_remote() {
    let store = setup().await;
    let account = create_test_account(&store).await;
    let local = LocalId::new();
    let remote = RemoteId::new(99).unwrap();
    store
        .insert(&IdentityEntry::new_remote(
            account.id(),
            EntityKind::Board,
            local,
            remote,
            None,
        ))
        .await
        .unwrap();

    let found = store
        .resolve_remote(account.id(), EntityKind::Board, remote)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found.local_id, local);

    let missing = store
        .resolve_remote(account.id(), EntityKind::Board, RemoteId::new(100).unwrap())
        .await
        .unwrap();
    assert!(missing.is_none());
}

#[tokio::test]
async fn test_entries_in_status_orders_oldest_first() {
    let store = setup().await;
    let account = create_test_account(&store).await;

    let mut older = IdentityEntry::new_local(account.id(), EntityKind::Card, LocalId::new());
    older.updated_at = Utc::now() - chrono::Duration::minutes(5);
    let newer = IdentityEntry::new_local(account.id(), EntityKind::Card, LocalId::new());

    store.insert(&newer).await.unwrap();
    store.insert(&older).await.unwrap();

    let dirty = store
        .entries_in_status(account.id(), EntityKind::Card, SyncStatus::Dirty)
        .await
        .unwrap();
    assert_eq!(dirty.len(), 2);
    assert_eq!(dirty[0].local_id, older.local_id);
}

#[tokio::test]
async fn test_known_remote_ids_skips_unpushed() {
    let store = setup().await;
    let account = create_test_account(&store).await;

    store
        .insert(&IdentityEntry::new_local(
            account.id(),
            EntityKind::Board,
            LocalId::new(),
        ))
        .await
        .unwrap();
    let synced_local = LocalId::new();
    store
        .insert(&IdentityEntry::new_remote(
            account.id(),
            EntityKind::Board,
            synced_local,
            RemoteId::new(7).unwrap(),
            None,
        ))
        .await
        .unwrap();

    let known = store
        .known_remote_ids(account.id(), EntityKind::Board)
        .await
        .unwrap();
    assert_eq!(known, vec![(synced_local, RemoteId::new(7).unwrap())]);
}

#[tokio::test]
async fn test_identity_remove() {
    let store = setup().await;
    let account = create_test_account(&store).await;
    let local = LocalId::new();
    store
        .insert(&IdentityEntry::new_local(
            account.id(),
            EntityKind::Card,
            local,
        ))
        .await
        .unwrap();

    IdentityMap::remove(&store, account.id(), EntityKind::Card, local)
        .await
        .unwrap();
    let stored = store.entry(account.id(), EntityKind::Card, local).await.unwrap();
    assert!(stored.is_none());
}

// ============================================================================
// Accounts
// ============================================================================

#[tokio::test]
async fn test_account_round_trip_with_etag() {
    let store = setup().await;
    let mut account = create_test_account(&store).await;

    account.update_etag(Etag::new("acct-v3").unwrap());
    account.record_sync(Utc::now());
    store.save_account(&account).await.unwrap();

    let loaded = store.get_account(account.id()).await.unwrap().unwrap();
    assert_eq!(loaded.etag().unwrap().as_str(), "acct-v3");
    assert!(loaded.last_sync().is_some());
    assert_eq!(loaded.state(), &AccountState::Active);
}

#[tokio::test]
async fn test_account_error_state_round_trip() {
    let store = setup().await;
    let mut account = create_test_account(&store).await;
    account.mark_error("server exploded");
    store.save_account(&account).await.unwrap();

    let loaded = store.get_account(account.id()).await.unwrap().unwrap();
    assert_eq!(
        loaded.state(),
        &AccountState::Error("server exploded".to_string())
    );
}

#[tokio::test]
async fn test_remove_account_cascades() {
    let store = setup().await;
    let account = create_test_account(&store).await;
    let board = test_board(account.id());
    store.save(&board).await.unwrap();
    store
        .insert(&IdentityEntry::new_local(
            account.id(),
            EntityKind::Board,
            board.local_id(),
        ))
        .await
        .unwrap();

    store.remove_account(account.id()).await.unwrap();

    assert!(store.get_account(account.id()).await.unwrap().is_none());
    let boards: Vec<Board> = store.list_children(account.id(), None).await.unwrap();
    assert!(boards.is_empty());
    let entry = store
        .entry(account.id(), EntityKind::Board, board.local_id())
        .await
        .unwrap();
    assert!(entry.is_none());
}

// ============================================================================
// Card links
// ============================================================================

#[tokio::test]
async fn test_label_links() {
    let store = setup().await;
    let account = create_test_account(&store).await;
    let board = test_board(account.id());
    let stack = Stack::new(account.id(), board.local_id(), "To do", 0);
    let card = Card::new(account.id(), stack.local_id(), "Fix login", 0);
    let label = Label::new(account.id(), board.local_id(), "bug", "ff0000");

    store
        .link_label(account.id(), card.local_id(), label.local_id())
        .await
        .unwrap();
    // Linking twice is fine.
    store
        .link_label(account.id(), card.local_id(), label.local_id())
        .await
        .unwrap();

    let labels = store
        .labels_for_card(account.id(), card.local_id())
        .await
        .unwrap();
    assert_eq!(labels, vec![label.local_id()]);

    store
        .unlink_label(account.id(), card.local_id(), label.local_id())
        .await
        .unwrap();
    let labels = store
        .labels_for_card(account.id(), card.local_id())
        .await
        .unwrap();
    assert!(labels.is_empty());
}

#[tokio::test]
async fn test_user_links() {
    let store = setup().await;
    let account = create_test_account(&store).await;
    let card_id = LocalId::new();
    let user_id = LocalId::new();

    store
        .link_user(account.id(), card_id, user_id)
        .await
        .unwrap();
    let users = store.users_for_card(account.id(), card_id).await.unwrap();
    assert_eq!(users, vec![user_id]);

    store
        .unlink_user(account.id(), card_id, user_id)
        .await
        .unwrap();
    let users = store.users_for_card(account.id(), card_id).await.unwrap();
    assert!(users.is_empty());
}

// ============================================================================
// Change events
// ============================================================================

#[tokio::test]
async fn test_mutations_publish_change_events() {
    let store = setup().await;
    let account = create_test_account(&store).await;
    let mut stream = store.subscribe(ChangeScope::account(account.id()));

    let board = test_board(account.id());
    store.save(&board).await.unwrap();

    match stream.next().await {
        Some(ChangeSignal::Event(ChangeEvent::Entity {
            account_id,
            kind,
            local_id,
            change,
        })) => {
            assert_eq!(account_id, account.id());
            assert_eq!(kind, EntityKind::Board);
            assert_eq!(local_id, board.local_id());
            assert_eq!(change, Change::Created);
        }
        other => panic!("Expected a created event, got {other:?}"),
    }

    store.save(&board).await.unwrap();
    match stream.next().await {
        Some(ChangeSignal::Event(ChangeEvent::Entity { change, .. })) => {
            assert_eq!(change, Change::Updated);
        }
        other => panic!("Expected an updated event, got {other:?}"),
    }
}

#[tokio::test]
async fn test_status_changes_publish_events() {
    let store = setup().await;
    let account = create_test_account(&store).await;
    let local = LocalId::new();
    store
        .insert(&IdentityEntry::new_local(
            account.id(),
            EntityKind::Card,
            local,
        ))
        .await
        .unwrap();

    let mut stream = store.subscribe(ChangeScope::entity(account.id(), EntityKind::Card, local));
    store
        .mark_pushing(account.id(), EntityKind::Card, local)
        .await
        .unwrap();

    match stream.next().await {
        Some(ChangeSignal::Event(ChangeEvent::Entity { change, .. })) => {
            assert_eq!(change, Change::StatusChanged(SyncStatus::Pushing));
        }
        other => panic!("Expected a status event, got {other:?}"),
    }
}

#[tokio::test]
async fn test_account_save_publishes_account_event() {
    let store = setup().await;
    let mut account = create_test_account(&store).await;

    let mut stream = store.subscribe(ChangeScope::account(account.id()));
    account.update_etag(Etag::new("acct-v1").unwrap());
    store.save_account(&account).await.unwrap();

    match stream.next().await {
        Some(ChangeSignal::Event(ChangeEvent::Account { account_id })) => {
            assert_eq!(account_id, account.id());
        }
        other => panic!("Expected an account event, got {other:?}"),
    }
}

// ============================================================================
// Migrations
// ============================================================================

#[tokio::test]
async fn test_schema_is_at_current_version() {
    let pool = DatabasePool::in_memory().await.unwrap();
    let version = deckhand_store::migrations::current_version(pool.pool())
        .await
        .unwrap();
    assert_eq!(version, deckhand_store::migrations::SCHEMA_VERSION);
}

#[tokio::test]
async fn test_migrations_are_idempotent_on_rerun() {
    let pool = DatabasePool::in_memory().await.unwrap();
    // Second run sees everything applied and does nothing.
    deckhand_store::migrations::run(pool.pool()).await.unwrap();
    let version = deckhand_store::migrations::current_version(pool.pool())
        .await
        .unwrap();
    assert_eq!(version, deckhand_store::migrations::SCHEMA_VERSION);
}

#[tokio::test]
async fn test_account_etag_column_defaults_to_null() {
    // Accounts created before the etag column existed must read back with
    // no etag and trigger a full pull.
    let store = setup().await;
    let account = create_test_account(&store).await;
    let loaded = store.get_account(account.id()).await.unwrap().unwrap();
    assert!(loaded.etag().is_none());
}
