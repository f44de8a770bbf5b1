//! Syncable domain entities
//!
//! The board / stack / card hierarchy plus its satellite records (labels,
//! users, comments, attachments). Every entity is identified by a
//! [`LocalId`] and owned by one account; the server-side identity (remote
//! id, etag, sync status) lives in the identity map, not on the entity.
//!
//! Instead of one repository interface per entity, a single capability
//! trait ([`Syncable`]) describes what the store and the engine need from
//! any entity kind: its kind tag, its local identity, its account scope,
//! and its optional parent link. Per-kind behavior (push order, whether the
//! kind is ever pushed at all) hangs off [`EntityKind`].

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::fmt;

use super::newtypes::{AccountId, LocalId};

// ============================================================================
// EntityKind
// ============================================================================

/// Tag identifying one syncable entity kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Board,
    Label,
    Stack,
    Card,
    User,
    Comment,
    Attachment,
}

impl EntityKind {
    /// Push order for one account: parents strictly before children.
    ///
    /// A card must not be pushed before its stack exists remotely, a stack
    /// not before its board. Users are absent: they are pull-only.
    pub const PUSH_ORDER: [EntityKind; 6] = [
        EntityKind::Board,
        EntityKind::Label,
        EntityKind::Stack,
        EntityKind::Card,
        EntityKind::Comment,
        EntityKind::Attachment,
    ];

    /// Returns true if local edits of this kind are ever pushed
    ///
    /// User records are owned by the server and only mirrored locally.
    pub fn is_pushable(&self) -> bool {
        !matches!(self, EntityKind::User)
    }

    /// The kind of this kind's parent, if it has one
    pub fn parent_kind(&self) -> Option<EntityKind> {
        match self {
            EntityKind::Board | EntityKind::User => None,
            EntityKind::Label | EntityKind::Stack => Some(EntityKind::Board),
            EntityKind::Card => Some(EntityKind::Stack),
            EntityKind::Comment | EntityKind::Attachment => Some(EntityKind::Card),
        }
    }

    /// Stable storage name for this kind
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Board => "board",
            EntityKind::Label => "label",
            EntityKind::Stack => "stack",
            EntityKind::Card => "card",
            EntityKind::User => "user",
            EntityKind::Comment => "comment",
            EntityKind::Attachment => "attachment",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Syncable capability trait
// ============================================================================

/// Capability trait implemented by every syncable entity kind
///
/// This is the single seam the generic repository, the identity map, and
/// the sync engine are parameterized over. `merge_remote` copies the
/// server-owned payload fields from a pulled record into the local row
/// while leaving identity fields (local id, account, parent link) intact.
pub trait Syncable:
    Clone + fmt::Debug + PartialEq + Send + Sync + Serialize + DeserializeOwned + 'static
{
    /// The kind tag for this entity type
    const KIND: EntityKind;

    /// Process-local identity
    fn local_id(&self) -> LocalId;

    /// Owning account
    fn account_id(&self) -> AccountId;

    /// Local id of the parent entity, if this kind has a parent
    fn parent_local_id(&self) -> Option<LocalId>;

    /// Re-home this entity under a different parent
    ///
    /// Used by the pull pass when a record fetched from the server is
    /// inserted under a locally-resolved parent. Kinds without a parent
    /// (boards, users) ignore the call.
    fn attach_parent(&mut self, _parent: LocalId) {}

    /// Overwrite server-owned payload fields from a pulled record
    fn merge_remote(&mut self, remote: &Self);
}

// ============================================================================
// Board
// ============================================================================

/// A project board, the root of the stack/card hierarchy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Board {
    pub local_id: LocalId,
    pub account_id: AccountId,
    /// Board title as shown to users
    pub title: String,
    /// Hex color without leading '#', e.g. "0082c9"
    pub color: String,
    /// Whether the board is archived (read-only on the server)
    pub archived: bool,
}

impl Board {
    /// Creates a new local board draft
    pub fn new(account_id: AccountId, title: impl Into<String>, color: impl Into<String>) -> Self {
        Self {
            local_id: LocalId::new(),
            account_id,
            title: title.into(),
            color: color.into(),
            archived: false,
        }
    }
}

impl Syncable for Board {
    const KIND: EntityKind = EntityKind::Board;

    fn local_id(&self) -> LocalId {
        self.local_id
    }

    fn account_id(&self) -> AccountId {
        self.account_id
    }

    fn parent_local_id(&self) -> Option<LocalId> {
        None
    }

    fn merge_remote(&mut self, remote: &Self) {
        self.title = remote.title.clone();
        self.color = remote.color.clone();
        self.archived = remote.archived;
    }
}

// ============================================================================
// Label
// ============================================================================

/// A colored label defined on a board and assignable to cards
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Label {
    pub local_id: LocalId,
    pub account_id: AccountId,
    /// The board this label belongs to
    pub board_local_id: LocalId,
    pub title: String,
    /// Hex color without leading '#'
    pub color: String,
}

impl Label {
    /// Creates a new local label draft on the given board
    pub fn new(
        account_id: AccountId,
        board_local_id: LocalId,
        title: impl Into<String>,
        color: impl Into<String>,
    ) -> Self {
        Self {
            local_id: LocalId::new(),
            account_id,
            board_local_id,
            title: title.into(),
            color: color.into(),
        }
    }
}

impl Syncable for Label {
    const KIND: EntityKind = EntityKind::Label;

    fn local_id(&self) -> LocalId {
        self.local_id
    }

    fn account_id(&self) -> AccountId {
        self.account_id
    }

    fn parent_local_id(&self) -> Option<LocalId> {
        Some(self.board_local_id)
    }

    fn attach_parent(&mut self, parent: LocalId) {
        self.board_local_id = parent;
    }

    fn merge_remote(&mut self, remote: &Self) {
        self.title = remote.title.clone();
        self.color = remote.color.clone();
    }
}

// ============================================================================
// Stack
// ============================================================================

/// An ordered column of cards on a board
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stack {
    pub local_id: LocalId,
    pub account_id: AccountId,
    /// The board this stack belongs to
    pub board_local_id: LocalId,
    pub title: String,
    /// Display order within the board, ascending
    pub order: i32,
}

impl Stack {
    /// Creates a new local stack draft on the given board
    pub fn new(
        account_id: AccountId,
        board_local_id: LocalId,
        title: impl Into<String>,
        order: i32,
    ) -> Self {
        Self {
            local_id: LocalId::new(),
            account_id,
            board_local_id,
            title: title.into(),
            order,
        }
    }
}

impl Syncable for Stack {
    const KIND: EntityKind = EntityKind::Stack;

    fn local_id(&self) -> LocalId {
        self.local_id
    }

    fn account_id(&self) -> AccountId {
        self.account_id
    }

    fn parent_local_id(&self) -> Option<LocalId> {
        Some(self.board_local_id)
    }

    fn attach_parent(&mut self, parent: LocalId) {
        self.board_local_id = parent;
    }

    fn merge_remote(&mut self, remote: &Self) {
        self.title = remote.title.clone();
        self.order = remote.order;
    }
}

// ============================================================================
// Card
// ============================================================================

/// A single task card within a stack
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Card {
    pub local_id: LocalId,
    pub account_id: AccountId,
    /// The stack this card belongs to
    pub stack_local_id: LocalId,
    pub title: String,
    /// Markdown description body
    pub description: String,
    /// Display order within the stack, ascending
    pub order: i32,
    /// Optional due date
    pub due_date: Option<DateTime<Utc>>,
}

impl Card {
    /// Creates a new local card draft in the given stack
    pub fn new(
        account_id: AccountId,
        stack_local_id: LocalId,
        title: impl Into<String>,
        order: i32,
    ) -> Self {
        Self {
            local_id: LocalId::new(),
            account_id,
            stack_local_id,
            title: title.into(),
            description: String::new(),
            order,
            due_date: None,
        }
    }
}

impl Syncable for Card {
    const KIND: EntityKind = EntityKind::Card;

    fn local_id(&self) -> LocalId {
        self.local_id
    }

    fn account_id(&self) -> AccountId {
        self.account_id
    }

    fn parent_local_id(&self) -> Option<LocalId> {
        Some(self.stack_local_id)
    }

    fn attach_parent(&mut self, parent: LocalId) {
        self.stack_local_id = parent;
    }

    fn merge_remote(&mut self, remote: &Self) {
        self.title = remote.title.clone();
        self.description = remote.description.clone();
        self.order = remote.order;
        self.due_date = remote.due_date;
    }
}

// ============================================================================
// User
// ============================================================================

/// A server-side user visible to an account, assignable to cards
///
/// Users are pull-only: the server owns them, the engine only mirrors them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub local_id: LocalId,
    pub account_id: AccountId,
    /// Server-side login/uid, unique per account
    pub uid: String,
    pub display_name: String,
}

impl User {
    /// Creates a mirrored user record
    pub fn new(
        account_id: AccountId,
        uid: impl Into<String>,
        display_name: impl Into<String>,
    ) -> Self {
        Self {
            local_id: LocalId::new(),
            account_id,
            uid: uid.into(),
            display_name: display_name.into(),
        }
    }
}

impl Syncable for User {
    const KIND: EntityKind = EntityKind::User;

    fn local_id(&self) -> LocalId {
        self.local_id
    }

    fn account_id(&self) -> AccountId {
        self.account_id
    }

    fn parent_local_id(&self) -> Option<LocalId> {
        None
    }

    fn merge_remote(&mut self, remote: &Self) {
        self.uid = remote.uid.clone();
        self.display_name = remote.display_name.clone();
    }
}

// ============================================================================
// Comment
// ============================================================================

/// A comment on a card
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub local_id: LocalId,
    pub account_id: AccountId,
    /// The card this comment belongs to
    pub card_local_id: LocalId,
    pub message: String,
    /// Server uid of the author
    pub author_uid: String,
    pub created_at: DateTime<Utc>,
}

impl Comment {
    /// Creates a new local comment draft on the given card
    pub fn new(
        account_id: AccountId,
        card_local_id: LocalId,
        message: impl Into<String>,
        author_uid: impl Into<String>,
    ) -> Self {
        Self {
            local_id: LocalId::new(),
            account_id,
            card_local_id,
            message: message.into(),
            author_uid: author_uid.into(),
            created_at: Utc::now(),
        }
    }
}

impl Syncable for Comment {
    const KIND: EntityKind = EntityKind::Comment;

    fn local_id(&self) -> LocalId {
        self.local_id
    }

    fn account_id(&self) -> AccountId {
        self.account_id
    }

    fn parent_local_id(&self) -> Option<LocalId> {
        Some(self.card_local_id)
    }

    fn attach_parent(&mut self, parent: LocalId) {
        self.card_local_id = parent;
    }

    fn merge_remote(&mut self, remote: &Self) {
        self.message = remote.message.clone();
        self.author_uid = remote.author_uid.clone();
        self.created_at = remote.created_at;
    }
}

// ============================================================================
// Attachment
// ============================================================================

/// Metadata for a file attached to a card
///
/// Only the metadata takes part in reconciliation; content transfer is the
/// collaborator's concern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub local_id: LocalId,
    pub account_id: AccountId,
    /// The card this attachment belongs to
    pub card_local_id: LocalId,
    pub filename: String,
    pub mime_type: String,
    pub size_bytes: i64,
}

impl Attachment {
    /// Creates a new local attachment record on the given card
    pub fn new(
        account_id: AccountId,
        card_local_id: LocalId,
        filename: impl Into<String>,
        mime_type: impl Into<String>,
        size_bytes: i64,
    ) -> Self {
        Self {
            local_id: LocalId::new(),
            account_id,
            card_local_id,
            filename: filename.into(),
            mime_type: mime_type.into(),
            size_bytes,
        }
    }
}

impl Syncable for Attachment {
    const KIND: EntityKind = EntityKind::Attachment;

    fn local_id(&self) -> LocalId {
        self.local_id
    }

    fn account_id(&self) -> AccountId {
        self.account_id
    }

    fn parent_local_id(&self) -> Option<LocalId> {
        Some(self.card_local_id)
    }

    fn attach_parent(&mut self, parent: LocalId) {
        self.card_local_id = parent;
    }

    fn merge_remote(&mut self, remote: &Self) {
        self.filename = remote.filename.clone();
        self.mime_type = remote.mime_type.clone();
        self.size_bytes = remote.size_bytes;
    }
}

// ============================================================================
// Tests
// ============================================================================
