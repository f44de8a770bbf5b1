//! Wire DTOs and path construction for the server API
//!
//! These types mirror the server's JSON payloads and never leave this
//! crate; the gateway maps them to domain entities at the boundary. The
//! [`WirePayload`] trait ties each entity kind to its DTO and endpoint
//! layout, which is what lets a single generic gateway implementation
//! serve every kind.
//!
//! Endpoint layout (under the API root):
//!
//! | Kind       | Collection                      |
//! |------------|---------------------------------|
//! | Board      | `boards`                        |
//! | Label      | `boards/{board}/labels`         |
//! | Stack      | `boards/{board}/stacks`         |
//! | Card       | `stacks/{stack}/cards`          |
//! | Comment    | `cards/{card}/comments`         |
//! | Attachment | `cards/{card}/attachments`      |
//! | User       | `users` (read-only)             |
//!
//! Item paths are `{collection}/{remote_id}`. Each item document carries
//! `id` and, when the server versions the kind, `etag`.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use deckhand_core::domain::{
    AccountId, Attachment, Board, Card, Comment, Label, LocalId, RemoteId, Stack, Syncable, User,
};
use deckhand_core::ports::{GatewayError, RemoteEntity, RemoteHead};

/// Ties an entity kind to its wire representation and endpoint layout
pub trait WirePayload: Syncable {
    /// The JSON document for this kind
    type Dto: Serialize + DeserializeOwned + Send + Sync + 'static;

    /// Collection path under the API root
    ///
    /// # Errors
    /// Returns `GatewayError::Protocol` when the kind requires a parent and
    /// none was supplied, or the other way around.
    fn collection_path(parent: Option<RemoteId>) -> Result<String, GatewayError>;

    /// Builds the request document from a local entity (no id, no etag)
    fn to_dto(&self) -> Self::Dto;

    /// Maps a response document into a remote entity
    ///
    /// Local-only fields (local id, parent local id) are placeholders the
    /// sync engine resolves through the identity map.
    fn from_dto(
        dto: Self::Dto,
        account_id: AccountId,
        parent: Option<RemoteId>,
    ) -> Result<RemoteEntity<Self>, GatewayError>;
}

// ============================================================================
// Shared helpers
// ============================================================================

fn require_parent(kind: &str, parent: Option<RemoteId>) -> Result<RemoteId, GatewayError> {
    parent.ok_or_else(|| {
        GatewayError::Protocol(format!("{} requests require a parent remote id", kind))
    })
}

fn no_parent(kind: &str, parent: Option<RemoteId>) -> Result<(), GatewayError> {
    if parent.is_some() {
        return Err(GatewayError::Protocol(format!(
            "{} requests take no parent remote id",
            kind
        )));
    }
    Ok(())
}

/// Builds the head from a response document's id/etag fields
pub(crate) fn head_from(
    kind: &str,
    id: Option<i64>,
    etag: Option<String>,
) -> Result<RemoteHead, GatewayError> {
    let raw = id.ok_or_else(|| {
        GatewayError::Protocol(format!("{} document is missing its id", kind))
    })?;
    let remote_id = RemoteId::new(raw)
        .map_err(|e| GatewayError::Protocol(format!("{} document has a bad id: {}", kind, e)))?;
    let etag = etag
        .map(deckhand_core::domain::Etag::new)
        .transpose()
        .map_err(|e| GatewayError::Protocol(format!("{} document has a bad etag: {}", kind, e)))?;
    Ok(RemoteHead { remote_id, etag })
}

// ============================================================================
// Board
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardDto {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
    pub title: String,
    pub color: String,
    #[serde(default)]
    pub archived: bool,
}

impl WirePayload for Board {
    type Dto = BoardDto;

    fn collection_path(parent: Option<RemoteId>) -> Result<String, GatewayError> {
        no_parent("board", parent)?;
        Ok("boards".to_string())
    }

    fn to_dto(&self) -> BoardDto {
        BoardDto {
            id: None,
            etag: None,
            title: self.title.clone(),
            color: self.color.clone(),
            archived: self.archived,
        }
    }

    fn from_dto(
        dto: BoardDto,
        account_id: AccountId,
        _parent: Option<RemoteId>,
    ) -> Result<RemoteEntity<Board>, GatewayError> {
        let head = head_from("board", dto.id, dto.etag)?;
        Ok(RemoteEntity {
            head,
            parent_remote_id: None,
            entity: Board {
                local_id: LocalId::new(),
                account_id,
                title: dto.title,
                color: dto.color,
                archived: dto.archived,
            },
        })
    }
}

// ============================================================================
// Label
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabelDto {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
    pub title: String,
    pub color: String,
}

impl WirePayload for Label {
    type Dto = LabelDto;

    fn collection_path(parent: Option<RemoteId>) -> Result<String, GatewayError> {
        let board = require_parent("label", parent)?;
        Ok(format!("boards/{}/labels", board))
    }

    fn to_dto(&self) -> LabelDto {
        LabelDto {
            id: None,
            etag: None,
            title: self.title.clone(),
            color: self.color.clone(),
        }
    }

    fn from_dto(
        dto: LabelDto,
        account_id: AccountId,
        parent: Option<RemoteId>,
    ) -> Result<RemoteEntity<Label>, GatewayError> {
        let head = head_from("label", dto.id, dto.etag)?;
        Ok(RemoteEntity {
            head,
            parent_remote_id: parent,
            entity: Label {
                local_id: LocalId::new(),
                account_id,
                board_local_id: LocalId::nil(),
                title: dto.title,
                color: dto.color,
            },
        })
    }
}

// ============================================================================
// Stack
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackDto {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
    pub title: String,
    pub order: i32,
}

impl WirePayload for Stack {
    type Dto = StackDto;

    fn collection_path(parent: Option<RemoteId>) -> Result<String, GatewayError> {
        let board = require_parent("stack", parent)?;
        Ok(format!("boards/{}/stacks", board))
    }

    fn to_dto(&self) -> StackDto {
        StackDto {
            id: None,
            etag: None,
            title: self.title.clone(),
            order: self.order,
        }
    }

    fn from_dto(
        dto: StackDto,
        account_id: AccountId,
        parent: Option<RemoteId>,
    ) -> Result<RemoteEntity<Stack>, GatewayError> {
        let head = head_from("stack", dto.id, dto.etag)?;
        Ok(RemoteEntity {
            head,
            parent_remote_id: parent,
            entity: Stack {
                local_id: LocalId::new(),
                account_id,
                board_local_id: LocalId::nil(),
                title: dto.title,
                order: dto.order,
            },
        })
    }
}

// ============================================================================
// Card
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardDto {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub order: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<DateTime<Utc>>,
}

impl WirePayload for Card {
    type Dto = CardDto;

    fn collection_path(parent: Option<RemoteId>) -> Result<String, GatewayError> {
        let stack = require_parent("card", parent)?;
        Ok(format!("stacks/{}/cards", stack))
    }

    fn to_dto(&self) -> CardDto {
        CardDto {
            id: None,
            etag: None,
            title: self.title.clone(),
            description: self.description.clone(),
            order: self.order,
            due_date: self.due_date,
        }
    }

    fn from_dto(
        dto: CardDto,
        account_id: AccountId,
        parent: Option<RemoteId>,
    ) -> Result<RemoteEntity<Card>, GatewayError> {
        let head = head_from("card", dto.id, dto.etag)?;
        Ok(RemoteEntity {
            head,
            parent_remote_id: parent,
            entity: Card {
                local_id: LocalId::new(),
                account_id,
                stack_local_id: LocalId::nil(),
                title: dto.title,
                description: dto.description,
                order: dto.order,
                due_date: dto.due_date,
            },
        })
    }
}

// ============================================================================
// Comment
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentDto {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
    pub message: String,
    #[serde(default)]
    pub author_uid: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl WirePayload for Comment {
    type Dto = CommentDto;

    fn collection_path(parent: Option<RemoteId>) -> Result<String, GatewayError> {
        let card = require_parent("comment", parent)?;
        Ok(format!("cards/{}/comments", card))
    }

    fn to_dto(&self) -> CommentDto {
        CommentDto {
            id: None,
            etag: None,
            message: self.message.clone(),
            author_uid: self.author_uid.clone(),
            created_at: Some(self.created_at),
        }
    }

    fn from_dto(
        dto: CommentDto,
        account_id: AccountId,
        parent: Option<RemoteId>,
    ) -> Result<RemoteEntity<Comment>, GatewayError> {
        let head = head_from("comment", dto.id, dto.etag)?;
        Ok(RemoteEntity {
            head,
            parent_remote_id: parent,
            entity: Comment {
                local_id: LocalId::new(),
                account_id,
                card_local_id: LocalId::nil(),
                message: dto.message,
                author_uid: dto.author_uid,
                created_at: dto.created_at.unwrap_or_else(Utc::now),
            },
        })
    }
}

// ============================================================================
// Attachment
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentDto {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
    pub filename: String,
    #[serde(default)]
    pub mime_type: String,
    #[serde(default)]
    pub size_bytes: i64,
}

impl WirePayload for Attachment {
    type Dto = AttachmentDto;

    fn collection_path(parent: Option<RemoteId>) -> Result<String, GatewayError> {
        let card = require_parent("attachment", parent)?;
        Ok(format!("cards/{}/attachments", card))
    }

    fn to_dto(&self) -> AttachmentDto {
        AttachmentDto {
            id: None,
            etag: None,
            filename: self.filename.clone(),
            mime_type: self.mime_type.clone(),
            size_bytes: self.size_bytes,
        }
    }

    fn from_dto(
        dto: AttachmentDto,
        account_id: AccountId,
        parent: Option<RemoteId>,
    ) -> Result<RemoteEntity<Attachment>, GatewayError> {
        let head = head_from("attachment", dto.id, dto.etag)?;
        Ok(RemoteEntity {
            head,
            parent_remote_id: parent,
            entity: Attachment {
                local_id: LocalId::new(),
                account_id,
                card_local_id: LocalId::nil(),
                filename: dto.filename,
                mime_type: dto.mime_type,
                size_bytes: dto.size_bytes,
            },
        })
    }
}

// ============================================================================
// User (pull-only; no WirePayload impl, used by the account gateway)
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserDto {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub uid: String,
    #[serde(default)]
    pub display_name: String,
}

impl UserDto {
    pub(crate) fn into_remote(
        self,
        account_id: AccountId,
    ) -> Result<RemoteEntity<User>, GatewayError> {
        let head = head_from("user", self.id, None)?;
        Ok(RemoteEntity {
            head,
            parent_remote_id: None,
            entity: User {
                local_id: LocalId::new(),
                account_id,
                uid: self.uid,
                display_name: self.display_name,
            },
        })
    }
}
