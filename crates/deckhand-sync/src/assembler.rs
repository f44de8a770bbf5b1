//! Card aggregate assembly
//!
//! Joins a card row with its labels, assigned users, comments, and
//! attachments into a [`CardAggregate`] read model. Junction rows that point
//! at missing labels or users are skipped rather than treated as fatal; the
//! next sync pass cleans them up.

use deckhand_core::domain::{
    AccountId, Attachment, Card, CardAggregate, Comment, EntityKind, Label, LocalId, User,
};
use deckhand_core::ports::{CardLinks, EntityStore, StoreError};

use crate::SyncError;

/// Loads a card and all of its children into an aggregate
pub async fn assemble<S>(
    store: &S,
    account_id: AccountId,
    card: LocalId,
) -> Result<CardAggregate, SyncError>
where
    S: EntityStore<Card>
        + EntityStore<Label>
        + EntityStore<User>
        + EntityStore<Comment>
        + EntityStore<Attachment>
        + CardLinks,
{
    let root = EntityStore::<Card>::get(store, account_id, card)
        .await?
        .ok_or_else(|| StoreError::not_found(EntityKind::Card, card))?;

    let mut labels = Vec::new();
    for label_id in store.labels_for_card(account_id, card).await? {
        if let Some(label) = EntityStore::<Label>::get(store, account_id, label_id).await? {
            labels.push(label);
        }
    }

    let mut users = Vec::new();
    for user_id in store.users_for_card(account_id, card).await? {
        if let Some(user) = EntityStore::<User>::get(store, account_id, user_id).await? {
            users.push(user);
        }
    }

    let comments = EntityStore::<Comment>::list_children(store, account_id, Some(card)).await?;
    let attachments =
        EntityStore::<Attachment>::list_children(store, account_id, Some(card)).await?;

    Ok(CardAggregate::new(
        root,
        labels,
        users,
        comments,
        attachments,
    )?)
}
