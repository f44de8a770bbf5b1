//! Card aggregate
//!
//! A [`CardAggregate`] is an immutable composite of a card plus its related
//! child collections as of assembly time. It is never persisted: it is
//! recomputed on every read from the local store. Presentation collaborators
//! compare two aggregates field-by-field (including all child collections)
//! to detect unsaved edits.

use serde::{Deserialize, Serialize};

use super::entities::{Attachment, Card, Comment, Label, User};
use super::errors::DomainError;

/// A card composed with its labels, assignees, comments, and attachments
///
/// Equality is derived and therefore field-by-field across the root and
/// every child collection, which is exactly the contract the discard-prompt
/// logic at the UI boundary relies on. Child collections with a server-side
/// order (comments by creation time, attachments by filename) are sorted at
/// construction so equality is insensitive to assembly order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CardAggregate {
    /// The root card
    pub card: Card,
    /// Labels assigned to the card, sorted by title
    pub labels: Vec<Label>,
    /// Users assigned to the card, sorted by uid
    pub assigned_users: Vec<User>,
    /// Comments on the card, oldest first
    pub comments: Vec<Comment>,
    /// Attachment metadata, sorted by filename
    pub attachments: Vec<Attachment>,
}

impl CardAggregate {
    /// Builds an aggregate, validating that every child shares the root's
    /// account and normalizing child collection order
    ///
    /// # Errors
    /// Returns `DomainError::ValidationFailed` if any child belongs to a
    /// different account than the root card.
    pub fn new(
        card: Card,
        mut labels: Vec<Label>,
        mut assigned_users: Vec<User>,
        mut comments: Vec<Comment>,
        mut attachments: Vec<Attachment>,
    ) -> Result<Self, DomainError> {
        let account = card.account_id;

        let foreign = labels.iter().any(|l| l.account_id != account)
            || assigned_users.iter().any(|u| u.account_id != account)
            || comments.iter().any(|c| c.account_id != account)
            || attachments.iter().any(|a| a.account_id != account);
        if foreign {
            return Err(DomainError::ValidationFailed(format!(
                "Aggregate for card {} contains children from a foreign account",
                card.local_id
            )));
        }

        labels.sort_by(|a, b| a.title.cmp(&b.title));
        assigned_users.sort_by(|a, b| a.uid.cmp(&b.uid));
        comments.sort_by_key(|c| c.created_at);
        attachments.sort_by(|a, b| a.filename.cmp(&b.filename));

        Ok(Self {
            card,
            labels,
            assigned_users,
            comments,
            attachments,
        })
    }

    /// Returns true if the aggregate has no children at all
    pub fn is_bare(&self) -> bool {
        self.labels.is_empty()
            && self.assigned_users.is_empty()
            && self.comments.is_empty()
            && self.attachments.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::newtypes::{AccountId, LocalId};

    fn sample_card(account: AccountId) -> Card {
        Card::new(account, LocalId::new(), "Write tests", 0)
    }

    #[test]
    fn test_bare_aggregate() {
        let account = AccountId::new();
        let agg = CardAggregate::new(sample_card(account), vec![], vec![], vec![], vec![]).unwrap();
        assert!(agg.is_bare());
    }

    #[test]
    fn test_foreign_account_child_rejected() {
        let account = AccountId::new();
        let card = sample_card(account);
        let foreign_label = Label::new(AccountId::new(), LocalId::new(), "bug", "ff0000");

        let result = CardAggregate::new(card, vec![foreign_label], vec![], vec![], vec![]);
        assert!(matches!(result, Err(DomainError::ValidationFailed(_))));
    }

    #[test]
    fn test_equality_is_order_insensitive_for_labels() {
        let account = AccountId::new();
        let board = LocalId::new();
        let card = sample_card(account);
        let l1 = Label::new(account, board, "alpha", "00ff00");
        let l2 = Label::new(account, board, "beta", "0000ff");

        let a = CardAggregate::new(card.clone(), vec![l1.clone(), l2.clone()], vec![], vec![], vec![])
            .unwrap();
        let b = CardAggregate::new(card, vec![l2, l1], vec![], vec![], vec![]).unwrap();

        assert_eq!(a, b);
    }

    #[test]
    fn test_equality_detects_edited_root() {
        let account = AccountId::new();
        let card = sample_card(account);
        let a = CardAggregate::new(card.clone(), vec![], vec![], vec![], vec![]).unwrap();

        let mut edited = card;
        edited.title = "Write more tests".to_string();
        let b = CardAggregate::new(edited, vec![], vec![], vec![], vec![]).unwrap();

        assert_ne!(a, b);
    }

    #[test]
    fn test_comments_sorted_oldest_first() {
        let account = AccountId::new();
        let card = sample_card(account);
        let mut older = Comment::new(account, card.local_id, "first", "alice");
        older.created_at = older.created_at - chrono::Duration::hours(1);
        let newer = Comment::new(account, card.local_id, "second", "bob");

        let agg =
            CardAggregate::new(card, vec![], vec![], vec![newer.clone(), older.clone()], vec![])
                .unwrap();
        assert_eq!(agg.comments[0].message, "first");
        assert_eq!(agg.comments[1].message, "second");
    }
}
