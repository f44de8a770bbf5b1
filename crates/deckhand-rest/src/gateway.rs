//! Gateway port implementations over the HTTP client
//!
//! A single [`RestGateway`] instance serves one account. The
//! [`EntityGateway`] implementation is generic over every kind that has a
//! [`WirePayload`] mapping, so boards, stacks, cards, and the card children
//! all share one code path.

use async_trait::async_trait;
use tracing::debug;

use deckhand_core::domain::{AccountId, Etag, RemoteId, User};
use deckhand_core::ports::{
    AccountGateway, AccountProbe, EntityGateway, GatewayError, RemoteEntity, RemoteHead,
};

use crate::client::DeckClient;
use crate::wire::{UserDto, WirePayload};

/// Remote gateway for one account
#[derive(Clone)]
pub struct RestGateway {
    client: DeckClient,
    account_id: AccountId,
}

impl RestGateway {
    /// Creates a gateway backed by the given client, scoped to one account
    pub fn new(client: DeckClient, account_id: AccountId) -> Self {
        Self { client, account_id }
    }

    /// The account this gateway serves
    pub fn account_id(&self) -> AccountId {
        self.account_id
    }
}

fn item_path<E: WirePayload>(
    parent: Option<RemoteId>,
    remote_id: RemoteId,
) -> Result<String, GatewayError> {
    Ok(format!("{}/{}", E::collection_path(parent)?, remote_id))
}

/// Prefers the header etag over the one embedded in the body
///
/// Servers are inconsistent about where they return the fresh etag after a
/// write; the header wins when both are present.
fn merge_etag(head: RemoteHead, header_etag: Option<Etag>) -> RemoteHead {
    RemoteHead {
        remote_id: head.remote_id,
        etag: header_etag.or(head.etag),
    }
}

#[async_trait]
impl<E: WirePayload> EntityGateway<E> for RestGateway {
    async fn list(&self, parent: Option<RemoteId>) -> Result<Vec<RemoteEntity<E>>, GatewayError> {
        let path = E::collection_path(parent)?;
        let dtos: Vec<E::Dto> = self.client.get_json(&path, None).await?;
        debug!(kind = E::KIND.as_str(), count = dtos.len(), "Listed remote entities");
        dtos.into_iter()
            .map(|dto| E::from_dto(dto, self.account_id, parent))
            .collect()
    }

    async fn fetch(
        &self,
        parent: Option<RemoteId>,
        remote_id: RemoteId,
    ) -> Result<RemoteEntity<E>, GatewayError> {
        let path = item_path::<E>(parent, remote_id)?;
        let dto: E::Dto = self.client.get_json(&path, Some(remote_id)).await?;
        E::from_dto(dto, self.account_id, parent)
    }

    async fn create(
        &self,
        parent: Option<RemoteId>,
        entity: &E,
    ) -> Result<RemoteHead, GatewayError> {
        let path = E::collection_path(parent)?;
        let (dto, header_etag): (E::Dto, _) =
            self.client.post_json(&path, &entity.to_dto()).await?;
        let created = E::from_dto(dto, self.account_id, parent)?;
        debug!(
            kind = E::KIND.as_str(),
            remote_id = created.head.remote_id.as_i64(),
            "Created remote entity"
        );
        Ok(merge_etag(created.head, header_etag))
    }

    async fn update(
        &self,
        parent: Option<RemoteId>,
        remote_id: RemoteId,
        etag: Option<&Etag>,
        entity: &E,
    ) -> Result<RemoteHead, GatewayError> {
        let path = item_path::<E>(parent, remote_id)?;
        let (dto, header_etag): (E::Dto, _) = self
            .client
            .put_json(&path, &entity.to_dto(), remote_id, etag)
            .await?;
        let updated = E::from_dto(dto, self.account_id, parent)?;
        Ok(merge_etag(updated.head, header_etag))
    }

    async fn delete(
        &self,
        parent: Option<RemoteId>,
        remote_id: RemoteId,
    ) -> Result<(), GatewayError> {
        let path = item_path::<E>(parent, remote_id)?;
        self.client.delete(&path, remote_id).await
    }
}

#[async_trait]
impl AccountGateway for RestGateway {
    async fn probe(&self, etag: Option<&Etag>) -> Result<AccountProbe, GatewayError> {
        self.client.probe("account", etag).await
    }

    async fn fetch_users(&self) -> Result<Vec<RemoteEntity<User>>, GatewayError> {
        let dtos: Vec<UserDto> = self.client.get_json("users", None).await?;
        dtos.into_iter()
            .map(|dto| dto.into_remote(self.account_id))
            .collect()
    }
}
