//! Account domain entity
//!
//! An Account represents one configured connection to a remote service
//! instance. It owns the account-level `etag` used to short-circuit
//! unchanged pulls and the timestamp of the last successful sync pass.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::newtypes::{AccountId, CredentialRef, Etag, ServerUrl};

/// Current state of an account
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountState {
    /// Account is active and can sync
    #[default]
    Active,
    /// The server rejected the stored credentials; re-authentication needed
    AuthenticationRequired,
    /// Account is in an error state with a description
    Error(String),
}

impl AccountState {
    /// Returns true if the account can perform sync passes
    pub fn can_sync(&self) -> bool {
        matches!(self, AccountState::Active)
    }
}

impl std::fmt::Display for AccountState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AccountState::Active => write!(f, "active"),
            AccountState::AuthenticationRequired => write!(f, "authentication_required"),
            AccountState::Error(msg) => write!(f, "error: {}", msg),
        }
    }
}

/// A configured connection to one remote service instance
///
/// Created on user setup, updated on every successful account-level pull,
/// and never destroyed except by explicit user removal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Unique identifier for this account
    id: AccountId,
    /// Base URL of the remote service
    server_url: ServerUrl,
    /// Login name on the remote service
    user_name: String,
    /// Opaque handle to the stored credential (never the secret itself)
    credential: CredentialRef,
    /// Account-level freshness token; when the server reports it unchanged,
    /// the whole pull pass is skipped
    etag: Option<Etag>,
    /// Timestamp of the last successful sync pass (None if never synced)
    last_sync: Option<DateTime<Utc>>,
    /// Current account state
    state: AccountState,
    /// When this account was created
    created_at: DateTime<Utc>,
}

impl Account {
    /// Creates a new Account in Active state
    pub fn new(server_url: ServerUrl, user_name: impl Into<String>, credential: CredentialRef) -> Self {
        Self {
            id: AccountId::new(),
            server_url,
            user_name: user_name.into(),
            credential,
            etag: None,
            last_sync: None,
            state: AccountState::Active,
            created_at: Utc::now(),
        }
    }

    /// Reconstitutes an Account from storage
    #[allow(clippy::too_many_arguments)]
    pub fn from_parts(
        id: AccountId,
        server_url: ServerUrl,
        user_name: impl Into<String>,
        credential: CredentialRef,
        etag: Option<Etag>,
        last_sync: Option<DateTime<Utc>>,
        state: AccountState,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            server_url,
            user_name: user_name.into(),
            credential,
            etag,
            last_sync,
            state,
            created_at,
        }
    }

    // --- Getters ---

    /// Returns the account's unique identifier
    pub fn id(&self) -> AccountId {
        self.id
    }

    /// Returns the server base URL
    pub fn server_url(&self) -> &ServerUrl {
        &self.server_url
    }

    /// Returns the login name
    pub fn user_name(&self) -> &str {
        &self.user_name
    }

    /// Returns the credential reference
    pub fn credential(&self) -> &CredentialRef {
        &self.credential
    }

    /// Returns the account-level etag if any
    pub fn etag(&self) -> Option<&Etag> {
        self.etag.as_ref()
    }

    /// Returns the last sync timestamp if any
    pub fn last_sync(&self) -> Option<DateTime<Utc>> {
        self.last_sync
    }

    /// Returns the current account state
    pub fn state(&self) -> &AccountState {
        &self.state
    }

    /// Returns when the account was created
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    // --- Mutations ---

    /// Records a fresh account-level etag from a pull probe
    pub fn update_etag(&mut self, etag: Etag) {
        self.etag = Some(etag);
    }

    /// Drops the stored account etag, forcing a full pull next pass
    pub fn clear_etag(&mut self) {
        self.etag = None;
    }

    /// Records a successful sync pass
    pub fn record_sync(&mut self, at: DateTime<Utc>) {
        self.last_sync = Some(at);
        self.state = AccountState::Active;
    }

    /// Marks the account as needing re-authentication
    pub fn require_authentication(&mut self) {
        self.state = AccountState::AuthenticationRequired;
    }

    /// Marks the account as errored with a reason
    pub fn mark_error(&mut self, reason: impl Into<String>) {
        self.state = AccountState::Error(reason.into());
    }
}
