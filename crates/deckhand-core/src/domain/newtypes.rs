//! Domain newtypes with validation
//!
//! Strongly-typed wrappers for the identifiers and tokens that flow through
//! the sync engine. Each newtype validates at construction time, so the rest
//! of the engine can rely on the values being well-formed.
//!
//! The dual-identity scheme is central here: every entity carries a
//! [`LocalId`] assigned by this process at insert time, and may additionally
//! be known to the server under a [`RemoteId`]. Only local ids are safe to
//! reference from collaborators; remote ids exist purely for reconciliation.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::errors::DomainError;

// ============================================================================
// UUID-based ID types
// ============================================================================

/// Process-assigned identity for a syncable entity
///
/// Stable across sync passes, never reused, and independent of any
/// server-assigned identifier. This is the only identifier internal
/// references (parent links, junction rows, UI state) may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LocalId(Uuid);

impl LocalId {
    /// Create a new random LocalId
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a LocalId from an existing UUID
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID value
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// Create a nil (all zeros) LocalId
    #[must_use]
    pub const fn nil() -> Self {
        Self(Uuid::nil())
    }
}

impl Default for LocalId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for LocalId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for LocalId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| DomainError::InvalidId(format!("Invalid LocalId: {e}")))
    }
}

impl From<Uuid> for LocalId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// Identifier for Account entities
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(Uuid);

impl AccountId {
    /// Create a new random AccountId
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create an AccountId from an existing UUID
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID value
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for AccountId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for AccountId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for AccountId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| DomainError::InvalidId(format!("Invalid AccountId: {e}")))
    }
}

impl From<Uuid> for AccountId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

// ============================================================================
// Remote identity
// ============================================================================

/// Server-assigned identity for an entity
///
/// Present only after the first successful push (or when the entity arrived
/// through a pull). Unique within an account for a given entity kind. The
/// Deck-style API uses positive numeric ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct RemoteId(i64);

impl RemoteId {
    /// Create a new RemoteId
    ///
    /// # Errors
    /// Returns an error if the id is not positive
    pub fn new(id: i64) -> Result<Self, DomainError> {
        if id <= 0 {
            return Err(DomainError::InvalidId(format!(
                "Remote id must be positive, got {id}"
            )));
        }
        Ok(Self(id))
    }

    /// Get the inner i64 value
    #[must_use]
    pub const fn as_i64(&self) -> i64 {
        self.0
    }
}

impl Display for RemoteId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<i64> for RemoteId {
    type Error = DomainError;

    fn try_from(id: i64) -> Result<Self, Self::Error> {
        Self::new(id)
    }
}

impl From<RemoteId> for i64 {
    fn from(id: RemoteId) -> Self {
        id.0
    }
}

impl FromStr for RemoteId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let id: i64 = s
            .parse()
            .map_err(|e| DomainError::InvalidId(format!("Invalid RemoteId: {e}")))?;
        Self::new(id)
    }
}

// ============================================================================
// Etag
// ============================================================================

/// Opaque freshness token for conditional updates and conflict detection
///
/// The server returns an etag with every canonical entity representation.
/// Updates are sent conditionally on the locally-known etag; a mismatch is
/// a conflict, never silently overwritten. The token contents are opaque;
/// we only require it to be non-empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Etag(String);

impl Etag {
    /// Create a new Etag
    ///
    /// # Errors
    /// Returns an error if the token is empty
    pub fn new(token: impl Into<String>) -> Result<Self, DomainError> {
        let token = token.into();
        if token.is_empty() {
            return Err(DomainError::InvalidEtag(
                "Etag cannot be empty".to_string(),
            ));
        }
        Ok(Self(token))
    }

    /// Get the inner string reference
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for Etag {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Etag {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.to_string())
    }
}

impl TryFrom<String> for Etag {
    type Error = DomainError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<Etag> for String {
    fn from(etag: Etag) -> Self {
        etag.0
    }
}

// ============================================================================
// Server URL
// ============================================================================

/// Base URL of a remote service instance
///
/// Validated to be an absolute http(s) URL without trailing slash so that
/// endpoint paths can be appended mechanically.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ServerUrl(String);

impl ServerUrl {
    /// Create a new ServerUrl
    ///
    /// # Errors
    /// Returns an error if the URL is not absolute http(s)
    pub fn new(url: impl Into<String>) -> Result<Self, DomainError> {
        let mut url = url.into();
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(DomainError::InvalidServerUrl(format!(
                "Server URL must start with http:// or https://: {url}"
            )));
        }
        while url.ends_with('/') {
            url.pop();
        }
        if url == "http:/" || url == "https:/" || url.len() < 10 {
            return Err(DomainError::InvalidServerUrl(format!(
                "Server URL has no host: {url}"
            )));
        }
        Ok(Self(url))
    }

    /// Get the inner string reference
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ServerUrl {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ServerUrl {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.to_string())
    }
}

impl TryFrom<String> for ServerUrl {
    type Error = DomainError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<ServerUrl> for String {
    fn from(url: ServerUrl) -> Self {
        url.0
    }
}

// ============================================================================
// Credential reference
// ============================================================================

/// Opaque handle to a stored credential
///
/// The engine never holds the secret itself; it carries a reference that the
/// gateway adapter resolves against the platform credential store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CredentialRef(String);

impl CredentialRef {
    /// Create a new CredentialRef
    ///
    /// # Errors
    /// Returns an error if the reference is empty
    pub fn new(reference: impl Into<String>) -> Result<Self, DomainError> {
        let reference = reference.into();
        if reference.is_empty() {
            return Err(DomainError::InvalidCredentialRef(
                "Credential reference cannot be empty".to_string(),
            ));
        }
        Ok(Self(reference))
    }

    /// Get the inner string reference
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for CredentialRef {
    type Error = DomainError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<CredentialRef> for String {
    fn from(r: CredentialRef) -> Self {
        r.0
    }
}

// ============================================================================
// Tests
// ============================================================================
