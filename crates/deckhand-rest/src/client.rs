//! Typed HTTP client for the kanban server API
//!
//! Wraps `reqwest::Client` with Basic authentication, base URL construction,
//! conditional request headers, and HTTP-status → [`GatewayError`]
//! classification. The entity-level gateway implementations in
//! [`crate::gateway`] are thin path/DTO layers over this client.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use deckhand_rest::client::DeckClient;
//! use std::time::Duration;
//!
//! # fn example() -> Result<(), deckhand_core::ports::GatewayError> {
//! let client = DeckClient::new(
//!     "https://cloud.example.com",
//!     "alice",
//!     "app-password",
//!     Duration::from_secs(30),
//! )?;
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use deckhand_core::domain::{Etag, RemoteId};
use deckhand_core::ports::{AccountProbe, GatewayError};

/// API root mounted under the server base URL
const API_PREFIX: &str = "/api/v1";

/// HTTP client for the kanban server
///
/// One instance per account; credentials and base URL are fixed at
/// construction. Cheap to clone (the inner reqwest client is refcounted).
#[derive(Clone)]
pub struct DeckClient {
    /// The underlying HTTP client
    http: Client,
    /// Server base URL without the API prefix, no trailing slash
    base_url: String,
    /// Login name for Basic auth
    user_name: String,
    /// App password / token for Basic auth
    password: String,
}

impl DeckClient {
    /// Creates a client for the given server and credentials
    ///
    /// # Errors
    /// Returns `GatewayError::Protocol` if the underlying HTTP client
    /// cannot be constructed.
    pub fn new(
        server_url: impl Into<String>,
        user_name: impl Into<String>,
        password: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, GatewayError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GatewayError::Protocol(format!("Failed to build HTTP client: {}", e)))?;

        let base_url = server_url.into().trim_end_matches('/').to_string();
        Ok(Self {
            http,
            base_url,
            user_name: user_name.into(),
            password: password.into(),
        })
    }

    /// Creates an authenticated request builder for the given method and
    /// API path (relative to the API root, e.g. "boards" or "boards/7/stacks")
    pub fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}/{}", self.base_url, API_PREFIX, path);
        self.http
            .request(method, &url)
            .basic_auth(&self.user_name, Some(&self.password))
            .header(reqwest::header::ACCEPT, "application/json")
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Response, GatewayError> {
        builder
            .send()
            .await
            .map_err(|e| GatewayError::Unreachable(e.to_string()))
    }

    /// GET a JSON document
    pub(crate) async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        subject: Option<RemoteId>,
    ) -> Result<T, GatewayError> {
        debug!(path, "GET");
        let response = self.send(self.request(Method::GET, path)).await?;
        let response = check_status(response, subject, None)?;
        parse_json(response).await
    }

    /// POST a JSON body, returning the parsed response and the ETag header
    pub(crate) async fn post_json<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<(T, Option<Etag>), GatewayError> {
        debug!(path, "POST");
        let response = self
            .send(self.request(Method::POST, path).json(body))
            .await?;
        let response = check_status(response, None, None)?;
        let header_etag = etag_header(&response)?;
        Ok((parse_json(response).await?, header_etag))
    }

    /// PUT a JSON body with an optional `If-Match` precondition
    ///
    /// A 412 answer is classified as `GatewayError::Conflict` for the
    /// addressed object.
    pub(crate) async fn put_json<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
        subject: RemoteId,
        if_match: Option<&Etag>,
    ) -> Result<(T, Option<Etag>), GatewayError> {
        debug!(path, if_match = ?if_match.map(|e| e.as_str()), "PUT");
        let mut builder = self.request(Method::PUT, path).json(body);
        if let Some(etag) = if_match {
            builder = builder.header(reqwest::header::IF_MATCH, etag.as_str());
        }
        let response = self.send(builder).await?;
        let response = check_status(response, Some(subject), if_match.cloned())?;
        let header_etag = etag_header(&response)?;
        Ok((parse_json(response).await?, header_etag))
    }

    /// DELETE an object
    pub(crate) async fn delete(&self, path: &str, subject: RemoteId) -> Result<(), GatewayError> {
        debug!(path, "DELETE");
        let response = self.send(self.request(Method::DELETE, path)).await?;
        check_status(response, Some(subject), None)?;
        Ok(())
    }

    /// GET with an `If-None-Match` precondition for the account probe
    ///
    /// 304 means nothing changed server-side; 200 carries the fresh
    /// account etag in the `ETag` header.
    pub(crate) async fn probe(
        &self,
        path: &str,
        if_none_match: Option<&Etag>,
    ) -> Result<AccountProbe, GatewayError> {
        debug!(path, if_none_match = ?if_none_match.map(|e| e.as_str()), "GET (probe)");
        let mut builder = self.request(Method::GET, path);
        if let Some(etag) = if_none_match {
            builder = builder.header(reqwest::header::IF_NONE_MATCH, etag.as_str());
        }
        let response = self.send(builder).await?;

        if response.status() == StatusCode::NOT_MODIFIED {
            return Ok(AccountProbe::NotModified);
        }
        let response = check_status(response, None, None)?;
        Ok(AccountProbe::Modified(etag_header(&response)?))
    }
}

// ============================================================================
// Status classification and response helpers
// ============================================================================

/// Maps a non-success status to the gateway error taxonomy
fn check_status(
    response: Response,
    subject: Option<RemoteId>,
    stale_etag: Option<Etag>,
) -> Result<Response, GatewayError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    Err(match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => GatewayError::Unauthorized,
        StatusCode::NOT_FOUND => match subject {
            Some(remote_id) => GatewayError::NotFound(remote_id),
            None => GatewayError::Protocol("Unexpected 404 for an unaddressed request".to_string()),
        },
        StatusCode::PRECONDITION_FAILED => match subject {
            Some(remote_id) => GatewayError::Conflict {
                remote_id,
                stale_etag,
            },
            None => GatewayError::Protocol("Unexpected 412 for an unaddressed request".to_string()),
        },
        s if s.is_server_error() => GatewayError::Server {
            status: s.as_u16(),
        },
        s => GatewayError::Protocol(format!("Unexpected HTTP status {}", s)),
    })
}

async fn parse_json<T: DeserializeOwned>(response: Response) -> Result<T, GatewayError> {
    response
        .json()
        .await
        .map_err(|e| GatewayError::Protocol(format!("Failed to parse response body: {}", e)))
}

/// Extracts and validates the ETag response header, if present
fn etag_header(response: &Response) -> Result<Option<Etag>, GatewayError> {
    let Some(value) = response.headers().get(reqwest::header::ETAG) else {
        return Ok(None);
    };
    let raw = value
        .to_str()
        .map_err(|e| GatewayError::Protocol(format!("Invalid ETag header: {}", e)))?;
    // Strip the quoting (and weak-validator prefix) the header form carries.
    let trimmed = raw.trim_start_matches("W/").trim_matches('"');
    Etag::new(trimmed)
        .map(Some)
        .map_err(|e| GatewayError::Protocol(format!("Invalid ETag header: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_strips_trailing_slash() {
        let client = DeckClient::new(
            "https://cloud.example.com/",
            "alice",
            "secret",
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(client.base_url, "https://cloud.example.com");
    }
}
