//! Deckhand REST - Remote gateway adapter
//!
//! HTTP implementation of the gateway ports from `deckhand-core`, speaking
//! the Deck-style JSON API with Basic authentication and conditional
//! requests (`If-Match` on updates, `If-None-Match` on the account probe).
//!
//! ## Architecture
//!
//! This is a driven (secondary) adapter in the hexagonal architecture:
//!
//! - [`client::DeckClient`] - Authenticated HTTP transport with
//!   status → error classification
//! - [`wire`] - DTOs and endpoint layout, tied to entity kinds through
//!   [`wire::WirePayload`]
//! - [`gateway::RestGateway`] - The port implementations; one generic
//!   `EntityGateway` impl covers every entity kind
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use deckhand_core::domain::AccountId;
//! use deckhand_rest::{DeckClient, RestGateway};
//!
//! # fn example() -> Result<(), deckhand_core::ports::GatewayError> {
//! let client = DeckClient::new(
//!     "https://cloud.example.com",
//!     "alice",
//!     "app-password",
//!     Duration::from_secs(30),
//! )?;
//! let gateway = RestGateway::new(client, AccountId::new());
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod gateway;
pub mod wire;

pub use client::DeckClient;
pub use gateway::RestGateway;
