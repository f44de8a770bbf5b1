//! Deckhand Core - Domain logic and business rules
//!
//! This crate contains the hexagonal architecture core with:
//! - **Domain entities** - `Account`, the kanban hierarchy (`Board`, `Stack`,
//!   `Card` and card children), `IdentityEntry`, `CardAggregate`
//! - **State machine** - per-entity [`domain::SyncStatus`] tracking local
//!   agreement with the server
//! - **Port definitions** - Traits for adapters: `EntityStore`, `IdentityMap`,
//!   `AccountStore`, `EntityGateway`, `AccountGateway`
//!
//! # Architecture
//!
//! This crate follows the hexagonal (ports & adapters) architecture pattern.
//! The domain module contains pure business logic with no external dependencies.
//! Ports define trait interfaces that adapter crates implement: the store
//! crate persists to SQLite, the rest crate speaks HTTP to the server, and
//! the sync crate orchestrates both through the port interfaces.

pub mod config;
pub mod domain;
pub mod ports;
