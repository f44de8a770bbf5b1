//! Port definitions (hexagonal architecture interfaces)
//!
//! This module defines the port traits that form the boundaries of the
//! hexagonal architecture. Ports are interfaces that the domain core
//! depends on, but whose implementations live in adapter crates.
//!
//! ## Ports Overview
//!
//! - [`EntityStore`] / [`IdentityMap`] / [`AccountStore`] / [`CardLinks`] -
//!   local persistence (SQLite adapter)
//! - [`EntityGateway`] / [`AccountGateway`] - the remote kanban service
//!   (HTTP adapter)
//! - [`Observable`] - scoped change subscriptions over committed writes

pub mod gateway;
pub mod observer;
pub mod store;

pub use gateway::{
    AccountGateway, AccountProbe, EntityGateway, GatewayError, RemoteEntity, RemoteHead,
};
pub use observer::{Change, ChangeEvent, ChangeFeed, ChangeScope, ChangeSignal, Observable};
pub use store::{AccountStore, CardLinks, EntityStore, IdentityMap, StoreError};
