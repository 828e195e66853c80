// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Client-side cart synchronization.
//!
//! The server is the only source of truth for totals and stock. This crate
//! keeps an optimistic projection of the server cart, funnels quantity changes
//! through a FIFO queue that has at most one call outstanding, and re-fetches
//! the canonical cart after every settle.

pub mod config;
pub mod engine;
pub mod error;
pub mod gateway;
pub mod model;
pub mod queue;
pub mod store;

pub use config::{CartPrefs, ConfigError, ConfigService, ConfigStore, EngineConfig};
pub use engine::{CartEngine, CartEvent, CartView};
pub use error::{CartError, GatewayError};
pub use gateway::CartGateway;
pub use model::{
    CartId, CartLine, CartSnapshot, Direction, MutationId, MutationOp, PendingMutation, ProductId,
};
pub use queue::MutationQueue;
pub use store::{FetchTicket, SnapshotStore};
