// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Error types for the cart engine and its gateway port.

use std::time::Duration;
use thiserror::Error;

/// Failure reported by a [`CartGateway`](crate::gateway::CartGateway).
///
/// `Clone` so that failures can travel on broadcast channels.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    /// The server has no cart (or product) for this identity.
    #[error("not found")]
    NotFound,
    /// Credential rejected by the server.
    #[error("unauthorized")]
    Unauthorized,
    /// No bearer credential was supplied.
    #[error("missing credential")]
    MissingCredential,
    /// Any other non-success status code.
    #[error("unexpected status {0}")]
    Status(u16),
    /// Network or transport failure.
    #[error("transport error: {0}")]
    Transport(String),
    /// Response body could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),
    /// The call did not complete within the configured timeout.
    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

/// Errors surfaced by the public [`CartEngine`](crate::engine::CartEngine) API.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CartError {
    /// Requested quantity below 1.
    #[error("invalid quantity {0}: must be at least 1")]
    InvalidQuantity(u32),
    /// Pending queue is at its configured bound.
    #[error("mutation queue full ({0} pending)")]
    QueueFull(usize),
    /// The engine was closed (session ended).
    #[error("cart engine closed")]
    Closed,
    /// Enqueue happened outside a Tokio runtime, so no drain loop can run.
    #[error("no async runtime available to drain the queue")]
    NoRuntime,
    /// Gateway failure (reconciliation).
    #[error(transparent)]
    Gateway(#[from] GatewayError),
}
