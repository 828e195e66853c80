// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Port for the remote, canonical cart.
//!
//! The engine depends only on this trait; concrete transports (HTTP, fakes in
//! tests) live elsewhere.

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::GatewayError;
use crate::model::{CartSnapshot, ProductId};

/// Operations against the server-side cart for the current identity.
#[async_trait]
pub trait CartGateway: Send + Sync {
    /// Fetch the canonical cart. `Ok(None)` means "no cart" (treated as empty).
    async fn fetch_cart(&self) -> Result<Option<CartSnapshot>, GatewayError>;
    /// Increase `product` by exactly one unit.
    async fn increment_item(&self, product: &ProductId) -> Result<(), GatewayError>;
    /// Decrease `product` by exactly one unit.
    async fn decrement_item(&self, product: &ProductId) -> Result<(), GatewayError>;
    /// Drop `quantity` units of `product` in one call (all of them for a removal).
    async fn remove_item(&self, product: &ProductId, quantity: u32) -> Result<(), GatewayError>;
    /// Empty the cart.
    async fn clear_cart(&self) -> Result<(), GatewayError>;
}

#[async_trait]
impl<G> CartGateway for Arc<G>
where
    G: CartGateway + ?Sized,
{
    async fn fetch_cart(&self) -> Result<Option<CartSnapshot>, GatewayError> {
        (**self).fetch_cart().await
    }

    async fn increment_item(&self, product: &ProductId) -> Result<(), GatewayError> {
        (**self).increment_item(product).await
    }

    async fn decrement_item(&self, product: &ProductId) -> Result<(), GatewayError> {
        (**self).decrement_item(product).await
    }

    async fn remove_item(&self, product: &ProductId, quantity: u32) -> Result<(), GatewayError> {
        (**self).remove_item(product, quantity).await
    }

    async fn clear_cart(&self) -> Result<(), GatewayError> {
        (**self).clear_cart().await
    }
}
