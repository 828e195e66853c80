// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! JSON shapes exchanged with the cart endpoint.

use cart_sync_core::{CartId, CartLine, CartSnapshot, ProductId};
use serde::{Deserialize, Serialize};

/// Cart ids arrive as JSON numbers or strings depending on the backend.
/// Product ids carry the same choice inside [`ProductId`].
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum RawId {
    Num(u64),
    Text(String),
}

impl From<RawId> for String {
    fn from(raw: RawId) -> Self {
        match raw {
            RawId::Num(n) => n.to_string(),
            RawId::Text(s) => s,
        }
    }
}

/// `GET` response body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CartDto {
    #[serde(default)]
    pub id: Option<RawId>,
    #[serde(default)]
    pub order_total_price: f64,
    #[serde(default)]
    pub items: Vec<CartItemDto>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CartItemDto {
    pub product_id: ProductId,
    pub single_price: f64,
    pub total_price: f64,
    pub quantity: u32,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub primary_image_uri: Option<String>,
}

impl From<CartDto> for CartSnapshot {
    fn from(dto: CartDto) -> Self {
        let lines = dto
            .items
            .into_iter()
            // zero-quantity lines are not lines
            .filter(|item| item.quantity >= 1)
            .map(|item| CartLine {
                product: item.product_id,
                unit_price: item.single_price,
                quantity: item.quantity,
                line_total: item.total_price,
                title: item.title,
                image: item.primary_image_uri,
            })
            .collect();
        Self {
            id: dto.id.map(|id| CartId::new(String::from(id))),
            lines,
            total: dto.order_total_price,
        }
    }
}

/// `PUT` / `DELETE` body naming a product and a unit count. The id goes back
/// in the JSON type the server used for it.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct QuantityBody<'a> {
    pub product_id: &'a ProductId,
    pub quantity: u32,
}
