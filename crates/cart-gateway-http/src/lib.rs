// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! HTTP adapter for the storefront cart endpoint.
//!
//! One resource, four verbs:
//! - `GET` returns the cart (404 when the identity has none)
//! - `PUT {productId, quantity: 1}` adds one unit
//! - `DELETE {productId, quantity: n}` takes `n` units away
//! - `DELETE` without a body empties the cart
//!
//! Every request carries the session's bearer token.

use async_trait::async_trait;
use cart_sync_core::{CartGateway, CartPrefs, CartSnapshot, GatewayError, ProductId};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode, Url};
use tracing::{debug, instrument};

mod wire;

use wire::{CartDto, QuantityBody};

/// `CartGateway` over the REST cart endpoint.
#[derive(Debug, Clone)]
pub struct HttpCartGateway {
    client: Client,
    endpoint: Url,
    token: String,
}

impl HttpCartGateway {
    /// Build a gateway for `{base_url}{cart_path}` authenticated with `token`.
    ///
    /// A blank token is a precondition failure: the caller must log in first.
    pub fn new(
        base_url: &str,
        cart_path: &str,
        token: impl Into<String>,
    ) -> Result<Self, GatewayError> {
        let token = token.into();
        if token.trim().is_empty() {
            return Err(GatewayError::MissingCredential);
        }
        let endpoint = cart_endpoint(base_url, cart_path)?;
        let client = Client::builder()
            .build()
            .map_err(|e| GatewayError::Transport(format!("http client init failed: {e}")))?;
        Ok(Self {
            client,
            endpoint,
            token,
        })
    }

    /// Build from persisted prefs.
    pub fn from_prefs(prefs: &CartPrefs, token: impl Into<String>) -> Result<Self, GatewayError> {
        Self::new(&prefs.base_url, &prefs.cart_path, token)
    }

    /// Resolved cart URL.
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    fn request(&self, method: Method) -> RequestBuilder {
        self.client
            .request(method, self.endpoint.clone())
            .bearer_auth(&self.token)
    }

    async fn send(&self, req: RequestBuilder) -> Result<Response, GatewayError> {
        let resp = req
            .send()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;
        debug!(status = %resp.status(), "cart endpoint responded");
        Ok(resp)
    }

    async fn send_units(
        &self,
        method: Method,
        product: &ProductId,
        quantity: u32,
    ) -> Result<(), GatewayError> {
        let body = QuantityBody {
            product_id: product,
            quantity,
        };
        let resp = self.send(self.request(method).json(&body)).await?;
        check(resp.status())
    }
}

fn cart_endpoint(base_url: &str, cart_path: &str) -> Result<Url, GatewayError> {
    let base = base_url.trim_end_matches('/');
    let path = cart_path.trim_start_matches('/');
    Url::parse(&format!("{base}/{path}"))
        .map_err(|e| GatewayError::Transport(format!("invalid cart url {base_url:?}: {e}")))
}

fn check(status: StatusCode) -> Result<(), GatewayError> {
    if status.is_success() {
        return Ok(());
    }
    Err(match status {
        StatusCode::NOT_FOUND => GatewayError::NotFound,
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => GatewayError::Unauthorized,
        other => GatewayError::Status(other.as_u16()),
    })
}

#[async_trait]
impl CartGateway for HttpCartGateway {
    #[instrument(skip(self), fields(url = %self.endpoint))]
    async fn fetch_cart(&self) -> Result<Option<CartSnapshot>, GatewayError> {
        let resp = self.send(self.request(Method::GET)).await?;
        match resp.status() {
            StatusCode::NOT_FOUND | StatusCode::NO_CONTENT => return Ok(None),
            status => check(status)?,
        }
        let dto: CartDto = resp
            .json()
            .await
            .map_err(|e| GatewayError::Decode(e.to_string()))?;
        Ok(Some(dto.into()))
    }

    #[instrument(skip(self))]
    async fn increment_item(&self, product: &ProductId) -> Result<(), GatewayError> {
        self.send_units(Method::PUT, product, 1).await
    }

    #[instrument(skip(self))]
    async fn decrement_item(&self, product: &ProductId) -> Result<(), GatewayError> {
        self.send_units(Method::DELETE, product, 1).await
    }

    #[instrument(skip(self))]
    async fn remove_item(&self, product: &ProductId, quantity: u32) -> Result<(), GatewayError> {
        self.send_units(Method::DELETE, product, quantity).await
    }

    #[instrument(skip(self))]
    async fn clear_cart(&self) -> Result<(), GatewayError> {
        let resp = self.send(self.request(Method::DELETE)).await?;
        check(resp.status())
    }
}
