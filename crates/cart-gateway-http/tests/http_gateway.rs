// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>

#![allow(missing_docs)]
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::{
    body::Bytes,
    extract::State,
    http::{header::AUTHORIZATION, HeaderMap, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::any,
    Json, Router,
};
use cart_gateway_http::HttpCartGateway;
use cart_sync_core::{CartEngine, CartGateway, EngineConfig, GatewayError, ProductId};
use serde_json::{json, Value};

#[derive(Debug, Clone)]
struct Seen {
    method: Method,
    auth: Option<String>,
    body: Option<Value>,
}

#[derive(Default)]
struct MockState {
    /// (product id, unit price, quantity)
    items: Vec<(String, f64, u32)>,
    seen: Vec<Seen>,
    force_status: Option<StatusCode>,
}

#[derive(Clone, Default)]
struct Mock(Arc<Mutex<MockState>>);

impl Mock {
    fn with_items(items: &[(&str, f64, u32)]) -> Self {
        let mock = Self::default();
        mock.0.lock().unwrap().items = items
            .iter()
            .map(|(id, price, qty)| ((*id).to_string(), *price, *qty))
            .collect();
        mock
    }

    fn force(&self, status: StatusCode) {
        self.0.lock().unwrap().force_status = Some(status);
    }

    fn seen(&self) -> Vec<Seen> {
        self.0.lock().unwrap().seen.clone()
    }
}

/// Numeric ids are served as JSON numbers, like the real backend, and must
/// come back as numbers.
fn product_json(id: &str) -> Value {
    id.parse::<u64>().map_or_else(|_| json!(id), |n| json!(n))
}

fn cart_json(items: &[(String, f64, u32)]) -> Value {
    let lines: Vec<Value> = items
        .iter()
        .map(|(id, price, qty)| {
            json!({
                "productId": product_json(id),
                "singlePrice": price,
                "totalPrice": price * f64::from(*qty),
                "quantity": qty,
                "title": format!("Product {id}"),
                "primaryImageUri": format!("/img/{id}.png"),
            })
        })
        .collect();
    let total: f64 = items.iter().map(|(_, p, q)| p * f64::from(*q)).sum();
    json!({ "id": 77, "orderTotalPrice": total, "items": lines })
}

async fn handle(
    State(mock): State<Mock>,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let body: Option<Value> = if body.is_empty() {
        None
    } else {
        serde_json::from_slice(&body).ok()
    };
    let mut st = mock.0.lock().unwrap();
    st.seen.push(Seen {
        method: method.clone(),
        auth: headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        body: body.clone(),
    });
    if let Some(status) = st.force_status {
        return status.into_response();
    }

    let target = body.as_ref().map(|b| {
        (
            b["productId"].clone(),
            u32::try_from(b["quantity"].as_u64().unwrap_or(0)).unwrap_or(0),
        )
    });
    match (method, target) {
        (Method::GET, _) if st.items.is_empty() => StatusCode::NOT_FOUND.into_response(),
        (Method::GET, _) => Json(cart_json(&st.items)).into_response(),
        (Method::PUT, Some((id, n))) => {
            match st.items.iter_mut().find(|(i, _, _)| product_json(i) == id) {
                Some(item) => {
                    item.2 += n;
                    StatusCode::OK.into_response()
                }
                None => StatusCode::NOT_FOUND.into_response(),
            }
        }
        (Method::DELETE, Some((id, n))) => {
            let Some(pos) = st.items.iter().position(|(i, _, _)| product_json(i) == id) else {
                return StatusCode::NOT_FOUND.into_response();
            };
            if st.items[pos].2 <= n {
                st.items.remove(pos);
            } else {
                st.items[pos].2 -= n;
            }
            StatusCode::OK.into_response()
        }
        (Method::DELETE, None) => {
            st.items.clear();
            StatusCode::NO_CONTENT.into_response()
        }
        _ => StatusCode::METHOD_NOT_ALLOWED.into_response(),
    }
}

async fn serve(mock: Mock) -> SocketAddr {
    let app = Router::new()
        .route("/api/cart", any(handle))
        .with_state(mock);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

async fn gateway_for(mock: &Mock) -> HttpCartGateway {
    let addr = serve(mock.clone()).await;
    HttpCartGateway::new(&format!("http://{addr}/api"), "/cart", "secret-token").unwrap()
}

#[tokio::test]
async fn fetch_parses_cart_body() {
    let mock = Mock::with_items(&[("101", 10.0, 2), ("sku-b", 2.5, 1)]);
    let gw = gateway_for(&mock).await;

    let snap = gw.fetch_cart().await.unwrap().expect("cart present");
    assert_eq!(snap.id.as_ref().map(|id| id.as_str()), Some("77"));
    assert_eq!(snap.quantity_of(&ProductId::from("101")), 2);
    assert_eq!(snap.quantity_of(&ProductId::from("sku-b")), 1);
    assert!((snap.total - 22.5).abs() < f64::EPSILON);
    let line = snap.line(&ProductId::from("101")).unwrap();
    assert_eq!(line.image.as_deref(), Some("/img/101.png"));
    assert!((line.line_total - 20.0).abs() < f64::EPSILON);
}

#[tokio::test]
async fn fetch_404_means_no_cart() {
    let mock = Mock::default();
    let gw = gateway_for(&mock).await;
    assert_eq!(gw.fetch_cart().await.unwrap(), None);
}

#[tokio::test]
async fn unit_calls_carry_bearer_and_quantity_body() {
    let mock = Mock::with_items(&[("5", 1.0, 3)]);
    let gw = gateway_for(&mock).await;
    let product = ProductId::numeric(5);

    gw.increment_item(&product).await.unwrap();
    gw.decrement_item(&product).await.unwrap();
    gw.remove_item(&product, 3).await.unwrap();

    let seen = mock.seen();
    assert_eq!(seen.len(), 3);
    assert!(seen
        .iter()
        .all(|s| s.auth.as_deref() == Some("Bearer secret-token")));
    assert_eq!(seen[0].method, Method::PUT);
    assert_eq!(seen[0].body, Some(json!({"productId": 5, "quantity": 1})));
    assert_eq!(seen[1].method, Method::DELETE);
    assert_eq!(seen[1].body, Some(json!({"productId": 5, "quantity": 1})));
    assert_eq!(seen[2].body, Some(json!({"productId": 5, "quantity": 3})));
    assert_eq!(gw.fetch_cart().await.unwrap(), None, "line fully removed");
}

#[tokio::test]
async fn clear_sends_bodiless_delete() {
    let mock = Mock::with_items(&[("1", 1.0, 1), ("2", 1.0, 4)]);
    let gw = gateway_for(&mock).await;

    gw.clear_cart().await.unwrap();

    let seen = mock.seen();
    assert_eq!(seen[0].method, Method::DELETE);
    assert!(seen[0].body.is_none());
    assert_eq!(gw.fetch_cart().await.unwrap(), None);
}

#[tokio::test]
async fn error_statuses_are_classified() {
    let mock = Mock::with_items(&[("1", 1.0, 1)]);
    let gw = gateway_for(&mock).await;
    let product = ProductId::from("1");

    mock.force(StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        gw.increment_item(&product).await,
        Err(GatewayError::Status(500))
    );
    assert_eq!(gw.fetch_cart().await, Err(GatewayError::Status(500)));

    mock.force(StatusCode::UNAUTHORIZED);
    assert_eq!(gw.fetch_cart().await, Err(GatewayError::Unauthorized));
}

#[tokio::test]
async fn ids_go_back_in_the_json_type_the_cart_used() {
    let mock = Mock::with_items(&[("7", 2.0, 1), ("sku-b", 1.0, 1)]);
    let gw = gateway_for(&mock).await;
    let snap = gw.fetch_cart().await.unwrap().expect("cart present");

    for line in &snap.lines {
        gw.increment_item(&line.product).await.unwrap();
    }
    let bodies: Vec<Option<Value>> = mock.seen().into_iter().map(|s| s.body).collect();
    assert_eq!(
        bodies[1..],
        [
            Some(json!({"productId": 7, "quantity": 1})),
            Some(json!({"productId": "sku-b", "quantity": 1})),
        ]
    );

    // a string "7" is not the product the server handed out
    assert_eq!(
        gw.increment_item(&ProductId::from("7")).await,
        Err(GatewayError::NotFound)
    );
}

#[tokio::test]
async fn unknown_product_is_not_found() {
    let mock = Mock::with_items(&[("1", 1.0, 1)]);
    let gw = gateway_for(&mock).await;
    assert_eq!(
        gw.increment_item(&ProductId::from("404")).await,
        Err(GatewayError::NotFound)
    );
}

#[tokio::test]
async fn unreachable_server_is_a_transport_error() {
    let gw = HttpCartGateway::new("http://127.0.0.1:9", "/cart", "t").unwrap();
    assert!(matches!(
        gw.fetch_cart().await,
        Err(GatewayError::Transport(_))
    ));
}

#[tokio::test]
async fn engine_drives_rest_cart_end_to_end() {
    let mock = Mock::with_items(&[("1", 10.0, 2), ("2", 3.0, 1)]);
    let gw = gateway_for(&mock).await;
    let engine = CartEngine::new(gw, EngineConfig::default());
    engine.load().await.unwrap();

    engine.increment("1").unwrap();
    engine.increment("1").unwrap();
    engine.decrement("2").unwrap();
    engine.idle().await;

    let view = engine.view();
    assert_eq!(view.quantity_of(&ProductId::from("1")), 4);
    assert!(view.projection.line(&ProductId::from("2")).is_none());
    assert_eq!(view.projection, view.canonical);
    assert!((view.canonical.total - 40.0).abs() < f64::EPSILON);

    engine.clear().unwrap();
    engine.idle().await;
    assert!(engine.view().is_empty());
}
