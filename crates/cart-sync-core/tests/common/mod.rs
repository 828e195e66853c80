// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use cart_sync_core::{
    CartGateway, CartId, CartLine, CartSnapshot, GatewayError, ProductId,
};
use tokio::sync::Semaphore;

/// One call observed by the fake server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Fetch,
    Increment(ProductId),
    Decrement(ProductId),
    Remove(ProductId, u32),
    Clear,
}

impl Call {
    pub fn is_mutation(&self) -> bool {
        !matches!(self, Call::Fetch)
    }
}

#[derive(Default)]
struct Server {
    lines: Vec<CartLine>,
    calls: Vec<Call>,
    outstanding: usize,
    max_outstanding: usize,
    failing: HashSet<ProductId>,
    /// Successful calls left before a product's one failing call.
    failing_after: HashMap<ProductId, u32>,
    hanging: HashSet<ProductId>,
    fetch_failures: VecDeque<GatewayError>,
}

/// In-memory stand-in for the remote cart.
///
/// The cart 404s (fetch returns `None`) whenever it has no lines. Mutation
/// calls can be gated so a test can hold one in flight.
pub struct FakeGateway {
    server: Mutex<Server>,
    gate: Option<Semaphore>,
}

impl FakeGateway {
    pub fn new(lines: Vec<CartLine>) -> Arc<Self> {
        Arc::new(Self {
            server: Mutex::new(Server {
                lines,
                ..Server::default()
            }),
            gate: None,
        })
    }

    /// Every mutation call waits for a permit from [`Self::release`].
    pub fn gated(lines: Vec<CartLine>) -> Arc<Self> {
        Arc::new(Self {
            server: Mutex::new(Server {
                lines,
                ..Server::default()
            }),
            gate: Some(Semaphore::new(0)),
        })
    }

    pub fn release(&self, permits: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(permits);
        }
    }

    pub fn fail_product(&self, product: &str) {
        self.server.lock().unwrap().failing.insert(product.into());
    }

    /// Let `ok_calls` more mutations on `product` through, fail the next one,
    /// then behave normally again.
    pub fn fail_once_after(&self, product: &str, ok_calls: u32) {
        self.server
            .lock()
            .unwrap()
            .failing_after
            .insert(product.into(), ok_calls);
    }

    pub fn hang_product(&self, product: &str) {
        self.server.lock().unwrap().hanging.insert(product.into());
    }

    pub fn fail_next_fetch(&self, err: GatewayError) {
        self.server.lock().unwrap().fetch_failures.push_back(err);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.server.lock().unwrap().calls.clone()
    }

    pub fn mutation_calls(&self) -> Vec<Call> {
        self.calls().into_iter().filter(Call::is_mutation).collect()
    }

    pub fn max_outstanding(&self) -> usize {
        self.server.lock().unwrap().max_outstanding
    }

    pub fn snapshot(&self) -> CartSnapshot {
        let lines = self.server.lock().unwrap().lines.clone();
        CartSnapshot::from_lines(Some(CartId::new("cart-1")), lines)
    }

    async fn mutate(
        &self,
        call: Call,
        apply: impl FnOnce(&mut Vec<CartLine>) -> Result<(), GatewayError>,
    ) -> Result<(), GatewayError> {
        let product = match &call {
            Call::Increment(p) | Call::Decrement(p) | Call::Remove(p, _) => Some(p.clone()),
            Call::Fetch | Call::Clear => None,
        };
        let (fail, hang) = {
            let mut s = self.server.lock().unwrap();
            s.calls.push(call);
            s.outstanding += 1;
            s.max_outstanding = s.max_outstanding.max(s.outstanding);
            let mut fail = product.as_ref().is_some_and(|p| s.failing.contains(p));
            if let Some(p) = product.as_ref() {
                match s.failing_after.get(p).copied() {
                    Some(0) => {
                        s.failing_after.remove(p);
                        fail = true;
                    }
                    Some(left) => {
                        s.failing_after.insert(p.clone(), left - 1);
                    }
                    None => {}
                }
            }
            let hang = product.as_ref().is_some_and(|p| s.hanging.contains(p));
            (fail, hang)
        };
        if hang {
            std::future::pending::<()>().await;
        }
        if let Some(gate) = &self.gate {
            gate.acquire().await.unwrap().forget();
        }
        tokio::task::yield_now().await;
        let mut s = self.server.lock().unwrap();
        s.outstanding -= 1;
        if fail {
            return Err(GatewayError::Status(500));
        }
        apply(&mut s.lines)
    }
}

fn reprice(line: &mut CartLine) {
    line.line_total = line.unit_price * f64::from(line.quantity);
}

fn take_units(lines: &mut Vec<CartLine>, product: &ProductId, n: u32) -> Result<(), GatewayError> {
    let idx = lines
        .iter()
        .position(|l| &l.product == product)
        .ok_or(GatewayError::NotFound)?;
    if lines[idx].quantity <= n {
        lines.remove(idx);
    } else {
        lines[idx].quantity -= n;
        reprice(&mut lines[idx]);
    }
    Ok(())
}

#[async_trait]
impl CartGateway for FakeGateway {
    async fn fetch_cart(&self) -> Result<Option<CartSnapshot>, GatewayError> {
        let mut s = self.server.lock().unwrap();
        s.calls.push(Call::Fetch);
        if let Some(err) = s.fetch_failures.pop_front() {
            return Err(err);
        }
        if s.lines.is_empty() {
            return Ok(None);
        }
        Ok(Some(CartSnapshot::from_lines(
            Some(CartId::new("cart-1")),
            s.lines.clone(),
        )))
    }

    async fn increment_item(&self, product: &ProductId) -> Result<(), GatewayError> {
        let p = product.clone();
        self.mutate(Call::Increment(p.clone()), move |lines| {
            let line = lines
                .iter_mut()
                .find(|l| l.product == p)
                .ok_or(GatewayError::NotFound)?;
            line.quantity += 1;
            reprice(line);
            Ok(())
        })
        .await
    }

    async fn decrement_item(&self, product: &ProductId) -> Result<(), GatewayError> {
        let p = product.clone();
        self.mutate(Call::Decrement(p.clone()), move |lines| {
            take_units(lines, &p, 1)
        })
        .await
    }

    async fn remove_item(&self, product: &ProductId, quantity: u32) -> Result<(), GatewayError> {
        let p = product.clone();
        self.mutate(Call::Remove(p.clone(), quantity), move |lines| {
            take_units(lines, &p, quantity)
        })
        .await
    }

    async fn clear_cart(&self) -> Result<(), GatewayError> {
        self.mutate(Call::Clear, |lines| {
            lines.clear();
            Ok(())
        })
        .await
    }
}

pub fn line(product: &str, price: f64, quantity: u32) -> CartLine {
    CartLine::new(product, price, quantity, format!("Product {product}"))
}
