// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Cart synchronization engine: optimistic projection, single-flight drain
//! loop, and reconciliation against the gateway.
//!
//! One `CartEngine` is created per authenticated session and dropped (after
//! [`CartEngine::close`]) on logout. The UI reads [`CartView`]s from a watch
//! channel and listens for [`CartEvent`]s; it only ever appends to the queue.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use tokio::runtime::Handle;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, instrument, warn};

use crate::config::EngineConfig;
use crate::error::{CartError, GatewayError};
use crate::gateway::CartGateway;
use crate::model::{CartSnapshot, Direction, MutationOp, PendingMutation, ProductId};
use crate::queue::MutationQueue;
use crate::store::{FetchTicket, SnapshotStore};

const EVENT_CAPACITY: usize = 256;

/// Read-only state published to the UI after every change.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CartView {
    /// Optimistic cart shown to the user.
    pub projection: CartSnapshot,
    /// Last server-confirmed cart.
    pub canonical: CartSnapshot,
    /// True once a fetch succeeded (including an explicit empty cart).
    pub loaded: bool,
    /// Mutation currently being sent.
    pub in_flight: Option<PendingMutation>,
    /// Mutations waiting behind the in-flight one.
    pub pending: usize,
    /// True while the drain loop runs.
    pub draining: bool,
    /// Mutations whose gateway call failed since the engine was created.
    pub failed: u64,
}

impl CartView {
    /// The "cart is empty" state: loaded and nothing in the projection.
    pub fn is_empty(&self) -> bool {
        self.loaded && self.projection.is_empty()
    }

    /// Quantity of `product` in the projection.
    pub fn quantity_of(&self, product: &ProductId) -> u32 {
        self.projection.quantity_of(product)
    }
}

/// Notifications for the caller layer (toasts, logs, tests).
#[derive(Debug, Clone)]
pub enum CartEvent {
    /// A mutation reached the head and its optimistic change is visible.
    Applied(PendingMutation),
    /// A mutation's gateway call returned.
    Settled {
        /// The mutation that settled.
        mutation: PendingMutation,
        /// Gateway result; failures are not retried.
        outcome: Result<(), GatewayError>,
    },
    /// A fetch succeeded and its snapshot became canonical. Stale fetches
    /// that lost to a newer one are not reported.
    Reconciled(CartSnapshot),
    /// A fetch failed; the previous snapshot is still canonical.
    ReconcileFailed(GatewayError),
}

struct State {
    store: SnapshotStore,
    queue: MutationQueue,
    closed: bool,
    failed: u64,
}

impl State {
    fn rebuild(&mut self) {
        let Self { store, queue, .. } = self;
        store.rebuild(queue.in_flight().into_iter().chain(queue.pending()));
    }

    fn view(&self) -> CartView {
        CartView {
            projection: self.store.projection().clone(),
            canonical: self.store.canonical().clone(),
            loaded: self.store.is_loaded(),
            in_flight: self.queue.in_flight().cloned(),
            pending: self.queue.len(),
            draining: self.queue.is_draining(),
            failed: self.failed,
        }
    }
}

struct Shared<G> {
    gateway: G,
    config: EngineConfig,
    state: Mutex<State>,
    view_tx: watch::Sender<CartView>,
    events: broadcast::Sender<CartEvent>,
}

impl<G> Shared<G>
where
    G: CartGateway,
{
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, state: &State) {
        let view = state.view();
        self.view_tx.send_modify(|current| *current = view);
    }

    fn emit(&self, event: CartEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    async fn call<T>(
        &self,
        fut: impl Future<Output = Result<T, GatewayError>>,
    ) -> Result<T, GatewayError> {
        match self.config.call_timeout {
            Some(limit) => tokio::time::timeout(limit, fut)
                .await
                .map_err(|_| GatewayError::Timeout(limit))?,
            None => fut.await,
        }
    }

    async fn fetch(&self) -> (FetchTicket, Result<CartSnapshot, GatewayError>) {
        let ticket = self.lock().store.issue_ticket();
        let fetched = match self.call(self.gateway.fetch_cart()).await {
            Ok(Some(snapshot)) => Ok(snapshot),
            Ok(None) | Err(GatewayError::NotFound) => Ok(CartSnapshot::empty()),
            Err(err) => Err(err),
        };
        (ticket, fetched)
    }

    async fn reconcile(&self) -> Result<CartSnapshot, GatewayError> {
        let (ticket, fetched) = self.fetch().await;
        match fetched {
            Ok(snapshot) => {
                let (adopted, canonical) = {
                    let mut st = self.lock();
                    let adopted = st.store.adopt(ticket, snapshot);
                    if adopted {
                        st.rebuild();
                        self.publish(&st);
                    } else {
                        debug!(?ticket, "stale cart fetch ignored");
                    }
                    (adopted, st.store.canonical().clone())
                };
                if adopted {
                    self.emit(CartEvent::Reconciled(canonical.clone()));
                }
                Ok(canonical)
            }
            Err(err) => {
                warn!(%err, "cart reconciliation failed; keeping previous snapshot");
                self.emit(CartEvent::ReconcileFailed(err.clone()));
                Err(err)
            }
        }
    }

    /// Perform the gateway side of `mutation` as unit calls.
    ///
    /// Returns how many unit calls succeeded alongside the outcome, so a
    /// partly applied adjustment can still be accounted for.
    async fn send(&self, mutation: &PendingMutation) -> (u32, Result<(), GatewayError>) {
        match &mutation.op {
            MutationOp::Adjust {
                product,
                direction,
                units,
                ..
            } => {
                for applied in 0..*units {
                    let sent = match direction {
                        Direction::Increase => {
                            self.call(self.gateway.increment_item(product)).await
                        }
                        Direction::Decrease => {
                            self.call(self.gateway.decrement_item(product)).await
                        }
                    };
                    if let Err(err) = sent {
                        return (applied, Err(err));
                    }
                }
                (*units, Ok(()))
            }
            MutationOp::Remove { product } => {
                let quantity = self.lock().store.settled_quantity(product);
                if quantity == 0 {
                    debug!(%product, "remove skipped; product not in settled cart");
                    return (0, Ok(()));
                }
                let sent = self.call(self.gateway.remove_item(product, quantity)).await;
                (u32::from(sent.is_ok()), sent)
            }
            MutationOp::Clear => {
                let sent = self.call(self.gateway.clear_cart()).await;
                (u32::from(sent.is_ok()), sent)
            }
        }
    }
}

async fn drain<G>(shared: Arc<Shared<G>>)
where
    G: CartGateway,
{
    loop {
        let next = {
            let mut st = shared.lock();
            let next = st.queue.advance();
            st.rebuild();
            shared.publish(&st);
            next
        };
        let Some(mutation) = next else {
            debug!("mutation queue drained");
            return;
        };
        debug!(id = %mutation.id, op = ?mutation.op, "applying mutation");
        shared.emit(CartEvent::Applied(mutation.clone()));

        let (applied, outcome) = shared.send(&mutation).await;
        if let Err(err) = &outcome {
            warn!(id = %mutation.id, applied, %err, "mutation failed; dropping and resyncing");
        }

        let (ticket, fetched) = shared.fetch().await;
        let adopted = {
            let mut st = shared.lock();
            st.queue.settle();
            if outcome.is_err() {
                st.failed += 1;
            }
            let adopted = match &fetched {
                Ok(snapshot) => {
                    let adopted = st.store.adopt(ticket, snapshot.clone());
                    if !adopted {
                        debug!(?ticket, "stale cart fetch ignored");
                    }
                    adopted
                }
                Err(_) if outcome.is_ok() => {
                    st.store.hold_unconfirmed(mutation.clone());
                    false
                }
                Err(_) => {
                    // Units the server already took stay visible until a fetch
                    // confirms them.
                    if let Some(op) = mutation.op.partial(applied) {
                        st.store.hold_unconfirmed(PendingMutation {
                            op,
                            ..mutation.clone()
                        });
                    }
                    false
                }
            };
            st.rebuild();
            shared.publish(&st);
            adopted
        };

        shared.emit(CartEvent::Settled { mutation, outcome });
        match fetched {
            Ok(snapshot) if adopted => shared.emit(CartEvent::Reconciled(snapshot)),
            Ok(_) => {}
            Err(err) => {
                warn!(%err, "cart reconciliation failed; keeping previous snapshot");
                shared.emit(CartEvent::ReconcileFailed(err));
            }
        }
    }
}

/// Handle to a session's cart engine. Cheap to clone.
pub struct CartEngine<G> {
    shared: Arc<Shared<G>>,
}

impl<G> Clone for CartEngine<G> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<G> CartEngine<G>
where
    G: CartGateway + 'static,
{
    /// Create an engine for one authenticated session.
    pub fn new(gateway: G, config: EngineConfig) -> Self {
        let queue = match config.max_pending {
            Some(max) => MutationQueue::bounded(max),
            None => MutationQueue::new(),
        };
        let state = State {
            store: SnapshotStore::new(),
            queue,
            closed: false,
            failed: 0,
        };
        let (view_tx, _) = watch::channel(state.view());
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            shared: Arc::new(Shared {
                gateway,
                config,
                state: Mutex::new(state),
                view_tx,
                events,
            }),
        }
    }

    /// Current view.
    pub fn view(&self) -> CartView {
        self.shared.view_tx.borrow().clone()
    }

    /// Watch the view as it changes.
    pub fn subscribe(&self) -> watch::Receiver<CartView> {
        self.shared.view_tx.subscribe()
    }

    /// Receive settle and failure events.
    pub fn events(&self) -> broadcast::Receiver<CartEvent> {
        self.shared.events.subscribe()
    }

    /// Initial load; same as [`Self::reconcile`].
    pub async fn load(&self) -> Result<CartSnapshot, CartError> {
        self.reconcile().await
    }

    /// Fetch the canonical cart and adopt it.
    ///
    /// A "not found" answer becomes the explicit empty cart. On failure the
    /// previous snapshot stays canonical and the error is returned (and
    /// broadcast as [`CartEvent::ReconcileFailed`]).
    #[instrument(skip(self))]
    pub async fn reconcile(&self) -> Result<CartSnapshot, CartError> {
        Ok(self.shared.reconcile().await?)
    }

    /// Queue a one-unit increase. `Ok(None)` if the product is not in the cart.
    pub fn increment(
        &self,
        product: impl Into<ProductId>,
    ) -> Result<Option<PendingMutation>, CartError> {
        let product = product.into();
        self.enqueue_with(|projection| {
            let line = projection.line(&product)?;
            MutationOp::adjust(
                line.product.clone(),
                line.quantity,
                line.quantity.saturating_add(1),
            )
        })
    }

    /// Queue a one-unit decrease. Going from 1 to 0 removes the line;
    /// decrementing an absent product is a no-op (`Ok(None)`).
    pub fn decrement(
        &self,
        product: impl Into<ProductId>,
    ) -> Result<Option<PendingMutation>, CartError> {
        let product = product.into();
        self.enqueue_with(|projection| {
            let line = projection.line(&product)?;
            MutationOp::adjust(line.product.clone(), line.quantity, line.quantity - 1)
        })
    }

    /// Queue a jump to `quantity` (fanned out into unit calls when sent).
    ///
    /// `quantity` must be at least 1; use [`Self::remove`] to drop a line.
    pub fn set_quantity(
        &self,
        product: impl Into<ProductId>,
        quantity: u32,
    ) -> Result<Option<PendingMutation>, CartError> {
        if quantity < 1 {
            return Err(CartError::InvalidQuantity(quantity));
        }
        let product = product.into();
        self.enqueue_with(|projection| {
            let line = projection.line(&product)?;
            MutationOp::adjust(line.product.clone(), line.quantity, quantity)
        })
    }

    /// Queue removal of every unit of `product`.
    pub fn remove(&self, product: impl Into<ProductId>) -> Result<PendingMutation, CartError> {
        let product = product.into();
        self.enqueue(|projection| MutationOp::Remove {
            product: projection
                .line(&product)
                .map(|line| line.product.clone())
                .unwrap_or(product),
        })
    }

    /// Queue emptying the whole cart.
    pub fn clear(&self) -> Result<PendingMutation, CartError> {
        self.enqueue(|_| MutationOp::Clear)
    }

    /// Resolve once the drain loop has stopped with nothing left queued.
    pub async fn idle(&self) {
        let mut rx = self.shared.view_tx.subscribe();
        // The sender lives as long as `self`, so this cannot fail.
        let _ = rx.wait_for(|view| !view.draining).await;
    }

    /// End the session: further enqueues fail with [`CartError::Closed`].
    /// Work already queued still drains.
    pub fn close(&self) {
        let mut st = self.shared.lock();
        if !st.closed {
            st.closed = true;
            info!(pending = st.queue.len(), "cart engine closed");
        }
    }

    fn enqueue_with(
        &self,
        build: impl FnOnce(&CartSnapshot) -> Option<MutationOp>,
    ) -> Result<Option<PendingMutation>, CartError> {
        let runtime = Handle::try_current().map_err(|_| CartError::NoRuntime)?;
        let (mutation, start) = {
            let mut st = self.shared.lock();
            if st.closed {
                return Err(CartError::Closed);
            }
            let Some(op) = build(st.store.projection()) else {
                return Ok(None);
            };
            self.push(&mut st, op)?
        };
        if start {
            runtime.spawn(drain(Arc::clone(&self.shared)));
        }
        Ok(Some(mutation))
    }

    fn enqueue(
        &self,
        build: impl FnOnce(&CartSnapshot) -> MutationOp,
    ) -> Result<PendingMutation, CartError> {
        let runtime = Handle::try_current().map_err(|_| CartError::NoRuntime)?;
        let (mutation, start) = {
            let mut st = self.shared.lock();
            if st.closed {
                return Err(CartError::Closed);
            }
            let op = build(st.store.projection());
            self.push(&mut st, op)?
        };
        if start {
            runtime.spawn(drain(Arc::clone(&self.shared)));
        }
        Ok(mutation)
    }

    fn push(&self, st: &mut State, op: MutationOp) -> Result<(PendingMutation, bool), CartError> {
        let mutation = st.queue.enqueue(op, Instant::now())?;
        debug!(id = %mutation.id, op = ?mutation.op, "mutation queued");
        st.rebuild();
        let start = st.queue.claim_drain();
        self.shared.publish(st);
        Ok((mutation, start))
    }
}
