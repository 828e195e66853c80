// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Canonical snapshot plus the optimistic working projection derived from it.

use crate::model::{CartSnapshot, PendingMutation, ProductId};

/// Ordering token for a cart fetch. Later tickets win.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct FetchTicket(u64);

/// Holds the last server-confirmed cart and the view shown to the user.
///
/// Only the reconciliation path writes the canonical snapshot. The projection
/// is always canonical + overlay and is thrown away on every rebuild.
#[derive(Debug, Default)]
pub struct SnapshotStore {
    canonical: CartSnapshot,
    projection: CartSnapshot,
    loaded: bool,
    /// Mutations the server accepted whose follow-up fetch failed.
    unconfirmed: Vec<PendingMutation>,
    issued: u64,
    adopted: u64,
}

impl SnapshotStore {
    /// Empty, not-yet-loaded store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Last server-confirmed snapshot.
    pub fn canonical(&self) -> &CartSnapshot {
        &self.canonical
    }

    /// Current optimistic view.
    pub fn projection(&self) -> &CartSnapshot {
        &self.projection
    }

    /// True once any snapshot (including the explicit empty cart) was adopted.
    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// Replace the canonical snapshot wholesale.
    ///
    /// Clears the unconfirmed overlay and resets the projection to the new
    /// snapshot; callers re-apply in-flight work with [`Self::rebuild`].
    pub fn set_snapshot(&mut self, snapshot: CartSnapshot) {
        self.projection = snapshot.clone();
        self.canonical = snapshot;
        self.loaded = true;
        self.unconfirmed.clear();
    }

    /// Hand out a ticket for a fetch about to be issued.
    pub fn issue_ticket(&mut self) -> FetchTicket {
        self.issued += 1;
        FetchTicket(self.issued)
    }

    /// Adopt `snapshot` if `ticket` is newer than the last adopted fetch.
    /// Returns `false` (and changes nothing) for stale results.
    pub fn adopt(&mut self, ticket: FetchTicket, snapshot: CartSnapshot) -> bool {
        if ticket.0 <= self.adopted {
            return false;
        }
        self.adopted = ticket.0;
        self.set_snapshot(snapshot);
        true
    }

    /// Canonical snapshot with `mutation` applied. Pure; the store is untouched.
    pub fn project(&self, mutation: &PendingMutation) -> CartSnapshot {
        self.canonical.apply(&mutation.op)
    }

    /// Canonical snapshot plus mutations the server accepted but no fetch has
    /// confirmed yet.
    pub fn settled_view(&self) -> CartSnapshot {
        self.unconfirmed
            .iter()
            .fold(self.canonical.clone(), |acc, m| acc.apply(&m.op))
    }

    /// Quantity of `product` in the settled view.
    pub fn settled_quantity(&self, product: &ProductId) -> u32 {
        self.settled_view().quantity_of(product)
    }

    /// Keep `mutation` visible until the next adopted snapshot.
    pub fn hold_unconfirmed(&mut self, mutation: PendingMutation) {
        self.unconfirmed.push(mutation);
    }

    /// Recompute the projection as settled view + `overlay`, in order.
    pub fn rebuild<'a>(&mut self, overlay: impl IntoIterator<Item = &'a PendingMutation>) {
        self.projection = overlay
            .into_iter()
            .fold(self.settled_view(), |acc, m| acc.apply(&m.op));
    }
}
