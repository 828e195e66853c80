// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! FIFO, single-flight mutation queue.
//!
//! The queue owns three pieces of state: the pending entries, the entry
//! currently in flight, and whether a drain loop holds the claim. Callers may
//! only append; the drain loop is the only one that advances and settles.

use std::collections::VecDeque;
use std::time::Instant;

use crate::error::CartError;
use crate::model::{MutationId, MutationOp, PendingMutation};

/// Ordered sequencer of pending cart mutations.
#[derive(Debug, Default)]
pub struct MutationQueue {
    pending: VecDeque<PendingMutation>,
    in_flight: Option<PendingMutation>,
    draining: bool,
    next_id: u64,
    max_pending: Option<usize>,
}

impl MutationQueue {
    /// Create an unbounded queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a queue that rejects enqueues once `max` entries are pending.
    pub fn bounded(max: usize) -> Self {
        Self {
            max_pending: Some(max),
            ..Self::default()
        }
    }

    /// Append `op` to the tail. Entries are never merged or deduplicated.
    pub fn enqueue(&mut self, op: MutationOp, now: Instant) -> Result<PendingMutation, CartError> {
        if let Some(max) = self.max_pending {
            if self.pending.len() >= max {
                return Err(CartError::QueueFull(self.pending.len()));
            }
        }
        self.next_id += 1;
        let mutation = PendingMutation {
            id: MutationId(self.next_id),
            op,
            enqueued_at: now,
        };
        self.pending.push_back(mutation.clone());
        Ok(mutation)
    }

    /// Claim the drain loop. Returns `false` when one is already running, in
    /// which case the caller must not start another.
    pub fn claim_drain(&mut self) -> bool {
        if self.draining {
            return false;
        }
        self.draining = true;
        true
    }

    /// Move the head into flight and return it.
    ///
    /// Returns `None` while a mutation is still in flight. When nothing is
    /// pending the drain claim is released in the same step, so an enqueue
    /// racing with the end of a drain always starts a fresh loop.
    pub fn advance(&mut self) -> Option<PendingMutation> {
        if self.in_flight.is_some() {
            return None;
        }
        match self.pending.pop_front() {
            Some(head) => {
                self.in_flight = Some(head.clone());
                Some(head)
            }
            None => {
                self.draining = false;
                None
            }
        }
    }

    /// Remove the in-flight mutation, whatever its outcome.
    pub fn settle(&mut self) -> Option<PendingMutation> {
        self.in_flight.take()
    }

    /// Mutation currently sent to the gateway.
    pub fn in_flight(&self) -> Option<&PendingMutation> {
        self.in_flight.as_ref()
    }

    /// Queued mutations not yet started, in FIFO order.
    pub fn pending(&self) -> impl Iterator<Item = &PendingMutation> {
        self.pending.iter()
    }

    /// Number of queued (not in-flight) mutations.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// True when nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// True while a drain loop holds the claim.
    pub fn is_draining(&self) -> bool {
        self.draining
    }
}
