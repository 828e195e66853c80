// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Cart data model: server-confirmed snapshots, lines, and queued mutations.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::time::Instant;

/// Product identifier; unique within a snapshot.
///
/// Backends hand out either numeric or string ids. The id remembers which
/// JSON type it arrived as and serializes back the same way, while equality,
/// ordering and hashing only look at the textual form (so `7` and `"7"` name
/// the same product).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "RawProductId", into = "RawProductId")]
pub struct ProductId {
    raw: String,
    numeric: bool,
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum RawProductId {
    Num(u64),
    Text(String),
}

impl From<RawProductId> for ProductId {
    fn from(raw: RawProductId) -> Self {
        match raw {
            RawProductId::Num(n) => Self::numeric(n),
            RawProductId::Text(s) => Self::new(s),
        }
    }
}

impl From<ProductId> for RawProductId {
    fn from(id: ProductId) -> Self {
        match id.as_u64() {
            Some(n) => Self::Num(n),
            None => Self::Text(id.raw),
        }
    }
}

impl ProductId {
    /// Wrap a textual identifier.
    pub fn new(raw: impl Into<String>) -> Self {
        Self {
            raw: raw.into(),
            numeric: false,
        }
    }

    /// Identifier the backend reports as a JSON number.
    pub fn numeric(n: u64) -> Self {
        Self {
            raw: n.to_string(),
            numeric: true,
        }
    }

    /// Borrow the textual form.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// The numeric value, for ids that arrived as numbers.
    pub fn as_u64(&self) -> Option<u64> {
        if self.numeric {
            self.raw.parse().ok()
        } else {
            None
        }
    }
}

impl PartialEq for ProductId {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl Eq for ProductId {}

impl Hash for ProductId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.raw.hash(state);
    }
}

impl PartialOrd for ProductId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ProductId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.raw.cmp(&other.raw)
    }
}

impl fmt::Display for ProductId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&self.raw)
    }
}

impl From<&str> for ProductId {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

impl From<String> for ProductId {
    fn from(raw: String) -> Self {
        Self::new(raw)
    }
}

/// Server-side cart identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CartId(String);

impl CartId {
    /// Wrap a raw identifier.
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Borrow the raw identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// One product's presence in the cart. `quantity` is always at least 1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartLine {
    /// Product this line refers to.
    pub product: ProductId,
    /// Price of a single unit.
    pub unit_price: f64,
    /// Number of units (>= 1).
    pub quantity: u32,
    /// `unit_price * quantity` as reported by the server (or recomputed in a projection).
    pub line_total: f64,
    /// Display title.
    pub title: String,
    /// Primary image reference, if any.
    pub image: Option<String>,
}

impl CartLine {
    /// Build a line whose total is derived from price and quantity.
    pub fn new(
        product: impl Into<ProductId>,
        unit_price: f64,
        quantity: u32,
        title: impl Into<String>,
    ) -> Self {
        Self {
            product: product.into(),
            unit_price,
            quantity,
            line_total: unit_price * f64::from(quantity),
            title: title.into(),
            image: None,
        }
    }

    fn with_quantity(&self, quantity: u32) -> Self {
        Self {
            quantity,
            line_total: self.unit_price * f64::from(quantity),
            ..self.clone()
        }
    }
}

/// Server-confirmed cart state. Replaced wholesale, never patched in place
/// once adopted as canonical.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct CartSnapshot {
    /// Cart identifier; `None` for the explicit empty cart.
    pub id: Option<CartId>,
    /// Lines in server order.
    pub lines: Vec<CartLine>,
    /// Order total.
    pub total: f64,
}

impl CartSnapshot {
    /// The explicit empty cart (what a 404 on fetch maps to).
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a snapshot whose total is the sum of its line totals.
    pub fn from_lines(id: Option<CartId>, lines: Vec<CartLine>) -> Self {
        let total = lines.iter().map(|l| l.line_total).sum();
        Self { id, lines, total }
    }

    /// Look up the line for `product`.
    pub fn line(&self, product: &ProductId) -> Option<&CartLine> {
        self.lines.iter().find(|l| &l.product == product)
    }

    /// Quantity of `product`, 0 when absent.
    pub fn quantity_of(&self, product: &ProductId) -> u32 {
        self.line(product).map_or(0, |l| l.quantity)
    }

    /// Total number of units across all lines.
    pub fn item_count(&self) -> u64 {
        self.lines.iter().map(|l| u64::from(l.quantity)).sum()
    }

    /// True when the cart has no lines.
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Apply `op` to a copy of this snapshot and return it.
    ///
    /// Lines whose quantity would drop below 1 are removed. A line that is not
    /// already present is never synthesized. Totals are recomputed from the
    /// resulting lines.
    pub fn apply(&self, op: &MutationOp) -> Self {
        let lines = match op {
            MutationOp::Clear => Vec::new(),
            MutationOp::Remove { product } => self
                .lines
                .iter()
                .filter(|l| &l.product != product)
                .cloned()
                .collect(),
            MutationOp::Adjust {
                product, target, ..
            } => {
                if self.line(product).is_none() {
                    return self.clone();
                }
                self.lines
                    .iter()
                    .filter_map(|l| {
                        if &l.product != product {
                            Some(l.clone())
                        } else if *target < 1 {
                            None
                        } else {
                            Some(l.with_quantity(*target))
                        }
                    })
                    .collect()
            }
        };
        Self::from_lines(self.id.clone(), lines)
    }
}

/// Direction of a quantity change relative to the last known quantity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    /// Quantity goes up.
    Increase,
    /// Quantity goes down.
    Decrease,
}

/// Monotonic sequence number assigned at enqueue time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MutationId(pub u64);

impl fmt::Display for MutationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What a queued mutation asks the server to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationOp {
    /// Move `product` to `target` units through `units` single-unit calls.
    Adjust {
        /// Product to adjust.
        product: ProductId,
        /// Requested quantity after this mutation.
        target: u32,
        /// Whether the unit calls increment or decrement.
        direction: Direction,
        /// Number of unit calls (`|target - last known|`).
        units: u32,
    },
    /// Drop every unit of `product`.
    Remove {
        /// Product to remove.
        product: ProductId,
    },
    /// Empty the whole cart.
    Clear,
}

impl MutationOp {
    /// Build an adjustment from the last known quantity to `target`.
    /// Returns `None` when nothing would change.
    pub fn adjust(product: ProductId, last_known: u32, target: u32) -> Option<Self> {
        let direction = match target.cmp(&last_known) {
            Ordering::Greater => Direction::Increase,
            Ordering::Less => Direction::Decrease,
            Ordering::Equal => return None,
        };
        Some(Self::Adjust {
            product,
            target,
            direction,
            units: target.abs_diff(last_known),
        })
    }

    /// The part of an adjustment that `applied` successful unit calls already
    /// carried out. `None` when nothing was applied or the op is not an
    /// adjustment.
    pub fn partial(&self, applied: u32) -> Option<Self> {
        let Self::Adjust {
            product,
            target,
            direction,
            units,
        } = self
        else {
            return None;
        };
        if applied == 0 {
            return None;
        }
        let applied = applied.min(*units);
        let target = match direction {
            Direction::Increase => target.saturating_sub(units - applied),
            Direction::Decrease => target.saturating_add(units - applied),
        };
        Some(Self::Adjust {
            product: product.clone(),
            target,
            direction: *direction,
            units: applied,
        })
    }

    /// Product targeted by this op (`None` for `Clear`).
    pub fn product(&self) -> Option<&ProductId> {
        match self {
            Self::Adjust { product, .. } | Self::Remove { product } => Some(product),
            Self::Clear => None,
        }
    }
}

/// A queued user intent.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingMutation {
    /// FIFO sequence number.
    pub id: MutationId,
    /// Requested change.
    pub op: MutationOp,
    /// When the mutation was enqueued.
    pub enqueued_at: Instant,
}
