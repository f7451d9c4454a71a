//! Order and order-book model.
//!
//! # Responsibility
//! - Define order lines, orders and the queued/processed order book.
//! - Provide queue selection and the derived revenue figure.
//!
//! # Invariants
//! - An order is never in both `queued` and `processed`.
//! - Queue order is `created_at ASC, id ASC`; processed order is completion
//!   order.
//! - Revenue is derived on demand and never stored.

use crate::model::item::{Inventory, ItemId};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Generated order primary key.
pub type OrderId = i64;

/// Most lines one order may carry; line numbers stay below the
/// per-order correlation id block.
pub const MAX_ORDER_LINES: usize = 999;

/// One requested quantity of one item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub item_id: ItemId,
    pub quantity: Decimal,
}

impl OrderLine {
    pub fn new(item_id: impl Into<ItemId>, quantity: Decimal) -> Self {
        Self {
            item_id: item_id.into(),
            quantity,
        }
    }

    /// Returns the quantity as a robot repeat count.
    ///
    /// `None` for zero, negative, fractional or out-of-range quantities.
    pub fn whole_quantity(&self) -> Option<u32> {
        if self.quantity <= Decimal::ZERO || !self.quantity.fract().is_zero() {
            return None;
        }
        self.quantity.to_u32()
    }
}

/// Which order-book list an order belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderState {
    Queued,
    Processed,
}

impl OrderState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Processed => "processed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "queued" => Some(Self::Queued),
            "processed" => Some(Self::Processed),
            _ => None,
        }
    }
}

/// Customer order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    /// Unix epoch milliseconds.
    pub created_at: i64,
    pub lines: Vec<OrderLine>,
}

impl Order {
    /// Sort key used for queue selection.
    pub fn queue_key(&self) -> (i64, OrderId) {
        (self.created_at, self.id)
    }

    /// Sum of `quantity * unit_price` over lines whose item is known.
    pub fn value(&self, inventory: &Inventory) -> Decimal {
        self.lines
            .iter()
            .filter_map(|line| {
                inventory
                    .get(&line.item_id)
                    .map(|item| line.quantity * item.unit_price)
            })
            .sum()
    }
}

/// Aggregate root holding queued and processed orders.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBook {
    pub queued: Vec<Order>,
    pub processed: Vec<Order>,
}

impl OrderBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Earliest queued order, ties broken by id.
    pub fn next_queued(&self) -> Option<&Order> {
        self.queued.iter().min_by_key(|order| order.queue_key())
    }

    /// Moves one order from the queue to the end of the processed list.
    ///
    /// Returns `false` when `id` is not queued; the book is left untouched.
    pub fn mark_processed(&mut self, id: OrderId) -> bool {
        let Some(position) = self.queued.iter().position(|order| order.id == id) else {
            return false;
        };
        let order = self.queued.remove(position);
        self.processed.push(order);
        true
    }

    /// Total number of orders across both lists.
    pub fn order_count(&self) -> usize {
        self.queued.len() + self.processed.len()
    }

    /// Revenue over processed orders, priced from `inventory`.
    pub fn total_revenue(&self, inventory: &Inventory) -> Decimal {
        self.processed
            .iter()
            .map(|order| order.value(inventory))
            .sum()
    }
}

/// Current wall-clock time in Unix epoch milliseconds.
pub fn epoch_ms_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}
