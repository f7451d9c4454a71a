//! Inventory and order-book store contracts and SQLite implementation.
//!
//! # Responsibility
//! - Load the order book and inventory as whole aggregates.
//! - Persist queue transitions and stock changes in one transaction.
//! - Seed, reset and append orders.
//!
//! # Invariants
//! - `save_all` writes only mutable state: item quantities and order
//!   membership. Prices, kinds and lines are immutable after creation.
//! - Queued orders load as `created_at ASC, id ASC`; processed orders load in
//!   completion order.
//! - Every public operation retries transient lock errors per `RetryPolicy`.

use crate::db::{DbResult, RetryPolicy};
use crate::model::item::{Inventory, Item, ItemKind};
use crate::model::order::{Order, OrderBook, OrderId, OrderLine, OrderState, MAX_ORDER_LINES};
use crate::repo::seed::{seed_items, seed_orders};
use crate::repo::{StoreError, StoreResult};
use log::{error, info};
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction, TransactionBehavior};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Instant;

const ITEM_SELECT_SQL: &str = "SELECT
    id,
    kind,
    unit_price,
    quantity,
    location,
    measurement_unit,
    weight,
    sort_class
FROM items";

/// Store interface used by the fulfillment workflow and the app layer.
pub trait InventoryStore {
    /// Loads queued and processed orders with their lines.
    fn load_order_book(&self) -> StoreResult<OrderBook>;
    /// Loads every stock item.
    fn load_inventory(&self) -> StoreResult<Inventory>;
    /// Persists order membership and item quantities atomically.
    fn save_all(&self, book: &OrderBook, inventory: &Inventory) -> StoreResult<()>;
    /// Replaces items and orders with the seed data set.
    fn reset_to_seed(&self) -> StoreResult<()>;
    /// Seeds only when no items and no orders exist. Returns whether it seeded.
    fn ensure_seed_data(&self) -> StoreResult<bool>;
    /// Appends one queued order and returns its generated id.
    fn submit_order(&self, created_at: i64, lines: &[OrderLine]) -> StoreResult<OrderId>;
    /// Round-trips a trivial query.
    fn check_connection(&self) -> StoreResult<()>;
}

/// SQLite-backed inventory store.
pub struct SqliteInventoryStore<'conn> {
    conn: &'conn Connection,
    retry: RetryPolicy,
}

impl<'conn> SqliteInventoryStore<'conn> {
    /// Creates a store over a migrated connection with the default retry budget.
    pub fn new(conn: &'conn Connection) -> Self {
        Self::with_retry(conn, RetryPolicy::default())
    }

    pub fn with_retry(conn: &'conn Connection, retry: RetryPolicy) -> Self {
        Self { conn, retry }
    }

    fn run<T>(&self, operation: &str, op: impl FnMut() -> StoreResult<T>) -> StoreResult<T> {
        let started_at = Instant::now();
        let result = self.retry.run(operation, op, StoreError::is_transient);
        match &result {
            Ok(_) => info!(
                "event=store_op module=repo status=ok operation={} duration_ms={}",
                operation,
                started_at.elapsed().as_millis()
            ),
            Err(err) => error!(
                "event=store_op module=repo status=error operation={} duration_ms={} transient={} error={}",
                operation,
                started_at.elapsed().as_millis(),
                err.is_transient(),
                err
            ),
        }
        result
    }

    fn begin(&self, behavior: TransactionBehavior) -> DbResult<Transaction<'conn>> {
        Ok(Transaction::new_unchecked(self.conn, behavior)?)
    }
}

impl InventoryStore for SqliteInventoryStore<'_> {
    fn load_order_book(&self) -> StoreResult<OrderBook> {
        self.run("load_order_book", || {
            let tx = self.begin(TransactionBehavior::Deferred)?;
            let book = read_order_book(&tx)?;
            tx.commit()?;
            Ok(book)
        })
    }

    fn load_inventory(&self) -> StoreResult<Inventory> {
        self.run("load_inventory", || read_inventory(self.conn))
    }

    fn save_all(&self, book: &OrderBook, inventory: &Inventory) -> StoreResult<()> {
        self.run("save_all", || {
            let tx = self.begin(TransactionBehavior::Immediate)?;
            write_inventory(&tx, inventory)?;
            write_order_membership(&tx, book)?;
            tx.commit()?;
            Ok(())
        })
    }

    fn reset_to_seed(&self) -> StoreResult<()> {
        self.run("reset_to_seed", || {
            let tx = self.begin(TransactionBehavior::Immediate)?;
            tx.execute_batch(
                "DELETE FROM order_lines;
                 DELETE FROM orders;
                 DELETE FROM items;
                 DELETE FROM sqlite_sequence WHERE name IN ('orders', 'order_lines');",
            )?;
            write_seed(&tx)?;
            tx.commit()?;
            Ok(())
        })
    }

    fn ensure_seed_data(&self) -> StoreResult<bool> {
        self.run("ensure_seed_data", || {
            let tx = self.begin(TransactionBehavior::Immediate)?;
            let populated: bool = tx.query_row(
                "SELECT EXISTS(SELECT 1 FROM items) OR EXISTS(SELECT 1 FROM orders);",
                [],
                |row| row.get(0),
            )?;
            if populated {
                return Ok(false);
            }
            write_seed(&tx)?;
            tx.commit()?;
            Ok(true)
        })
    }

    fn submit_order(&self, created_at: i64, lines: &[OrderLine]) -> StoreResult<OrderId> {
        if lines.is_empty() {
            return Err(StoreError::InvalidOrder(
                "an order needs at least one line".to_string(),
            ));
        }
        if lines.len() > MAX_ORDER_LINES {
            return Err(StoreError::InvalidOrder(format!(
                "an order may have at most {MAX_ORDER_LINES} lines, got {}",
                lines.len()
            )));
        }
        if let Some(line) = lines.iter().find(|line| line.quantity <= Decimal::ZERO) {
            return Err(StoreError::InvalidOrder(format!(
                "quantity for `{}` must be positive, got {}",
                line.item_id, line.quantity
            )));
        }

        self.run("submit_order", || {
            let tx = self.begin(TransactionBehavior::Immediate)?;
            for line in lines {
                let known: Option<i64> = tx
                    .query_row(
                        "SELECT 1 FROM items WHERE id = ?1;",
                        [line.item_id.as_str()],
                        |row| row.get(0),
                    )
                    .optional()?;
                if known.is_none() {
                    return Err(StoreError::UnknownItem(line.item_id.clone()));
                }
            }
            let order_id = insert_order(&tx, created_at, lines)?;
            tx.commit()?;
            Ok(order_id)
        })
    }

    fn check_connection(&self) -> StoreResult<()> {
        self.run("check_connection", || {
            let one: i64 = self.conn.query_row("SELECT 1;", [], |row| row.get(0))?;
            if one == 1 {
                Ok(())
            } else {
                Err(StoreError::InvalidData(format!(
                    "connection probe returned {one}"
                )))
            }
        })
    }
}

fn read_inventory(conn: &Connection) -> StoreResult<Inventory> {
    let mut stmt = conn.prepare(&format!("{ITEM_SELECT_SQL} ORDER BY id ASC;"))?;
    let mut rows = stmt.query([])?;
    let mut inventory = Inventory::new();
    while let Some(row) = rows.next()? {
        inventory.insert(parse_item_row(row)?);
    }
    Ok(inventory)
}

fn read_order_book(conn: &Connection) -> StoreResult<OrderBook> {
    let mut lines_by_order = read_order_lines(conn)?;
    let mut stmt = conn.prepare(
        "SELECT id, created_at, state
         FROM orders
         ORDER BY
            CASE state WHEN 'queued' THEN 0 ELSE 1 END,
            CASE state WHEN 'queued' THEN created_at ELSE processed_seq END,
            id ASC;",
    )?;
    let mut rows = stmt.query([])?;
    let mut book = OrderBook::new();

    while let Some(row) = rows.next()? {
        let id: OrderId = row.get("id")?;
        let state_text: String = row.get("state")?;
        let state = OrderState::parse(&state_text).ok_or_else(|| {
            StoreError::InvalidData(format!("invalid order state `{state_text}` in orders.state"))
        })?;
        let order = Order {
            id,
            created_at: row.get("created_at")?,
            lines: lines_by_order.remove(&id).unwrap_or_default(),
        };
        match state {
            OrderState::Queued => book.queued.push(order),
            OrderState::Processed => book.processed.push(order),
        }
    }

    Ok(book)
}

fn read_order_lines(conn: &Connection) -> StoreResult<HashMap<OrderId, Vec<OrderLine>>> {
    let mut stmt = conn.prepare(
        "SELECT order_id, item_id, quantity
         FROM order_lines
         ORDER BY order_id ASC, line_no ASC;",
    )?;
    let mut rows = stmt.query([])?;
    let mut lines: HashMap<OrderId, Vec<OrderLine>> = HashMap::new();
    while let Some(row) = rows.next()? {
        let order_id: OrderId = row.get("order_id")?;
        let quantity = parse_decimal(row, "quantity", "order_lines.quantity")?;
        lines
            .entry(order_id)
            .or_default()
            .push(OrderLine::new(row.get::<_, String>("item_id")?, quantity));
    }
    Ok(lines)
}

fn write_inventory(tx: &Transaction<'_>, inventory: &Inventory) -> StoreResult<()> {
    let mut stmt = tx.prepare("UPDATE items SET quantity = ?1 WHERE id = ?2;")?;
    for item in inventory.items() {
        item.validate()?;
        let changed = stmt.execute(params![item.quantity.to_string(), item.id.as_str()])?;
        if changed == 0 {
            return Err(StoreError::Conflict(format!(
                "item `{}` no longer exists",
                item.id
            )));
        }
    }
    Ok(())
}

fn write_order_membership(tx: &Transaction<'_>, book: &OrderBook) -> StoreResult<()> {
    let mut requeue = tx.prepare(
        "UPDATE orders
         SET state = 'queued', processed_seq = NULL
         WHERE id = ?1 AND state = 'queued';",
    )?;
    for order in &book.queued {
        if requeue.execute([order.id])? == 0 {
            return Err(StoreError::Conflict(format!(
                "order {} is missing or already processed",
                order.id
            )));
        }
    }

    // A processed order must either still be queued (this save completes it)
    // or already sit at the same completion slot.
    let mut complete = tx.prepare(
        "UPDATE orders
         SET state = 'processed', processed_seq = ?2
         WHERE id = ?1 AND (state = 'queued' OR processed_seq = ?2);",
    )?;
    for (index, order) in book.processed.iter().enumerate() {
        let seq = i64::try_from(index).unwrap_or(i64::MAX - 1) + 1;
        if complete.execute(params![order.id, seq])? == 0 {
            return Err(StoreError::Conflict(format!(
                "order {} is missing or was processed elsewhere",
                order.id
            )));
        }
    }
    Ok(())
}

fn write_seed(tx: &Transaction<'_>) -> StoreResult<()> {
    for item in seed_items() {
        insert_item(tx, &item)?;
    }
    for order in seed_orders(crate::model::order::epoch_ms_now()) {
        insert_order(tx, order.created_at, &order.lines)?;
    }
    info!("event=store_seed module=repo status=ok");
    Ok(())
}

fn insert_item(tx: &Transaction<'_>, item: &Item) -> StoreResult<()> {
    item.validate()?;
    let (unit, weight) = match &item.kind {
        ItemKind::Simple => (None, None),
        ItemKind::BulkMeasured { unit } => (Some(unit.as_str()), None),
        ItemKind::UnitWeighted { weight } => (None, Some(*weight)),
    };
    tx.execute(
        "INSERT INTO items (
            id,
            kind,
            unit_price,
            quantity,
            location,
            measurement_unit,
            weight,
            sort_class
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8);",
        params![
            item.id.as_str(),
            item.kind.discriminant(),
            item.unit_price.to_string(),
            item.quantity.to_string(),
            item.location,
            unit,
            weight,
            item.class_tag.as_deref(),
        ],
    )?;
    Ok(())
}

/// Inserts one queued order plus its lines inside an open transaction.
fn insert_order(
    tx: &Transaction<'_>,
    created_at: i64,
    lines: &[OrderLine],
) -> StoreResult<OrderId> {
    tx.execute(
        "INSERT INTO orders (created_at, state) VALUES (?1, 'queued');",
        [created_at],
    )?;
    let order_id = tx.last_insert_rowid();
    let mut stmt = tx.prepare(
        "INSERT INTO order_lines (order_id, line_no, item_id, quantity)
         VALUES (?1, ?2, ?3, ?4);",
    )?;
    for (index, line) in lines.iter().enumerate() {
        stmt.execute(params![
            order_id,
            i64::try_from(index).unwrap_or(i64::MAX - 1) + 1,
            line.item_id.as_str(),
            line.quantity.to_string(),
        ])?;
    }
    Ok(order_id)
}

fn parse_item_row(row: &Row<'_>) -> StoreResult<Item> {
    let id: String = row.get("id")?;
    let kind_text: String = row.get("kind")?;
    let kind = match kind_text.as_str() {
        "simple" => ItemKind::Simple,
        "bulk_measured" => ItemKind::BulkMeasured {
            unit: row
                .get::<_, Option<String>>("measurement_unit")?
                .ok_or_else(|| {
                    StoreError::InvalidData(format!(
                        "bulk item `{id}` has no items.measurement_unit"
                    ))
                })?,
        },
        "unit_weighted" => ItemKind::UnitWeighted {
            weight: row.get::<_, Option<f64>>("weight")?.ok_or_else(|| {
                StoreError::InvalidData(format!("unit item `{id}` has no items.weight"))
            })?,
        },
        other => {
            return Err(StoreError::InvalidData(format!(
                "invalid item kind `{other}` in items.kind"
            )));
        }
    };

    let location: i64 = row.get("location")?;
    let location = u32::try_from(location).map_err(|_| {
        StoreError::InvalidData(format!("invalid location `{location}` in items.location"))
    })?;

    Ok(Item {
        unit_price: parse_decimal(row, "unit_price", "items.unit_price")?,
        quantity: parse_decimal(row, "quantity", "items.quantity")?,
        id,
        kind,
        location,
        class_tag: row.get("sort_class")?,
    })
}

fn parse_decimal(row: &Row<'_>, column: &str, label: &str) -> StoreResult<Decimal> {
    let text: String = row.get(column)?;
    Decimal::from_str(&text)
        .map_err(|_| StoreError::InvalidData(format!("invalid decimal `{text}` in {label}")))
}

impl<S: InventoryStore + ?Sized> InventoryStore for &S {
    fn load_order_book(&self) -> StoreResult<OrderBook> {
        (**self).load_order_book()
    }

    fn load_inventory(&self) -> StoreResult<Inventory> {
        (**self).load_inventory()
    }

    fn save_all(&self, book: &OrderBook, inventory: &Inventory) -> StoreResult<()> {
        (**self).save_all(book, inventory)
    }

    fn reset_to_seed(&self) -> StoreResult<()> {
        (**self).reset_to_seed()
    }

    fn ensure_seed_data(&self) -> StoreResult<bool> {
        (**self).ensure_seed_data()
    }

    fn submit_order(&self, created_at: i64, lines: &[OrderLine]) -> StoreResult<OrderId> {
        (**self).submit_order(created_at, lines)
    }

    fn check_connection(&self) -> StoreResult<()> {
        (**self).check_connection()
    }
}
