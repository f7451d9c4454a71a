//! Order fulfillment coordinator.
//!
//! # Responsibility
//! - Select the next queued order and validate it for robot dispatch.
//! - Send one sorter program per order line, in line order.
//! - Debit stock, move the order to the processed list, persist, reload.
//!
//! # Invariants
//! - One call touches at most one order: the earliest queued by
//!   `created_at, id`.
//! - Select/validate failures happen before any robot command or mutation.
//! - Dispatch failures are recorded and never block later lines or commit;
//!   committed stock is never rolled back for a failed dispatch.
//! - The returned aggregate is the store's re-read state, not in-memory deltas.

use crate::model::item::{Inventory, ItemId};
use crate::model::order::{Order, OrderBook, OrderId, MAX_ORDER_LINES};
use crate::repo::inventory_store::InventoryStore;
use crate::repo::StoreError;
use crate::robot::link::{RobotEndpoint, RobotLink};
use crate::robot::script::{assembly_to_output, item_sorter, SortClass};
use log::{error, info, warn};
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::thread;
use std::time::{Duration, Instant};

const DEFAULT_DISPATCH_DELAY: Duration = Duration::from_millis(150);
const CORRELATION_STRIDE: u64 = MAX_ORDER_LINES as u64 + 1;

/// Lifecycle of one order inside `process_next`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FulfillmentStage {
    Queued,
    Dispatching,
    Committing,
    Processed,
}

impl FulfillmentStage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Dispatching => "dispatching",
            Self::Committing => "committing",
            Self::Processed => "processed",
        }
    }
}

/// Step at which `process_next` gave up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailedStage {
    Select,
    Validate,
    Commit,
    Reload,
}

/// Order line that cannot drive the robot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    TooManyLines {
        order_id: OrderId,
        lines: usize,
    },
    InvalidQuantity {
        order_id: OrderId,
        line_no: usize,
        item_id: ItemId,
        quantity: Decimal,
    },
    UnknownItem {
        order_id: OrderId,
        line_no: usize,
        item_id: ItemId,
    },
    InsufficientStock {
        order_id: OrderId,
        item_id: ItemId,
        requested: Decimal,
        on_hand: Decimal,
    },
}

impl Display for ValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TooManyLines { order_id, lines } => write!(
                f,
                "order {order_id} has {lines} lines, at most {MAX_ORDER_LINES} can be dispatched"
            ),
            Self::InvalidQuantity {
                order_id,
                line_no,
                item_id,
                quantity,
            } => write!(
                f,
                "invalid quantity {quantity} for `{item_id}` on order {order_id} line {line_no}: \
                 robot orders need a whole positive count"
            ),
            Self::UnknownItem {
                order_id,
                line_no,
                item_id,
            } => write!(
                f,
                "order {order_id} line {line_no} references unknown item `{item_id}`"
            ),
            Self::InsufficientStock {
                order_id,
                item_id,
                requested,
                on_hand,
            } => write!(
                f,
                "order {order_id} requests {requested} of `{item_id}` but only {on_hand} on hand"
            ),
        }
    }
}

impl Error for ValidationError {}

/// Failure of one `process_next` call.
#[derive(Debug)]
pub enum FulfillmentError {
    /// Loading the aggregate failed; nothing was sent or changed.
    Select(StoreError),
    /// The selected order failed validation; nothing was sent or changed.
    Validation(ValidationError),
    /// Scripts were dispatched but persisting the result failed.
    Commit {
        order_id: OrderId,
        dispatches: Vec<DispatchReport>,
        source: StoreError,
    },
    /// Commit succeeded but the aggregate could not be re-read.
    Reload { order_id: OrderId, source: StoreError },
}

impl FulfillmentError {
    pub fn stage(&self) -> FailedStage {
        match self {
            Self::Select(_) => FailedStage::Select,
            Self::Validation(_) => FailedStage::Validate,
            Self::Commit { .. } => FailedStage::Commit,
            Self::Reload { .. } => FailedStage::Reload,
        }
    }
}

impl Display for FulfillmentError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Select(err) => write!(f, "could not load orders: {err}"),
            Self::Validation(err) => write!(f, "{err}"),
            Self::Commit {
                order_id, source, ..
            } => write!(f, "order {order_id} was dispatched but not saved: {source}"),
            Self::Reload { order_id, source } => {
                write!(f, "order {order_id} was saved but reload failed: {source}")
            }
        }
    }
}

impl Error for FulfillmentError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Select(err) => Some(err),
            Self::Validation(err) => Some(err),
            Self::Commit { source, .. } | Self::Reload { source, .. } => Some(source),
        }
    }
}

impl From<ValidationError> for FulfillmentError {
    fn from(value: ValidationError) -> Self {
        Self::Validation(value)
    }
}

/// Result of one robot send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchReport {
    /// 1-based order line, `None` for the assembly-to-output transfer.
    pub line_no: Option<usize>,
    pub program: String,
    pub correlation_id: u64,
    /// Link error text when the send failed.
    pub error: Option<String>,
}

impl DispatchReport {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Successful fulfillment of one order.
#[derive(Debug, Clone, PartialEq)]
pub struct FulfillmentReport {
    pub order_id: OrderId,
    pub dispatches: Vec<DispatchReport>,
    /// Re-read order book after commit.
    pub book: OrderBook,
    /// Re-read inventory after commit.
    pub inventory: Inventory,
}

impl FulfillmentReport {
    pub fn failed_dispatches(&self) -> usize {
        self.dispatches.iter().filter(|report| !report.is_ok()).count()
    }
}

/// What `process_next` did.
#[derive(Debug, Clone, PartialEq)]
pub enum FulfillmentOutcome {
    NothingQueued,
    Processed(FulfillmentReport),
}

/// Tunables for dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FulfillmentOptions {
    /// Emit the simulator gripper stub instead of the physical RG2 driver.
    pub simulated: bool,
    /// Pause between consecutive sends to the controller.
    pub dispatch_delay: Duration,
    /// Follow the line programs with an assembly-to-output transfer.
    pub output_transfer: bool,
}

impl Default for FulfillmentOptions {
    fn default() -> Self {
        Self {
            simulated: true,
            dispatch_delay: DEFAULT_DISPATCH_DELAY,
            output_transfer: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct PlannedDispatch {
    line_no: usize,
    item_id: ItemId,
    class: SortClass,
    count: u32,
}

/// Coordinates robot dispatch with the store for one order at a time.
pub struct FulfillmentCoordinator<S: InventoryStore, L: RobotLink> {
    store: S,
    link: L,
    options: FulfillmentOptions,
}

impl<S: InventoryStore, L: RobotLink> FulfillmentCoordinator<S, L> {
    pub fn new(store: S, link: L, options: FulfillmentOptions) -> Self {
        Self {
            store,
            link,
            options,
        }
    }

    /// Fulfills the earliest queued order.
    ///
    /// # Errors
    /// - `Select`/`Validation`: nothing was sent and nothing changed.
    /// - `Commit`: scripts went out but the store is unchanged.
    /// - `Reload`: the store committed; the caller's snapshot is stale.
    pub fn process_next(
        &self,
        endpoint: &RobotEndpoint,
    ) -> Result<FulfillmentOutcome, FulfillmentError> {
        let started_at = Instant::now();
        let mut book = self
            .store
            .load_order_book()
            .map_err(FulfillmentError::Select)?;
        let Some(order) = book.next_queued().cloned() else {
            info!("event=fulfillment module=service status=ok result=nothing_queued");
            return Ok(FulfillmentOutcome::NothingQueued);
        };
        let mut inventory = self
            .store
            .load_inventory()
            .map_err(FulfillmentError::Select)?;

        let plan = match plan_dispatch(&order, &inventory) {
            Ok(plan) => plan,
            Err(err) => {
                warn!(
                    "event=fulfillment module=service status=rejected order_id={} error={}",
                    order.id, err
                );
                return Err(err.into());
            }
        };

        log_stage(order.id, FulfillmentStage::Queued, FulfillmentStage::Dispatching);
        let dispatches = self.dispatch(&order, &plan, endpoint);

        log_stage(order.id, FulfillmentStage::Dispatching, FulfillmentStage::Committing);
        for line in &order.lines {
            if let Some(item) = inventory.get_mut(&line.item_id) {
                item.debit(line.quantity);
            }
        }
        book.mark_processed(order.id);
        if let Err(source) = self.store.save_all(&book, &inventory) {
            error!(
                "event=fulfillment module=service status=error stage=commit order_id={} error={}",
                order.id, source
            );
            return Err(FulfillmentError::Commit {
                order_id: order.id,
                dispatches,
                source,
            });
        }
        log_stage(order.id, FulfillmentStage::Committing, FulfillmentStage::Processed);

        let reloaded = self
            .store
            .load_order_book()
            .and_then(|book| Ok((book, self.store.load_inventory()?)));
        let (book, inventory) = reloaded.map_err(|source| FulfillmentError::Reload {
            order_id: order.id,
            source,
        })?;

        let report = FulfillmentReport {
            order_id: order.id,
            dispatches,
            book,
            inventory,
        };
        info!(
            "event=fulfillment module=service status=ok order_id={} dispatched={} dispatch_failed={} duration_ms={}",
            report.order_id,
            report.dispatches.len(),
            report.failed_dispatches(),
            started_at.elapsed().as_millis()
        );
        Ok(FulfillmentOutcome::Processed(report))
    }

    fn dispatch(
        &self,
        order: &Order,
        plan: &[PlannedDispatch],
        endpoint: &RobotEndpoint,
    ) -> Vec<DispatchReport> {
        let base = u64::try_from(order.id)
            .unwrap_or(0)
            .saturating_mul(CORRELATION_STRIDE);
        let mut reports = Vec::with_capacity(plan.len() + 1);

        for step in plan {
            if !reports.is_empty() {
                self.pause();
            }
            let script = item_sorter(step.class, step.count, self.options.simulated);
            let correlation_id = base + step.line_no as u64;
            let program = format!("{} x{}", step.item_id, step.count);
            reports.push(self.send(endpoint, Some(step.line_no), program, &script, correlation_id));
        }

        if self.options.output_transfer {
            if !reports.is_empty() {
                self.pause();
            }
            let script = assembly_to_output(self.options.simulated);
            reports.push(self.send(
                endpoint,
                None,
                "assembly_to_output".to_string(),
                &script,
                base,
            ));
        }

        reports
    }

    fn send(
        &self,
        endpoint: &RobotEndpoint,
        line_no: Option<usize>,
        program: String,
        script: &str,
        correlation_id: u64,
    ) -> DispatchReport {
        // Best effort: a failed send is reported, never propagated.
        let error = match self.link.send_script(endpoint, script, correlation_id) {
            Ok(()) => None,
            Err(err) => {
                warn!(
                    "event=dispatch module=service status=error correlation_id={} error={}",
                    correlation_id, err
                );
                Some(err.to_string())
            }
        };
        DispatchReport {
            line_no,
            program,
            correlation_id,
            error,
        }
    }

    fn pause(&self) {
        if !self.options.dispatch_delay.is_zero() {
            thread::sleep(self.options.dispatch_delay);
        }
    }
}

fn plan_dispatch(
    order: &Order,
    inventory: &Inventory,
) -> Result<Vec<PlannedDispatch>, ValidationError> {
    if order.lines.len() > MAX_ORDER_LINES {
        return Err(ValidationError::TooManyLines {
            order_id: order.id,
            lines: order.lines.len(),
        });
    }

    let mut plan = Vec::with_capacity(order.lines.len());
    let mut requested: BTreeMap<&str, Decimal> = BTreeMap::new();

    for (index, line) in order.lines.iter().enumerate() {
        let line_no = index + 1;
        let count = line
            .whole_quantity()
            .ok_or_else(|| ValidationError::InvalidQuantity {
                order_id: order.id,
                line_no,
                item_id: line.item_id.clone(),
                quantity: line.quantity,
            })?;
        let item = inventory
            .get(&line.item_id)
            .ok_or_else(|| ValidationError::UnknownItem {
                order_id: order.id,
                line_no,
                item_id: line.item_id.clone(),
            })?;
        *requested.entry(line.item_id.as_str()).or_default() += line.quantity;
        plan.push(PlannedDispatch {
            line_no,
            item_id: line.item_id.clone(),
            class: SortClass::for_item(item),
            count,
        });
    }

    for (item_id, amount) in requested {
        if let Some(item) = inventory.get(item_id) {
            if !item.covers(amount) {
                return Err(ValidationError::InsufficientStock {
                    order_id: order.id,
                    item_id: item_id.to_string(),
                    requested: amount,
                    on_hand: item.quantity,
                });
            }
        }
    }

    Ok(plan)
}

fn log_stage(order_id: OrderId, from: FulfillmentStage, to: FulfillmentStage) {
    info!(
        "event=fulfillment_stage module=service order_id={} from={} to={}",
        order_id,
        from.as_str(),
        to.as_str()
    );
}
