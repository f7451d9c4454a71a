//! Front-end controller over the store, the robot link and the coordinator.
//!
//! # Responsibility
//! - Hold the view snapshot (queues, revenue, status line) shown to users.
//! - Expose each user action as a command returning `CommandResponse`.
//! - Notify observers after every successful reload.
//!
//! # Invariants
//! - A command never runs re-entrantly; a second call while one is in
//!   flight is refused, not queued.
//! - The view is replaced only from data re-read from the store.

use crate::model::account::Session;
use crate::model::item::Inventory;
use crate::model::order::{epoch_ms_now, OrderBook, OrderLine};
use crate::repo::inventory_store::InventoryStore;
use crate::robot::link::{RobotEndpoint, RobotLink};
use crate::robot::script::wave;
use crate::service::fulfillment::{
    FailedStage, FulfillmentCoordinator, FulfillmentError, FulfillmentOptions, FulfillmentOutcome,
};
use log::{info, warn};
use rust_decimal::Decimal;
use serde::Serialize;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

pub const STATUS_READY: &str = "Ready";
const PING_CORRELATION_ID: u64 = 0;

/// Snapshot rendered by front-ends.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ViewState {
    pub book: OrderBook,
    pub inventory: Inventory,
    pub total_revenue: Decimal,
    pub status_message: String,
}

impl ViewState {
    pub fn queued_count(&self) -> usize {
        self.book.queued.len()
    }

    pub fn processed_count(&self) -> usize {
        self.book.processed.len()
    }
}

/// Outcome of one user command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandResponse {
    pub ok: bool,
    pub message: String,
}

impl CommandResponse {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            ok: true,
            message: message.into(),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    ProcessNext,
    PingRobot,
    CheckDb,
    ResetDb,
    SubmitOrder,
}

impl Command {
    const COUNT: usize = 5;

    fn index(self) -> usize {
        self as usize
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::ProcessNext => "process_next",
            Self::PingRobot => "ping_robot",
            Self::CheckDb => "check_db",
            Self::ResetDb => "reset_db",
            Self::SubmitOrder => "submit_order",
        }
    }
}

/// Clears the in-flight flag when the command returns.
struct CommandGuard<'a> {
    flag: &'a Cell<bool>,
}

impl Drop for CommandGuard<'_> {
    fn drop(&mut self) {
        self.flag.set(false);
    }
}

type Observer = Rc<dyn Fn(&ViewState)>;

/// Single-threaded controller; commands take `&self` so observers may read it.
pub struct AppController<S: InventoryStore, L: RobotLink> {
    store: S,
    link: L,
    options: FulfillmentOptions,
    endpoint: RefCell<RobotEndpoint>,
    view: RefCell<ViewState>,
    in_flight: [Cell<bool>; Command::COUNT],
    observers: RefCell<Vec<Observer>>,
}

impl<S: InventoryStore, L: RobotLink> AppController<S, L> {
    pub fn new(store: S, link: L, endpoint: RobotEndpoint, options: FulfillmentOptions) -> Self {
        Self {
            store,
            link,
            options,
            endpoint: RefCell::new(endpoint),
            view: RefCell::new(ViewState {
                status_message: STATUS_READY.to_string(),
                ..ViewState::default()
            }),
            in_flight: Default::default(),
            observers: RefCell::new(Vec::new()),
        }
    }

    /// Current view snapshot.
    pub fn view(&self) -> ViewState {
        self.view.borrow().clone()
    }

    pub fn endpoint(&self) -> RobotEndpoint {
        self.endpoint.borrow().clone()
    }

    /// Registers a callback run with the new view after every reload.
    ///
    /// Observers added while a notification is running are first called on
    /// the next reload.
    pub fn subscribe(&self, observer: impl Fn(&ViewState) + 'static) {
        self.observers.borrow_mut().push(Rc::new(observer));
    }

    /// Points subsequent sends at a different controller host.
    pub fn set_robot_host(&self, host: &str) -> CommandResponse {
        let host = host.trim();
        if host.is_empty() {
            return self.finish(CommandResponse::failure("Robot host cannot be empty"));
        }
        self.endpoint.borrow_mut().host = host.to_string();
        self.finish(CommandResponse::success(format!("Robot host set to {host}")))
    }

    /// Seeds an empty store and loads the first view.
    pub fn load(&self) -> CommandResponse {
        let seeded = match self.store.ensure_seed_data() {
            Ok(seeded) => seeded,
            Err(err) => return self.finish(CommandResponse::failure(format!("DB error: {err}"))),
        };
        match self.reload() {
            Ok(()) if seeded => self.finish(CommandResponse::success("DB seeded")),
            Ok(()) => self.finish(CommandResponse::success(STATUS_READY)),
            Err(message) => self.finish(CommandResponse::failure(message)),
        }
    }

    /// Whether `process_next` would currently do anything.
    pub fn can_process_next(&self) -> bool {
        !self.in_flight[Command::ProcessNext.index()].get() && self.view.borrow().queued_count() > 0
    }

    /// Fulfills the earliest queued order.
    pub fn process_next(&self) -> CommandResponse {
        let Some(_guard) = self.begin(Command::ProcessNext) else {
            return busy(Command::ProcessNext);
        };
        let endpoint = self.endpoint();
        let coordinator =
            FulfillmentCoordinator::new(&self.store, &self.link, self.options.clone());

        let response = match coordinator.process_next(&endpoint) {
            Ok(FulfillmentOutcome::NothingQueued) => {
                CommandResponse::success("No queued order to move.")
            }
            Ok(FulfillmentOutcome::Processed(report)) => {
                let failed = report.failed_dispatches();
                let order_id = report.order_id;
                self.apply(report.book, report.inventory);
                if failed == 0 {
                    CommandResponse::success(format!("Order {order_id} processed, robot ran"))
                } else {
                    CommandResponse::success(format!(
                        "Order {order_id} processed, {failed} robot send(s) failed"
                    ))
                }
            }
            Err(err) => {
                if matches!(err, FulfillmentError::Reload { .. }) {
                    warn!("event=app_command module=app status=error command=process_next stale_view=true");
                }
                let prefix = match err.stage() {
                    FailedStage::Validate => "Order rejected",
                    FailedStage::Select => "DB error",
                    FailedStage::Commit | FailedStage::Reload => "DB save/robot error",
                };
                CommandResponse::failure(format!("{prefix}: {err}"))
            }
        };
        self.finish(response)
    }

    /// Sends the wave program as a connectivity check.
    pub fn ping_robot(&self) -> CommandResponse {
        let Some(_guard) = self.begin(Command::PingRobot) else {
            return busy(Command::PingRobot);
        };
        let endpoint = self.endpoint();
        let response = match self.link.send_script(&endpoint, wave(), PING_CORRELATION_ID) {
            Ok(()) => CommandResponse::success(format!("Robot OK ({})", endpoint.script_address())),
            Err(err) => CommandResponse::failure(format!("Robot error: {err}")),
        };
        self.finish(response)
    }

    pub fn check_db(&self) -> CommandResponse {
        let Some(_guard) = self.begin(Command::CheckDb) else {
            return busy(Command::CheckDb);
        };
        let response = match self.store.check_connection() {
            Ok(()) => CommandResponse::success("DB OK"),
            Err(err) => CommandResponse::failure(format!("DB error: {err}")),
        };
        self.finish(response)
    }

    /// Replaces all data with the seed set and reloads.
    pub fn reset_db(&self) -> CommandResponse {
        let Some(_guard) = self.begin(Command::ResetDb) else {
            return busy(Command::ResetDb);
        };
        self.set_status("Resetting DB...");
        let response = match self.store.reset_to_seed() {
            Ok(()) => match self.reload() {
                Ok(()) => CommandResponse::success("DB reset OK"),
                Err(message) => CommandResponse::failure(message),
            },
            Err(err) => CommandResponse::failure(format!("Reset error: {err}")),
        };
        self.finish(response)
    }

    /// Queues a new order for a logged-in user.
    pub fn submit_order(&self, session: &Session, lines: &[OrderLine]) -> CommandResponse {
        let Some(_guard) = self.begin(Command::SubmitOrder) else {
            return busy(Command::SubmitOrder);
        };
        if !session.is_logged_in() {
            return self.finish(CommandResponse::failure("You must be logged in."));
        }
        let response = match self.store.submit_order(epoch_ms_now(), lines) {
            Ok(order_id) => match self.reload() {
                Ok(()) => CommandResponse::success(format!("Order {order_id} queued")),
                Err(message) => CommandResponse::failure(message),
            },
            Err(err) => CommandResponse::failure(format!("Order rejected: {err}")),
        };
        self.finish(response)
    }

    fn begin(&self, command: Command) -> Option<CommandGuard<'_>> {
        let flag = &self.in_flight[command.index()];
        if flag.replace(true) {
            return None;
        }
        Some(CommandGuard { flag })
    }

    fn reload(&self) -> Result<(), String> {
        let book = self
            .store
            .load_order_book()
            .map_err(|err| format!("DB error: {err}"))?;
        let inventory = self
            .store
            .load_inventory()
            .map_err(|err| format!("DB error: {err}"))?;
        self.apply(book, inventory);
        Ok(())
    }

    fn apply(&self, book: OrderBook, inventory: Inventory) {
        let snapshot = {
            let mut view = self.view.borrow_mut();
            view.total_revenue = book.total_revenue(&inventory);
            view.book = book;
            view.inventory = inventory;
            view.clone()
        };
        let observers: Vec<Observer> = self.observers.borrow().clone();
        for observer in observers {
            observer(&snapshot);
        }
    }

    fn set_status(&self, message: &str) {
        self.view.borrow_mut().status_message = message.to_string();
    }

    fn finish(&self, response: CommandResponse) -> CommandResponse {
        self.set_status(&response.message);
        info!(
            "event=app_command module=app status={} queued={} processed={}",
            if response.ok { "ok" } else { "error" },
            self.view.borrow().queued_count(),
            self.view.borrow().processed_count()
        );
        response
    }
}

fn busy(command: Command) -> CommandResponse {
    warn!(
        "event=app_command module=app status=rejected command={} reason=in_flight",
        command.as_str()
    );
    CommandResponse::failure(format!("{} is already running", command.as_str()))
}

#[cfg(test)]
mod tests {
    use super::{AppController, Command, CommandResponse};
    use crate::db::open_db_in_memory;
    use crate::repo::inventory_store::SqliteInventoryStore;
    use crate::robot::link::{RobotEndpoint, RobotLink, RobotLinkError};
    use crate::service::fulfillment::FulfillmentOptions;
    use std::cell::Cell;
    use std::rc::Rc;
    use std::time::Duration;

    struct NullLink;

    impl RobotLink for NullLink {
        fn send_script(
            &self,
            _endpoint: &RobotEndpoint,
            _body: &str,
            _correlation_id: u64,
        ) -> Result<(), RobotLinkError> {
            Ok(())
        }

        fn send_command(
            &self,
            _endpoint: &RobotEndpoint,
            _command: &str,
        ) -> Result<(), RobotLinkError> {
            Ok(())
        }
    }

    #[test]
    fn in_flight_command_is_refused_until_guard_drops() {
        let conn = open_db_in_memory().unwrap();
        let controller = AppController::new(
            SqliteInventoryStore::new(&conn),
            NullLink,
            RobotEndpoint::default(),
            FulfillmentOptions {
                dispatch_delay: Duration::ZERO,
                ..FulfillmentOptions::default()
            },
        );
        assert!(controller.load().ok);

        let guard = controller.begin(Command::ProcessNext);
        assert!(guard.is_some());
        assert!(controller.begin(Command::ProcessNext).is_none());
        assert!(!controller.can_process_next());
        let refused = controller.process_next();
        assert!(!refused.ok);
        assert!(refused.message.contains("already running"));
        assert_eq!(controller.view().processed_count(), 0);

        // Other commands keep their own flag.
        assert!(controller.check_db().ok);

        drop(guard);
        assert!(controller.process_next().ok);
        assert_eq!(controller.view().processed_count(), 1);
    }

    #[test]
    fn observer_may_subscribe_during_notification() {
        let conn = Box::leak(Box::new(open_db_in_memory().unwrap()));
        let controller = Rc::new(AppController::new(
            SqliteInventoryStore::new(conn),
            NullLink,
            RobotEndpoint::default(),
            FulfillmentOptions {
                dispatch_delay: Duration::ZERO,
                ..FulfillmentOptions::default()
            },
        ));
        assert!(controller.load().ok);
        let late_calls = Rc::new(Cell::new(0));
        let subscribed = Cell::new(false);
        let weak = Rc::downgrade(&controller);
        let counter = Rc::clone(&late_calls);
        controller.subscribe(move |_view| {
            if subscribed.replace(true) {
                return;
            }
            if let Some(controller) = weak.upgrade() {
                let counter = Rc::clone(&counter);
                controller.subscribe(move |_view| counter.set(counter.get() + 1));
            }
        });

        assert!(controller.process_next().ok);
        assert_eq!(late_calls.get(), 0);
        assert!(controller.process_next().ok);
        assert_eq!(late_calls.get(), 1);
    }

    #[test]
    fn command_indices_are_distinct() {
        let all = [
            Command::ProcessNext,
            Command::PingRobot,
            Command::CheckDb,
            Command::ResetDb,
            Command::SubmitOrder,
        ];
        let mut indices: Vec<_> = all.iter().map(|command| command.index()).collect();
        indices.sort_unstable();
        indices.dedup();
        assert_eq!(indices.len(), Command::COUNT);
        assert!(indices.iter().all(|index| *index < Command::COUNT));
    }

    #[test]
    fn responses_carry_ok_flag() {
        assert!(CommandResponse::success("x").ok);
        assert!(!CommandResponse::failure("x").ok);
    }
}
