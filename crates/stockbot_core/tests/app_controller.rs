use rust_decimal_macros::dec;
use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;
use stockbot_core::db::open_db_in_memory;
use stockbot_core::model::order::OrderLine;
use stockbot_core::repo::seed::{BLACK_SHELL, WHITE_SHELL};
use stockbot_core::robot::script::wave;
use stockbot_core::{
    AppController, FulfillmentOptions, RobotEndpoint, RobotLink, RobotLinkError, Session,
    SqliteInventoryStore,
};

/// Accepts everything and remembers which host each script went to.
#[derive(Default)]
struct StubLink {
    hosts: RefCell<Vec<String>>,
    bodies: RefCell<Vec<String>>,
}

impl RobotLink for StubLink {
    fn send_script(
        &self,
        endpoint: &RobotEndpoint,
        body: &str,
        _correlation_id: u64,
    ) -> Result<(), RobotLinkError> {
        self.hosts.borrow_mut().push(endpoint.host.clone());
        self.bodies.borrow_mut().push(body.to_string());
        Ok(())
    }

    fn send_command(&self, _endpoint: &RobotEndpoint, _command: &str) -> Result<(), RobotLinkError> {
        Ok(())
    }
}

fn options() -> FulfillmentOptions {
    FulfillmentOptions {
        dispatch_delay: Duration::ZERO,
        ..FulfillmentOptions::default()
    }
}

#[test]
fn fresh_controller_reports_ready_then_loads_seed() {
    let conn = open_db_in_memory().unwrap();
    let link = StubLink::default();
    let controller = AppController::new(
        SqliteInventoryStore::new(&conn),
        &link,
        RobotEndpoint::default(),
        options(),
    );
    assert_eq!(controller.view().status_message, "Ready");
    assert!(!controller.can_process_next());

    let loaded = controller.load();

    assert!(loaded.ok, "{}", loaded.message);
    let view = controller.view();
    assert_eq!(view.queued_count(), 3);
    assert_eq!(view.processed_count(), 0);
    assert_eq!(view.total_revenue, dec!(0));
    assert!(controller.can_process_next());
}

#[test]
fn process_next_updates_view_and_notifies_observers() {
    let conn = open_db_in_memory().unwrap();
    let link = StubLink::default();
    let controller = AppController::new(
        SqliteInventoryStore::new(&conn),
        &link,
        RobotEndpoint::default(),
        options(),
    );
    controller.load();
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&seen);
    controller.subscribe(move |view| sink.borrow_mut().push(view.processed_count()));

    let response = controller.process_next();

    assert!(response.ok, "{}", response.message);
    assert_eq!(response.message, "Order 1 processed, robot ran");
    let view = controller.view();
    assert_eq!(view.status_message, response.message);
    assert_eq!(view.queued_count(), 2);
    assert_eq!(view.total_revenue, dec!(100));
    assert_eq!(
        view.inventory.get(WHITE_SHELL).unwrap().quantity,
        dec!(8)
    );
    assert_eq!(*seen.borrow(), vec![1]);
}

#[test]
fn draining_the_queue_disables_process_next() {
    let conn = open_db_in_memory().unwrap();
    let link = StubLink::default();
    let controller = AppController::new(
        SqliteInventoryStore::new(&conn),
        &link,
        RobotEndpoint::default(),
        options(),
    );
    controller.load();

    while controller.can_process_next() {
        assert!(controller.process_next().ok);
    }

    let view = controller.view();
    assert_eq!(view.processed_count(), 3);
    assert_eq!(view.total_revenue, dec!(300));
    let again = controller.process_next();
    assert!(again.ok);
    assert_eq!(again.message, "No queued order to move.");
}

#[test]
fn rejected_order_leaves_view_untouched() {
    let conn = open_db_in_memory().unwrap();
    let link = StubLink::default();
    let controller = AppController::new(
        SqliteInventoryStore::new(&conn),
        &link,
        RobotEndpoint::default(),
        options(),
    );
    controller.load();
    let session = Session::for_user("user", false);
    assert!(
        controller
            .submit_order(&session, &[OrderLine::new(BLACK_SHELL, dec!(2.5))])
            .ok
    );
    // The new order is the newest; drain the seed orders first.
    for _ in 0..3 {
        assert!(controller.process_next().ok);
    }
    let before = controller.view();

    let response = controller.process_next();

    assert!(!response.ok);
    assert!(response.message.starts_with("Order rejected:"), "{}", response.message);
    assert!(response.message.contains("invalid quantity"), "{}", response.message);
    let after = controller.view();
    assert_eq!(after.book, before.book);
    assert_eq!(after.inventory, before.inventory);
    assert_eq!(link.bodies.borrow().len(), 4);
}

#[test]
fn submit_order_requires_login() {
    let conn = open_db_in_memory().unwrap();
    let link = StubLink::default();
    let controller = AppController::new(
        SqliteInventoryStore::new(&conn),
        &link,
        RobotEndpoint::default(),
        options(),
    );
    controller.load();

    let refused = controller.submit_order(
        &Session::anonymous(),
        &[OrderLine::new(WHITE_SHELL, dec!(1))],
    );
    assert!(!refused.ok);
    assert_eq!(controller.view().queued_count(), 3);

    let accepted = controller.submit_order(
        &Session::for_user("user", false),
        &[OrderLine::new(WHITE_SHELL, dec!(1))],
    );
    assert!(accepted.ok, "{}", accepted.message);
    assert_eq!(controller.view().queued_count(), 4);

    let unknown = controller.submit_order(
        &Session::for_user("user", false),
        &[OrderLine::new("Gear", dec!(1))],
    );
    assert!(!unknown.ok);
    assert!(unknown.message.contains("Gear"));
}

#[test]
fn ping_uses_current_robot_host() {
    let conn = open_db_in_memory().unwrap();
    let link = StubLink::default();
    let controller = AppController::new(
        SqliteInventoryStore::new(&conn),
        &link,
        RobotEndpoint::default(),
        options(),
    );

    let first = controller.ping_robot();
    assert_eq!(first.message, "Robot OK (localhost:30002)");

    assert!(controller.set_robot_host("192.168.0.50").ok);
    assert!(!controller.set_robot_host("   ").ok);
    let second = controller.ping_robot();
    assert_eq!(second.message, "Robot OK (192.168.0.50:30002)");

    assert_eq!(*link.hosts.borrow(), vec!["localhost", "192.168.0.50"]);
    assert!(link.bodies.borrow().iter().all(|body| body == wave()));
}

#[test]
fn ping_failure_is_reported_in_status() {
    let conn = open_db_in_memory().unwrap();
    let closed = std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port();
    let controller = AppController::new(
        SqliteInventoryStore::new(&conn),
        stockbot_core::TcpRobotLink::new(),
        RobotEndpoint {
            host: "127.0.0.1".to_string(),
            script_port: closed,
            dashboard_port: closed,
        },
        options(),
    );

    let response = controller.ping_robot();

    assert!(!response.ok);
    assert!(response.message.starts_with("Robot error:"));
    assert_eq!(controller.view().status_message, response.message);
}

#[test]
fn check_db_and_reset_report_status() {
    let conn = open_db_in_memory().unwrap();
    let link = StubLink::default();
    let controller = AppController::new(
        SqliteInventoryStore::new(&conn),
        &link,
        RobotEndpoint::default(),
        options(),
    );
    controller.load();
    controller.process_next();

    assert_eq!(controller.check_db().message, "DB OK");

    let reset = controller.reset_db();
    assert!(reset.ok);
    assert_eq!(reset.message, "DB reset OK");
    let view = controller.view();
    assert_eq!(view.queued_count(), 3);
    assert_eq!(view.processed_count(), 0);
    assert_eq!(view.status_message, "DB reset OK");
}
