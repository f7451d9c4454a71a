use rust_decimal_macros::dec;
use std::cell::RefCell;
use std::io;
use std::time::Duration;
use stockbot_core::db::open_db_in_memory;
use stockbot_core::model::order::OrderLine;
use stockbot_core::repo::seed::{BLACK_SHELL, WHITE_SHELL};
use stockbot_core::robot::script::{assembly_to_output, item_sorter, SortClass};
use stockbot_core::{
    FailedStage, FulfillmentCoordinator, FulfillmentError, FulfillmentOptions, FulfillmentOutcome,
    InventoryStore, RobotEndpoint, RobotLink, RobotLinkError, SqliteInventoryStore,
    ValidationError,
};

/// Records every script and optionally fails chosen correlation ids.
#[derive(Default)]
struct RecordingLink {
    sent: RefCell<Vec<(u64, String)>>,
    fail: Vec<u64>,
}

impl RecordingLink {
    fn failing(ids: &[u64]) -> Self {
        Self {
            fail: ids.to_vec(),
            ..Self::default()
        }
    }

    fn sent_ids(&self) -> Vec<u64> {
        self.sent.borrow().iter().map(|(id, _)| *id).collect()
    }
}

impl RobotLink for RecordingLink {
    fn send_script(
        &self,
        endpoint: &RobotEndpoint,
        body: &str,
        correlation_id: u64,
    ) -> Result<(), RobotLinkError> {
        self.sent
            .borrow_mut()
            .push((correlation_id, body.to_string()));
        if self.fail.contains(&correlation_id) {
            return Err(RobotLinkError::Connect {
                address: endpoint.script_address(),
                source: io::Error::new(io::ErrorKind::ConnectionRefused, "refused"),
            });
        }
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

fn processed(outcome: FulfillmentOutcome) -> stockbot_core::FulfillmentReport {
    match outcome {
        FulfillmentOutcome::Processed(report) => report,
        FulfillmentOutcome::NothingQueued => panic!("expected an order to be processed"),
    }
}

#[test]
fn earliest_order_is_processed_and_debited() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteInventoryStore::new(&conn);
    store.ensure_seed_data().unwrap();
    let link = RecordingLink::default();
    let coordinator = FulfillmentCoordinator::new(&store, &link, options());

    let report = processed(coordinator.process_next(&RobotEndpoint::default()).unwrap());

    assert_eq!(report.order_id, 1);
    let queued: Vec<i64> = report.book.queued.iter().map(|order| order.id).collect();
    let done: Vec<i64> = report.book.processed.iter().map(|order| order.id).collect();
    assert_eq!(queued, vec![2, 3]);
    assert_eq!(done, vec![1]);
    assert_eq!(report.inventory.get(WHITE_SHELL).unwrap().quantity, dec!(8));
    assert_eq!(report.inventory.get(BLACK_SHELL).unwrap().quantity, dec!(10));

    let sent = link.sent.borrow();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, 1001);
    assert_eq!(sent[0].1, item_sorter(SortClass::WhiteShell, 2, true));
}

#[test]
fn multi_line_order_dispatches_each_line_in_order() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteInventoryStore::new(&conn);
    store.ensure_seed_data().unwrap();
    let link = RecordingLink::default();
    let coordinator = FulfillmentCoordinator::new(&store, &link, options());
    let endpoint = RobotEndpoint::default();

    for _ in 0..3 {
        processed(coordinator.process_next(&endpoint).unwrap());
    }

    assert_eq!(link.sent_ids(), vec![1001, 2001, 3001, 3002]);
    let sent = link.sent.borrow();
    assert_eq!(sent[1].1, item_sorter(SortClass::BlackShell, 2, true));
    assert_eq!(sent[2].1, item_sorter(SortClass::WhiteShell, 1, true));
    assert_eq!(sent[3].1, item_sorter(SortClass::BlackShell, 1, true));

    let inventory = store.load_inventory().unwrap();
    assert_eq!(inventory.get(WHITE_SHELL).unwrap().quantity, dec!(7));
    assert_eq!(inventory.get(BLACK_SHELL).unwrap().quantity, dec!(7));
    let book = store.load_order_book().unwrap();
    assert!(book.queued.is_empty());
    assert_eq!(book.order_count(), 3);
    assert_eq!(book.total_revenue(&inventory), dec!(300));
}

#[test]
fn empty_queue_is_an_idempotent_no_op() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteInventoryStore::new(&conn);
    store.ensure_seed_data().unwrap();
    let link = RecordingLink::default();
    let coordinator = FulfillmentCoordinator::new(&store, &link, options());
    let endpoint = RobotEndpoint::default();
    for _ in 0..3 {
        coordinator.process_next(&endpoint).unwrap();
    }
    let sends = link.sent.borrow().len();
    let book = store.load_order_book().unwrap();
    let inventory = store.load_inventory().unwrap();

    for _ in 0..2 {
        assert_eq!(
            coordinator.process_next(&endpoint).unwrap(),
            FulfillmentOutcome::NothingQueued
        );
    }

    assert_eq!(link.sent.borrow().len(), sends);
    assert_eq!(store.load_order_book().unwrap(), book);
    assert_eq!(store.load_inventory().unwrap(), inventory);
}

#[test]
fn fractional_quantity_is_rejected_without_mutation() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteInventoryStore::new(&conn);
    store.ensure_seed_data().unwrap();
    // Older than every seed order, so it is selected first.
    store
        .submit_order(0, &[OrderLine::new(BLACK_SHELL, dec!(2.5))])
        .unwrap();
    let book = store.load_order_book().unwrap();
    let inventory = store.load_inventory().unwrap();
    let link = RecordingLink::default();
    let coordinator = FulfillmentCoordinator::new(&store, &link, options());

    let err = coordinator
        .process_next(&RobotEndpoint::default())
        .unwrap_err();

    assert_eq!(err.stage(), FailedStage::Validate);
    assert!(matches!(
        err,
        FulfillmentError::Validation(ValidationError::InvalidQuantity { line_no: 1, .. })
    ));
    assert!(err.to_string().contains("invalid quantity"));
    assert!(link.sent.borrow().is_empty());
    assert_eq!(store.load_order_book().unwrap(), book);
    assert_eq!(store.load_inventory().unwrap(), inventory);
}

#[test]
fn insufficient_stock_is_rejected_before_dispatch() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteInventoryStore::new(&conn);
    store.ensure_seed_data().unwrap();
    store
        .submit_order(0, &[OrderLine::new(WHITE_SHELL, dec!(11))])
        .unwrap();
    let link = RecordingLink::default();
    let coordinator = FulfillmentCoordinator::new(&store, &link, options());

    let err = coordinator
        .process_next(&RobotEndpoint::default())
        .unwrap_err();

    assert!(matches!(
        err,
        FulfillmentError::Validation(ValidationError::InsufficientStock { .. })
    ));
    assert!(link.sent.borrow().is_empty());
    assert_eq!(
        store.load_inventory().unwrap().get(WHITE_SHELL).unwrap().quantity,
        dec!(10)
    );
}

#[test]
fn failed_dispatch_is_reported_and_commit_still_happens() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteInventoryStore::new(&conn);
    store.ensure_seed_data().unwrap();
    let mut book = store.load_order_book().unwrap();
    let first = book.queued[0].id;
    let second = book.queued[1].id;
    book.mark_processed(first);
    book.mark_processed(second);
    store.save_all(&book, &store.load_inventory().unwrap()).unwrap();

    // Order 3 has two lines; the first send fails.
    let link = RecordingLink::failing(&[3001]);
    let coordinator = FulfillmentCoordinator::new(&store, &link, options());
    let report = processed(coordinator.process_next(&RobotEndpoint::default()).unwrap());

    assert_eq!(report.order_id, 3);
    assert_eq!(report.dispatches.len(), 2);
    assert!(!report.dispatches[0].is_ok());
    assert!(report.dispatches[1].is_ok());
    assert_eq!(report.failed_dispatches(), 1);
    assert_eq!(link.sent_ids(), vec![3001, 3002]);
    assert!(report.book.queued.is_empty());
    assert_eq!(report.inventory.get(WHITE_SHELL).unwrap().quantity, dec!(9));
    assert_eq!(report.inventory.get(BLACK_SHELL).unwrap().quantity, dec!(9));
}

#[test]
fn output_transfer_follows_line_programs_when_enabled() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteInventoryStore::new(&conn);
    store.ensure_seed_data().unwrap();
    let link = RecordingLink::default();
    let coordinator = FulfillmentCoordinator::new(
        &store,
        &link,
        FulfillmentOptions {
            output_transfer: true,
            simulated: false,
            ..options()
        },
    );

    let report = processed(coordinator.process_next(&RobotEndpoint::default()).unwrap());

    assert_eq!(link.sent_ids(), vec![1001, 1000]);
    assert_eq!(report.dispatches[1].line_no, None);
    assert_eq!(link.sent.borrow()[1].1, assembly_to_output(false));
    assert_eq!(
        link.sent.borrow()[0].1,
        item_sorter(SortClass::WhiteShell, 2, false)
    );
}

#[test]
fn dispatch_goes_to_the_given_endpoint() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let reader = std::thread::spawn(move || {
        use std::io::Read;
        let (mut stream, _) = listener.accept().unwrap();
        let mut text = String::new();
        stream.read_to_string(&mut text).unwrap();
        text
    });

    let conn = open_db_in_memory().unwrap();
    let store = SqliteInventoryStore::new(&conn);
    store.ensure_seed_data().unwrap();
    let link = stockbot_core::TcpRobotLink::new();
    let coordinator = FulfillmentCoordinator::new(&store, &link, options());
    let endpoint = RobotEndpoint {
        host: "127.0.0.1".to_string(),
        script_port: port,
        dashboard_port: port,
    };

    let report = processed(coordinator.process_next(&endpoint).unwrap());
    assert_eq!(report.failed_dispatches(), 0);

    let received = reader.join().unwrap();
    assert!(received.starts_with("def pick_item_1001():\n"));
    assert!(received.ends_with("\nend\n"));
    assert!(received.contains("ItemSorter: WHITE SHELL (A) x2"));
}

#[test]
fn order_without_lines_is_completed_without_dispatch() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteInventoryStore::new(&conn);
    store.ensure_seed_data().unwrap();
    // Bypasses submit_order, which refuses empty orders.
    conn.execute(
        "INSERT INTO orders (created_at, state) VALUES (0, 'queued');",
        [],
    )
    .unwrap();
    let link = RecordingLink::default();
    let coordinator = FulfillmentCoordinator::new(&store, &link, options());
    let endpoint = RobotEndpoint::default();

    let report = processed(coordinator.process_next(&endpoint).unwrap());

    assert_eq!(report.order_id, 4);
    assert!(report.dispatches.is_empty());
    assert!(link.sent.borrow().is_empty());
    assert_eq!(report.book.queued.len(), 3);

    for _ in 0..3 {
        processed(coordinator.process_next(&endpoint).unwrap());
    }
    let book = store.load_order_book().unwrap();
    assert!(book.queued.is_empty());
    assert_eq!(book.processed.len(), 4);
}

#[test]
fn mixed_class_item_sends_interleaved_program() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteInventoryStore::new(&conn);
    store.ensure_seed_data().unwrap();
    conn.execute(
        "INSERT INTO items (id, kind, unit_price, quantity, location, sort_class)
         VALUES ('Shell Kit', 'simple', '90', '4', 3, 'mixed');",
        [],
    )
    .unwrap();
    let order_id = store
        .submit_order(0, &[OrderLine::new("Shell Kit", dec!(2))])
        .unwrap();
    let link = RecordingLink::default();
    let coordinator = FulfillmentCoordinator::new(&store, &link, options());

    let report = processed(coordinator.process_next(&RobotEndpoint::default()).unwrap());

    assert_eq!(report.order_id, order_id);
    assert_eq!(report.inventory.get("Shell Kit").unwrap().quantity, dec!(2));
    let sent = link.sent.borrow();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].1, item_sorter(SortClass::Mixed, 2, true));
    let picks: Vec<&str> = sent[0]
        .1
        .lines()
        .filter(|line| line.contains("textmsg(\"pick:"))
        .map(|line| if line.contains("(A)") { "A" } else { "B" })
        .collect();
    assert_eq!(picks, vec!["A", "B", "A", "B"]);
}
