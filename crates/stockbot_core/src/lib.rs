//! Core domain logic for Stockbot.
//! Inventory, order queue, robot script generation and dispatch.

pub mod app;
pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod robot;
pub mod service;

pub use app::{AppController, CommandResponse, ViewState};
pub use config::{AppConfig, ConfigError};
pub use db::{open_db, open_db_in_memory, DbError, RetryPolicy};
pub use logging::{default_log_level, init_logging, logging_status, LogTarget, LoggingError};
pub use model::account::{Account, Session, UserSession};
pub use model::item::{Inventory, Item, ItemId, ItemKind, ItemValidationError};
pub use model::order::{Order, OrderBook, OrderId, OrderLine, OrderState};
pub use repo::account_repo::{AccountRepository, SqliteAccountRepository};
pub use repo::inventory_store::{InventoryStore, SqliteInventoryStore};
pub use repo::{StoreError, StoreResult};
pub use robot::link::{RobotEndpoint, RobotLink, RobotLinkError, TcpRobotLink};
pub use robot::script::SortClass;
pub use service::auth_service::{AccountService, AuthError, PasswordHasher};
pub use service::fulfillment::{
    DispatchReport, FailedStage, FulfillmentCoordinator, FulfillmentError, FulfillmentOptions,
    FulfillmentOutcome, FulfillmentReport, ValidationError,
};

