//! Repository layer abstractions and SQLite implementations.
//!
//! # Responsibility
//! - Define the load/save contracts the fulfillment workflow depends on.
//! - Isolate SQL details from service orchestration.
//! - Classify storage failures as transient or persistent.
//!
//! # Invariants
//! - Writes of one aggregate happen inside one transaction.
//! - Transient failures are retried by the store before surfacing.
//! - Read paths reject invalid persisted state instead of masking it.

pub mod account_repo;
pub mod inventory_store;
pub mod seed;

use crate::db::DbError;
use crate::model::item::{ItemId, ItemValidationError};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type StoreResult<T> = Result<T, StoreError>;

/// Storage error shared by the inventory and account stores.
#[derive(Debug)]
pub enum StoreError {
    /// Lock/busy/I-O failure that outlived the retry budget.
    Transient(DbError),
    /// Non-retryable database failure.
    Db(DbError),
    /// Persisted rows no longer match the aggregate being saved.
    Conflict(String),
    /// Persisted data cannot be converted to a valid model.
    InvalidData(String),
    /// Item failed record validation before write.
    Validation(ItemValidationError),
    /// Order submission referenced an unknown item.
    UnknownItem(ItemId),
    /// Order submission carried an unusable line set.
    InvalidOrder(String),
    /// Account username is already registered.
    DuplicateAccount(String),
}

impl StoreError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transient(err) => write!(f, "database is busy or locked: {err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::Conflict(message) => write!(f, "store conflict: {message}"),
            Self::InvalidData(message) => write!(f, "invalid persisted data: {message}"),
            Self::Validation(err) => write!(f, "{err}"),
            Self::UnknownItem(id) => write!(f, "unknown item: {id}"),
            Self::InvalidOrder(message) => write!(f, "invalid order: {message}"),
            Self::DuplicateAccount(username) => {
                write!(f, "username is already taken: {username}")
            }
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Transient(err) | Self::Db(err) => Some(err),
            Self::Validation(err) => Some(err),
            Self::Conflict(_)
            | Self::InvalidData(_)
            | Self::UnknownItem(_)
            | Self::InvalidOrder(_)
            | Self::DuplicateAccount(_) => None,
        }
    }
}

impl From<DbError> for StoreError {
    fn from(value: DbError) -> Self {
        if value.is_transient() {
            Self::Transient(value)
        } else {
            Self::Db(value)
        }
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        DbError::Sqlite(value).into()
    }
}

impl From<ItemValidationError> for StoreError {
    fn from(value: ItemValidationError) -> Self {
        Self::Validation(value)
    }
}
