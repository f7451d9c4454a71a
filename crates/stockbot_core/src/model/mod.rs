//! Inventory and order domain model.
//!
//! # Responsibility
//! - Define canonical data structures used by fulfillment and persistence.
//! - Keep variant-specific item data in one tagged shape.
//!
//! # Invariants
//! - Every item is identified by a unique, stable string id.
//! - An order lives in exactly one of the queued or processed lists.

pub mod account;
pub mod item;
pub mod order;
