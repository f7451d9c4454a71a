//! Stock item model.
//!
//! # Responsibility
//! - Define the tagged item variants and their shared stock attributes.
//! - Provide the in-memory inventory keyed by item id.
//!
//! # Invariants
//! - `id` is non-empty and unique within an inventory.
//! - `unit_price` is never negative.
//! - Persisted `quantity` is never negative after a successful fulfillment.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Stable item identifier (human-readable, e.g. `White Shell`).
pub type ItemId = String;

/// Pick slot for white shells.
pub const LOCATION_WHITE_SHELL: u32 = 1;
/// Pick slot for black shells.
pub const LOCATION_BLACK_SHELL: u32 = 2;

/// Variant-specific item data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ItemKind {
    /// Plain counted item.
    Simple,
    /// Sold by a measure (kg, m, ...).
    BulkMeasured { unit: String },
    /// Counted item with a per-unit weight in kg.
    UnitWeighted { weight: f64 },
}

impl ItemKind {
    /// Discriminant stored in `items.kind`.
    pub fn discriminant(&self) -> &'static str {
        match self {
            Self::Simple => "simple",
            Self::BulkMeasured { .. } => "bulk_measured",
            Self::UnitWeighted { .. } => "unit_weighted",
        }
    }
}

/// Item validation failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemValidationError {
    EmptyId,
    NegativePrice(ItemId),
    NegativeQuantity(ItemId),
    EmptyMeasurementUnit(ItemId),
    InvalidWeight(ItemId),
}

impl Display for ItemValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyId => write!(f, "item id cannot be empty"),
            Self::NegativePrice(id) => write!(f, "item `{id}` has a negative unit price"),
            Self::NegativeQuantity(id) => write!(f, "item `{id}` has a negative quantity"),
            Self::EmptyMeasurementUnit(id) => {
                write!(f, "bulk item `{id}` requires a measurement unit")
            }
            Self::InvalidWeight(id) => write!(f, "unit item `{id}` requires a positive weight"),
        }
    }
}

impl Error for ItemValidationError {}

/// One stock keeping record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    #[serde(flatten)]
    pub kind: ItemKind,
    pub unit_price: Decimal,
    /// On-hand quantity.
    pub quantity: Decimal,
    /// Physical slot code, see the `LOCATION_*` constants.
    pub location: u32,
    /// Sorter class tag; takes precedence over `location` when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_tag: Option<String>,
}

impl Item {
    pub fn simple(
        id: impl Into<ItemId>,
        unit_price: Decimal,
        quantity: Decimal,
        location: u32,
    ) -> Self {
        Self {
            id: id.into(),
            kind: ItemKind::Simple,
            unit_price,
            quantity,
            location,
            class_tag: None,
        }
    }

    pub fn bulk_measured(
        id: impl Into<ItemId>,
        unit_price: Decimal,
        quantity: Decimal,
        location: u32,
        unit: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            kind: ItemKind::BulkMeasured { unit: unit.into() },
            unit_price,
            quantity,
            location,
            class_tag: None,
        }
    }

    pub fn unit_weighted(
        id: impl Into<ItemId>,
        unit_price: Decimal,
        quantity: Decimal,
        location: u32,
        weight: f64,
    ) -> Self {
        Self {
            id: id.into(),
            kind: ItemKind::UnitWeighted { weight },
            unit_price,
            quantity,
            location,
            class_tag: None,
        }
    }

    pub fn with_class_tag(mut self, tag: impl Into<String>) -> Self {
        self.class_tag = Some(tag.into());
        self
    }

    /// Checks record-level invariants before persistence.
    pub fn validate(&self) -> Result<(), ItemValidationError> {
        if self.id.trim().is_empty() {
            return Err(ItemValidationError::EmptyId);
        }
        if self.unit_price.is_sign_negative() && !self.unit_price.is_zero() {
            return Err(ItemValidationError::NegativePrice(self.id.clone()));
        }
        if self.quantity.is_sign_negative() && !self.quantity.is_zero() {
            return Err(ItemValidationError::NegativeQuantity(self.id.clone()));
        }
        match &self.kind {
            ItemKind::BulkMeasured { unit } if unit.trim().is_empty() => {
                Err(ItemValidationError::EmptyMeasurementUnit(self.id.clone()))
            }
            ItemKind::UnitWeighted { weight } if !(weight.is_finite() && *weight > 0.0) => {
                Err(ItemValidationError::InvalidWeight(self.id.clone()))
            }
            _ => Ok(()),
        }
    }

    /// Returns whether on-hand stock covers `amount`.
    pub fn covers(&self, amount: Decimal) -> bool {
        self.quantity >= amount
    }

    /// Subtracts `amount` from on-hand stock.
    pub fn debit(&mut self, amount: Decimal) {
        self.quantity -= amount;
    }
}

/// In-memory stock keyed by item id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Inventory {
    items: BTreeMap<ItemId, Item>,
}

impl Inventory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces one item, returning the previous record.
    pub fn insert(&mut self, item: Item) -> Option<Item> {
        self.items.insert(item.id.clone(), item)
    }

    pub fn get(&self, id: &str) -> Option<&Item> {
        self.items.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Item> {
        self.items.get_mut(id)
    }

    /// Items sorted by id.
    pub fn items(&self) -> impl Iterator<Item = &Item> {
        self.items.values()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl FromIterator<Item> for Inventory {
    fn from_iter<T: IntoIterator<Item = Item>>(iter: T) -> Self {
        let mut inventory = Self::new();
        for item in iter {
            inventory.insert(item);
        }
        inventory
    }
}

#[cfg(test)]
mod tests {
    use super::{Inventory, Item, ItemKind, ItemValidationError, LOCATION_WHITE_SHELL};
    use rust_decimal::Decimal;

    fn shell(quantity: i64) -> Item {
        Item::unit_weighted(
            "White Shell",
            Decimal::new(50, 0),
            Decimal::new(quantity, 0),
            LOCATION_WHITE_SHELL,
            0.1,
        )
    }

    #[test]
    fn validate_accepts_seed_like_item() {
        assert_eq!(shell(10).validate(), Ok(()));
    }

    #[test]
    fn validate_rejects_blank_bulk_unit() {
        let item = Item::bulk_measured("Rice", Decimal::ONE, Decimal::TEN, 3, "  ");
        assert_eq!(
            item.validate(),
            Err(ItemValidationError::EmptyMeasurementUnit("Rice".to_string()))
        );
    }

    #[test]
    fn validate_rejects_negative_quantity() {
        let item = shell(-1);
        assert!(matches!(
            item.validate(),
            Err(ItemValidationError::NegativeQuantity(_))
        ));
    }

    #[test]
    fn debit_and_cover_track_on_hand_stock() {
        let mut item = shell(3);
        assert!(item.covers(Decimal::new(3, 0)));
        assert!(!item.covers(Decimal::new(4, 0)));
        item.debit(Decimal::new(2, 0));
        assert_eq!(item.quantity, Decimal::ONE);
    }

    #[test]
    fn kind_serializes_with_tag() {
        let json = serde_json::to_value(&shell(1)).unwrap();
        assert_eq!(json["kind"], "unit_weighted");
        assert_eq!(ItemKind::Simple.discriminant(), "simple");
    }

    #[test]
    fn inventory_is_keyed_by_id() {
        let inventory: Inventory = vec![shell(1), shell(5)].into_iter().collect();
        assert_eq!(inventory.len(), 1);
        assert_eq!(
            inventory.get("White Shell").map(|item| item.quantity),
            Some(Decimal::new(5, 0))
        );
    }
}
