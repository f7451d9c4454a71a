//! Demo data written by `ensure_seed_data` / `reset_to_seed`.

use crate::model::item::{Item, LOCATION_BLACK_SHELL, LOCATION_WHITE_SHELL};
use crate::model::order::OrderLine;
use rust_decimal::Decimal;

pub const WHITE_SHELL: &str = "White Shell";
pub const BLACK_SHELL: &str = "Black Shell";

const MINUTE_MS: i64 = 60 * 1000;

/// Seed order before it has a generated id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeedOrder {
    pub created_at: i64,
    pub lines: Vec<OrderLine>,
}

pub fn seed_items() -> Vec<Item> {
    vec![
        Item::unit_weighted(
            WHITE_SHELL,
            Decimal::new(50, 0),
            Decimal::new(10, 0),
            LOCATION_WHITE_SHELL,
            0.10,
        ),
        Item::unit_weighted(
            BLACK_SHELL,
            Decimal::new(50, 0),
            Decimal::new(10, 0),
            LOCATION_BLACK_SHELL,
            0.10,
        ),
    ]
}

/// Three queued orders placed 10, 7 and 2 minutes before `now_ms`.
pub fn seed_orders(now_ms: i64) -> Vec<SeedOrder> {
    vec![
        SeedOrder {
            created_at: now_ms - 10 * MINUTE_MS,
            lines: vec![OrderLine::new(WHITE_SHELL, Decimal::new(2, 0))],
        },
        SeedOrder {
            created_at: now_ms - 7 * MINUTE_MS,
            lines: vec![OrderLine::new(BLACK_SHELL, Decimal::new(2, 0))],
        },
        SeedOrder {
            created_at: now_ms - 2 * MINUTE_MS,
            lines: vec![
                OrderLine::new(WHITE_SHELL, Decimal::ONE),
                OrderLine::new(BLACK_SHELL, Decimal::ONE),
            ],
        },
    ]
}
