//! proptest strategies for inventory data.

use proptest::prelude::*;
use racepay_core::types::{Gender, HoldLine, InventoryKey, Size};

/// Any `(size, gender)` row.
pub fn inventory_key() -> impl Strategy<Value = InventoryKey> {
    (
        prop::sample::select(Size::ALL.to_vec()),
        prop::sample::select(Gender::ALL.to_vec()),
    )
        .prop_map(|(size, gender)| InventoryKey::new(size, gender))
}

/// A hold request of one to four lines, each for one to three units.
pub fn hold_request() -> impl Strategy<Value = Vec<HoldLine>> {
    prop::collection::vec(
        (inventory_key(), 1u32..=3).prop_map(|(key, count)| HoldLine::new(key, count)),
        1..=4,
    )
}

