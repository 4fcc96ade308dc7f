//! Low-stock derivation.
//!
//! Pure functions of committed item state; the notifier is never consulted.

use serde::{Deserialize, Serialize};

use storekeep_core::ItemId;

use crate::Item;

/// `true` when the item is at or below its threshold.
pub fn is_low(item: &Item) -> bool {
    item.quantity() <= item.low_stock_threshold
}

/// What the external notifier receives for one item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LowStockAlert {
    pub item_id: ItemId,
    pub item_name: String,
    pub quantity: i64,
    pub threshold: i64,
}

impl LowStockAlert {
    /// `Some` only when the item is low.
    pub fn for_item(item: &Item) -> Option<Self> {
        is_low(item).then(|| Self {
            item_id: item.id,
            item_name: item.name.clone(),
            quantity: item.quantity(),
            threshold: item.low_stock_threshold,
        })
    }
}

/// Alerts for every low item in `items`, lowest quantity first.
pub fn low_stock_alerts<'a>(items: impl IntoIterator<Item = &'a Item>) -> Vec<LowStockAlert> {
    let mut out: Vec<LowStockAlert> = items.into_iter().filter_map(LowStockAlert::for_item).collect();
    out.sort_by(|a, b| a.quantity.cmp(&b.quantity).then_with(|| a.item_name.cmp(&b.item_name)));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use proptest::prelude::*;

    use crate::ItemDraft;

    fn item(name: &str, quantity: i64, threshold: i64) -> Item {
        ItemDraft {
            name: name.to_string(),
            category_id: None,
            quantity,
            low_stock_threshold: threshold,
            description: None,
            unit: None,
            location: None,
        }
        .into_item(ItemId::new(), Utc::now())
        .unwrap()
    }

    #[test]
    fn threshold_is_inclusive() {
        assert!(is_low(&item("a", 5, 5)));
        assert!(is_low(&item("a", 4, 5)));
        assert!(!is_low(&item("a", 6, 5)));
    }

    #[test]
    fn alerts_only_for_low_items_sorted_by_quantity() {
        let items = vec![item("b", 3, 5), item("ok", 50, 5), item("a", 0, 1)];
        let alerts = low_stock_alerts(&items);
        let names: Vec<&str> = alerts.iter().map(|a| a.item_name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(alerts[1].threshold, 5);
    }

    proptest! {
        #[test]
        fn alert_exists_iff_is_low(q in 0i64..100, t in 0i64..100) {
            let it = item("x", q, t);
            prop_assert_eq!(LowStockAlert::for_item(&it).is_some(), q <= t);
        }
    }
}
