//! # Alert Module
//!
//! Low-stock latch evaluation.
//!
//! ## Latch State Machine (per product)
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │            stock <= min_stock                                          │
//! │   ┌──────────┐  (notify once)   ┌──────────┐                           │
//! │   │  CLEAR   │ ───────────────► │ LATCHED  │ ◄─┐ still low:            │
//! │   │ sent=no  │                  │ sent=yes │ ──┘ nothing happens       │
//! │   └──────────┘ ◄─────────────── └──────────┘                           │
//! │        ▲  │     stock > min_stock                                      │
//! │        └──┘     (silent reset)                                         │
//! │     healthy:                                                            │
//! │     nothing happens                                                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! [`evaluate`] turns a product snapshot into a [`SweepPlan`]; the engine
//! persists the flag changes and sends the single notice.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::types::Product;

/// Subject line of the low-stock notice.
pub const LOW_STOCK_SUBJECT: &str = "Inventory warning: action needed";

/// A product that just crossed into low stock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct LowStockEntry {
    pub product_id: String,
    pub name: String,
    pub stock: i64,
    pub min_stock: i64,
}

impl From<&Product> for LowStockEntry {
    fn from(product: &Product) -> Self {
        LowStockEntry {
            product_id: product.id.clone(),
            name: product.name.clone(),
            stock: product.stock,
            min_stock: product.min_stock,
        }
    }
}

/// What one sweep must do.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepPlan {
    /// Products to latch and announce, in snapshot order.
    pub newly_low: Vec<LowStockEntry>,
    /// Products whose latch resets silently.
    pub recovered: Vec<String>,
}

impl SweepPlan {
    /// Flag writes for the store: `(product_id, alert_sent)`.
    pub fn flag_updates(&self) -> Vec<(String, bool)> {
        self.newly_low
            .iter()
            .map(|e| (e.product_id.clone(), true))
            .chain(self.recovered.iter().map(|id| (id.clone(), false)))
            .collect()
    }

    pub fn is_noop(&self) -> bool {
        self.newly_low.is_empty() && self.recovered.is_empty()
    }
}

/// Evaluates the latch for every product in the snapshot.
pub fn evaluate(products: &[Product]) -> SweepPlan {
    let mut plan = SweepPlan::default();
    for product in products {
        match (product.is_low_stock(), product.alert_sent) {
            (true, false) => plan.newly_low.push(LowStockEntry::from(product)),
            (false, true) => plan.recovered.push(product.id.clone()),
            _ => {}
        }
    }
    plan
}

/// Renders the aggregated notice body.
///
/// ## Example
/// ```text
/// The following products are at or below their minimum stock:
///
/// - Milk 1L: only 2 left (minimum 5)
/// - Bread: only 0 left (minimum 3)
///
/// Please contact suppliers or approve a purchase order.
/// ```
pub fn render_low_stock_notice(entries: &[LowStockEntry]) -> String {
    let mut body = String::from("The following products are at or below their minimum stock:\n\n");
    for entry in entries {
        body.push_str(&format!(
            "- {}: only {} left (minimum {})\n",
            entry.name, entry.stock, entry.min_stock
        ));
    }
    body.push_str("\nPlease contact suppliers or approve a purchase order.\n");
    body
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::money::Money;

    fn product(name: &str, stock: i64, min_stock: i64, alert_sent: bool) -> Product {
        let mut p = Product::new(name, Money::from_major(10), Money::from_major(7), stock, min_stock);
        p.alert_sent = alert_sent;
        p
    }

    #[test]
    fn test_all_four_latch_cases() {
        let products = vec![
            product("low-new", 2, 5, false),
            product("low-latched", 1, 5, true),
            product("healthy-latched", 9, 5, true),
            product("healthy", 9, 5, false),
        ];

        let plan = evaluate(&products);

        assert_eq!(plan.newly_low.len(), 1);
        assert_eq!(plan.newly_low[0].name, "low-new");
        assert_eq!(plan.recovered, vec![products[2].id.clone()]);
        assert_eq!(
            plan.flag_updates(),
            vec![(products[0].id.clone(), true), (products[2].id.clone(), false)]
        );
    }

    #[test]
    fn test_threshold_equal_counts_as_low() {
        let plan = evaluate(&[product("edge", 5, 5, false)]);
        assert_eq!(plan.newly_low.len(), 1);
    }

    #[test]
    fn test_steady_state_is_noop() {
        let plan = evaluate(&[product("a", 1, 5, true), product("b", 50, 5, false)]);
        assert!(plan.is_noop());
    }

    #[test]
    fn test_notice_lists_every_product() {
        let body = render_low_stock_notice(&[
            LowStockEntry {
                product_id: "1".into(),
                name: "Milk 1L".into(),
                stock: 2,
                min_stock: 5,
            },
            LowStockEntry {
                product_id: "2".into(),
                name: "Bread".into(),
                stock: 0,
                min_stock: 3,
            },
        ]);
        assert!(body.contains("- Milk 1L: only 2 left (minimum 5)"));
        assert!(body.contains("- Bread: only 0 left (minimum 3)"));
        assert!(body.ends_with("Please contact suppliers or approve a purchase order.\n"));
    }
}
