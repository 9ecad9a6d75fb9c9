//! # Report Module
//!
//! Aggregations over committed sales: the daily closing summary, the
//! back-office sales overview and product recommendations.

use chrono::{DateTime, Duration, NaiveDate, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use ts_rs::TS;

use crate::money::Money;
use crate::types::{PaymentMethod, Product, Sale};

/// Number of products listed in [`SalesOverview::top_products`].
pub const TOP_PRODUCTS_LIMIT: usize = 5;

/// Number of sales listed in [`SalesOverview::recent_sales`].
pub const RECENT_SALES_LIMIT: usize = 10;

/// Trading hours (UTC, inclusive) covered by [`SalesOverview::hourly_traffic`].
pub const TRADING_HOURS: std::ops::RangeInclusive<u32> = 9..=21;

/// Products returned by [`recommend`].
pub const RECOMMENDATION_LIMIT: usize = 3;

/// Half-open UTC window `[00:00, next 00:00)` covering `date`.
pub fn day_window(date: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = date.and_time(chrono::NaiveTime::MIN).and_utc();
    (start, start + Duration::days(1))
}

// =============================================================================
// Daily Summary
// =============================================================================

/// End-of-day figures. Sent every day, even when zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct DailySummary {
    #[ts(as = "String")]
    pub date: NaiveDate,
    pub sale_count: i64,
    pub revenue_cents: i64,
}

impl DailySummary {
    pub fn from_sales(date: NaiveDate, sales: &[Sale]) -> Self {
        DailySummary {
            date,
            sale_count: sales.len() as i64,
            revenue_cents: sales.iter().map(Sale::total).sum::<Money>().cents(),
        }
    }

    #[inline]
    pub fn revenue(&self) -> Money {
        Money::from_cents(self.revenue_cents)
    }

    pub fn subject(&self) -> String {
        format!("Daily closing report - {}", self.date.format("%Y-%m-%d"))
    }

    pub fn body(&self) -> String {
        format!(
            "Closing summary for {}\n\nSales: {}\nRevenue: {}\n",
            self.date.format("%Y-%m-%d"),
            self.sale_count,
            self.revenue()
        )
    }
}

// =============================================================================
// Sales Overview
// =============================================================================

/// Units and revenue for one product within an overview window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ProductSales {
    pub product_id: String,
    pub product_name: String,
    pub units: i64,
    pub revenue_cents: i64,
}

/// Back-office figures for a window of sales.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SalesOverview {
    pub sale_count: i64,
    pub revenue_cents: i64,
    /// Cost of goods sold at current buying prices.
    pub cost_cents: i64,
    pub profit_cents: i64,
    /// Profit over revenue in basis points, rounded half up.
    pub margin_bps: i64,
    /// Best sellers by units, ties broken by name.
    pub top_products: Vec<ProductSales>,
    pub revenue_by_payment: BTreeMap<PaymentMethod, i64>,
    pub revenue_by_cashier: BTreeMap<String, i64>,
    /// Line revenue per product category. Uncategorised and deleted
    /// products are left out.
    pub revenue_by_category: BTreeMap<String, i64>,
    /// Sales started in each trading hour; every hour is present.
    pub hourly_traffic: BTreeMap<u32, i64>,
    /// Every sale ever recorded, not only this window.
    pub lifetime_sale_count: i64,
    /// Newest first.
    pub recent_sales: Vec<Sale>,
}

impl SalesOverview {
    /// Builds the overview. `products` supplies buying prices and categories;
    /// lines whose product no longer exists count at zero cost.
    pub fn compute(
        sales: &[Sale],
        products: &HashMap<String, Product>,
        lifetime_sale_count: i64,
    ) -> Self {
        let mut revenue = Money::zero();
        let mut cost = Money::zero();
        let mut by_product: HashMap<&str, ProductSales> = HashMap::new();
        let mut revenue_by_payment = BTreeMap::new();
        let mut revenue_by_cashier = BTreeMap::new();
        let mut revenue_by_category = BTreeMap::new();
        let mut hourly_traffic: BTreeMap<u32, i64> = TRADING_HOURS.map(|h| (h, 0)).collect();

        for sale in sales {
            revenue += sale.total();
            *revenue_by_payment.entry(sale.payment_method).or_insert(0) += sale.total_cents;
            *revenue_by_cashier
                .entry(sale.cashier_name.clone())
                .or_insert(0) += sale.total_cents;
            if let Some(count) = hourly_traffic.get_mut(&sale.created_at.hour()) {
                *count += 1;
            }

            for item in &sale.items {
                if let Some(product) = products.get(&item.product_id) {
                    cost += product.buying_price().multiply_quantity(item.quantity);
                    if let Some(category) = &product.category {
                        *revenue_by_category.entry(category.clone()).or_insert(0) +=
                            item.line_total_cents;
                    }
                }
                let entry = by_product
                    .entry(item.product_id.as_str())
                    .or_insert_with(|| ProductSales {
                        product_id: item.product_id.clone(),
                        product_name: item.product_name.clone(),
                        units: 0,
                        revenue_cents: 0,
                    });
                entry.units += item.quantity;
                entry.revenue_cents += item.line_total_cents;
            }
        }

        let mut top_products: Vec<ProductSales> = by_product.into_values().collect();
        top_products.sort_by(|a, b| {
            b.units
                .cmp(&a.units)
                .then_with(|| a.product_name.cmp(&b.product_name))
        });
        top_products.truncate(TOP_PRODUCTS_LIMIT);

        let mut recent_sales = sales.to_vec();
        recent_sales.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        recent_sales.truncate(RECENT_SALES_LIMIT);

        let profit = revenue - cost;
        SalesOverview {
            sale_count: sales.len() as i64,
            revenue_cents: revenue.cents(),
            cost_cents: cost.cents(),
            profit_cents: profit.cents(),
            margin_bps: profit.ratio_bps(revenue),
            top_products,
            revenue_by_payment,
            revenue_by_cashier,
            revenue_by_category,
            hourly_traffic,
            lifetime_sale_count,
            recent_sales,
        }
    }
}

// =============================================================================
// Recommendations
// =============================================================================

/// Products bought together with `product_id`, most frequent first.
///
/// Each line of another product in a sale that also contains `product_id`
/// counts once. Ties go to the smaller id.
pub fn co_purchase_ranking(sales: &[Sale], product_id: &str) -> Vec<String> {
    let mut frequency: HashMap<&str, i64> = HashMap::new();
    for sale in sales {
        if !sale.items.iter().any(|i| i.product_id == product_id) {
            continue;
        }
        for item in sale.items.iter().filter(|i| i.product_id != product_id) {
            *frequency.entry(item.product_id.as_str()).or_insert(0) += 1;
        }
    }
    ranked(frequency)
}

/// Every product ever sold, by units, highest first. Ties go to the smaller id.
pub fn best_sellers(sales: &[Sale]) -> Vec<String> {
    let mut units: HashMap<&str, i64> = HashMap::new();
    for item in sales.iter().flat_map(|s| &s.items) {
        *units.entry(item.product_id.as_str()).or_insert(0) += item.quantity;
    }
    ranked(units)
}

fn ranked(counts: HashMap<&str, i64>) -> Vec<String> {
    let mut entries: Vec<(&str, i64)> = counts.into_iter().collect();
    entries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    entries.into_iter().map(|(id, _)| id.to_string()).collect()
}

/// Up to [`RECOMMENDATION_LIMIT`] products to suggest next to `product_id`.
///
/// ```text
///   1. bought together with it (co_purchase_ranking)
///   2. same category, by name          } only while slots are free
///   3. store-wide best sellers         }
/// ```
///
/// Only products still in `catalogue` are returned and never `product_id`
/// itself. An unknown `product_id` skips the category stage.
///
/// ## Example
/// ```rust
/// use till_core::report::recommend;
/// use till_core::{Money, Product};
///
/// let tea = Product::new("Tea", Money::from_major(3), Money::from_major(1), 10, 1).with_category("Drinks");
/// let coffee = Product::new("Coffee", Money::from_major(4), Money::from_major(2), 10, 1).with_category("Drinks");
/// let catalogue = vec![tea.clone(), coffee.clone()];
///
/// let picks = recommend(&tea.id, &[], &catalogue);
/// assert_eq!(picks, vec![coffee]);
/// ```
pub fn recommend(product_id: &str, sales: &[Sale], catalogue: &[Product]) -> Vec<Product> {
    let mut picker = Picker {
        by_id: catalogue.iter().map(|p| (p.id.as_str(), p)).collect(),
        exclude: product_id,
        picked: Vec::with_capacity(RECOMMENDATION_LIMIT),
    };

    for id in co_purchase_ranking(sales, product_id) {
        picker.offer(&id);
    }

    if !picker.is_full() {
        let own = catalogue.iter().find(|p| p.id == product_id);
        if let Some(category) = own.and_then(|p| p.category.as_deref()) {
            let mut mates: Vec<&Product> = catalogue
                .iter()
                .filter(|p| p.category.as_deref() == Some(category))
                .collect();
            mates.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
            for mate in mates {
                picker.offer(&mate.id);
            }
        }
    }

    if !picker.is_full() {
        for id in best_sellers(sales) {
            picker.offer(&id);
        }
    }

    picker.picked.into_iter().cloned().collect()
}

struct Picker<'a, 'p> {
    by_id: HashMap<&'a str, &'a Product>,
    exclude: &'p str,
    picked: Vec<&'a Product>,
}

impl Picker<'_, '_> {
    fn is_full(&self) -> bool {
        self.picked.len() >= RECOMMENDATION_LIMIT
    }

    /// Adds a catalogue product unless full, excluded or already picked.
    fn offer(&mut self, id: &str) {
        if self.is_full() || id == self.exclude {
            return;
        }
        if let Some(&product) = self.by_id.get(id) {
            if !self.picked.iter().any(|p| p.id == product.id) {
                self.picked.push(product);
            }
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
