//! # Insights
//!
//! Back-office numbers: low-stock count, a sales overview for a window, the
//! loyalty leaderboard and "customers also bought" suggestions. Read-only.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use till_core::report::{recommend, SalesOverview};
use till_core::{Customer, Product};

use crate::error::EngineResult;
use crate::store::{CustomerStore, InventoryStore, SaleLog, Stores};

/// Leaderboard size when the caller has no preference.
pub const DEFAULT_TOP_CUSTOMERS: u32 = 20;

pub struct InsightsService {
    inventory: Arc<dyn InventoryStore>,
    customers: Arc<dyn CustomerStore>,
    sales: Arc<dyn SaleLog>,
}

impl InsightsService {
    pub fn new(stores: &Stores) -> Self {
        InsightsService {
            inventory: stores.inventory.clone(),
            customers: stores.customers.clone(),
            sales: stores.sales.clone(),
        }
    }

    /// Products at or below their minimum stock.
    pub async fn low_stock_count(&self) -> EngineResult<i64> {
        Ok(self.inventory.count_low_stock().await?)
    }

    /// Overview of sales in `[start, end)`. Cost uses current buying prices.
    pub async fn sales_overview(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> EngineResult<SalesOverview> {
        let sales = self.sales.list_sales_in_range(start, end).await?;
        let lifetime = self.sales.count_sales().await?;
        let products: HashMap<String, Product> = self
            .inventory
            .list_products()
            .await?
            .into_iter()
            .map(|p| (p.id.clone(), p))
            .collect();

        let overview = SalesOverview::compute(&sales, &products, lifetime);
        debug!(
            sales = overview.sale_count,
            revenue_cents = overview.revenue_cents,
            margin_bps = overview.margin_bps,
            "Sales overview computed"
        );
        Ok(overview)
    }

    /// Customers by points, highest first.
    pub async fn top_customers(&self, limit: u32) -> EngineResult<Vec<Customer>> {
        Ok(self.customers.top_customers(limit).await?)
    }

    /// Up to three products to offer alongside `product_id`, drawn from the
    /// whole sale history. See [`till_core::report::recommend`].
    pub async fn recommendations(&self, product_id: &str) -> EngineResult<Vec<Product>> {
        let sales = self.sales.list_sales_after(DateTime::<Utc>::UNIX_EPOCH).await?;
        let catalogue = self.inventory.list_products().await?;

        let picks = recommend(product_id, &sales, &catalogue);
        debug!(product_id = %product_id, history = sales.len(), picks = picks.len(), "Recommendations computed");
        Ok(picks)
    }
}

impl std::fmt::Debug for InsightsService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InsightsService").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use crate::processor::SaleProcessor;
    use chrono::Duration;
    use std::time::Duration as StdDuration;
    use till_core::loyalty::LoyaltyPolicy;
    use till_core::{Money, PaymentMethod, SaleLineRequest, SaleRequest};

    #[tokio::test]
    async fn test_overview_after_checkouts() {
        let store = MemoryStore::new();
        let stores = store.stores();
        let milk = Product::new("Milk", Money::from_major(10), Money::from_major(6), 20, 5).with_category("Dairy");
        let tea = Product::new("Tea", Money::from_major(20), Money::from_major(15), 3, 5);
        store.insert_product(milk.clone()).await;
        store.insert_product(tea.clone()).await;

        let processor = SaleProcessor::new(stores.clone(), LoyaltyPolicy::default(), StdDuration::from_secs(5));
        processor
            .process_sale(
                &SaleRequest::new("Asha")
                    .line(SaleLineRequest::new(&milk.id, 3, milk.selling_price()))
                    .line(SaleLineRequest::new(&tea.id, 1, tea.selling_price())),
            )
            .await
            .unwrap();
        processor
            .process_sale(
                &SaleRequest::new("Ravi")
                    .payment_method(PaymentMethod::Upi)
                    .line(SaleLineRequest::new(&milk.id, 1, milk.selling_price())),
            )
            .await
            .unwrap();

        let insights = InsightsService::new(&stores);
        let now = Utc::now();
        let overview = insights
            .sales_overview(now - Duration::hours(1), now + Duration::hours(1))
            .await
            .unwrap();

        assert_eq!(overview.sale_count, 2);
        assert_eq!(overview.revenue_cents, 6_000);
        assert_eq!(overview.cost_cents, 3_900);
        assert_eq!(overview.profit_cents, 2_100);
        assert_eq!(overview.margin_bps, 3_500);
        assert_eq!(overview.top_products[0].product_name, "Milk");
        assert_eq!(overview.top_products[0].units, 4);
        assert_eq!(overview.revenue_by_payment[&PaymentMethod::Upi], 1_000);
        assert_eq!(overview.revenue_by_cashier["Asha"], 5_000);
        assert_eq!(overview.lifetime_sale_count, 2);
        assert_eq!(overview.recent_sales.len(), 2);
        assert_eq!(overview.revenue_by_category["Dairy"], 4_000);

        assert_eq!(insights.low_stock_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_recommendations_from_history() {
        let store = MemoryStore::new();
        let stores = store.stores();
        let bread = Product::new("Bread", Money::from_major(3), Money::from_major(2), 50, 5).with_category("Bakery");
        let butter = Product::new("Butter", Money::from_major(5), Money::from_major(3), 50, 5).with_category("Dairy");
        let bun = Product::new("Bun", Money::from_major(1), Money::from_major(1), 50, 5).with_category("Bakery");
        let tea = Product::new("Tea", Money::from_major(3), Money::from_major(1), 50, 5);
        for p in [&bread, &butter, &bun, &tea] {
            store.insert_product(p.clone()).await;
        }

        let processor = SaleProcessor::new(stores.clone(), LoyaltyPolicy::default(), StdDuration::from_secs(5));
        let checkout = |lines: Vec<SaleLineRequest>| {
            let mut request = SaleRequest::new("Asha");
            for l in lines {
                request = request.line(l);
            }
            request
        };
        processor
            .process_sale(&checkout(vec![
                SaleLineRequest::new(&bread.id, 1, bread.selling_price()),
                SaleLineRequest::new(&butter.id, 1, butter.selling_price()),
            ]))
            .await
            .unwrap();
        processor
            .process_sale(&checkout(vec![SaleLineRequest::new(&tea.id, 4, tea.selling_price())]))
            .await
            .unwrap();

        let insights = InsightsService::new(&stores);
        let names: Vec<String> = insights
            .recommendations(&bread.id)
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.name)
            .collect();
        assert_eq!(names, vec!["Butter", "Bun", "Tea"]);
    }

    #[tokio::test]
    async fn test_top_customers_ranked() {
        let store = MemoryStore::new();
        for (phone, points) in [("1", 10), ("2", 900), ("3", 300)] {
            let mut c = Customer::guest(phone);
            c.points = points;
            store.insert_customer(c).await;
        }

        let insights = InsightsService::new(&store.stores());
        let top: Vec<i64> = insights
            .top_customers(2)
            .await
            .unwrap()
            .iter()
            .map(|c| c.points)
            .collect();
        assert_eq!(top, vec![900, 300]);
    }
}
