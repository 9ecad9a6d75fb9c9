//! # SQLite Stores
//!
//! Store trait implementations over the `till-db` repositories.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

use till_core::{Customer, Product, Sale};
use till_db::{CustomerRepository, Database, ProductRepository, SaleRepository};

use crate::store::{CustomerStore, InventoryStore, SaleLog, StoreResult, Stores};

impl Stores {
    /// Stores backed by one shared SQLite pool.
    pub fn sqlite(db: &Database) -> Self {
        Stores::new(
            Arc::new(db.products()),
            Arc::new(db.customers()),
            Arc::new(db.sales()),
        )
    }
}

#[async_trait]
impl InventoryStore for ProductRepository {
    async fn get_product(&self, id: &str) -> StoreResult<Option<Product>> {
        Ok(self.get_by_id(id).await?)
    }

    async fn save_product(&self, product: &Product) -> StoreResult<()> {
        Ok(self.save(product).await?)
    }

    async fn save_products(&self, products: &[Product]) -> StoreResult<()> {
        Ok(self.save_all(products).await?)
    }

    async fn list_products(&self) -> StoreResult<Vec<Product>> {
        Ok(self.list_all().await?)
    }

    async fn decrement_stock_if_available(&self, id: &str, quantity: i64) -> StoreResult<bool> {
        Ok(ProductRepository::decrement_stock_if_available(self, id, quantity).await?)
    }

    async fn increment_stock(&self, id: &str, quantity: i64) -> StoreResult<bool> {
        Ok(ProductRepository::increment_stock(self, id, quantity).await?)
    }

    async fn save_alert_flags(&self, flags: &[(String, bool)]) -> StoreResult<()> {
        Ok(self.set_alert_flags(flags).await?)
    }

    async fn count_low_stock(&self) -> StoreResult<i64> {
        Ok(ProductRepository::count_low_stock(self).await?)
    }
}

#[async_trait]
impl CustomerStore for CustomerRepository {
    async fn find_by_phone(&self, phone: &str) -> StoreResult<Option<Customer>> {
        Ok(CustomerRepository::find_by_phone(self, phone).await?)
    }

    async fn save_customer(&self, customer: &Customer) -> StoreResult<()> {
        Ok(self.save(customer).await?)
    }

    async fn delete_customer(&self, id: &str) -> StoreResult<()> {
        self.delete(id).await?;
        Ok(())
    }

    async fn top_customers(&self, limit: u32) -> StoreResult<Vec<Customer>> {
        Ok(self.top_by_points(limit).await?)
    }
}

#[async_trait]
impl SaleLog for SaleRepository {
    async fn save_sale(&self, sale: &Sale) -> StoreResult<Sale> {
        self.insert(sale).await?;
        Ok(sale.clone())
    }

    async fn void_sale(&self, id: &str) -> StoreResult<()> {
        self.delete(id).await?;
        Ok(())
    }

    async fn list_sales_in_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StoreResult<Vec<Sale>> {
        Ok(self.list_in_range(start, end).await?)
    }

    async fn list_sales_after(&self, since: DateTime<Utc>) -> StoreResult<Vec<Sale>> {
        Ok(self.list_after(since).await?)
    }

    async fn count_sales(&self) -> StoreResult<i64> {
        Ok(self.count().await?)
    }
}
