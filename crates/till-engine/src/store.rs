//! # Store Traits
//!
//! The engine talks to persistence only through these traits, so the same
//! checkout and scheduling code runs over SQLite in production and over the
//! in-memory stores in tests.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  SaleProcessor ─┐                      ┌─► SQLite repositories          │
//! │  AlertJobs     ─┼─► Stores { Arc<dyn> }┤   (sqlite.rs)                  │
//! │  ForecastSvc   ─┤                      └─► Memory stores                │
//! │  InsightsSvc   ─┘                          (memory.rs)                  │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

use till_core::{Customer, Product, Sale};

use crate::error::StoreError;

pub type StoreResult<T> = Result<T, StoreError>;

// =============================================================================
// Inventory
// =============================================================================

#[async_trait]
pub trait InventoryStore: Send + Sync {
    async fn get_product(&self, id: &str) -> StoreResult<Option<Product>>;

    /// Inserts or fully replaces a product record.
    async fn save_product(&self, product: &Product) -> StoreResult<()>;

    /// Saves several products atomically.
    async fn save_products(&self, products: &[Product]) -> StoreResult<()>;

    async fn list_products(&self) -> StoreResult<Vec<Product>>;

    /// Removes `quantity` units only if that many are on hand. Returns false,
    /// changing nothing, when stock is short or the product is unknown.
    async fn decrement_stock_if_available(&self, id: &str, quantity: i64) -> StoreResult<bool>;

    /// Adds `quantity` units. Returns false when the product is unknown.
    async fn increment_stock(&self, id: &str, quantity: i64) -> StoreResult<bool>;

    /// Writes alert latches atomically without touching any other field.
    async fn save_alert_flags(&self, flags: &[(String, bool)]) -> StoreResult<()>;

    async fn count_low_stock(&self) -> StoreResult<i64>;
}

// =============================================================================
// Customers
// =============================================================================

#[async_trait]
pub trait CustomerStore: Send + Sync {
    async fn find_by_phone(&self, phone: &str) -> StoreResult<Option<Customer>>;

    async fn save_customer(&self, customer: &Customer) -> StoreResult<()>;

    /// Removes a customer record. Only used to undo a guest created by a
    /// checkout that then failed.
    async fn delete_customer(&self, id: &str) -> StoreResult<()>;

    /// Highest balances first.
    async fn top_customers(&self, limit: u32) -> StoreResult<Vec<Customer>>;
}

// =============================================================================
// Sale Log
// =============================================================================

#[async_trait]
pub trait SaleLog: Send + Sync {
    /// Appends a sale with its items atomically and returns it as stored.
    async fn save_sale(&self, sale: &Sale) -> StoreResult<Sale>;

    /// Removes a sale with its items. Only used when a checkout gave up while
    /// its sale write was in flight; a missing sale is not an error.
    async fn void_sale(&self, id: &str) -> StoreResult<()>;

    /// Sales with `start <= created_at < end`, oldest first.
    async fn list_sales_in_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StoreResult<Vec<Sale>>;

    /// Sales with `created_at > since`, oldest first.
    async fn list_sales_after(&self, since: DateTime<Utc>) -> StoreResult<Vec<Sale>>;

    /// Every sale ever recorded.
    async fn count_sales(&self) -> StoreResult<i64>;
}

// =============================================================================
// Bundle
// =============================================================================

/// The three stores, shared by every engine component.
#[derive(Clone)]
pub struct Stores {
    pub inventory: Arc<dyn InventoryStore>,
    pub customers: Arc<dyn CustomerStore>,
    pub sales: Arc<dyn SaleLog>,
}

impl Stores {
    pub fn new(
        inventory: Arc<dyn InventoryStore>,
        customers: Arc<dyn CustomerStore>,
        sales: Arc<dyn SaleLog>,
    ) -> Self {
        Stores {
            inventory,
            customers,
            sales,
        }
    }
}

impl std::fmt::Debug for Stores {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stores").finish_non_exhaustive()
    }
}
