//! # In-Memory Stores
//!
//! A single [`MemoryStore`] implements every store trait over plain maps,
//! plus a [`RecordingNotifier`] that keeps what it was asked to send.
//! Both support fault injection so rollback paths can be exercised without
//! a broken database.
//!
//! ```rust,ignore
//! let store = MemoryStore::new();
//! store.fail_after(FailPoint::Decrement, 1).await; // 2nd decrement fails
//! let processor = SaleProcessor::new(store.stores(), LoyaltyPolicy::default(), timeout);
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use till_core::{Customer, Product, Sale};

use crate::error::{NotifyError, StoreError};
use crate::notifier::Notifier;
use crate::store::{CustomerStore, InventoryStore, SaleLog, StoreResult, Stores};

// =============================================================================
// Fault Injection
// =============================================================================

/// Store calls that can be made to fail or stall.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailPoint {
    GetProduct,
    ListProducts,
    Decrement,
    Increment,
    SaveAlertFlags,
    FindCustomer,
    SaveCustomer,
    SaveSale,
    ListSales,
}

#[derive(Debug, Default, Clone, Copy)]
struct Fault {
    /// Calls that still succeed before failures start.
    succeed_first: usize,
    failing: bool,
    delay: Option<Duration>,
    /// Sleep after the call has taken effect.
    stall: Option<Duration>,
}

#[derive(Debug, Default)]
struct State {
    products: HashMap<String, Product>,
    customers: HashMap<String, Customer>,
    sales: Vec<Sale>,
    faults: HashMap<FailPoint, Fault>,
}

impl State {
    /// Applies the fault rule for `point`; Err means this call must fail.
    fn check(&mut self, point: FailPoint) -> StoreResult<Option<Duration>> {
        let Some(fault) = self.faults.get_mut(&point) else {
            return Ok(None);
        };
        if fault.failing {
            if fault.succeed_first == 0 {
                return Err(StoreError::unavailable(format!("injected failure at {:?}", point)));
            }
            fault.succeed_first -= 1;
        }
        Ok(fault.delay)
    }
}

// =============================================================================
// Memory Store
// =============================================================================

/// In-memory implementation of [`InventoryStore`], [`CustomerStore`] and
/// [`SaleLog`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(MemoryStore::default())
    }

    /// A [`Stores`] bundle where all three stores are this instance.
    pub fn stores(self: &Arc<Self>) -> Stores {
        Stores::new(self.clone(), self.clone(), self.clone())
    }

    /// Every call at `point` fails from now on.
    pub async fn fail_on(&self, point: FailPoint) {
        self.fail_after(point, 0).await;
    }

    /// The next `successes` calls at `point` succeed, then calls fail.
    pub async fn fail_after(&self, point: FailPoint, successes: usize) {
        let mut state = self.state.lock().await;
        let fault = state.faults.entry(point).or_default();
        fault.failing = true;
        fault.succeed_first = successes;
    }

    /// Every call at `point` first sleeps for `delay` (tokio time).
    pub async fn delay_on(&self, point: FailPoint, delay: Duration) {
        let mut state = self.state.lock().await;
        state.faults.entry(point).or_default().delay = Some(delay);
    }

    /// Every call at `point` takes effect, then sleeps for `delay` before
    /// returning. Models a write that lands but whose reply is late.
    pub async fn stall_after_apply(&self, point: FailPoint, delay: Duration) {
        let mut state = self.state.lock().await;
        state.faults.entry(point).or_default().stall = Some(delay);
    }

    pub async fn clear_faults(&self) {
        self.state.lock().await.faults.clear();
    }

    // -------------------------------------------------------------------------
    // Direct access (bypasses faults)
    // -------------------------------------------------------------------------

    pub async fn insert_product(&self, product: Product) {
        self.state
            .lock()
            .await
            .products
            .insert(product.id.clone(), product);
    }

    pub async fn insert_customer(&self, customer: Customer) {
        self.state
            .lock()
            .await
            .customers
            .insert(customer.id.clone(), customer);
    }

    pub async fn product(&self, id: &str) -> Option<Product> {
        self.state.lock().await.products.get(id).cloned()
    }

    pub async fn customer_by_phone(&self, phone: &str) -> Option<Customer> {
        self.state
            .lock()
            .await
            .customers
            .values()
            .find(|c| c.phone == phone)
            .cloned()
    }

    pub async fn customer_count(&self) -> usize {
        self.state.lock().await.customers.len()
    }

    pub async fn sales(&self) -> Vec<Sale> {
        self.state.lock().await.sales.clone()
    }

    /// Runs the fault rule for `point`, sleeping outside the lock if asked.
    async fn enter(&self, point: FailPoint) -> StoreResult<()> {
        let delay = self.state.lock().await.check(point)?;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(())
    }

    /// Sleeps for the post-apply stall configured at `point`, if any.
    async fn linger(&self, point: FailPoint) {
        let stall = self
            .state
            .lock()
            .await
            .faults
            .get(&point)
            .and_then(|f| f.stall);
        if let Some(stall) = stall {
            tokio::time::sleep(stall).await;
        }
    }
}

#[async_trait]
impl InventoryStore for MemoryStore {
    async fn get_product(&self, id: &str) -> StoreResult<Option<Product>> {
        self.enter(FailPoint::GetProduct).await?;
        Ok(self.state.lock().await.products.get(id).cloned())
    }

    async fn save_product(&self, product: &Product) -> StoreResult<()> {
        self.insert_product(product.clone()).await;
        Ok(())
    }

    async fn save_products(&self, products: &[Product]) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        for product in products {
            state.products.insert(product.id.clone(), product.clone());
        }
        Ok(())
    }

    async fn list_products(&self) -> StoreResult<Vec<Product>> {
        self.enter(FailPoint::ListProducts).await?;
        let mut products: Vec<Product> =
            self.state.lock().await.products.values().cloned().collect();
        products.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        Ok(products)
    }

    async fn decrement_stock_if_available(&self, id: &str, quantity: i64) -> StoreResult<bool> {
        self.enter(FailPoint::Decrement).await?;
        let applied = {
            let mut state = self.state.lock().await;
            match state.products.get_mut(id) {
                Some(product) if product.stock >= quantity => {
                    product.stock -= quantity;
                    product.updated_at = Utc::now();
                    true
                }
                _ => false,
            }
        };
        self.linger(FailPoint::Decrement).await;
        Ok(applied)
    }

    async fn increment_stock(&self, id: &str, quantity: i64) -> StoreResult<bool> {
        self.enter(FailPoint::Increment).await?;
        let mut state = self.state.lock().await;
        match state.products.get_mut(id) {
            Some(product) => {
                product.stock += quantity;
                product.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn save_alert_flags(&self, flags: &[(String, bool)]) -> StoreResult<()> {
        self.enter(FailPoint::SaveAlertFlags).await?;
        let mut state = self.state.lock().await;
        for (id, sent) in flags {
            if let Some(product) = state.products.get_mut(id) {
                product.alert_sent = *sent;
            }
        }
        Ok(())
    }

    async fn count_low_stock(&self) -> StoreResult<i64> {
        self.enter(FailPoint::ListProducts).await?;
        let state = self.state.lock().await;
        Ok(state.products.values().filter(|p| p.is_low_stock()).count() as i64)
    }
}

#[async_trait]
impl CustomerStore for MemoryStore {
    async fn find_by_phone(&self, phone: &str) -> StoreResult<Option<Customer>> {
        self.enter(FailPoint::FindCustomer).await?;
        Ok(self.customer_by_phone(phone).await)
    }

    async fn save_customer(&self, customer: &Customer) -> StoreResult<()> {
        self.enter(FailPoint::SaveCustomer).await?;
        {
            let mut state = self.state.lock().await;
            let taken = state
                .customers
                .values()
                .any(|c| c.phone == customer.phone && c.id != customer.id);
            if taken {
                return Err(StoreError::Conflict(format!(
                    "phone {} already registered",
                    customer.phone
                )));
            }
            state.customers.insert(customer.id.clone(), customer.clone());
        }
        self.linger(FailPoint::SaveCustomer).await;
        Ok(())
    }

    async fn delete_customer(&self, id: &str) -> StoreResult<()> {
        self.state.lock().await.customers.remove(id);
        Ok(())
    }

    async fn top_customers(&self, limit: u32) -> StoreResult<Vec<Customer>> {
        self.enter(FailPoint::FindCustomer).await?;
        let mut customers: Vec<Customer> =
            self.state.lock().await.customers.values().cloned().collect();
        customers.sort_by(|a, b| b.points.cmp(&a.points).then_with(|| a.name.cmp(&b.name)));
        customers.truncate(limit as usize);
        Ok(customers)
    }
}

#[async_trait]
impl SaleLog for MemoryStore {
    async fn save_sale(&self, sale: &Sale) -> StoreResult<Sale> {
        self.enter(FailPoint::SaveSale).await?;
        self.state.lock().await.sales.push(sale.clone());
        self.linger(FailPoint::SaveSale).await;
        Ok(sale.clone())
    }

    async fn void_sale(&self, id: &str) -> StoreResult<()> {
        self.state.lock().await.sales.retain(|s| s.id != id);
        Ok(())
    }

    async fn list_sales_in_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StoreResult<Vec<Sale>> {
        self.enter(FailPoint::ListSales).await?;
        let mut sales: Vec<Sale> = self
            .state
            .lock()
            .await
            .sales
            .iter()
            .filter(|s| s.created_at >= start && s.created_at < end)
            .cloned()
            .collect();
        sales.sort_by_key(|s| s.created_at);
        Ok(sales)
    }

    async fn list_sales_after(&self, since: DateTime<Utc>) -> StoreResult<Vec<Sale>> {
        self.enter(FailPoint::ListSales).await?;
        let mut sales: Vec<Sale> = self
            .state
            .lock()
            .await
            .sales
            .iter()
            .filter(|s| s.created_at > since)
            .cloned()
            .collect();
        sales.sort_by_key(|s| s.created_at);
        Ok(sales)
    }

    async fn count_sales(&self) -> StoreResult<i64> {
        self.enter(FailPoint::ListSales).await?;
        Ok(self.state.lock().await.sales.len() as i64)
    }
}

// =============================================================================
// Recording Notifier
// =============================================================================

/// A sent (or attempted) notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub subject: String,
    pub body: String,
}

/// Keeps every notification; can be switched to fail.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Notice>>,
    failing: Mutex<bool>,
}

impl RecordingNotifier {
    pub fn new() -> Arc<Self> {
        Arc::new(RecordingNotifier::default())
    }

    pub async fn set_failing(&self, failing: bool) {
        *self.failing.lock().await = failing;
    }

    /// Successfully delivered notices, oldest first.
    pub async fn sent(&self) -> Vec<Notice> {
        self.sent.lock().await.clone()
    }

    pub async fn count_with_subject_prefix(&self, prefix: &str) -> usize {
        self.sent
            .lock()
            .await
            .iter()
            .filter(|n| n.subject.starts_with(prefix))
            .count()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, subject: &str, body: &str) -> Result<(), NotifyError> {
        if *self.failing.lock().await {
            return Err(NotifyError("mail relay unreachable".to_string()));
        }
        self.sent.lock().await.push(Notice {
            subject: subject.to_string(),
            body: body.to_string(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use till_core::Money;

    #[tokio::test]
    async fn test_fail_after_counts_successes() {
        let store = MemoryStore::new();
        let p = Product::new("Milk", Money::from_major(5), Money::from_major(3), 10, 1);
        store.insert_product(p.clone()).await;
        store.fail_after(FailPoint::Decrement, 1).await;

        assert!(store.decrement_stock_if_available(&p.id, 1).await.unwrap());
        assert!(store.decrement_stock_if_available(&p.id, 1).await.is_err());
        assert_eq!(store.product(&p.id).await.unwrap().stock, 9);

        store.clear_faults().await;
        assert!(store.decrement_stock_if_available(&p.id, 1).await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stall_applies_before_sleeping() {
        let store = MemoryStore::new();
        let p = Product::new("Milk", Money::from_major(5), Money::from_major(3), 10, 1);
        store.insert_product(p.clone()).await;
        store.stall_after_apply(FailPoint::Decrement, Duration::from_secs(60)).await;

        let call = store.decrement_stock_if_available(&p.id, 2);
        let result = tokio::time::timeout(Duration::from_secs(1), call).await;

        assert!(result.is_err());
        assert_eq!(store.product(&p.id).await.unwrap().stock, 8);
    }

    #[tokio::test]
    async fn test_duplicate_phone_conflicts() {
        let store = MemoryStore::new();
        store.save_customer(&Customer::guest("555")).await.unwrap();
        let err = store.save_customer(&Customer::guest("555")).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_recording_notifier_failure() {
        let notifier = RecordingNotifier::new();
        notifier.notify("a", "b").await.unwrap();
        notifier.set_failing(true).await;
        assert!(notifier.notify("c", "d").await.is_err());
        assert_eq!(notifier.sent().await.len(), 1);
    }
}
