//! # Sale Processor
//!
//! Commits a checkout: stock, loyalty points and the sale record move
//! together or not at all.
//!
//! ## Commit Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  validate request (pure) ──────────────────────────► Validation        │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  lock products (sorted) + phone ───────────────────► TransactionTimeout│
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  look up + check combined demand ──────────────────► ProductNotFound   │
//! │       │                              (no mutation)   InsufficientStock │
//! │       ▼                                                                 │
//! │  ┌────────────────────── journaled ──────────────────────┐             │
//! │  │ decrement_stock_if_available  per product             │             │
//! │  │ find/create customer, accrue, save                    │             │
//! │  │ save sale (sale + items in one write)                 │             │
//! │  └───────────────────────────────────────────────────────┘             │
//! │       │ any failure or deadline                                         │
//! │       ▼                                                                 │
//! │  unwind journal (increment stock, restore customer) ─► error           │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Concurrency
//! Product locks are held from the stock check through the sale write, so two
//! sales of the same product on this process are serialized. The store's
//! conditional decrement still guards against writers outside the process.
//! The phone lock is held just as long, which keeps point accruals for one
//! customer from overwriting each other and makes restoring the pre-sale
//! balance safe.
//!
//! ## Deadline
//! The whole commit shares one budget. Lock waits and every store call are
//! bounded by it. A write still in flight at the deadline is abandoned and
//! its effect is treated as unknown:
//!
//! ```text
//!   decrement      re-read the product; journal it if the stock moved by
//!                  exactly the sale quantity
//!   customer save  journal the undo anyway (restore/delete are idempotent)
//!   sale write     journal a void of the sale id
//! ```

use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use till_core::loyalty::LoyaltyPolicy;
use till_core::validation::validate_sale_request;
use till_core::{
    new_id, Customer, Money, Product, Sale, SaleItem, SaleRequest, ValidationError,
};

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult, StoreError};
use crate::locks::{KeyedGuard, KeyedLocks};
use crate::store::Stores;

// =============================================================================
// Compensation Journal
// =============================================================================

enum CustomerUndo {
    /// The customer was created by this sale.
    Delete(String),
    /// Put back the pre-sale record.
    Restore(Customer),
}

/// Mutations applied so far, in order.
#[derive(Default)]
struct Journal {
    decrements: Vec<(String, i64)>,
    customer: Option<CustomerUndo>,
    /// Sale written (or possibly written) before the deadline hit.
    sale: Option<String>,
}

impl Journal {
    /// Reverts everything recorded, newest first. Failures are logged; there
    /// is nothing better to do with them at this point.
    async fn unwind(self, stores: &Stores) {
        if let Some(sale_id) = self.sale {
            if let Err(e) = stores.sales.void_sale(&sale_id).await {
                error!(?e, sale_id = %sale_id, "Failed to void sale during rollback");
            }
        }

        if let Some(undo) = self.customer {
            let result = match &undo {
                CustomerUndo::Delete(id) => stores.customers.delete_customer(id).await,
                CustomerUndo::Restore(customer) => stores.customers.save_customer(customer).await,
            };
            if let Err(e) = result {
                error!(?e, "Failed to restore customer during sale rollback");
            }
        }

        for (product_id, quantity) in self.decrements.into_iter().rev() {
            match stores.inventory.increment_stock(&product_id, quantity).await {
                Ok(true) => debug!(product_id = %product_id, quantity, "Stock restored"),
                Ok(false) => error!(product_id = %product_id, quantity, "Product vanished during sale rollback"),
                Err(e) => error!(?e, product_id = %product_id, quantity, "Failed to restore stock during sale rollback"),
            }
        }
    }
}

// =============================================================================
// Sale Processor
// =============================================================================

/// Checkout entry point. Cheap to share behind an `Arc`.
#[derive(Debug)]
pub struct SaleProcessor {
    stores: Stores,
    policy: LoyaltyPolicy,
    timeout: Duration,
    product_locks: KeyedLocks,
    customer_locks: KeyedLocks,
}

impl SaleProcessor {
    pub fn new(stores: Stores, policy: LoyaltyPolicy, timeout: Duration) -> Self {
        SaleProcessor {
            stores,
            policy,
            timeout,
            product_locks: KeyedLocks::new(),
            customer_locks: KeyedLocks::new(),
        }
    }

    pub fn from_config(stores: Stores, config: &EngineConfig) -> Self {
        Self::new(stores, config.loyalty.clone(), config.checkout_timeout())
    }

    pub fn policy(&self) -> &LoyaltyPolicy {
        &self.policy
    }

    /// Processes one checkout.
    ///
    /// ## Returns
    /// * `Ok(Sale)` - the committed sale, items in request order
    /// * `Err(Validation | ProductNotFound | InsufficientStock)` - nothing was
    ///   changed
    /// * `Err(StorageFailure | TransactionTimeout)` - whatever was applied has
    ///   been rolled back; safe to retry
    ///
    /// ## Example
    /// ```rust,ignore
    /// let sale = processor
    ///     .process_sale(&SaleRequest::new("Asha")
    ///         .customer_phone("999")
    ///         .line(SaleLineRequest::new(&apple.id, 1, Money::from_major(50))))
    ///     .await?;
    /// ```
    pub async fn process_sale(&self, request: &SaleRequest) -> EngineResult<Sale> {
        let total = validate_sale_request(request)?;
        let deadline = self.deadline()?;
        let demand = request.demand_by_product();

        let _products_held = self
            .lock(&self.product_locks, demand.keys().copied(), deadline)
            .await?;
        let _phone_held = match request.phone() {
            Some(phone) => Some(self.lock(&self.customer_locks, [phone], deadline).await?),
            None => None,
        };

        let products = self.load_and_check(request, &demand, deadline).await?;

        let mut journal = Journal::default();
        match self
            .commit(request, total, &demand, &products, deadline, &mut journal)
            .await
        {
            Ok(sale) => {
                info!(
                    sale_id = %sale.id,
                    total = %sale.total(),
                    lines = sale.items.len(),
                    cashier = %sale.cashier_name,
                    "Sale committed"
                );
                Ok(sale)
            }
            Err(e) => {
                warn!(error = %e, "Sale failed, rolling back");
                journal.unwind(&self.stores).await;
                Err(e)
            }
        }
    }

    /// Adds stock from a delivery. Leaves the alert latch to the next sweep.
    /// Only the lock wait is bounded; the increment itself is never abandoned.
    pub async fn restock(&self, product_id: &str, quantity: i64) -> EngineResult<Product> {
        if quantity <= 0 {
            return Err(ValidationError::MustBePositive {
                field: "quantity".to_string(),
            }
            .into());
        }

        let deadline = self.deadline()?;
        let _held = self.lock(&self.product_locks, [product_id], deadline).await?;

        if !self.stores.inventory.increment_stock(product_id, quantity).await? {
            return Err(EngineError::ProductNotFound(product_id.to_string()));
        }

        let product = self
            .stores
            .inventory
            .get_product(product_id)
            .await?
            .ok_or_else(|| EngineError::ProductNotFound(product_id.to_string()))?;

        info!(product_id = %product_id, quantity, stock = product.stock, "Product restocked");
        Ok(product)
    }

    // =========================================================================
    // Steps
    // =========================================================================

    async fn lock<'k>(
        &self,
        locks: &KeyedLocks,
        keys: impl IntoIterator<Item = &'k str>,
        deadline: Instant,
    ) -> EngineResult<KeyedGuard> {
        tokio::time::timeout_at(deadline, locks.acquire(keys))
            .await
            .map_err(|_| self.timed_out())
    }

    /// Resolves every product in line order and checks the combined demand.
    async fn load_and_check<'r>(
        &self,
        request: &'r SaleRequest,
        demand: &BTreeMap<&'r str, i64>,
        deadline: Instant,
    ) -> EngineResult<HashMap<&'r str, Product>> {
        let mut products: HashMap<&str, Product> = HashMap::new();

        for line in &request.items {
            let id = line.product_id.as_str();
            if products.contains_key(id) {
                continue;
            }

            let product = self
                .bounded(deadline, self.stores.inventory.get_product(id))
                .await?
                .ok_or_else(|| EngineError::ProductNotFound(id.to_string()))?;

            let requested = demand.get(id).copied().unwrap_or(line.quantity);
            if !product.can_sell(requested) {
                debug!(product_id = %id, available = product.stock, requested, "Insufficient stock");
                return Err(insufficient(&product, product.stock, requested));
            }

            products.insert(id, product);
        }

        Ok(products)
    }

    async fn commit(
        &self,
        request: &SaleRequest,
        total: Money,
        demand: &BTreeMap<&str, i64>,
        products: &HashMap<&str, Product>,
        deadline: Instant,
        journal: &mut Journal,
    ) -> EngineResult<Sale> {
        for (&id, &quantity) in demand {
            self.check_deadline(deadline)?;
            let call = self.stores.inventory.decrement_stock_if_available(id, quantity);
            let applied = match tokio::time::timeout_at(deadline, call).await {
                Ok(result) => result?,
                Err(_) => {
                    let before = products.get(id).map(|p| p.stock);
                    if self.decrement_landed(id, quantity, before).await {
                        journal.decrements.push((id.to_string(), quantity));
                    }
                    return Err(self.timed_out());
                }
            };

            if !applied {
                // another writer got there between our check and the update
                let current = self
                    .bounded(deadline, self.stores.inventory.get_product(id))
                    .await
                    .ok()
                    .flatten();
                let (snapshot, available) = match (&current, products.get(id)) {
                    (Some(p), _) => (p, p.stock),
                    (None, Some(p)) => (p, 0),
                    (None, None) => return Err(EngineError::ProductNotFound(id.to_string())),
                };
                return Err(insufficient(snapshot, available, quantity));
            }
            journal.decrements.push((id.to_string(), quantity));
        }

        let sale_id = new_id();
        let mut items = Vec::with_capacity(request.items.len());
        for (line_no, line) in request.items.iter().enumerate() {
            let product = products
                .get(line.product_id.as_str())
                .ok_or_else(|| EngineError::ProductNotFound(line.product_id.clone()))?;
            items.push(SaleItem::snapshot(&sale_id, line_no, product, line));
        }

        let customer_id = match request.phone() {
            Some(phone) => Some(self.accrue_points(phone, total, deadline, journal).await?),
            None => None,
        };

        let sale = Sale {
            id: sale_id,
            cashier_name: request.cashier().to_string(),
            payment_method: request.payment_method.unwrap_or_default(),
            status: request.status.unwrap_or_default(),
            customer_id,
            total_cents: total.cents(),
            created_at: Utc::now(),
            items,
        };

        self.check_deadline(deadline)?;
        let written = tokio::time::timeout_at(deadline, self.stores.sales.save_sale(&sale)).await;
        match written {
            Ok(result) => Ok(result?),
            Err(_) => {
                journal.sale = Some(sale.id);
                Err(self.timed_out())
            }
        }
    }

    /// Credits the customer behind `phone`, creating them on first sight.
    /// Returns the customer id.
    async fn accrue_points(
        &self,
        phone: &str,
        total: Money,
        deadline: Instant,
        journal: &mut Journal,
    ) -> EngineResult<String> {
        let existing = self
            .bounded(deadline, self.stores.customers.find_by_phone(phone))
            .await?;

        let (mut customer, undo) = match existing {
            Some(customer) => {
                let undo = CustomerUndo::Restore(customer.clone());
                (customer, undo)
            }
            None => {
                let guest = Customer::guest(phone);
                let undo = CustomerUndo::Delete(guest.id.clone());
                (guest, undo)
            }
        };

        let accrual = self.policy.accrue(customer.points, total);
        customer.points = accrual.balance_after;
        customer.updated_at = Utc::now();

        self.check_deadline(deadline)?;
        let saved = tokio::time::timeout_at(deadline, self.stores.customers.save_customer(&customer)).await;
        match saved {
            Ok(result) => {
                result?;
                journal.customer = Some(undo);
            }
            Err(_) => {
                journal.customer = Some(undo);
                return Err(self.timed_out());
            }
        }

        debug!(
            customer_id = %customer.id,
            tier = ?accrual.tier,
            awarded = accrual.awarded_points,
            balance = accrual.balance_after,
            "Loyalty points accrued"
        );
        Ok(customer.id)
    }

    /// Runs a store call that changes nothing, giving up at `deadline`.
    async fn bounded<T>(
        &self,
        deadline: Instant,
        call: impl Future<Output = Result<T, StoreError>>,
    ) -> EngineResult<T> {
        self.check_deadline(deadline)?;
        match tokio::time::timeout_at(deadline, call).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(self.timed_out()),
        }
    }

    /// Decides whether an abandoned decrement took effect. `before` is the
    /// stock read under the product lock. Anything but an exact match counts
    /// as not applied: a unit lost to the shelf is safer than a phantom one.
    async fn decrement_landed(&self, id: &str, quantity: i64, before: Option<i64>) -> bool {
        let Some(before) = before else {
            return false;
        };
        match tokio::time::timeout(self.timeout, self.stores.inventory.get_product(id)).await {
            Ok(Ok(Some(product))) if product.stock == before - quantity => true,
            Ok(Ok(Some(product))) => {
                if product.stock != before {
                    warn!(
                        product_id = %id,
                        before,
                        now = product.stock,
                        quantity,
                        "Stock moved outside the sale while a decrement was in flight"
                    );
                }
                false
            }
            Ok(Ok(None)) => false,
            Ok(Err(e)) => {
                error!(?e, product_id = %id, quantity, "Could not re-read stock after timeout; not restoring");
                false
            }
            Err(_) => {
                error!(product_id = %id, quantity, "Stock re-read timed out; not restoring");
                false
            }
        }
    }

    fn deadline(&self) -> EngineResult<Instant> {
        Instant::now()
            .checked_add(self.timeout)
            .ok_or_else(|| EngineError::InvalidConfig(format!("checkout timeout {:?} is too large", self.timeout)))
    }

    fn check_deadline(&self, deadline: Instant) -> EngineResult<()> {
        if Instant::now() >= deadline {
            return Err(self.timed_out());
        }
        Ok(())
    }

    fn timed_out(&self) -> EngineError {
        EngineError::TransactionTimeout {
            timeout_ms: self.timeout.as_millis() as u64,
        }
    }
}

fn insufficient(product: &Product, available: i64, requested: i64) -> EngineError {
    EngineError::InsufficientStock {
        product_id: product.id.clone(),
        product_name: product.name.clone(),
        available,
        requested,
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{FailPoint, MemoryStore};
    use std::sync::Arc;
    use till_core::{PaymentMethod, SaleLineRequest, SaleStatus};
    use till_db::{Database, DbConfig};

    const TIMEOUT: Duration = Duration::from_secs(5);

    fn product(name: &str, price: i64, stock: i64) -> Product {
        Product::new(name, Money::from_major(price), Money::from_major(price / 2), stock, 2)
    }

    async fn setup(products: &[&Product]) -> (Arc<MemoryStore>, SaleProcessor) {
        let store = MemoryStore::new();
        for p in products {
            store.insert_product((*p).clone()).await;
        }
        let processor = SaleProcessor::new(store.stores(), LoyaltyPolicy::default(), TIMEOUT);
        (store, processor)
    }

    fn line(p: &Product, qty: i64) -> SaleLineRequest {
        SaleLineRequest::new(&p.id, qty, p.selling_price())
    }

    async fn stock(store: &MemoryStore, p: &Product) -> i64 {
        store.product(&p.id).await.unwrap().stock
    }

    #[tokio::test]
    async fn test_two_line_sale_without_phone() {
        let a = product("Apple", 50, 10);
        let b = product("Bread", 50, 10);
        let (store, processor) = setup(&[&a, &b]).await;

        let sale = processor
            .process_sale(&SaleRequest::new("Asha").line(line(&a, 1)).line(line(&b, 1)))
            .await
            .unwrap();

        assert_eq!(sale.total(), Money::from_major(100));
        assert_eq!(sale.items_total(), sale.total());
        assert_eq!(sale.items[0].product_name, "Apple");
        assert_eq!(sale.items[1].line_no, 1);
        assert_eq!(sale.customer_id, None);
        assert_eq!(stock(&store, &a).await, 9);
        assert_eq!(stock(&store, &b).await, 9);
        assert_eq!(store.customer_count().await, 0);
        assert_eq!(store.sales().await.len(), 1);
    }

    #[tokio::test]
    async fn test_silver_customer_accrues_fifteen() {
        let a = product("Apple", 50, 10);
        let b = product("Bread", 50, 10);
        let (store, processor) = setup(&[&a, &b]).await;
        let mut regular = Customer::guest("999");
        regular.points = 600;
        store.insert_customer(regular.clone()).await;

        let sale = processor
            .process_sale(
                &SaleRequest::new("Asha")
                    .customer_phone(" 999 ")
                    .line(line(&a, 1))
                    .line(line(&b, 1)),
            )
            .await
            .unwrap();

        assert_eq!(sale.customer_id.as_deref(), Some(regular.id.as_str()));
        assert_eq!(store.customer_by_phone("999").await.unwrap().points, 615);
    }

    #[tokio::test]
    async fn test_gold_and_boundary_tiers() {
        let a = product("Apple", 100, 10);
        let (store, processor) = setup(&[&a]).await;
        for (phone, points) in [("1001", 1001), ("500", 500)] {
            let mut c = Customer::guest(phone);
            c.points = points;
            store.insert_customer(c).await;
        }

        for phone in ["1001", "500"] {
            processor
                .process_sale(&SaleRequest::new("Asha").customer_phone(phone).line(line(&a, 1)))
                .await
                .unwrap();
        }

        assert_eq!(store.customer_by_phone("1001").await.unwrap().points, 1021);
        assert_eq!(store.customer_by_phone("500").await.unwrap().points, 510);
    }

    #[tokio::test]
    async fn test_unknown_phone_creates_guest() {
        let a = product("Apple", 100, 10);
        let (store, processor) = setup(&[&a]).await;

        processor
            .process_sale(&SaleRequest::new("Asha").customer_phone("12345").line(line(&a, 1)))
            .await
            .unwrap();

        let guest = store.customer_by_phone("12345").await.unwrap();
        assert_eq!(guest.name, "Guest 12345");
        assert_eq!(guest.points, 10);
    }

    #[tokio::test]
    async fn test_defaults_applied() {
        let a = product("Apple", 10, 10);
        let (_store, processor) = setup(&[&a]).await;

        let request = SaleRequest {
            items: vec![line(&a, 1)],
            ..Default::default()
        };
        let sale = processor.process_sale(&request).await.unwrap();

        assert_eq!(sale.cashier_name, "Unknown");
        assert_eq!(sale.payment_method, PaymentMethod::Cash);
        assert_eq!(sale.status, SaleStatus::Paid);
    }

    #[tokio::test]
    async fn test_second_line_short_leaves_first_untouched() {
        let a = product("Apple", 50, 10);
        let b = product("Bread", 50, 1);
        let (store, processor) = setup(&[&a, &b]).await;

        let err = processor
            .process_sale(&SaleRequest::new("Asha").customer_phone("999").line(line(&a, 2)).line(line(&b, 3)))
            .await
            .unwrap_err();

        assert_eq!(
            err,
            EngineError::InsufficientStock {
                product_id: b.id.clone(),
                product_name: "Bread".into(),
                available: 1,
                requested: 3,
            }
        );
        assert_eq!(stock(&store, &a).await, 10);
        assert_eq!(stock(&store, &b).await, 1);
        assert!(store.sales().await.is_empty());
        assert_eq!(store.customer_count().await, 0);
    }

    #[tokio::test]
    async fn test_repeated_product_lines_checked_together() {
        let a = product("Apple", 50, 3);
        let (store, processor) = setup(&[&a]).await;

        let err = processor
            .process_sale(&SaleRequest::new("Asha").line(line(&a, 2)).line(line(&a, 2)))
            .await
            .unwrap_err();

        assert!(matches!(err, EngineError::InsufficientStock { requested: 4, .. }));
        assert_eq!(stock(&store, &a).await, 3);
    }

    #[tokio::test]
    async fn test_unknown_product() {
        let a = product("Apple", 50, 10);
        let (store, processor) = setup(&[&a]).await;

        let err = processor
            .process_sale(
                &SaleRequest::new("Asha")
                    .line(line(&a, 1))
                    .line(SaleLineRequest::new("ghost", 1, Money::from_major(1))),
            )
            .await
            .unwrap_err();

        assert_eq!(err, EngineError::ProductNotFound("ghost".into()));
        assert!(!err.is_retryable());
        assert_eq!(stock(&store, &a).await, 10);
    }

    #[tokio::test]
    async fn test_invalid_requests_rejected() {
        let a = product("Apple", 50, 10);
        let (_store, processor) = setup(&[&a]).await;

        let empty = processor.process_sale(&SaleRequest::new("Asha")).await;
        assert!(matches!(empty, Err(EngineError::Validation(_))));

        let zero = processor.process_sale(&SaleRequest::new("Asha").line(line(&a, 0))).await;
        assert!(matches!(zero, Err(EngineError::Validation(_))));
    }

    #[tokio::test]
    async fn test_storage_failure_mid_decrement_restores_earlier_lines() {
        let a = product("Apple", 50, 10);
        let b = product("Bread", 50, 10);
        let (store, processor) = setup(&[&a, &b]).await;
        store.fail_after(FailPoint::Decrement, 1).await;

        let err = processor
            .process_sale(&SaleRequest::new("Asha").line(line(&a, 2)).line(line(&b, 2)))
            .await
            .unwrap_err();

        assert!(matches!(err, EngineError::StorageFailure(_)));
        assert!(err.is_retryable());
        assert_eq!(stock(&store, &a).await, 10);
        assert_eq!(stock(&store, &b).await, 10);
    }

    #[tokio::test]
    async fn test_sale_log_failure_restores_stock_and_points() {
        let a = product("Apple", 100, 10);
        let (store, processor) = setup(&[&a]).await;
        let mut regular = Customer::guest("999");
        regular.points = 600;
        store.insert_customer(regular).await;
        store.fail_on(FailPoint::SaveSale).await;

        let err = processor
            .process_sale(&SaleRequest::new("Asha").customer_phone("999").line(line(&a, 1)))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::StorageFailure(_)));

        let err = processor
            .process_sale(&SaleRequest::new("Asha").customer_phone("777").line(line(&a, 1)))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::StorageFailure(_)));

        assert_eq!(stock(&store, &a).await, 10);
        assert_eq!(store.customer_by_phone("999").await.unwrap().points, 600);
        assert!(store.customer_by_phone("777").await.is_none());
        assert!(store.sales().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_rolls_back() {
        let a = product("Apple", 50, 10);
        let b = product("Bread", 50, 10);
        let (store, processor) = setup(&[&a, &b]).await;
        store.delay_on(FailPoint::Decrement, Duration::from_secs(3)).await;

        let err = processor
            .process_sale(&SaleRequest::new("Asha").line(line(&a, 1)).line(line(&b, 1)))
            .await
            .unwrap_err();

        assert_eq!(err, EngineError::TransactionTimeout { timeout_ms: 5000 });
        assert!(err.is_retryable());
        assert_eq!(stock(&store, &a).await, 10);
        assert_eq!(stock(&store, &b).await, 10);
        assert!(store.sales().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_store_call_gives_up_at_deadline() {
        let a = product("Apple", 50, 10);
        let (store, processor) = setup(&[&a]).await;
        store.delay_on(FailPoint::Decrement, Duration::from_secs(600)).await;

        let started = Instant::now();
        let err = processor
            .process_sale(&SaleRequest::new("Asha").line(line(&a, 1)))
            .await
            .unwrap_err();

        assert_eq!(err, EngineError::TransactionTimeout { timeout_ms: 5000 });
        assert!(started.elapsed() < TIMEOUT + Duration::from_secs(1));
        assert_eq!(stock(&store, &a).await, 10);

        // locks were released with the abandoned call
        store.clear_faults().await;
        processor
            .process_sale(&SaleRequest::new("Asha").line(line(&a, 1)))
            .await
            .unwrap();
        assert_eq!(stock(&store, &a).await, 9);
    }

    #[tokio::test(start_paused = true)]
    async fn test_decrement_that_lands_late_is_restored() {
        let a = product("Apple", 50, 10);
        let b = product("Bread", 50, 10);
        let (store, processor) = setup(&[&a, &b]).await;
        store.stall_after_apply(FailPoint::Decrement, Duration::from_secs(600)).await;

        let started = Instant::now();
        let err = processor
            .process_sale(&SaleRequest::new("Asha").line(line(&a, 1)).line(line(&b, 1)))
            .await
            .unwrap_err();

        assert!(matches!(err, EngineError::TransactionTimeout { .. }));
        assert!(started.elapsed() < TIMEOUT + Duration::from_secs(1));
        assert_eq!(stock(&store, &a).await, 10);
        assert_eq!(stock(&store, &b).await, 10);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sale_write_that_lands_late_is_voided() {
        let a = product("Apple", 100, 10);
        let (store, processor) = setup(&[&a]).await;
        let mut regular = Customer::guest("999");
        regular.points = 600;
        store.insert_customer(regular).await;
        store.stall_after_apply(FailPoint::SaveSale, Duration::from_secs(600)).await;

        for phone in ["999", "777"] {
            let err = processor
                .process_sale(&SaleRequest::new("Asha").customer_phone(phone).line(line(&a, 1)))
                .await
                .unwrap_err();
            assert!(matches!(err, EngineError::TransactionTimeout { .. }));
        }

        assert!(store.sales().await.is_empty());
        assert_eq!(stock(&store, &a).await, 10);
        assert_eq!(store.customer_by_phone("999").await.unwrap().points, 600);
        assert!(store.customer_by_phone("777").await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_customer_save_that_lands_late_is_undone() {
        let a = product("Apple", 100, 10);
        let (store, processor) = setup(&[&a]).await;
        let mut regular = Customer::guest("999");
        regular.points = 600;
        store.insert_customer(regular).await;
        store.stall_after_apply(FailPoint::SaveCustomer, Duration::from_secs(600)).await;

        let err = processor
            .process_sale(&SaleRequest::new("Asha").customer_phone("999").line(line(&a, 1)))
            .await
            .unwrap_err();

        assert!(matches!(err, EngineError::TransactionTimeout { .. }));
        assert_eq!(store.customer_by_phone("999").await.unwrap().points, 600);
        assert_eq!(stock(&store, &a).await, 10);
    }

    #[tokio::test]
    async fn test_oversized_timeout_is_an_error() {
        let store = MemoryStore::new();
        let processor = SaleProcessor::new(store.stores(), LoyaltyPolicy::default(), Duration::MAX);
        assert!(matches!(processor.deadline(), Err(EngineError::InvalidConfig(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_lock_wait_counts_against_budget() {
        let a = product("Apple", 50, 10);
        let (store, processor) = setup(&[&a]).await;
        let processor = Arc::new(processor);

        let _held = processor.product_locks.acquire_one(&a.id).await;
        let err = processor
            .process_sale(&SaleRequest::new("Asha").line(line(&a, 1)))
            .await
            .unwrap_err();

        assert!(matches!(err, EngineError::TransactionTimeout { .. }));
        assert_eq!(stock(&store, &a).await, 10);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_sales_never_oversell() {
        let a = product("Apple", 10, 10);
        let (store, processor) = setup(&[&a]).await;
        let processor = Arc::new(processor);

        let mut tasks = Vec::new();
        for i in 0..25 {
            let processor = processor.clone();
            let request = SaleRequest::new(format!("cashier-{}", i)).line(line(&a, 1));
            tasks.push(tokio::spawn(async move { processor.process_sale(&request).await }));
        }

        let mut committed = 0;
        for task in tasks {
            match task.await.unwrap() {
                Ok(_) => committed += 1,
                Err(e) => assert!(matches!(e, EngineError::InsufficientStock { .. })),
            }
        }

        assert_eq!(committed, 10);
        assert_eq!(stock(&store, &a).await, 0);
        assert_eq!(store.sales().await.len(), 10);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_accruals_for_one_phone() {
        let a = product("Apple", 100, 100);
        let (store, processor) = setup(&[&a]).await;
        let processor = Arc::new(processor);

        let mut tasks = Vec::new();
        for _ in 0..10 {
            let processor = processor.clone();
            let request = SaleRequest::new("Asha").customer_phone("555").line(line(&a, 1));
            tasks.push(tokio::spawn(async move { processor.process_sale(&request).await }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        assert_eq!(store.customer_count().await, 1);
        assert_eq!(store.customer_by_phone("555").await.unwrap().points, 100);
    }

    #[tokio::test]
    async fn test_restock() {
        let a = product("Apple", 50, 1);
        let (store, processor) = setup(&[&a]).await;

        let restocked = processor.restock(&a.id, 24).await.unwrap();
        assert_eq!(restocked.stock, 25);
        assert_eq!(stock(&store, &a).await, 25);

        assert_eq!(
            processor.restock("ghost", 1).await.unwrap_err(),
            EngineError::ProductNotFound("ghost".into())
        );
        assert!(matches!(
            processor.restock(&a.id, 0).await,
            Err(EngineError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_end_to_end_on_sqlite() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let a = product("Apple", 50, 10);
        let b = product("Bread", 50, 10);
        db.products().save_all(&[a.clone(), b.clone()]).await.unwrap();
        let mut regular = Customer::guest("999");
        regular.points = 600;
        db.customers().save(&regular).await.unwrap();

        let processor = SaleProcessor::new(Stores::sqlite(&db), LoyaltyPolicy::default(), TIMEOUT);
        let sale = processor
            .process_sale(
                &SaleRequest::new("Asha")
                    .payment_method(PaymentMethod::Card)
                    .customer_phone("999")
                    .line(line(&a, 1))
                    .line(line(&b, 1)),
            )
            .await
            .unwrap();

        let stored = db.sales().get_by_id(&sale.id).await.unwrap().unwrap();
        assert_eq!(stored.total_cents, 10_000);
        assert_eq!(stored.items.len(), 2);
        assert_eq!(db.products().get_by_id(&a.id).await.unwrap().unwrap().stock, 9);
        assert_eq!(db.customers().find_by_phone("999").await.unwrap().unwrap().points, 615);

        let err = processor
            .process_sale(&SaleRequest::new("Asha").line(line(&a, 1)).line(line(&b, 50)))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InsufficientStock { .. }));
        assert_eq!(db.products().get_by_id(&a.id).await.unwrap().unwrap().stock, 9);
    }
}
