//! # Alert Jobs
//!
//! The job bodies run by the scheduler, kept apart from any timer so they
//! can be called directly.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  sweep()                                                                │
//! │    list_products ──► alert::evaluate ──► save_alert_flags (flags only) │
//! │                                              │                          │
//! │                               newly low? ────┴──► one aggregated notice │
//! │                                                                         │
//! │  daily_report(date)                                                     │
//! │    list_sales_in_range([00:00, next 00:00)) ──► summary notice          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Flags are written before the notice goes out. A notifier failure is
//! logged and the latch stays set, so a lost notice is not resent.

use chrono::NaiveDate;
use std::sync::Arc;
use tracing::{debug, info, warn};

use till_core::alert::{self, LOW_STOCK_SUBJECT};
use till_core::report::{day_window, DailySummary};

use crate::error::EngineResult;
use crate::notifier::Notifier;
use crate::store::{InventoryStore, SaleLog, Stores};

/// What a sweep changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepOutcome {
    /// Products latched by this sweep.
    pub newly_low: Vec<String>,
    /// Products whose latch was cleared.
    pub recovered: Vec<String>,
    /// Whether the aggregated notice was delivered.
    pub notified: bool,
}

pub struct AlertJobs {
    inventory: Arc<dyn InventoryStore>,
    sales: Arc<dyn SaleLog>,
    notifier: Arc<dyn Notifier>,
}

impl AlertJobs {
    pub fn new(stores: &Stores, notifier: Arc<dyn Notifier>) -> Self {
        AlertJobs {
            inventory: stores.inventory.clone(),
            sales: stores.sales.clone(),
            notifier,
        }
    }

    /// Runs one low-stock sweep.
    ///
    /// Storage errors abort the sweep before any notice is sent; nothing
    /// was persisted, so the next sweep sees the same state.
    pub async fn sweep(&self) -> EngineResult<SweepOutcome> {
        let products = self.inventory.list_products().await?;
        let plan = alert::evaluate(&products);

        if plan.is_noop() {
            debug!(products = products.len(), "Sweep found nothing to change");
            return Ok(SweepOutcome::default());
        }

        self.inventory.save_alert_flags(&plan.flag_updates()).await?;

        let mut outcome = SweepOutcome {
            newly_low: plan.newly_low.iter().map(|e| e.product_id.clone()).collect(),
            recovered: plan.recovered.clone(),
            notified: false,
        };

        if !plan.newly_low.is_empty() {
            let body = alert::render_low_stock_notice(&plan.newly_low);
            match self.notifier.notify(LOW_STOCK_SUBJECT, &body).await {
                Ok(()) => outcome.notified = true,
                Err(e) => warn!(error = %e, products = plan.newly_low.len(), "Low-stock notice not delivered"),
            }
        }

        info!(
            newly_low = outcome.newly_low.len(),
            recovered = outcome.recovered.len(),
            notified = outcome.notified,
            "Low-stock sweep complete"
        );
        Ok(outcome)
    }

    /// Summarizes the UTC day `date` and sends the closing report.
    pub async fn daily_report(&self, date: NaiveDate) -> EngineResult<DailySummary> {
        let (start, end) = day_window(date);
        let sales = self.sales.list_sales_in_range(start, end).await?;
        let summary = DailySummary::from_sales(date, &sales);

        if let Err(e) = self.notifier.notify(&summary.subject(), &summary.body()).await {
            warn!(error = %e, date = %date, "Daily report not delivered");
        }

        info!(
            date = %date,
            sales = summary.sale_count,
            revenue = %summary.revenue(),
            "Daily report generated"
        );
        Ok(summary)
    }
}

impl std::fmt::Debug for AlertJobs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlertJobs").finish_non_exhaustive()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;
    use crate::memory::{FailPoint, MemoryStore, RecordingNotifier};
    use chrono::{Duration, TimeZone, Utc};
    use till_core::{Money, Product, Sale, SaleItem, SaleLineRequest};

    fn product(name: &str, stock: i64, min_stock: i64) -> Product {
        Product::new(name, Money::from_major(10), Money::from_major(5), stock, min_stock)
    }

    async fn setup(products: &[&Product]) -> (Arc<MemoryStore>, Arc<RecordingNotifier>, AlertJobs) {
        let store = MemoryStore::new();
        for p in products {
            store.insert_product((*p).clone()).await;
        }
        let notifier = RecordingNotifier::new();
        let jobs = AlertJobs::new(&store.stores(), notifier.clone());
        (store, notifier, jobs)
    }

    #[tokio::test]
    async fn test_latch_sends_one_notice_per_episode() {
        let milk = product("Milk 1L", 2, 5);
        let tea = product("Tea", 50, 5);
        let (store, notifier, jobs) = setup(&[&milk, &tea]).await;

        let first = jobs.sweep().await.unwrap();
        assert_eq!(first.newly_low, vec![milk.id.clone()]);
        assert!(first.notified);

        for _ in 0..3 {
            assert_eq!(jobs.sweep().await.unwrap(), SweepOutcome::default());
        }

        let sent = notifier.sent().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].subject, LOW_STOCK_SUBJECT);
        assert!(sent[0].body.contains("- Milk 1L: only 2 left (minimum 5)"));
        assert!(!sent[0].body.contains("Tea"));
        assert!(store.product(&milk.id).await.unwrap().alert_sent);
    }

    #[tokio::test]
    async fn test_recovery_resets_then_renotifies() {
        let milk = product("Milk 1L", 2, 5);
        let (store, notifier, jobs) = setup(&[&milk]).await;
        jobs.sweep().await.unwrap();

        let mut restocked = store.product(&milk.id).await.unwrap();
        restocked.stock = 20;
        store.insert_product(restocked.clone()).await;

        let reset = jobs.sweep().await.unwrap();
        assert_eq!(reset.recovered, vec![milk.id.clone()]);
        assert!(!reset.notified);
        assert!(!store.product(&milk.id).await.unwrap().alert_sent);

        restocked.stock = 5;
        restocked.alert_sent = false;
        store.insert_product(restocked).await;
        assert!(jobs.sweep().await.unwrap().notified);

        assert_eq!(notifier.count_with_subject_prefix(LOW_STOCK_SUBJECT).await, 2);
    }

    #[tokio::test]
    async fn test_notifier_failure_keeps_latch() {
        let milk = product("Milk 1L", 0, 3);
        let (store, notifier, jobs) = setup(&[&milk]).await;
        notifier.set_failing(true).await;

        let outcome = jobs.sweep().await.unwrap();
        assert!(!outcome.notified);
        assert!(store.product(&milk.id).await.unwrap().alert_sent);

        notifier.set_failing(false).await;
        assert_eq!(jobs.sweep().await.unwrap(), SweepOutcome::default());
        assert!(notifier.sent().await.is_empty());
    }

    #[tokio::test]
    async fn test_storage_failure_aborts_without_notice() {
        let milk = product("Milk 1L", 0, 3);
        let (store, notifier, jobs) = setup(&[&milk]).await;
        store.fail_on(FailPoint::SaveAlertFlags).await;

        let err = jobs.sweep().await.unwrap_err();
        assert!(matches!(err, EngineError::StorageFailure(_)));
        assert!(notifier.sent().await.is_empty());
        assert!(!store.product(&milk.id).await.unwrap().alert_sent);

        store.clear_faults().await;
        assert!(jobs.sweep().await.unwrap().notified);
    }

    fn sale_at(p: &Product, at: chrono::DateTime<Utc>) -> Sale {
        let line = SaleLineRequest::new(&p.id, 1, p.selling_price());
        let id = till_core::new_id();
        let items = vec![SaleItem::snapshot(&id, 0, p, &line)];
        Sale {
            id,
            items,
            cashier_name: "Asha".to_string(),
            payment_method: Default::default(),
            status: Default::default(),
            customer_id: None,
            total_cents: p.selling_price_cents,
            created_at: at,
        }
    }

    #[tokio::test]
    async fn test_daily_report_window_edges() {
        let tea = product("Tea", 50, 5);
        let (store, notifier, jobs) = setup(&[&tea]).await;
        let stores = store.stores();
        let midnight = Utc.with_ymd_and_hms(2024, 3, 10, 0, 0, 0).unwrap();

        for at in [
            midnight - Duration::milliseconds(1),
            midnight,
            midnight + Duration::hours(23) + Duration::minutes(59),
            midnight + Duration::days(1),
        ] {
            stores.sales.save_sale(&sale_at(&tea, at)).await.unwrap();
        }

        let summary = jobs.daily_report(midnight.date_naive()).await.unwrap();
        assert_eq!(summary.sale_count, 2);
        assert_eq!(summary.revenue(), Money::from_major(20));

        let sent = notifier.sent().await;
        assert_eq!(sent[0].subject, "Daily closing report - 2024-03-10");
        assert!(sent[0].body.contains("Sales: 2"));
    }

    #[tokio::test]
    async fn test_daily_report_sent_even_when_empty() {
        let (_store, notifier, jobs) = setup(&[]).await;
        let date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();

        let summary = jobs.daily_report(date).await.unwrap();
        assert_eq!(summary.sale_count, 0);
        assert_eq!(notifier.sent().await.len(), 1);
    }
}
