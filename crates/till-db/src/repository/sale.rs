//! # Sale Repository
//!
//! Append-only sale log. A sale and its items are written in one
//! transaction, so readers never observe a sale without its lines.
//!
//! ## Time Windows
//! ```text
//!   list_in_range(start, end)     start <= created_at <  end
//!   list_after(t)                 t     <  created_at
//! ```
//! Timestamps are stored as RFC 3339 text in UTC; every row shares the
//! same offset, so text comparison orders them chronologically.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::collections::HashMap;
use tracing::debug;

use crate::error::DbResult;
use till_core::{Sale, SaleItem};

const SALE_COLUMNS: &str =
    "id, cashier_name, payment_method, status, customer_id, total_cents, created_at";

const ITEM_COLUMNS: &str = "si.id, si.sale_id, si.product_id, si.product_name, \
     si.unit_price_cents, si.quantity, si.line_total_cents, si.line_no";

#[derive(Debug, Clone)]
pub struct SaleRepository {
    pool: SqlitePool,
}

impl SaleRepository {
    pub fn new(pool: SqlitePool) -> Self {
        SaleRepository { pool }
    }

    /// Persists a sale and all of its items atomically.
    pub async fn insert(&self, sale: &Sale) -> DbResult<()> {
        debug!(sale_id = %sale.id, items = sale.items.len(), "Inserting sale");

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO sales (
                id, cashier_name, payment_method, status, customer_id, total_cents, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(&sale.id)
        .bind(&sale.cashier_name)
        .bind(sale.payment_method)
        .bind(sale.status)
        .bind(&sale.customer_id)
        .bind(sale.total_cents)
        .bind(sale.created_at)
        .execute(&mut *tx)
        .await?;

        for item in &sale.items {
            sqlx::query(
                r#"
                INSERT INTO sale_items (
                    id, sale_id, product_id, product_name,
                    unit_price_cents, quantity, line_total_cents, line_no
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                "#,
            )
            .bind(&item.id)
            .bind(&item.sale_id)
            .bind(&item.product_id)
            .bind(&item.product_name)
            .bind(item.unit_price_cents)
            .bind(item.quantity)
            .bind(item.line_total_cents)
            .bind(item.line_no)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Gets a sale with its items in line order.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Sale>> {
        let sql = format!("SELECT {} FROM sales WHERE id = ?1", SALE_COLUMNS);
        let sale = sqlx::query_as::<_, Sale>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        let Some(mut sale) = sale else {
            return Ok(None);
        };

        let sql = format!(
            "SELECT {} FROM sale_items si WHERE si.sale_id = ?1 ORDER BY si.line_no",
            ITEM_COLUMNS
        );
        sale.items = sqlx::query_as::<_, SaleItem>(&sql)
            .bind(id)
            .fetch_all(&self.pool)
            .await?;

        Ok(Some(sale))
    }

    /// Sales with `start <= created_at < end`, oldest first, items loaded.
    pub async fn list_in_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> DbResult<Vec<Sale>> {
        let sql = format!(
            "SELECT {} FROM sales WHERE created_at >= ?1 AND created_at < ?2 \
             ORDER BY created_at, id",
            SALE_COLUMNS
        );
        let sales = sqlx::query_as::<_, Sale>(&sql)
            .bind(start)
            .bind(end)
            .fetch_all(&self.pool)
            .await?;

        let sql = format!(
            "SELECT {} FROM sale_items si JOIN sales s ON s.id = si.sale_id \
             WHERE s.created_at >= ?1 AND s.created_at < ?2 \
             ORDER BY si.sale_id, si.line_no",
            ITEM_COLUMNS
        );
        let items = sqlx::query_as::<_, SaleItem>(&sql)
            .bind(start)
            .bind(end)
            .fetch_all(&self.pool)
            .await?;

        Ok(attach_items(sales, items))
    }

    /// Sales strictly after `since`, oldest first, items loaded.
    pub async fn list_after(&self, since: DateTime<Utc>) -> DbResult<Vec<Sale>> {
        let sql = format!(
            "SELECT {} FROM sales WHERE created_at > ?1 ORDER BY created_at, id",
            SALE_COLUMNS
        );
        let sales = sqlx::query_as::<_, Sale>(&sql)
            .bind(since)
            .fetch_all(&self.pool)
            .await?;

        let sql = format!(
            "SELECT {} FROM sale_items si JOIN sales s ON s.id = si.sale_id \
             WHERE s.created_at > ?1 ORDER BY si.sale_id, si.line_no",
            ITEM_COLUMNS
        );
        let items = sqlx::query_as::<_, SaleItem>(&sql)
            .bind(since)
            .fetch_all(&self.pool)
            .await?;

        Ok(attach_items(sales, items))
    }

    /// Removes a sale; its items go with it through the cascade. Returns
    /// false when there was no such sale.
    pub async fn delete(&self, id: &str) -> DbResult<bool> {
        let result = sqlx::query("DELETE FROM sales WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sales")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

/// Distributes items (already in line order) onto their sales.
fn attach_items(mut sales: Vec<Sale>, items: Vec<SaleItem>) -> Vec<Sale> {
    let mut by_sale: HashMap<String, Vec<SaleItem>> = HashMap::new();
    for item in items {
        by_sale.entry(item.sale_id.clone()).or_default().push(item);
    }
    for sale in &mut sales {
        sale.items = by_sale.remove(&sale.id).unwrap_or_default();
    }
    sales
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use crate::error::DbError;
    use crate::{Database, DbConfig};
    use till_core::{
        new_id, Customer, Money, PaymentMethod, Product, Sale, SaleItem, SaleLineRequest,
        SaleStatus,
    };

    async fn setup() -> (Database, Product) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let product = Product::new("Biscuits", Money::from_major(10), Money::from_major(6), 50, 5);
        db.products().save(&product).await.unwrap();
        (db, product)
    }

    fn sale_at(product: &Product, created_at: chrono::DateTime<Utc>, quantities: &[i64]) -> Sale {
        let id = new_id();
        let items: Vec<SaleItem> = quantities
            .iter()
            .enumerate()
            .map(|(n, qty)| {
                SaleItem::snapshot(
                    &id,
                    n,
                    product,
                    &SaleLineRequest::new(&product.id, *qty, product.selling_price()),
                )
            })
            .collect();
        Sale {
            id,
            cashier_name: "Asha".to_string(),
            payment_method: PaymentMethod::Upi,
            status: SaleStatus::Paid,
            customer_id: None,
            total_cents: items.iter().map(|i| i.line_total_cents).sum(),
            created_at,
            items,
        }
    }

    #[tokio::test]
    async fn test_insert_and_get_with_items_in_order() {
        let (db, product) = setup().await;
        let sale = sale_at(&product, Utc::now(), &[3, 1, 2]);
        db.sales().insert(&sale).await.unwrap();

        let loaded = db.sales().get_by_id(&sale.id).await.unwrap().unwrap();
        assert_eq!(loaded.payment_method, PaymentMethod::Upi);
        assert_eq!(loaded.total_cents, 6000);
        let qtys: Vec<i64> = loaded.items.iter().map(|i| i.quantity).collect();
        assert_eq!(qtys, vec![3, 1, 2]);
        assert_eq!(loaded.items_total(), loaded.total());
    }

    #[tokio::test]
    async fn test_range_is_half_open() {
        let (db, product) = setup().await;
        let start = Utc.with_ymd_and_hms(2026, 10, 16, 0, 0, 0).unwrap();
        let end = start + Duration::days(1);

        let at_start = sale_at(&product, start, &[1]);
        let inside = sale_at(&product, start + Duration::hours(23), &[2]);
        let at_end = sale_at(&product, end, &[4]);
        let before = sale_at(&product, start - Duration::seconds(1), &[8]);
        for s in [&at_start, &inside, &at_end, &before] {
            db.sales().insert(s).await.unwrap();
        }

        let in_day = db.sales().list_in_range(start, end).await.unwrap();
        let ids: Vec<&str> = in_day.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec![at_start.id.as_str(), inside.id.as_str()]);
        assert_eq!(in_day[1].items.len(), 1);
        assert_eq!(in_day[1].items[0].quantity, 2);
    }

    #[tokio::test]
    async fn test_list_after_is_strict() {
        let (db, product) = setup().await;
        let t = Utc.with_ymd_and_hms(2026, 10, 1, 12, 0, 0).unwrap();
        let exactly = sale_at(&product, t, &[1]);
        let later = sale_at(&product, t + Duration::milliseconds(1), &[1]);
        db.sales().insert(&exactly).await.unwrap();
        db.sales().insert(&later).await.unwrap();

        let after = db.sales().list_after(t).await.unwrap();
        assert_eq!(after.len(), 1);
        assert_eq!(after[0].id, later.id);
    }

    #[tokio::test]
    async fn test_insert_is_atomic() {
        let (db, product) = setup().await;
        let mut sale = sale_at(&product, Utc::now(), &[1, 1]);
        // duplicate line number violates UNIQUE (sale_id, line_no)
        sale.items[1].line_no = 0;

        let err = db.sales().insert(&sale).await.unwrap_err();
        assert!(matches!(err, DbError::UniqueViolation { .. }));
        assert_eq!(db.sales().count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_delete_takes_items_along() {
        let (db, product) = setup().await;
        let sale = sale_at(&product, Utc::now(), &[1, 2]);
        db.sales().insert(&sale).await.unwrap();

        assert!(db.sales().delete(&sale.id).await.unwrap());
        assert!(!db.sales().delete(&sale.id).await.unwrap());
        assert!(db.sales().get_by_id(&sale.id).await.unwrap().is_none());

        let items: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sale_items")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(items, 0);
    }

    #[tokio::test]
    async fn test_customer_reference() {
        let (db, product) = setup().await;
        let customer = Customer::guest("555");
        db.customers().save(&customer).await.unwrap();

        let mut sale = sale_at(&product, Utc::now(), &[1]);
        sale.customer_id = Some(customer.id.clone());
        db.sales().insert(&sale).await.unwrap();

        let loaded = db.sales().get_by_id(&sale.id).await.unwrap().unwrap();
        assert_eq!(loaded.customer_id, Some(customer.id));
    }
}
