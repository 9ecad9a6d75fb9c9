//! # Product Repository
//!
//! Catalogue reads plus the two narrow writes that run concurrently:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Writer             Columns touched        Statement                   │
//! │  ─────────────────  ─────────────────────  ─────────────────────────── │
//! │  checkout           stock, updated_at      conditional decrement       │
//! │  restock/rollback   stock, updated_at      increment                   │
//! │  alert sweep        alert_sent             flag update (one tx)        │
//! │  catalogue admin    everything             upsert                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Because the sweep never writes `stock` and checkout never writes
//! `alert_sent`, a sweep working from a stale snapshot cannot undo a sale.

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::DbResult;
use till_core::Product;

const PRODUCT_COLUMNS: &str = "id, name, category, selling_price_cents, buying_price_cents, \
     stock, min_stock, alert_sent, created_at, updated_at";

/// Repository for product database operations.
#[derive(Debug, Clone)]
pub struct ProductRepository {
    pool: SqlitePool,
}

impl ProductRepository {
    pub fn new(pool: SqlitePool) -> Self {
        ProductRepository { pool }
    }

    /// Gets a product by its ID.
    ///
    /// ## Returns
    /// * `Ok(Some(Product))` - Product found
    /// * `Ok(None)` - Product not found
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Product>> {
        let sql = format!("SELECT {} FROM products WHERE id = ?1", PRODUCT_COLUMNS);
        let product = sqlx::query_as::<_, Product>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(product)
    }

    /// Every product, ordered by name.
    pub async fn list_all(&self) -> DbResult<Vec<Product>> {
        let sql = format!("SELECT {} FROM products ORDER BY name, id", PRODUCT_COLUMNS);
        let products = sqlx::query_as::<_, Product>(&sql)
            .fetch_all(&self.pool)
            .await?;
        debug!(count = products.len(), "Listed products");
        Ok(products)
    }

    /// Inserts or fully replaces a product.
    pub async fn save(&self, product: &Product) -> DbResult<()> {
        upsert(&self.pool, product).await
    }

    /// Upserts several products in one transaction.
    pub async fn save_all(&self, products: &[Product]) -> DbResult<()> {
        let mut tx = self.pool.begin().await?;
        for product in products {
            upsert(&mut *tx, product).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Removes `quantity` units if at least that many are on hand.
    ///
    /// ## Returns
    /// * `Ok(true)` - Stock decremented
    /// * `Ok(false)` - Product missing or not enough stock; nothing changed
    pub async fn decrement_stock_if_available(&self, id: &str, quantity: i64) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE products
            SET stock = stock - ?2, updated_at = ?3
            WHERE id = ?1 AND stock >= ?2
            "#,
        )
        .bind(id)
        .bind(quantity)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        let applied = result.rows_affected() == 1;
        debug!(product_id = %id, quantity, applied, "Conditional stock decrement");
        Ok(applied)
    }

    /// Adds `quantity` units. Returns false when the product does not exist.
    pub async fn increment_stock(&self, id: &str, quantity: i64) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE products
            SET stock = stock + ?2, updated_at = ?3
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(quantity)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Writes alert latches in one transaction. Touches no other column;
    /// ids that no longer exist are skipped.
    pub async fn set_alert_flags(&self, flags: &[(String, bool)]) -> DbResult<()> {
        if flags.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        for (id, sent) in flags {
            sqlx::query("UPDATE products SET alert_sent = ?2 WHERE id = ?1")
                .bind(id)
                .bind(*sent)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;

        debug!(count = flags.len(), "Alert flags updated");
        Ok(())
    }

    /// Number of products at or below their threshold.
    pub async fn count_low_stock(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products WHERE stock <= min_stock")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

async fn upsert<'e, E>(executor: E, product: &Product) -> DbResult<()>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO products (
            id, name, category, selling_price_cents, buying_price_cents,
            stock, min_stock, alert_sent, created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
        ON CONFLICT (id) DO UPDATE SET
            name = excluded.name,
            category = excluded.category,
            selling_price_cents = excluded.selling_price_cents,
            buying_price_cents = excluded.buying_price_cents,
            stock = excluded.stock,
            min_stock = excluded.min_stock,
            alert_sent = excluded.alert_sent,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(&product.id)
    .bind(&product.name)
    .bind(&product.category)
    .bind(product.selling_price_cents)
    .bind(product.buying_price_cents)
    .bind(product.stock)
    .bind(product.min_stock)
    .bind(product.alert_sent)
    .bind(product.created_at)
    .bind(product.updated_at)
    .execute(executor)
    .await?;
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use crate::error::DbError;
    use crate::{Database, DbConfig};
    use till_core::{Money, Product};

    async fn setup() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    fn product(name: &str, stock: i64, min_stock: i64) -> Product {
        Product::new(name, Money::from_major(20), Money::from_major(12), stock, min_stock)
    }

    #[tokio::test]
    async fn test_save_and_get_round_trip() {
        let db = setup().await;
        let p = product("Milk 1L", 10, 3).with_category("Dairy");
        db.products().save(&p).await.unwrap();

        let loaded = db.products().get_by_id(&p.id).await.unwrap().unwrap();
        assert_eq!(loaded.name, "Milk 1L");
        assert_eq!(loaded.category.as_deref(), Some("Dairy"));
        assert_eq!(loaded.stock, 10);
        assert!(!loaded.alert_sent);
        assert!(db.products().get_by_id("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_replaces_existing() {
        let db = setup().await;
        let mut p = product("Bread", 5, 2);
        db.products().save(&p).await.unwrap();

        p.name = "Brown Bread".to_string();
        p.stock = 8;
        db.products().save(&p).await.unwrap();

        assert_eq!(db.products().count().await.unwrap(), 1);
        let loaded = db.products().get_by_id(&p.id).await.unwrap().unwrap();
        assert_eq!(loaded.name, "Brown Bread");
        assert_eq!(loaded.stock, 8);
    }

    #[tokio::test]
    async fn test_conditional_decrement() {
        let db = setup().await;
        let p = product("Eggs", 3, 1);
        db.products().save(&p).await.unwrap();

        assert!(db.products().decrement_stock_if_available(&p.id, 2).await.unwrap());
        assert!(!db.products().decrement_stock_if_available(&p.id, 2).await.unwrap());
        assert!(db.products().decrement_stock_if_available(&p.id, 1).await.unwrap());
        assert!(!db.products().decrement_stock_if_available("missing", 1).await.unwrap());

        let loaded = db.products().get_by_id(&p.id).await.unwrap().unwrap();
        assert_eq!(loaded.stock, 0);
    }

    #[tokio::test]
    async fn test_increment_stock() {
        let db = setup().await;
        let p = product("Rice", 0, 5);
        db.products().save(&p).await.unwrap();

        assert!(db.products().increment_stock(&p.id, 12).await.unwrap());
        assert!(!db.products().increment_stock("missing", 1).await.unwrap());
        assert_eq!(db.products().get_by_id(&p.id).await.unwrap().unwrap().stock, 12);
    }

    #[tokio::test]
    async fn test_alert_flags_leave_stock_alone() {
        let db = setup().await;
        let p = product("Tea", 2, 5);
        db.products().save(&p).await.unwrap();

        // a sale lands between the sweep's snapshot and its flag write
        db.products().decrement_stock_if_available(&p.id, 1).await.unwrap();
        db.products()
            .set_alert_flags(&[(p.id.clone(), true), ("gone".to_string(), false)])
            .await
            .unwrap();

        let loaded = db.products().get_by_id(&p.id).await.unwrap().unwrap();
        assert!(loaded.alert_sent);
        assert_eq!(loaded.stock, 1);
    }

    #[tokio::test]
    async fn test_count_low_stock_includes_threshold() {
        let db = setup().await;
        db.products()
            .save_all(&[product("a", 5, 5), product("b", 4, 5), product("c", 6, 5)])
            .await
            .unwrap();

        assert_eq!(db.products().count_low_stock().await.unwrap(), 2);
        assert_eq!(db.products().list_all().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_negative_stock_rejected_by_schema() {
        let db = setup().await;
        let err = db.products().save(&product("bad", -1, 0)).await.unwrap_err();
        assert!(matches!(err, DbError::CheckViolation { .. }));
    }
}
