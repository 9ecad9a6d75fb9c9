//! # Customer Repository
//!
//! Loyalty customers keyed by phone number.

use sqlx::SqlitePool;
use tracing::debug;

use crate::error::DbResult;
use till_core::Customer;

const CUSTOMER_COLUMNS: &str = "id, phone, name, points, created_at, updated_at";

#[derive(Debug, Clone)]
pub struct CustomerRepository {
    pool: SqlitePool,
}

impl CustomerRepository {
    pub fn new(pool: SqlitePool) -> Self {
        CustomerRepository { pool }
    }

    /// Looks up a customer by exact phone match.
    pub async fn find_by_phone(&self, phone: &str) -> DbResult<Option<Customer>> {
        let sql = format!("SELECT {} FROM customers WHERE phone = ?1", CUSTOMER_COLUMNS);
        let customer = sqlx::query_as::<_, Customer>(&sql)
            .bind(phone)
            .fetch_optional(&self.pool)
            .await?;
        Ok(customer)
    }

    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Customer>> {
        let sql = format!("SELECT {} FROM customers WHERE id = ?1", CUSTOMER_COLUMNS);
        let customer = sqlx::query_as::<_, Customer>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(customer)
    }

    /// Inserts or replaces a customer by id.
    ///
    /// A new id with a phone that already belongs to someone else fails
    /// with [`DbError::UniqueViolation`](crate::DbError::UniqueViolation).
    pub async fn save(&self, customer: &Customer) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO customers (id, phone, name, points, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT (id) DO UPDATE SET
                phone = excluded.phone,
                name = excluded.name,
                points = excluded.points,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&customer.id)
        .bind(&customer.phone)
        .bind(&customer.name)
        .bind(customer.points)
        .bind(customer.created_at)
        .bind(customer.updated_at)
        .execute(&self.pool)
        .await?;

        debug!(customer_id = %customer.id, points = customer.points, "Customer saved");
        Ok(())
    }

    /// Deletes a customer. Used to undo a guest record created by a failed
    /// checkout; returns false when nothing was deleted.
    pub async fn delete(&self, id: &str) -> DbResult<bool> {
        let result = sqlx::query("DELETE FROM customers WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Highest point balances first, ties by name.
    pub async fn top_by_points(&self, limit: u32) -> DbResult<Vec<Customer>> {
        let sql = format!(
            "SELECT {} FROM customers ORDER BY points DESC, name ASC LIMIT ?1",
            CUSTOMER_COLUMNS
        );
        let customers = sqlx::query_as::<_, Customer>(&sql)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        Ok(customers)
    }

    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM customers")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use crate::error::DbError;
    use crate::{Database, DbConfig};
    use till_core::Customer;

    async fn setup() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    #[tokio::test]
    async fn test_find_by_phone() {
        let db = setup().await;
        let guest = Customer::guest("9876543210");
        db.customers().save(&guest).await.unwrap();

        let found = db.customers().find_by_phone("9876543210").await.unwrap().unwrap();
        assert_eq!(found.id, guest.id);
        assert_eq!(found.name, "Guest 9876543210");
        assert_eq!(found.points, 0);
        assert!(db.customers().find_by_phone("000").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_updates_points() {
        let db = setup().await;
        let mut c = Customer::guest("555");
        db.customers().save(&c).await.unwrap();

        c.points = 615;
        db.customers().save(&c).await.unwrap();

        let loaded = db.customers().get_by_id(&c.id).await.unwrap().unwrap();
        assert_eq!(loaded.points, 615);
        assert_eq!(db.customers().count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_phone_rejected() {
        let db = setup().await;
        db.customers().save(&Customer::guest("555")).await.unwrap();
        let err = db.customers().save(&Customer::guest("555")).await.unwrap_err();
        assert!(matches!(err, DbError::UniqueViolation { .. }));
    }

    #[tokio::test]
    async fn test_top_by_points() {
        let db = setup().await;
        for (phone, points) in [("1", 10), ("2", 900), ("3", 450)] {
            let mut c = Customer::guest(phone);
            c.points = points;
            db.customers().save(&c).await.unwrap();
        }

        let top = db.customers().top_by_points(2).await.unwrap();
        let points: Vec<i64> = top.iter().map(|c| c.points).collect();
        assert_eq!(points, vec![900, 450]);
    }

    #[tokio::test]
    async fn test_delete() {
        let db = setup().await;
        let c = Customer::guest("777");
        db.customers().save(&c).await.unwrap();

        assert!(db.customers().delete(&c.id).await.unwrap());
        assert!(!db.customers().delete(&c.id).await.unwrap());
        assert!(db.customers().find_by_phone("777").await.unwrap().is_none());
    }
}
