//! Inventory ledger: per-book aggregate counters.
//!
//! Counter mutations that belong to a borrow transition run on the
//! caller's transaction; the locked read (`get_for_update`) serializes
//! concurrent writers on the same book.

use sqlx::{PgConnection, Pool, Postgres};

use crate::{
    error::{AppError, AppResult},
    models::inventory::{Inventory, UpdateInventory},
};

#[derive(Clone)]
pub struct InventoryRepository {
    pool: Pool<Postgres>,
}

impl InventoryRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Get inventory for a book
    pub async fn get_by_book(&self, book_id: i32) -> AppResult<Inventory> {
        sqlx::query_as::<_, Inventory>("SELECT * FROM inventories WHERE book_id = $1")
            .bind(book_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!("Inventory for book {} not found", book_id))
            })
    }

    /// List all inventories
    pub async fn list(&self) -> AppResult<Vec<Inventory>> {
        let items =
            sqlx::query_as::<_, Inventory>("SELECT * FROM inventories ORDER BY book_id")
                .fetch_all(&self.pool)
                .await?;
        Ok(items)
    }

    /// Create the inventory row alongside a new book
    pub async fn create(
        &self,
        conn: &mut PgConnection,
        book_id: i32,
        total: i32,
    ) -> AppResult<()> {
        sqlx::query(
            "INSERT INTO inventories (book_id, total, available) VALUES ($1, $2, $2)",
        )
        .bind(book_id)
        .bind(total)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    /// Locked read. Every borrow transition acquires this lock first so
    /// concurrent requests for the same book serialize.
    pub async fn get_for_update(
        &self,
        conn: &mut PgConnection,
        book_id: i32,
    ) -> AppResult<Inventory> {
        sqlx::query_as::<_, Inventory>(
            "SELECT * FROM inventories WHERE book_id = $1 FOR UPDATE",
        )
        .bind(book_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Inventory for book {} not found", book_id)))
    }

    /// Move copies from available to borrowed at request creation
    pub async fn reserve(
        &self,
        conn: &mut PgConnection,
        book_id: i32,
        quantity: i32,
    ) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE inventories
            SET available = available - $2, borrowed = borrowed + $2, updated_at = NOW()
            WHERE book_id = $1
            "#,
        )
        .bind(book_id)
        .bind(quantity)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    /// Undo a reservation on decline/cancel
    pub async fn cancel_reservation(
        &self,
        conn: &mut PgConnection,
        book_id: i32,
        quantity: i32,
    ) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE inventories
            SET available = available + $2, borrowed = borrowed - $2, updated_at = NOW()
            WHERE book_id = $1
            "#,
        )
        .bind(book_id)
        .bind(quantity)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    /// Settle counters on return: borrowed copies leave the borrowed pool
    /// and land in available/damaged/lost per their condition
    pub async fn release(
        &self,
        conn: &mut PgConnection,
        book_id: i32,
        quantity: i32,
        good: i32,
        damaged: i32,
        lost: i32,
    ) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE inventories
            SET borrowed = borrowed - $2,
                available = available + $3,
                damaged = damaged + $4,
                lost = lost + $5,
                updated_at = NOW()
            WHERE book_id = $1
            "#,
        )
        .bind(book_id)
        .bind(quantity)
        .bind(good)
        .bind(damaged)
        .bind(lost)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    /// Manual staff correction. Omitted fields keep their current value;
    /// the result must satisfy the sum invariant or the whole update is
    /// rejected.
    pub async fn set_absolute(
        &self,
        book_id: i32,
        update: &UpdateInventory,
    ) -> AppResult<Inventory> {
        let mut tx = self.pool.begin().await?;

        let current = self.get_for_update(&mut tx, book_id).await?;

        let total = update.total.unwrap_or(current.total);
        let available = update.available.unwrap_or(current.available);
        let borrowed = update.borrowed.unwrap_or(current.borrowed);
        let damaged = update.damaged.unwrap_or(current.damaged);
        let lost = update.lost.unwrap_or(current.lost);

        if available < 0 || borrowed < 0 || damaged < 0 || lost < 0 || total < 0 {
            return Err(AppError::Validation(
                "Inventory counters must not be negative".to_string(),
            ));
        }
        if available + borrowed + damaged + lost != total {
            return Err(AppError::Validation(
                "Invalid inventory numbers: total must equal available + borrowed + damaged + lost"
                    .to_string(),
            ));
        }

        let updated = sqlx::query_as::<_, Inventory>(
            r#"
            UPDATE inventories
            SET total = $2, available = $3, borrowed = $4, damaged = $5, lost = $6,
                updated_at = NOW()
            WHERE book_id = $1
            RETURNING *
            "#,
        )
        .bind(book_id)
        .bind(total)
        .bind(available)
        .bind(borrowed)
        .bind(damaged)
        .bind(lost)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(updated)
    }
}
