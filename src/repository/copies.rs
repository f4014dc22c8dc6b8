//! Copy registry: the physical-copy pool for each book.
//!
//! Status flips that belong to a borrow transition take a connection from
//! the caller's transaction so allocation, inventory counters and the
//! borrow record commit or roll back together.

use chrono::{DateTime, Utc};
use sqlx::{PgConnection, Pool, Postgres};

use crate::{
    error::{AppError, AppResult},
    models::copy::{BookCopy, CopyStatus},
};

#[derive(Clone)]
pub struct CopiesRepository {
    pool: Pool<Postgres>,
}

impl CopiesRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Get copy by ID
    pub async fn get_by_id(&self, id: i32) -> AppResult<BookCopy> {
        sqlx::query_as::<_, BookCopy>("SELECT * FROM book_copies WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Copy with id {} not found", id)))
    }

    /// List all copies of a book in creation order
    pub async fn list_by_book(&self, book_id: i32) -> AppResult<Vec<BookCopy>> {
        let copies = sqlx::query_as::<_, BookCopy>(
            "SELECT * FROM book_copies WHERE book_id = $1 ORDER BY id",
        )
        .bind(book_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(copies)
    }

    /// Insert a batch of copies for a book. Barcodes must already be derived.
    pub async fn create_batch(
        &self,
        conn: &mut PgConnection,
        book_id: i32,
        barcodes: &[String],
    ) -> AppResult<()> {
        for barcode in barcodes {
            sqlx::query("INSERT INTO book_copies (book_id, barcode) VALUES ($1, $2)")
                .bind(book_id)
                .bind(barcode)
                .execute(&mut *conn)
                .await?;
        }
        Ok(())
    }

    /// Find up to `count` available copies of a book, oldest first, locking
    /// the rows against concurrent allocation. May return fewer than
    /// requested; the caller must check the count.
    pub async fn find_available(
        &self,
        conn: &mut PgConnection,
        book_id: i32,
        count: i64,
    ) -> AppResult<Vec<BookCopy>> {
        let copies = sqlx::query_as::<_, BookCopy>(
            r#"
            SELECT * FROM book_copies
            WHERE book_id = $1 AND status = 'available'
            ORDER BY id
            LIMIT $2
            FOR UPDATE
            "#,
        )
        .bind(book_id)
        .bind(count)
        .fetch_all(&mut *conn)
        .await?;
        Ok(copies)
    }

    /// Move copies to `pending` and assign the borrower and due date.
    /// No business validation here; that is the caller's responsibility.
    pub async fn reserve(
        &self,
        conn: &mut PgConnection,
        copy_ids: &[i32],
        borrower_id: i32,
        due_date: DateTime<Utc>,
    ) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE book_copies
            SET status = 'pending', current_borrower = $2, due_date = $3, updated_at = NOW()
            WHERE id = ANY($1)
            "#,
        )
        .bind(copy_ids)
        .bind(borrower_id)
        .bind(due_date)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    /// Flip reserved copies to `borrowed` at pickup confirmation
    pub async fn mark_borrowed(&self, conn: &mut PgConnection, copy_ids: &[i32]) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE book_copies
            SET status = 'borrowed', updated_at = NOW()
            WHERE id = ANY($1) AND status = 'pending'
            "#,
        )
        .bind(copy_ids)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    /// Release copies to a final condition (`available`, `damaged` or
    /// `lost`), clearing borrower and due date. Used by return, decline
    /// and cancel.
    pub async fn release(
        &self,
        conn: &mut PgConnection,
        copy_ids: &[i32],
        final_status: CopyStatus,
    ) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE book_copies
            SET status = $2, current_borrower = NULL, due_date = NULL, updated_at = NOW()
            WHERE id = ANY($1)
            "#,
        )
        .bind(copy_ids)
        .bind(final_status)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    /// Bulk-advance the due date of all copies currently borrowed by a
    /// user for a book
    pub async fn extend_due_date(
        &self,
        conn: &mut PgConnection,
        book_id: i32,
        borrower_id: i32,
        new_due_date: DateTime<Utc>,
    ) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE book_copies
            SET due_date = $3, updated_at = NOW()
            WHERE book_id = $1 AND current_borrower = $2 AND status = 'borrowed'
            "#,
        )
        .bind(book_id)
        .bind(borrower_id)
        .bind(new_due_date)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }
}
