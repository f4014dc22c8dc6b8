//! Borrow records repository.
//!
//! Records are append-and-transition only: a row is created when a patron
//! requests a borrow and is never deleted, so the table doubles as the
//! audit trail. Status stamps that belong to a lifecycle transition take
//! the engine's transaction connection.

use chrono::{DateTime, Utc};
use sqlx::{PgConnection, Pool, Postgres};

use crate::{
    error::{AppError, AppResult},
    models::{
        borrow::{BorrowListEntry, BorrowRecord, BorrowStatus},
        copy::{CopySnapshot, CopyStatus},
        fine::Fine,
    },
};

#[derive(Clone)]
pub struct BorrowsRepository {
    pool: Pool<Postgres>,
}

impl BorrowsRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Get borrow record by ID
    pub async fn get_by_id(&self, id: i32) -> AppResult<BorrowRecord> {
        sqlx::query_as::<_, BorrowRecord>("SELECT * FROM borrow_records WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Borrow record with id {} not found", id)))
    }

    /// Locked read for a lifecycle transition
    pub async fn get_for_update(
        &self,
        conn: &mut PgConnection,
        id: i32,
    ) -> AppResult<BorrowRecord> {
        sqlx::query_as::<_, BorrowRecord>(
            "SELECT * FROM borrow_records WHERE id = $1 FOR UPDATE",
        )
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Borrow record with id {} not found", id)))
    }

    /// True when the user already has a pending or borrowed record for the
    /// book (one active request per user per book)
    pub async fn has_active_request(
        &self,
        conn: &mut PgConnection,
        user_id: i32,
        book_id: i32,
    ) -> AppResult<bool> {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM borrow_records
                WHERE user_id = $1 AND book_id = $2 AND status IN ('pending', 'borrowed')
            )
            "#,
        )
        .bind(user_id)
        .bind(book_id)
        .fetch_one(&mut *conn)
        .await?;
        Ok(exists)
    }

    /// True when any record in an active status references the book;
    /// blocks catalog deletion
    pub async fn book_has_active_records(&self, book_id: i32) -> AppResult<bool> {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM borrow_records
                WHERE book_id = $1 AND status IN ('pending', 'borrowed')
            )
            "#,
        )
        .bind(book_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    /// Insert a new pending record
    #[allow(clippy::too_many_arguments)]
    pub async fn create(
        &self,
        conn: &mut PgConnection,
        user_id: i32,
        book_id: i32,
        quantity: i32,
        due_date: DateTime<Utc>,
        is_read_on_site: bool,
        notes: Option<&str>,
    ) -> AppResult<BorrowRecord> {
        let record = sqlx::query_as::<_, BorrowRecord>(
            r#"
            INSERT INTO borrow_records (user_id, book_id, quantity, due_date, is_read_on_site, notes)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(book_id)
        .bind(quantity)
        .bind(due_date)
        .bind(is_read_on_site)
        .bind(notes)
        .fetch_one(&mut *conn)
        .await?;
        Ok(record)
    }

    /// Write the copy snapshot rows for a freshly created request
    pub async fn insert_snapshot(
        &self,
        conn: &mut PgConnection,
        borrow_id: i32,
        copies: &[(i32, String)],
    ) -> AppResult<()> {
        for (copy_id, barcode) in copies {
            sqlx::query(
                "INSERT INTO borrow_record_copies (borrow_id, copy_id, barcode) VALUES ($1, $2, $3)",
            )
            .bind(borrow_id)
            .bind(copy_id)
            .bind(barcode)
            .execute(&mut *conn)
            .await?;
        }
        Ok(())
    }

    /// Record a copy's final condition in the snapshot
    pub async fn set_snapshot_status(
        &self,
        conn: &mut PgConnection,
        borrow_id: i32,
        copy_id: i32,
        status: CopyStatus,
    ) -> AppResult<()> {
        sqlx::query(
            "UPDATE borrow_record_copies SET status = $3 WHERE borrow_id = $1 AND copy_id = $2",
        )
        .bind(borrow_id)
        .bind(copy_id)
        .bind(status)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    /// Read the copy snapshot of a record
    pub async fn get_snapshot(&self, borrow_id: i32) -> AppResult<Vec<CopySnapshot>> {
        let copies = sqlx::query_as::<_, CopySnapshot>(
            "SELECT copy_id, barcode, status FROM borrow_record_copies WHERE borrow_id = $1 ORDER BY copy_id",
        )
        .bind(borrow_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(copies)
    }

    /// Snapshot read inside a transition
    pub async fn get_snapshot_on(
        &self,
        conn: &mut PgConnection,
        borrow_id: i32,
    ) -> AppResult<Vec<CopySnapshot>> {
        let copies = sqlx::query_as::<_, CopySnapshot>(
            "SELECT copy_id, barcode, status FROM borrow_record_copies WHERE borrow_id = $1 ORDER BY copy_id",
        )
        .bind(borrow_id)
        .fetch_all(&mut *conn)
        .await?;
        Ok(copies)
    }

    /// pending → pendingPickup
    pub async fn mark_accepted(
        &self,
        conn: &mut PgConnection,
        id: i32,
        staff_id: i32,
    ) -> AppResult<BorrowRecord> {
        let record = sqlx::query_as::<_, BorrowRecord>(
            r#"
            UPDATE borrow_records
            SET status = 'pendingPickup', borrow_date = NOW(), processed_by = $2
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(staff_id)
        .fetch_one(&mut *conn)
        .await?;
        Ok(record)
    }

    /// pending → declined
    pub async fn mark_declined(
        &self,
        conn: &mut PgConnection,
        id: i32,
        staff_id: i32,
        reason: Option<&str>,
    ) -> AppResult<BorrowRecord> {
        let record = sqlx::query_as::<_, BorrowRecord>(
            r#"
            UPDATE borrow_records
            SET status = 'declined', processed_by = $2, notes = COALESCE($3, notes)
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(staff_id)
        .bind(reason)
        .fetch_one(&mut *conn)
        .await?;
        Ok(record)
    }

    /// pendingPickup → borrowed
    pub async fn mark_picked_up(
        &self,
        conn: &mut PgConnection,
        id: i32,
    ) -> AppResult<BorrowRecord> {
        let record = sqlx::query_as::<_, BorrowRecord>(
            r#"
            UPDATE borrow_records
            SET status = 'borrowed', pickup_date = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .fetch_one(&mut *conn)
        .await?;
        Ok(record)
    }

    /// pending|pendingPickup → cancelled
    pub async fn mark_cancelled(&self, conn: &mut PgConnection, id: i32) -> AppResult<BorrowRecord> {
        let record = sqlx::query_as::<_, BorrowRecord>(
            "UPDATE borrow_records SET status = 'cancelled' WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .fetch_one(&mut *conn)
        .await?;
        Ok(record)
    }

    /// borrowed → returned|lost
    pub async fn mark_returned(
        &self,
        conn: &mut PgConnection,
        id: i32,
        status: BorrowStatus,
        return_date: DateTime<Utc>,
        staff_id: i32,
        notes: Option<&str>,
    ) -> AppResult<BorrowRecord> {
        let record = sqlx::query_as::<_, BorrowRecord>(
            r#"
            UPDATE borrow_records
            SET status = $2, return_date = $3, processed_by = $4, notes = COALESCE($5, notes)
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(status)
        .bind(return_date)
        .bind(staff_id)
        .bind(notes)
        .fetch_one(&mut *conn)
        .await?;
        Ok(record)
    }

    /// Link the fine assessed during a return
    pub async fn set_fine(
        &self,
        conn: &mut PgConnection,
        id: i32,
        fine_id: i32,
    ) -> AppResult<()> {
        sqlx::query("UPDATE borrow_records SET fine_id = $2 WHERE id = $1")
            .bind(id)
            .bind(fine_id)
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    /// Advance the due date on an extension
    pub async fn extend(
        &self,
        conn: &mut PgConnection,
        id: i32,
        new_due_date: DateTime<Utc>,
        staff_id: i32,
    ) -> AppResult<BorrowRecord> {
        let record = sqlx::query_as::<_, BorrowRecord>(
            r#"
            UPDATE borrow_records
            SET due_date = $2, extended_at = NOW(), processed_by = $3
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(new_due_date)
        .bind(staff_id)
        .fetch_one(&mut *conn)
        .await?;
        Ok(record)
    }

    /// Fine attached to a record, if any
    pub async fn get_fine(&self, borrow_id: i32) -> AppResult<Option<Fine>> {
        let fine = sqlx::query_as::<_, Fine>("SELECT * FROM fines WHERE borrow_id = $1")
            .bind(borrow_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(fine)
    }

    /// List requests awaiting staff action (pending and pendingPickup),
    /// newest first
    pub async fn list_open_requests(&self) -> AppResult<Vec<BorrowListEntry>> {
        let rows = sqlx::query_as::<_, BorrowListEntry>(
            r#"
            SELECT b.id, b.user_id, u.name as user_name, u.student_code,
                   b.book_id, bk.title as book_title, bk.isbn,
                   b.status, b.quantity, b.due_date, b.return_date, b.created_at,
                   FALSE as is_overdue,
                   NULL::bigint as fine_amount, NULL::text as fine_reason, NULL::boolean as fine_paid
            FROM borrow_records b
            JOIN users u ON u.id = b.user_id
            LEFT JOIN books bk ON bk.id = b.book_id
            WHERE b.status IN ('pending', 'pendingPickup')
            ORDER BY b.created_at DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// List currently borrowed records, optionally overdue only, paginated
    pub async fn list_borrowed(
        &self,
        overdue_only: bool,
        page: i64,
        per_page: i64,
    ) -> AppResult<(Vec<BorrowListEntry>, i64)> {
        let overdue_filter = if overdue_only {
            " AND b.due_date < NOW()"
        } else {
            ""
        };

        let query = format!(
            r#"
            SELECT b.id, b.user_id, u.name as user_name, u.student_code,
                   b.book_id, bk.title as book_title, bk.isbn,
                   b.status, b.quantity, b.due_date, b.return_date, b.created_at,
                   (b.due_date < NOW()) as is_overdue,
                   NULL::bigint as fine_amount, NULL::text as fine_reason, NULL::boolean as fine_paid
            FROM borrow_records b
            JOIN users u ON u.id = b.user_id
            LEFT JOIN books bk ON bk.id = b.book_id
            WHERE b.status = 'borrowed'{overdue_filter}
            ORDER BY b.created_at DESC
            LIMIT $1 OFFSET $2
            "#
        );

        let rows = sqlx::query_as::<_, BorrowListEntry>(&query)
            .bind(per_page)
            .bind((page - 1) * per_page)
            .fetch_all(&self.pool)
            .await?;

        let count_query = format!(
            "SELECT COUNT(*) FROM borrow_records b WHERE b.status = 'borrowed'{overdue_filter}"
        );
        let total: i64 = sqlx::query_scalar(&count_query).fetch_one(&self.pool).await?;

        Ok((rows, total))
    }

    /// Return history (terminal returned/lost records), optionally for one
    /// user, newest returns first, paginated
    pub async fn list_history(
        &self,
        user_id: Option<i32>,
        page: i64,
        per_page: i64,
    ) -> AppResult<(Vec<BorrowListEntry>, i64)> {
        let user_filter = if user_id.is_some() {
            " AND b.user_id = $3"
        } else {
            ""
        };

        let query = format!(
            r#"
            SELECT b.id, b.user_id, u.name as user_name, u.student_code,
                   b.book_id, bk.title as book_title, bk.isbn,
                   b.status, b.quantity, b.due_date, b.return_date, b.created_at,
                   FALSE as is_overdue,
                   f.amount as fine_amount, f.reason as fine_reason, f.paid as fine_paid
            FROM borrow_records b
            JOIN users u ON u.id = b.user_id
            LEFT JOIN books bk ON bk.id = b.book_id
            LEFT JOIN fines f ON f.borrow_id = b.id
            WHERE b.status IN ('returned', 'lost'){user_filter}
            ORDER BY b.return_date DESC
            LIMIT $1 OFFSET $2
            "#
        );

        let mut rows_query = sqlx::query_as::<_, BorrowListEntry>(&query)
            .bind(per_page)
            .bind((page - 1) * per_page);
        if let Some(uid) = user_id {
            rows_query = rows_query.bind(uid);
        }
        let rows = rows_query.fetch_all(&self.pool).await?;

        let count_query = format!(
            "SELECT COUNT(*) FROM borrow_records b WHERE b.status IN ('returned', 'lost'){}",
            if user_id.is_some() { " AND b.user_id = $1" } else { "" }
        );
        let mut count = sqlx::query_scalar::<_, i64>(&count_query);
        if let Some(uid) = user_id {
            count = count.bind(uid);
        }
        let total = count.fetch_one(&self.pool).await?;

        Ok((rows, total))
    }

    /// All requests of one user, any status, newest first
    pub async fn list_user_requests(&self, user_id: i32) -> AppResult<Vec<BorrowListEntry>> {
        let rows = sqlx::query_as::<_, BorrowListEntry>(
            r#"
            SELECT b.id, b.user_id, u.name as user_name, u.student_code,
                   b.book_id, bk.title as book_title, bk.isbn,
                   b.status, b.quantity, b.due_date, b.return_date, b.created_at,
                   (b.status = 'borrowed' AND b.due_date < NOW()) as is_overdue,
                   f.amount as fine_amount, f.reason as fine_reason, f.paid as fine_paid
            FROM borrow_records b
            JOIN users u ON u.id = b.user_id
            LEFT JOIN books bk ON bk.id = b.book_id
            LEFT JOIN fines f ON f.borrow_id = b.id
            WHERE b.user_id = $1
            ORDER BY b.created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}
