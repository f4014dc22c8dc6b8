//! Fines repository for database operations

use sqlx::{PgConnection, Pool, Postgres};

use crate::{
    error::{AppError, AppResult},
    models::fine::{Fine, FineQuery, FineReason, FineSummary},
};

/// Fields for a new fine row; the lifecycle engine and the manual staff
/// path both go through this.
pub struct NewFine<'a> {
    pub borrow_id: Option<i32>,
    pub user_id: i32,
    pub reason: FineReason,
    pub amount: i64,
    pub processed_by: i32,
    pub note: Option<&'a str>,
}

#[derive(Clone)]
pub struct FinesRepository {
    pool: Pool<Postgres>,
}

impl FinesRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Get fine by ID
    pub async fn get_by_id(&self, id: i32) -> AppResult<Fine> {
        sqlx::query_as::<_, Fine>("SELECT * FROM fines WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Fine with id {} not found", id)))
    }

    /// Insert a fine. Takes the caller's connection so the lifecycle
    /// engine can create fines inside a return transaction.
    pub async fn create(&self, conn: &mut PgConnection, fine: &NewFine<'_>) -> AppResult<Fine> {
        let created = sqlx::query_as::<_, Fine>(
            r#"
            INSERT INTO fines (borrow_id, user_id, reason, amount, processed_by, note)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(fine.borrow_id)
        .bind(fine.user_id)
        .bind(fine.reason)
        .bind(fine.amount)
        .bind(fine.processed_by)
        .bind(fine.note)
        .fetch_one(&mut *conn)
        .await?;
        Ok(created)
    }

    /// Number of unpaid fines a user has, system-wide. Gates extensions.
    pub async fn count_unpaid(&self, user_id: i32) -> AppResult<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM fines WHERE user_id = $1 AND paid = FALSE")
                .bind(user_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }

    /// List fines with optional paid/user/reason filters, newest first,
    /// paginated
    pub async fn list(&self, query: &FineQuery) -> AppResult<(Vec<Fine>, i64)> {
        let page = query.page.unwrap_or(1).max(1);
        let per_page = query.per_page.unwrap_or(10).clamp(1, 100);

        let mut conditions = vec!["TRUE".to_string()];
        let mut param = 0;
        if query.paid.is_some() {
            param += 1;
            conditions.push(format!("paid = ${}", param));
        }
        if query.user_id.is_some() {
            param += 1;
            conditions.push(format!("user_id = ${}", param));
        }
        if query.reason.is_some() {
            param += 1;
            conditions.push(format!("reason = ${}", param));
        }
        let where_clause = conditions.join(" AND ");

        let list_query = format!(
            "SELECT * FROM fines WHERE {} ORDER BY created_at DESC LIMIT {} OFFSET {}",
            where_clause,
            per_page,
            (page - 1) * per_page
        );
        let count_query = format!("SELECT COUNT(*) FROM fines WHERE {}", where_clause);

        let mut rows = sqlx::query_as::<_, Fine>(&list_query);
        let mut count = sqlx::query_scalar::<_, i64>(&count_query);
        if let Some(paid) = query.paid {
            rows = rows.bind(paid);
            count = count.bind(paid);
        }
        if let Some(user_id) = query.user_id {
            rows = rows.bind(user_id);
            count = count.bind(user_id);
        }
        if let Some(reason) = query.reason {
            rows = rows.bind(reason);
            count = count.bind(reason);
        }

        let fines = rows.fetch_all(&self.pool).await?;
        let total = count.fetch_one(&self.pool).await?;
        Ok((fines, total))
    }

    /// All fines of one user plus paid/unpaid totals
    pub async fn list_by_user(&self, user_id: i32) -> AppResult<(Vec<Fine>, FineSummary)> {
        let fines = sqlx::query_as::<_, Fine>(
            "SELECT * FROM fines WHERE user_id = $1 ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        let total_amount: i64 = fines.iter().map(|f| f.amount).sum();
        let unpaid_amount: i64 = fines.iter().filter(|f| !f.paid).map(|f| f.amount).sum();

        let summary = FineSummary {
            total_fines: fines.len() as i64,
            total_amount,
            paid_amount: total_amount - unpaid_amount,
            unpaid_amount,
        };
        Ok((fines, summary))
    }

    /// Mark a fine as paid
    pub async fn mark_paid(
        &self,
        id: i32,
        staff_id: i32,
        note: Option<&str>,
    ) -> AppResult<Fine> {
        let fine = sqlx::query_as::<_, Fine>(
            r#"
            UPDATE fines
            SET paid = TRUE, paid_at = NOW(), processed_by = $2, note = COALESCE($3, note)
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(staff_id)
        .bind(note)
        .fetch_one(&self.pool)
        .await?;
        Ok(fine)
    }

    /// Update amount/reason/note of an unpaid fine
    pub async fn update(
        &self,
        id: i32,
        amount: Option<i64>,
        reason: Option<FineReason>,
        note: Option<&str>,
    ) -> AppResult<Fine> {
        let fine = sqlx::query_as::<_, Fine>(
            r#"
            UPDATE fines
            SET amount = COALESCE($2, amount),
                reason = COALESCE($3, reason),
                note = COALESCE($4, note)
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(amount)
        .bind(reason)
        .bind(note)
        .fetch_one(&self.pool)
        .await?;
        Ok(fine)
    }

    /// Delete an unpaid fine, unlinking it from its borrow record
    pub async fn delete(&self, id: i32) -> AppResult<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("UPDATE borrow_records SET fine_id = NULL WHERE fine_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM fines WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }
}
