//! Statistics service

use chrono::{DateTime, Utc};

use crate::{
    api::stats::{
        BorrowStatsResponse, FineOverall, FineReasonStat, FineStatsResponse, OverdueEntry,
        StatusSummary, TopBook, TopBorrower, TopFinedUser,
    },
    error::AppResult,
    repository::Repository,
};

#[derive(Clone)]
pub struct StatsService {
    repository: Repository,
}

impl StatsService {
    pub fn new(repository: Repository) -> Self {
        Self { repository }
    }

    /// Borrow/return statistics, optionally restricted to requests created
    /// within a date range. Read-only and idempotent.
    pub async fn borrow_statistics(
        &self,
        from_date: Option<DateTime<Utc>>,
        to_date: Option<DateTime<Utc>>,
    ) -> AppResult<BorrowStatsResponse> {
        let pool = &self.repository.pool;

        let summary = sqlx::query_as::<_, StatusSummary>(
            r#"
            SELECT status, COUNT(*) as count, COALESCE(SUM(quantity), 0)::bigint as total_quantity
            FROM borrow_records
            WHERE ($1::timestamptz IS NULL OR created_at >= $1)
              AND ($2::timestamptz IS NULL OR created_at <= $2)
            GROUP BY status
            ORDER BY status
            "#,
        )
        .bind(from_date)
        .bind(to_date)
        .fetch_all(pool)
        .await?;

        let overdue = sqlx::query_as::<_, OverdueEntry>(
            r#"
            SELECT b.id as borrow_id, b.user_id, u.name as user_name, u.student_code,
                   b.book_id, bk.title as book_title, b.due_date, b.quantity,
                   CEIL(EXTRACT(EPOCH FROM (NOW() - b.due_date)) / 86400)::bigint as days_late
            FROM borrow_records b
            JOIN users u ON u.id = b.user_id
            LEFT JOIN books bk ON bk.id = b.book_id
            WHERE b.status = 'borrowed' AND b.due_date < NOW()
            ORDER BY b.due_date
            "#,
        )
        .fetch_all(pool)
        .await?;

        let top_books = sqlx::query_as::<_, TopBook>(
            r#"
            SELECT b.book_id, bk.title as book_title, bk.isbn,
                   COUNT(*) as borrow_count, COALESCE(SUM(b.quantity), 0)::bigint as total_quantity
            FROM borrow_records b
            LEFT JOIN books bk ON bk.id = b.book_id
            WHERE b.status IN ('borrowed', 'returned')
              AND ($1::timestamptz IS NULL OR b.created_at >= $1)
              AND ($2::timestamptz IS NULL OR b.created_at <= $2)
            GROUP BY b.book_id, bk.title, bk.isbn
            ORDER BY borrow_count DESC
            LIMIT 10
            "#,
        )
        .bind(from_date)
        .bind(to_date)
        .fetch_all(pool)
        .await?;

        let top_borrowers = sqlx::query_as::<_, TopBorrower>(
            r#"
            SELECT b.user_id, u.name as user_name, u.student_code,
                   COUNT(*) as borrow_count, COALESCE(SUM(b.quantity), 0)::bigint as total_quantity
            FROM borrow_records b
            JOIN users u ON u.id = b.user_id
            WHERE b.status IN ('borrowed', 'returned')
              AND ($1::timestamptz IS NULL OR b.created_at >= $1)
              AND ($2::timestamptz IS NULL OR b.created_at <= $2)
            GROUP BY b.user_id, u.name, u.student_code
            ORDER BY borrow_count DESC
            LIMIT 10
            "#,
        )
        .bind(from_date)
        .bind(to_date)
        .fetch_all(pool)
        .await?;

        Ok(BorrowStatsResponse {
            summary,
            overdue,
            top_books,
            top_borrowers,
        })
    }

    /// Fine statistics, optionally restricted to fines created within a
    /// date range
    pub async fn fine_statistics(
        &self,
        from_date: Option<DateTime<Utc>>,
        to_date: Option<DateTime<Utc>>,
    ) -> AppResult<FineStatsResponse> {
        let pool = &self.repository.pool;

        let overall = sqlx::query_as::<_, FineOverall>(
            r#"
            SELECT COUNT(*) as total_fines,
                   COALESCE(SUM(amount), 0)::bigint as total_amount,
                   COUNT(*) FILTER (WHERE paid) as paid_fines,
                   COUNT(*) FILTER (WHERE NOT paid) as unpaid_fines,
                   COALESCE(SUM(amount) FILTER (WHERE paid), 0)::bigint as paid_amount,
                   COALESCE(SUM(amount) FILTER (WHERE NOT paid), 0)::bigint as unpaid_amount
            FROM fines
            WHERE ($1::timestamptz IS NULL OR created_at >= $1)
              AND ($2::timestamptz IS NULL OR created_at <= $2)
            "#,
        )
        .bind(from_date)
        .bind(to_date)
        .fetch_one(pool)
        .await?;

        let by_reason = sqlx::query_as::<_, FineReasonStat>(
            r#"
            SELECT reason, COUNT(*) as count,
                   COALESCE(SUM(amount), 0)::bigint as total_amount,
                   COUNT(*) FILTER (WHERE paid) as paid_count,
                   COUNT(*) FILTER (WHERE NOT paid) as unpaid_count
            FROM fines
            WHERE ($1::timestamptz IS NULL OR created_at >= $1)
              AND ($2::timestamptz IS NULL OR created_at <= $2)
            GROUP BY reason
            ORDER BY total_amount DESC
            "#,
        )
        .bind(from_date)
        .bind(to_date)
        .fetch_all(pool)
        .await?;

        let top_users = sqlx::query_as::<_, TopFinedUser>(
            r#"
            SELECT f.user_id, u.name as user_name, u.student_code,
                   COUNT(*) as total_fines,
                   COALESCE(SUM(f.amount), 0)::bigint as total_amount,
                   COALESCE(SUM(f.amount) FILTER (WHERE NOT f.paid), 0)::bigint as unpaid_amount
            FROM fines f
            JOIN users u ON u.id = f.user_id
            WHERE ($1::timestamptz IS NULL OR f.created_at >= $1)
              AND ($2::timestamptz IS NULL OR f.created_at <= $2)
            GROUP BY f.user_id, u.name, u.student_code
            ORDER BY total_amount DESC
            LIMIT 10
            "#,
        )
        .bind(from_date)
        .bind(to_date)
        .fetch_all(pool)
        .await?;

        Ok(FineStatsResponse {
            overall,
            by_reason,
            top_users,
        })
    }
}
