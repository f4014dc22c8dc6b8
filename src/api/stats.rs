//! Statistics endpoints

use axum::{
    extract::{Query, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::{
    error::AppResult,
    models::{borrow::BorrowStatus, fine::FineReason},
    AppState,
};

use super::AuthenticatedUser;

/// Date-range filter shared by the statistics endpoints
#[derive(Debug, Default, Deserialize)]
pub struct StatsQuery {
    pub from_date: Option<DateTime<Utc>>,
    pub to_date: Option<DateTime<Utc>>,
}

/// Per-status request counts
#[derive(Debug, Serialize, FromRow)]
pub struct StatusSummary {
    pub status: BorrowStatus,
    pub count: i64,
    pub total_quantity: i64,
}

/// One overdue record with how late it is
#[derive(Debug, Serialize, FromRow)]
pub struct OverdueEntry {
    pub borrow_id: i32,
    pub user_id: i32,
    pub user_name: Option<String>,
    pub student_code: String,
    pub book_id: i32,
    pub book_title: Option<String>,
    pub due_date: DateTime<Utc>,
    pub quantity: i32,
    pub days_late: i64,
}

#[derive(Debug, Serialize, FromRow)]
pub struct TopBook {
    pub book_id: i32,
    pub book_title: Option<String>,
    pub isbn: Option<String>,
    pub borrow_count: i64,
    pub total_quantity: i64,
}

#[derive(Debug, Serialize, FromRow)]
pub struct TopBorrower {
    pub user_id: i32,
    pub user_name: Option<String>,
    pub student_code: String,
    pub borrow_count: i64,
    pub total_quantity: i64,
}

/// Borrow/return statistics response
#[derive(Debug, Serialize)]
pub struct BorrowStatsResponse {
    pub summary: Vec<StatusSummary>,
    pub overdue: Vec<OverdueEntry>,
    pub top_books: Vec<TopBook>,
    pub top_borrowers: Vec<TopBorrower>,
}

/// System-wide fine totals
#[derive(Debug, Serialize, FromRow)]
pub struct FineOverall {
    pub total_fines: i64,
    pub total_amount: i64,
    pub paid_fines: i64,
    pub unpaid_fines: i64,
    pub paid_amount: i64,
    pub unpaid_amount: i64,
}

#[derive(Debug, Serialize, FromRow)]
pub struct FineReasonStat {
    pub reason: FineReason,
    pub count: i64,
    pub total_amount: i64,
    pub paid_count: i64,
    pub unpaid_count: i64,
}

#[derive(Debug, Serialize, FromRow)]
pub struct TopFinedUser {
    pub user_id: i32,
    pub user_name: Option<String>,
    pub student_code: String,
    pub total_fines: i64,
    pub total_amount: i64,
    pub unpaid_amount: i64,
}

/// Fine statistics response
#[derive(Debug, Serialize)]
pub struct FineStatsResponse {
    pub overall: FineOverall,
    pub by_reason: Vec<FineReasonStat>,
    pub top_users: Vec<TopFinedUser>,
}

/// Borrow/return statistics (staff)
pub async fn borrow_statistics(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Query(query): Query<StatsQuery>,
) -> AppResult<Json<BorrowStatsResponse>> {
    claims.require_staff()?;
    let stats = state
        .services
        .stats
        .borrow_statistics(query.from_date, query.to_date)
        .await?;
    Ok(Json(stats))
}

/// Fine statistics (staff)
pub async fn fine_statistics(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Query(query): Query<StatsQuery>,
) -> AppResult<Json<FineStatsResponse>> {
    claims.require_staff()?;
    let stats = state
        .services
        .stats
        .fine_statistics(query.from_date, query.to_date)
        .await?;
    Ok(Json(stats))
}
