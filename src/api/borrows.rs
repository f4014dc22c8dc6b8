//! Borrow lifecycle endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use validator::Validate;

use crate::{
    error::{AppError, AppResult},
    models::{
        borrow::{
            BorrowDetails, BorrowListEntry, BorrowQuery, BorrowRecord, CreateBorrowRequest,
            DeclineRequest, ExtendRequest, ReturnRequest,
        },
        Page,
    },
    AppState,
};

use super::AuthenticatedUser;

/// Response wrapping a transitioned record
#[derive(Serialize)]
pub struct BorrowResponse {
    pub message: String,
    pub borrow_record: BorrowRecord,
}

/// Create a borrow request (patron)
pub async fn create_request(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Json(request): Json<CreateBorrowRequest>,
) -> AppResult<(StatusCode, Json<BorrowDetails>)> {
    request
        .validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let details = state
        .services
        .borrows
        .create_request(claims.user_id, &request)
        .await?;
    Ok((StatusCode::CREATED, Json(details)))
}

/// Get a borrow record with its copy snapshot and fine
pub async fn get_request(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
) -> AppResult<Json<BorrowDetails>> {
    let details = state.services.borrows.get_details(id).await?;
    if details.record.user_id != claims.user_id {
        claims.require_staff()?;
    }
    Ok(Json(details))
}

/// Approve a pending request (staff)
pub async fn accept_request(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
) -> AppResult<Json<BorrowResponse>> {
    claims.require_staff()?;
    let record = state.services.borrows.accept(id, claims.user_id).await?;
    Ok(Json(BorrowResponse {
        message: "Borrow request approved successfully".to_string(),
        borrow_record: record,
    }))
}

/// Reject a pending request (staff)
pub async fn decline_request(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
    Json(request): Json<DeclineRequest>,
) -> AppResult<Json<BorrowResponse>> {
    claims.require_staff()?;
    let record = state
        .services
        .borrows
        .decline(id, claims.user_id, request.reason.as_deref())
        .await?;
    Ok(Json(BorrowResponse {
        message: "Borrow request declined successfully".to_string(),
        borrow_record: record,
    }))
}

/// Confirm the patron picked the books up (staff)
pub async fn confirm_pickup(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
) -> AppResult<Json<BorrowResponse>> {
    claims.require_staff()?;
    let record = state.services.borrows.confirm_pickup(id).await?;
    Ok(Json(BorrowResponse {
        message: "Book pickup confirmed successfully".to_string(),
        borrow_record: record,
    }))
}

/// Cancel a request before pickup (owner or staff)
pub async fn cancel_request(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
) -> AppResult<Json<BorrowResponse>> {
    let record = state
        .services
        .borrows
        .cancel(id, claims.user_id, claims.role)
        .await?;
    Ok(Json(BorrowResponse {
        message: "Borrow request cancelled successfully".to_string(),
        borrow_record: record,
    }))
}

/// Process a return with per-copy conditions (staff)
pub async fn return_books(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
    Json(request): Json<ReturnRequest>,
) -> AppResult<Json<BorrowDetails>> {
    claims.require_staff()?;
    let details = state
        .services
        .borrows
        .return_books(id, claims.user_id, &request)
        .await?;
    Ok(Json(details))
}

/// Extend a borrowed record (staff)
pub async fn extend_request(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
    Json(request): Json<ExtendRequest>,
) -> AppResult<Json<BorrowResponse>> {
    claims.require_staff()?;
    let record = state
        .services
        .borrows
        .extend(id, claims.user_id, request.days)
        .await?;
    Ok(Json(BorrowResponse {
        message: "Borrow period extended successfully".to_string(),
        borrow_record: record,
    }))
}

/// Requests awaiting staff action (staff)
pub async fn list_open_requests(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
) -> AppResult<Json<Vec<BorrowListEntry>>> {
    claims.require_staff()?;
    let requests = state.services.borrows.list_open_requests().await?;
    Ok(Json(requests))
}

/// Currently borrowed records, optionally overdue only (staff)
pub async fn list_borrowed(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Query(query): Query<BorrowQuery>,
) -> AppResult<Json<Page<BorrowListEntry>>> {
    claims.require_staff()?;
    let page = query.page.unwrap_or(1).max(1);
    let per_page = query.per_page.unwrap_or(10).clamp(1, 100);
    let (entries, total) = state
        .services
        .borrows
        .list_borrowed(query.is_overdue.unwrap_or(false), page, per_page)
        .await?;
    Ok(Json(Page::new(entries, total, page, per_page)))
}

/// Return history across all users (staff)
pub async fn list_history(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Query(query): Query<BorrowQuery>,
) -> AppResult<Json<Page<BorrowListEntry>>> {
    claims.require_staff()?;
    let page = query.page.unwrap_or(1).max(1);
    let per_page = query.per_page.unwrap_or(10).clamp(1, 100);
    let (entries, total) = state
        .services
        .borrows
        .list_history(None, page, per_page)
        .await?;
    Ok(Json(Page::new(entries, total, page, per_page)))
}

/// Return history of one user (owner or staff)
pub async fn list_user_history(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(user_id): Path<i32>,
    Query(query): Query<BorrowQuery>,
) -> AppResult<Json<Page<BorrowListEntry>>> {
    if user_id != claims.user_id {
        claims.require_staff()?;
    }
    let page = query.page.unwrap_or(1).max(1);
    let per_page = query.per_page.unwrap_or(10).clamp(1, 100);
    let (entries, total) = state
        .services
        .borrows
        .list_history(Some(user_id), page, per_page)
        .await?;
    Ok(Json(Page::new(entries, total, page, per_page)))
}

/// All requests of the calling user
pub async fn list_my_requests(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
) -> AppResult<Json<Vec<BorrowListEntry>>> {
    let requests = state
        .services
        .borrows
        .list_user_requests(claims.user_id)
        .await?;
    Ok(Json(requests))
}
