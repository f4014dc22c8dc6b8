//! Fine ledger endpoints

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
        fine::{CreateFine, Fine, FineQuery, FineSummary, PayFineRequest, UpdateFine},
        Page,
    },
    AppState,
};

use super::AuthenticatedUser;

/// A user's fines plus totals
#[derive(Serialize)]
pub struct UserFinesResponse {
    pub fines: Vec<Fine>,
    pub summary: FineSummary,
}

/// List fines with filters (staff)
pub async fn list_fines(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Query(query): Query<FineQuery>,
) -> AppResult<Json<Page<Fine>>> {
    claims.require_staff()?;
    let page = query.page.unwrap_or(1).max(1);
    let per_page = query.per_page.unwrap_or(10).clamp(1, 100);
    let (fines, total) = state.services.fines.list(&query).await?;
    Ok(Json(Page::new(fines, total, page, per_page)))
}

/// The calling user's fines with totals
pub async fn list_my_fines(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
) -> AppResult<Json<UserFinesResponse>> {
    let (fines, summary) = state.services.fines.list_by_user(claims.user_id).await?;
    Ok(Json(UserFinesResponse { fines, summary }))
}

/// One user's fines with totals (staff)
pub async fn list_user_fines(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(user_id): Path<i32>,
) -> AppResult<Json<UserFinesResponse>> {
    claims.require_staff()?;
    let (fines, summary) = state.services.fines.list_by_user(user_id).await?;
    Ok(Json(UserFinesResponse { fines, summary }))
}

/// Manual fine creation (staff)
pub async fn create_fine(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Json(request): Json<CreateFine>,
) -> AppResult<(StatusCode, Json<Fine>)> {
    claims.require_staff()?;
    request
        .validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let fine = state
        .services
        .fines
        .create_manual(claims.user_id, &request)
        .await?;
    Ok((StatusCode::CREATED, Json(fine)))
}

/// Mark a fine as paid (staff)
pub async fn pay_fine(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
    Json(request): Json<PayFineRequest>,
) -> AppResult<Json<Fine>> {
    claims.require_staff()?;
    let fine = state
        .services
        .fines
        .mark_paid(id, claims.user_id, request.note.as_deref())
        .await?;
    Ok(Json(fine))
}

/// Update an unpaid fine (staff)
pub async fn update_fine(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
    Json(request): Json<UpdateFine>,
) -> AppResult<Json<Fine>> {
    claims.require_staff()?;
    request
        .validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let fine = state.services.fines.update(id, &request).await?;
    Ok(Json(fine))
}

/// Delete an unpaid fine (staff)
pub async fn delete_fine(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
) -> AppResult<StatusCode> {
    claims.require_staff()?;
    state.services.fines.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
