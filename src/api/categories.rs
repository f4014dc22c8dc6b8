//! Category endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use validator::Validate;

use crate::{
    error::{AppError, AppResult},
    models::category::{Category, CreateCategory, UpdateCategory},
    AppState,
};

use super::AuthenticatedUser;

pub async fn list_categories(
    State(state): State<AppState>,
    AuthenticatedUser(_claims): AuthenticatedUser,
) -> AppResult<Json<Vec<Category>>> {
    let categories = state.services.catalog.list_categories().await?;
    Ok(Json(categories))
}

pub async fn create_category(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Json(request): Json<CreateCategory>,
) -> AppResult<(StatusCode, Json<Category>)> {
    claims.require_staff()?;
    request
        .validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let category = state.services.catalog.create_category(&request).await?;
    Ok((StatusCode::CREATED, Json(category)))
}

pub async fn update_category(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
    Json(request): Json<UpdateCategory>,
) -> AppResult<Json<Category>> {
    claims.require_staff()?;
    request
        .validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let category = state.services.catalog.update_category(id, &request).await?;
    Ok(Json(category))
}

pub async fn delete_category(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
) -> AppResult<StatusCode> {
    claims.require_staff()?;
    state.services.catalog.delete_category(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
