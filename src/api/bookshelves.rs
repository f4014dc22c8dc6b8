//! Bookshelf endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use validator::Validate;

use crate::{
    error::{AppError, AppResult},
    models::bookshelf::{Bookshelf, CreateBookshelf, UpdateBookshelf},
    AppState,
};

use super::AuthenticatedUser;

pub async fn list_bookshelves(
    State(state): State<AppState>,
    AuthenticatedUser(_claims): AuthenticatedUser,
) -> AppResult<Json<Vec<Bookshelf>>> {
    let shelves = state.services.catalog.list_bookshelves().await?;
    Ok(Json(shelves))
}

pub async fn create_bookshelf(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Json(request): Json<CreateBookshelf>,
) -> AppResult<(StatusCode, Json<Bookshelf>)> {
    claims.require_staff()?;
    request
        .validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let shelf = state.services.catalog.create_bookshelf(&request).await?;
    Ok((StatusCode::CREATED, Json(shelf)))
}

pub async fn update_bookshelf(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
    Json(request): Json<UpdateBookshelf>,
) -> AppResult<Json<Bookshelf>> {
    claims.require_staff()?;
    request
        .validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let shelf = state.services.catalog.update_bookshelf(id, &request).await?;
    Ok(Json(shelf))
}

pub async fn delete_bookshelf(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
) -> AppResult<StatusCode> {
    claims.require_staff()?;
    state.services.catalog.delete_bookshelf(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
