//! Book catalog endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use validator::Validate;

use crate::{
    error::{AppError, AppResult},
    models::{
        book::{Book, BookQuery, CreateBook, UpdateBook},
        copy::BookCopy,
        inventory::{Inventory, UpdateInventory},
        Page,
    },
    AppState,
};

use super::AuthenticatedUser;

/// List books with filters and pagination
pub async fn list_books(
    State(state): State<AppState>,
    AuthenticatedUser(_claims): AuthenticatedUser,
    Query(query): Query<BookQuery>,
) -> AppResult<Json<Page<Book>>> {
    let page = query.page.unwrap_or(1).max(1);
    let per_page = query.per_page.unwrap_or(10).clamp(1, 100);
    let (books, total) = state.services.catalog.search_books(&query).await?;
    Ok(Json(Page::new(books, total, page, per_page)))
}

/// Get a single book with its categories
pub async fn get_book(
    State(state): State<AppState>,
    AuthenticatedUser(_claims): AuthenticatedUser,
    Path(id): Path<i32>,
) -> AppResult<Json<Book>> {
    let book = state.services.catalog.get_book(id).await?;
    Ok(Json(book))
}

/// Create a book with its inventory and copies
pub async fn create_book(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Json(request): Json<CreateBook>,
) -> AppResult<(StatusCode, Json<Book>)> {
    claims.require_staff()?;
    request
        .validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let book = state.services.catalog.create_book(&request).await?;
    Ok((StatusCode::CREATED, Json(book)))
}

/// Update a book
pub async fn update_book(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
    Json(request): Json<UpdateBook>,
) -> AppResult<Json<Book>> {
    claims.require_staff()?;
    request
        .validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let book = state.services.catalog.update_book(id, &request).await?;
    Ok(Json(book))
}

/// Delete a book (rejected while active borrow records reference it)
pub async fn delete_book(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
) -> AppResult<StatusCode> {
    claims.require_staff()?;
    state.services.catalog.delete_book(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// List the physical copies of a book
pub async fn list_copies(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
) -> AppResult<Json<Vec<BookCopy>>> {
    claims.require_staff()?;
    let copies = state.services.catalog.list_copies(id).await?;
    Ok(Json(copies))
}

/// List all inventories
pub async fn list_inventories(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
) -> AppResult<Json<Vec<Inventory>>> {
    claims.require_staff()?;
    let inventories = state.services.catalog.list_inventories().await?;
    Ok(Json(inventories))
}

/// Get the inventory of a book
pub async fn get_inventory(
    State(state): State<AppState>,
    AuthenticatedUser(_claims): AuthenticatedUser,
    Path(id): Path<i32>,
) -> AppResult<Json<Inventory>> {
    let inventory = state.services.catalog.get_inventory(id).await?;
    Ok(Json(inventory))
}

/// Manual inventory correction, validated against the sum invariant
pub async fn update_inventory(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
    Json(request): Json<UpdateInventory>,
) -> AppResult<Json<Inventory>> {
    claims.require_staff()?;
    let inventory = state
        .services
        .catalog
        .update_inventory(id, &request)
        .await?;
    Ok(Json(inventory))
}
