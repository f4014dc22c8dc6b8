//! Book model and related types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

use super::category::Category;

/// Book model from database
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Book {
    pub id: i32,
    pub isbn: String,
    pub title: String,
    pub author: Option<String>,
    pub publisher: Option<String>,
    pub publish_year: Option<i32>,
    pub description: Option<String>,
    /// Replacement price in whole currency units; basis for damage/loss fines
    pub price: i64,
    pub bookshelf_id: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    // Populated separately, empty when the row comes straight from a query
    #[sqlx(skip)]
    #[serde(default)]
    pub categories: Vec<Category>,
}

/// Create book request
#[derive(Debug, Deserialize, Validate)]
pub struct CreateBook {
    #[validate(length(min = 1, message = "Title must not be empty"))]
    pub title: String,
    /// ISBN-10 or ISBN-13, digits only (trailing X allowed for ISBN-10)
    pub isbn: String,
    pub author: Option<String>,
    pub publisher: Option<String>,
    pub publish_year: Option<i32>,
    pub description: Option<String>,
    #[validate(range(min = 0, message = "Price must not be negative"))]
    pub price: i64,
    #[serde(default)]
    pub category_ids: Vec<i32>,
    pub bookshelf_id: Option<i32>,
    /// Number of physical copies to register
    #[validate(range(min = 0, max = 1000, message = "Quantity out of range"))]
    #[serde(default)]
    pub quantity: i32,
}

/// Update book request
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateBook {
    #[validate(length(min = 1, message = "Title must not be empty"))]
    pub title: Option<String>,
    pub author: Option<String>,
    pub publisher: Option<String>,
    pub publish_year: Option<i32>,
    pub description: Option<String>,
    #[validate(range(min = 0, message = "Price must not be negative"))]
    pub price: Option<i64>,
    pub category_ids: Option<Vec<i32>>,
    pub bookshelf_id: Option<i32>,
}

/// Book list query parameters
#[derive(Debug, Default, Deserialize)]
pub struct BookQuery {
    /// Substring match on title
    pub title: Option<String>,
    /// Substring match on author
    pub author: Option<String>,
    pub category_id: Option<i32>,
    pub bookshelf_id: Option<i32>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}
