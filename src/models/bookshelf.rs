//! Bookshelf model and related types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

/// Bookshelf model from database
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Bookshelf {
    pub id: i32,
    /// Shelf code, unique (e.g. "A-01")
    pub code: String,
    pub location: Option<String>,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Create bookshelf request
#[derive(Debug, Deserialize, Validate)]
pub struct CreateBookshelf {
    #[validate(length(min = 1, message = "Shelf code must not be empty"))]
    pub code: String,
    pub location: Option<String>,
    pub description: Option<String>,
}

/// Update bookshelf request
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateBookshelf {
    #[validate(length(min = 1, message = "Shelf code must not be empty"))]
    pub code: Option<String>,
    pub location: Option<String>,
    pub description: Option<String>,
}
