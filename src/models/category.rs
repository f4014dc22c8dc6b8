//! Category model and related types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

/// Category model from database
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Category {
    pub id: i32,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Create category request
#[derive(Debug, Deserialize, Validate)]
pub struct CreateCategory {
    #[validate(length(min = 1, message = "Category name must not be empty"))]
    pub name: String,
    pub description: Option<String>,
}

/// Update category request
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateCategory {
    #[validate(length(min = 1, message = "Category name must not be empty"))]
    pub name: Option<String>,
    pub description: Option<String>,
}
