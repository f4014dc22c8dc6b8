//! Categories repository for database operations

use sqlx::{Pool, Postgres};

use crate::{
    error::{AppError, AppResult},
    models::category::{Category, CreateCategory, UpdateCategory},
};

#[derive(Clone)]
pub struct CategoriesRepository {
    pool: Pool<Postgres>,
}

impl CategoriesRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    pub async fn get_by_id(&self, id: i32) -> AppResult<Category> {
        sqlx::query_as::<_, Category>("SELECT * FROM categories WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Category with id {} not found", id)))
    }

    pub async fn list(&self) -> AppResult<Vec<Category>> {
        let categories =
            sqlx::query_as::<_, Category>("SELECT * FROM categories ORDER BY name")
                .fetch_all(&self.pool)
                .await?;
        Ok(categories)
    }

    pub async fn name_exists(&self, name: &str, exclude_id: Option<i32>) -> AppResult<bool> {
        let exists: bool = if let Some(id) = exclude_id {
            sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM categories WHERE LOWER(name) = LOWER($1) AND id != $2)",
            )
            .bind(name)
            .bind(id)
            .fetch_one(&self.pool)
            .await?
        } else {
            sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM categories WHERE LOWER(name) = LOWER($1))",
            )
            .bind(name)
            .fetch_one(&self.pool)
            .await?
        };
        Ok(exists)
    }

    pub async fn create(&self, category: &CreateCategory) -> AppResult<Category> {
        let created = sqlx::query_as::<_, Category>(
            "INSERT INTO categories (name, description) VALUES ($1, $2) RETURNING *",
        )
        .bind(&category.name)
        .bind(&category.description)
        .fetch_one(&self.pool)
        .await?;
        Ok(created)
    }

    pub async fn update(&self, id: i32, update: &UpdateCategory) -> AppResult<Category> {
        sqlx::query_as::<_, Category>(
            r#"
            UPDATE categories
            SET name = COALESCE($2, name), description = COALESCE($3, description)
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&update.name)
        .bind(&update.description)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Category with id {} not found", id)))
    }

    /// True when any book is linked to the category
    pub async fn is_in_use(&self, id: i32) -> AppResult<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM book_categories WHERE category_id = $1)",
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    pub async fn delete(&self, id: i32) -> AppResult<()> {
        let result = sqlx::query("DELETE FROM categories WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Category with id {} not found", id)));
        }
        Ok(())
    }
}
