//! Fine ledger service.
//!
//! Fines created by the lifecycle engine arrive through the return
//! transaction; this service covers the staff-facing operations. A paid
//! fine is immutable.

use crate::{
    error::{AppError, AppResult},
    models::fine::{CreateFine, Fine, FineQuery, FineSummary, UpdateFine},
    repository::{fines::NewFine, Repository},
};

#[derive(Clone)]
pub struct FinesService {
    repository: Repository,
}

impl FinesService {
    pub fn new(repository: Repository) -> Self {
        Self { repository }
    }

    pub async fn get(&self, id: i32) -> AppResult<Fine> {
        self.repository.fines.get_by_id(id).await
    }

    /// List fines with filters
    pub async fn list(&self, query: &FineQuery) -> AppResult<(Vec<Fine>, i64)> {
        self.repository.fines.list(query).await
    }

    /// All fines of one user with totals
    pub async fn list_by_user(&self, user_id: i32) -> AppResult<(Vec<Fine>, FineSummary)> {
        self.repository.users.get_by_id(user_id).await?;
        self.repository.fines.list_by_user(user_id).await
    }

    /// Manual fine created by staff, optionally linked to a borrow record
    pub async fn create_manual(&self, staff_id: i32, request: &CreateFine) -> AppResult<Fine> {
        self.repository.users.get_by_id(request.user_id).await?;

        if let Some(borrow_id) = request.borrow_id {
            self.repository.borrows.get_by_id(borrow_id).await?;
            if self.repository.borrows.get_fine(borrow_id).await?.is_some() {
                return Err(AppError::Conflict(
                    "Borrow record already has a fine".to_string(),
                ));
            }
        }

        let mut conn = self.repository.pool.acquire().await?;
        let fine = self
            .repository
            .fines
            .create(
                &mut conn,
                &NewFine {
                    borrow_id: request.borrow_id,
                    user_id: request.user_id,
                    reason: request.reason,
                    amount: request.amount,
                    processed_by: staff_id,
                    note: request.note.as_deref(),
                },
            )
            .await?;

        if let Some(borrow_id) = request.borrow_id {
            let mut conn = self.repository.pool.acquire().await?;
            self.repository
                .borrows
                .set_fine(&mut conn, borrow_id, fine.id)
                .await?;
        }

        Ok(fine)
    }

    /// Mark a fine as paid; fails when already paid
    pub async fn mark_paid(
        &self,
        id: i32,
        staff_id: i32,
        note: Option<&str>,
    ) -> AppResult<Fine> {
        let fine = self.repository.fines.get_by_id(id).await?;
        if fine.paid {
            return Err(AppError::ConflictFinancial("Fine already paid".to_string()));
        }
        self.repository.fines.mark_paid(id, staff_id, note).await
    }

    /// Adjust amount/reason/note while unpaid
    pub async fn update(&self, id: i32, update: &UpdateFine) -> AppResult<Fine> {
        let fine = self.repository.fines.get_by_id(id).await?;
        if fine.paid {
            return Err(AppError::ConflictFinancial(
                "Cannot update paid fine".to_string(),
            ));
        }
        self.repository
            .fines
            .update(id, update.amount, update.reason, update.note.as_deref())
            .await
    }

    /// Delete a fine while unpaid
    pub async fn delete(&self, id: i32) -> AppResult<()> {
        let fine = self.repository.fines.get_by_id(id).await?;
        if fine.paid {
            return Err(AppError::ConflictFinancial(
                "Cannot delete paid fine".to_string(),
            ));
        }
        self.repository.fines.delete(id).await
    }
}
