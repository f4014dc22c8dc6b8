//! Borrow lifecycle engine.
//!
//! Owns the borrow-record state machine and every mutation of the copy
//! pool and the inventory counters. Each transition runs as one database
//! transaction: the availability check, copy allocation, counter update
//! and record write either all commit or none do, so the three entities
//! can never drift apart — also under concurrent requests for the same
//! book, which serialize on the locked inventory row.

use chrono::{DateTime, Duration, Utc};

use crate::{
    config::PolicyConfig,
    error::{AppError, AppResult},
    models::{
        borrow::{
            BorrowDetails, BorrowListEntry, BorrowRecord, BorrowStatus, CreateBorrowRequest,
            ReturnRequest,
        },
        copy::{CopyCondition, CopyStatus},
        fine::FineReason,
        user::Role,
    },
    repository::{fines::NewFine, Repository},
};

/// Outcome of the fine assessment on a return
#[derive(Debug, PartialEq)]
pub struct FineAssessment {
    pub reason: FineReason,
    pub amount: i64,
    pub note: String,
}

/// Compute the fine for a returned batch, if any.
///
/// The overdue component applies once to the whole batch while the
/// damage/loss components are per copy; the stored reason follows the
/// priority lost > damaged > overdue and the note keeps the breakdown.
pub fn assess_fine(
    policy: &PolicyConfig,
    book_price: i64,
    due_date: DateTime<Utc>,
    return_date: DateTime<Utc>,
    damaged_count: i32,
    lost_count: i32,
) -> Option<FineAssessment> {
    let mut amount = 0f64;
    let mut reasons = Vec::new();

    let late_seconds = (return_date - due_date).num_seconds();
    if late_seconds > 0 {
        let days_late = (late_seconds + 86_399) / 86_400;
        amount += (days_late * policy.overdue_fine_per_day) as f64;
        reasons.push(format!("Late return: {} days", days_late));
    }

    if damaged_count > 0 {
        amount += book_price as f64 * policy.damaged_price_ratio * damaged_count as f64;
        reasons.push(format!("{} damaged book(s)", damaged_count));
    }

    if lost_count > 0 {
        amount += book_price as f64 * policy.lost_price_ratio * lost_count as f64;
        reasons.push(format!("{} lost book(s)", lost_count));
    }

    let amount = amount.round() as i64;
    if amount <= 0 {
        return None;
    }

    let reason = if lost_count > 0 {
        FineReason::Lost
    } else if damaged_count > 0 {
        FineReason::Damaged
    } else {
        FineReason::Overdue
    };

    Some(FineAssessment {
        reason,
        amount,
        note: reasons.join(", "),
    })
}

#[derive(Clone)]
pub struct BorrowsService {
    repository: Repository,
    policy: PolicyConfig,
}

impl BorrowsService {
    pub fn new(repository: Repository, policy: PolicyConfig) -> Self {
        Self { repository, policy }
    }

    /// Borrow record with its copy snapshot and fine
    pub async fn get_details(&self, borrow_id: i32) -> AppResult<BorrowDetails> {
        let record = self.repository.borrows.get_by_id(borrow_id).await?;
        let copies = self.repository.borrows.get_snapshot(borrow_id).await?;
        let fine = self.repository.borrows.get_fine(borrow_id).await?;
        Ok(BorrowDetails {
            record,
            copies,
            fine,
        })
    }

    /// Create a borrow request: reserve copies, move inventory counters
    /// and write the pending record in one transaction
    pub async fn create_request(
        &self,
        user_id: i32,
        request: &CreateBorrowRequest,
    ) -> AppResult<BorrowDetails> {
        if request.due_date.date_naive() < Utc::now().date_naive() {
            return Err(AppError::Validation(
                "Due date must be today or in the future".to_string(),
            ));
        }

        // Verify user and book exist
        self.repository.users.get_by_id(user_id).await?;
        self.repository.books.get_by_id(request.book_id).await?;

        let mut tx = self.repository.pool.begin().await?;

        // The locked inventory row serializes concurrent requests for the
        // same book
        let inventory = self
            .repository
            .inventory
            .get_for_update(&mut tx, request.book_id)
            .await?;

        if inventory.available < request.quantity {
            return Err(AppError::InsufficientInventory(
                "Not enough copies available for borrowing".to_string(),
            ));
        }

        if self
            .repository
            .borrows
            .has_active_request(&mut tx, user_id, request.book_id)
            .await?
        {
            return Err(AppError::DuplicateActiveRequest(
                "User already has an active request for this book".to_string(),
            ));
        }

        let copies = self
            .repository
            .copies
            .find_available(&mut tx, request.book_id, request.quantity as i64)
            .await?;
        if (copies.len() as i32) < request.quantity {
            return Err(AppError::InsufficientInventory(
                "Not enough available book copies".to_string(),
            ));
        }

        let copy_ids: Vec<i32> = copies.iter().map(|c| c.id).collect();
        self.repository
            .copies
            .reserve(&mut tx, &copy_ids, user_id, request.due_date)
            .await?;
        self.repository
            .inventory
            .reserve(&mut tx, request.book_id, request.quantity)
            .await?;

        let record = self
            .repository
            .borrows
            .create(
                &mut tx,
                user_id,
                request.book_id,
                request.quantity,
                request.due_date,
                request.is_read_on_site,
                request.notes.as_deref(),
            )
            .await?;

        let snapshot: Vec<(i32, String)> =
            copies.iter().map(|c| (c.id, c.barcode.clone())).collect();
        self.repository
            .borrows
            .insert_snapshot(&mut tx, record.id, &snapshot)
            .await?;

        tx.commit().await?;

        tracing::info!(
            borrow_id = record.id,
            user_id,
            book_id = request.book_id,
            quantity = request.quantity,
            "borrow request created"
        );

        self.get_details(record.id).await
    }

    /// Approve a pending request; the reservation already happened at
    /// request time
    pub async fn accept(&self, borrow_id: i32, staff_id: i32) -> AppResult<BorrowRecord> {
        let mut tx = self.repository.pool.begin().await?;

        let record = self.repository.borrows.get_for_update(&mut tx, borrow_id).await?;
        if record.status != BorrowStatus::Pending {
            return Err(AppError::InvalidState(
                "Only pending requests can be accepted".to_string(),
            ));
        }

        let record = self
            .repository
            .borrows
            .mark_accepted(&mut tx, borrow_id, staff_id)
            .await?;
        tx.commit().await?;
        Ok(record)
    }

    /// Reject a pending request and release its reservation
    pub async fn decline(
        &self,
        borrow_id: i32,
        staff_id: i32,
        reason: Option<&str>,
    ) -> AppResult<BorrowRecord> {
        let mut tx = self.repository.pool.begin().await?;

        let record = self.repository.borrows.get_for_update(&mut tx, borrow_id).await?;
        if record.status != BorrowStatus::Pending {
            return Err(AppError::InvalidState(
                "Only pending requests can be declined".to_string(),
            ));
        }

        self.release_reservation(&mut tx, &record).await?;
        let record = self
            .repository
            .borrows
            .mark_declined(&mut tx, borrow_id, staff_id, reason)
            .await?;

        tx.commit().await?;
        Ok(record)
    }

    /// Confirm the patron picked the books up
    pub async fn confirm_pickup(&self, borrow_id: i32) -> AppResult<BorrowRecord> {
        let mut tx = self.repository.pool.begin().await?;

        let record = self.repository.borrows.get_for_update(&mut tx, borrow_id).await?;
        if record.status != BorrowStatus::PendingPickup {
            return Err(AppError::InvalidState(
                "Borrow is not in pending pickup state".to_string(),
            ));
        }

        let snapshot = self.repository.borrows.get_snapshot_on(&mut tx, borrow_id).await?;
        let copy_ids: Vec<i32> = snapshot.iter().map(|c| c.copy_id).collect();
        self.repository.copies.mark_borrowed(&mut tx, &copy_ids).await?;

        let record = self.repository.borrows.mark_picked_up(&mut tx, borrow_id).await?;
        tx.commit().await?;
        Ok(record)
    }

    /// Cancel a request before pickup. Allowed for the record owner and
    /// for staff.
    pub async fn cancel(
        &self,
        borrow_id: i32,
        actor_id: i32,
        actor_role: Role,
    ) -> AppResult<BorrowRecord> {
        let mut tx = self.repository.pool.begin().await?;

        let record = self.repository.borrows.get_for_update(&mut tx, borrow_id).await?;
        if record.status != BorrowStatus::Pending && record.status != BorrowStatus::PendingPickup {
            return Err(AppError::InvalidState(
                "Only pending or pendingPickup requests can be cancelled".to_string(),
            ));
        }
        if record.user_id != actor_id && !actor_role.is_staff() {
            return Err(AppError::Forbidden(
                "Not authorized to cancel this borrow request".to_string(),
            ));
        }

        self.release_reservation(&mut tx, &record).await?;
        let record = self.repository.borrows.mark_cancelled(&mut tx, borrow_id).await?;

        tx.commit().await?;
        Ok(record)
    }

    /// Process a return: release each copy per its reported condition,
    /// settle the inventory counters and assess the fine
    pub async fn return_books(
        &self,
        borrow_id: i32,
        staff_id: i32,
        request: &ReturnRequest,
    ) -> AppResult<BorrowDetails> {
        // The price at return time is the basis for damage/loss fines.
        // A borrowed record guards its book against deletion, so the read
        // ahead of the transaction cannot miss.
        let record = self.repository.borrows.get_by_id(borrow_id).await?;
        let book = self.repository.books.get_by_id(record.book_id).await?;

        let mut tx = self.repository.pool.begin().await?;

        let record = self.repository.borrows.get_for_update(&mut tx, borrow_id).await?;
        if record.status != BorrowStatus::Borrowed {
            return Err(AppError::InvalidState(
                "Only borrowed books can be returned".to_string(),
            ));
        }

        self.repository
            .inventory
            .get_for_update(&mut tx, record.book_id)
            .await?;

        let return_date = Utc::now();
        let snapshot = self.repository.borrows.get_snapshot_on(&mut tx, borrow_id).await?;

        // Per-copy conditions by barcode; unlisted copies and the
        // uniform-condition mode default to good
        let uniform = request.condition.unwrap_or(CopyCondition::Good);
        let condition_of = |barcode: &str| -> CopyCondition {
            match &request.conditions {
                Some(entries) => entries
                    .iter()
                    .find(|e| e.barcode == barcode)
                    .map(|e| e.condition)
                    .unwrap_or(CopyCondition::Good),
                None => uniform,
            }
        };

        let mut good_ids = Vec::new();
        let mut damaged_ids = Vec::new();
        let mut lost_ids = Vec::new();
        for copy in &snapshot {
            match condition_of(&copy.barcode) {
                CopyCondition::Good => good_ids.push(copy.copy_id),
                CopyCondition::Damaged => damaged_ids.push(copy.copy_id),
                CopyCondition::Lost => lost_ids.push(copy.copy_id),
            }
        }

        for (ids, status) in [
            (&good_ids, CopyStatus::Available),
            (&damaged_ids, CopyStatus::Damaged),
            (&lost_ids, CopyStatus::Lost),
        ] {
            if !ids.is_empty() {
                self.repository.copies.release(&mut tx, ids, status).await?;
                for copy_id in ids.iter() {
                    self.repository
                        .borrows
                        .set_snapshot_status(&mut tx, borrow_id, *copy_id, status)
                        .await?;
                }
            }
        }

        let returned_count = snapshot.len() as i32;
        self.repository
            .inventory
            .release(
                &mut tx,
                record.book_id,
                returned_count,
                good_ids.len() as i32,
                damaged_ids.len() as i32,
                lost_ids.len() as i32,
            )
            .await?;

        let final_status = if lost_ids.is_empty() {
            BorrowStatus::Returned
        } else {
            BorrowStatus::Lost
        };
        self.repository
            .borrows
            .mark_returned(
                &mut tx,
                borrow_id,
                final_status,
                return_date,
                staff_id,
                request.notes.as_deref(),
            )
            .await?;

        if let Some(assessment) = assess_fine(
            &self.policy,
            book.price,
            record.due_date,
            return_date,
            damaged_ids.len() as i32,
            lost_ids.len() as i32,
        ) {
            let fine = self
                .repository
                .fines
                .create(
                    &mut tx,
                    &NewFine {
                        borrow_id: Some(borrow_id),
                        user_id: record.user_id,
                        reason: assessment.reason,
                        amount: assessment.amount,
                        processed_by: staff_id,
                        note: Some(&assessment.note),
                    },
                )
                .await?;
            self.repository.borrows.set_fine(&mut tx, borrow_id, fine.id).await?;

            tracing::info!(
                borrow_id,
                amount = assessment.amount,
                reason = %assessment.reason,
                "fine assessed on return"
            );
        }

        tx.commit().await?;

        self.get_details(borrow_id).await
    }

    /// Extend a borrowed record. Blocked while the borrower has any
    /// unpaid fine.
    pub async fn extend(
        &self,
        borrow_id: i32,
        staff_id: i32,
        days: Option<i64>,
    ) -> AppResult<BorrowRecord> {
        let days = days.unwrap_or(self.policy.default_extension_days);
        if days < 1 {
            return Err(AppError::Validation(
                "Extension must be at least one day".to_string(),
            ));
        }

        let mut tx = self.repository.pool.begin().await?;

        let record = self.repository.borrows.get_for_update(&mut tx, borrow_id).await?;
        if record.status != BorrowStatus::Borrowed {
            return Err(AppError::InvalidState(
                "Only currently borrowed books can be extended".to_string(),
            ));
        }

        let outstanding = self.repository.fines.count_unpaid(record.user_id).await?;
        if outstanding > 0 {
            return Err(AppError::ConflictFinancial(
                "Cannot extend borrow period: user has outstanding fines".to_string(),
            ));
        }

        let new_due_date = record.due_date + Duration::days(days);
        let record = self
            .repository
            .borrows
            .extend(&mut tx, borrow_id, new_due_date, staff_id)
            .await?;
        self.repository
            .copies
            .extend_due_date(&mut tx, record.book_id, record.user_id, new_due_date)
            .await?;

        tx.commit().await?;
        Ok(record)
    }

    /// Requests awaiting staff action
    pub async fn list_open_requests(&self) -> AppResult<Vec<BorrowListEntry>> {
        self.repository.borrows.list_open_requests().await
    }

    /// Currently borrowed records, optionally overdue only
    pub async fn list_borrowed(
        &self,
        overdue_only: bool,
        page: i64,
        per_page: i64,
    ) -> AppResult<(Vec<BorrowListEntry>, i64)> {
        self.repository
            .borrows
            .list_borrowed(overdue_only, page, per_page)
            .await
    }

    /// Terminal returned/lost records, optionally for one user
    pub async fn list_history(
        &self,
        user_id: Option<i32>,
        page: i64,
        per_page: i64,
    ) -> AppResult<(Vec<BorrowListEntry>, i64)> {
        if let Some(uid) = user_id {
            self.repository.users.get_by_id(uid).await?;
        }
        self.repository.borrows.list_history(user_id, page, per_page).await
    }

    /// All requests of one user
    pub async fn list_user_requests(&self, user_id: i32) -> AppResult<Vec<BorrowListEntry>> {
        self.repository.users.get_by_id(user_id).await?;
        self.repository.borrows.list_user_requests(user_id).await
    }

    /// Shared release path for decline and cancel: copies go back to
    /// available and the reservation leaves the borrowed counter
    async fn release_reservation(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        record: &BorrowRecord,
    ) -> AppResult<()> {
        self.repository
            .inventory
            .get_for_update(tx, record.book_id)
            .await?;

        let snapshot = self.repository.borrows.get_snapshot_on(tx, record.id).await?;
        let copy_ids: Vec<i32> = snapshot.iter().map(|c| c.copy_id).collect();
        self.repository
            .copies
            .release(tx, &copy_ids, CopyStatus::Available)
            .await?;
        self.repository
            .inventory
            .cancel_reservation(tx, record.book_id, record.quantity)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn policy() -> PolicyConfig {
        PolicyConfig {
            overdue_fine_per_day: 5000,
            damaged_price_ratio: 0.3,
            lost_price_ratio: 1.0,
            default_extension_days: 7,
        }
    }

    fn day(d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, d, 12, 0, 0).unwrap()
    }

    #[test]
    fn no_fine_for_on_time_good_return() {
        assert_eq!(assess_fine(&policy(), 100_000, day(10), day(9), 0, 0), None);
        assert_eq!(assess_fine(&policy(), 100_000, day(10), day(10), 0, 0), None);
    }

    #[test]
    fn overdue_fine_is_per_day_flat_rate() {
        let fine = assess_fine(&policy(), 100_000, day(10), day(13), 0, 0).unwrap();
        assert_eq!(fine.reason, FineReason::Overdue);
        assert_eq!(fine.amount, 15_000);
        assert_eq!(fine.note, "Late return: 3 days");
    }

    #[test]
    fn partial_day_counts_as_full_day() {
        let due = day(10);
        let returned = due + Duration::seconds(1);
        let fine = assess_fine(&policy(), 100_000, due, returned, 0, 0).unwrap();
        assert_eq!(fine.amount, 5000);
    }

    #[test]
    fn overdue_plus_damaged_sums_components() {
        // 3 days late and one of two copies damaged:
        // 3 * 5000 + 100000 * 0.3 = 45000
        let fine = assess_fine(&policy(), 100_000, day(10), day(13), 1, 0).unwrap();
        assert_eq!(fine.amount, 45_000);
        assert_eq!(fine.reason, FineReason::Damaged);
        assert_eq!(fine.note, "Late return: 3 days, 1 damaged book(s)");
    }

    #[test]
    fn lost_takes_reason_priority() {
        let fine = assess_fine(&policy(), 100_000, day(10), day(13), 1, 1).unwrap();
        assert_eq!(fine.reason, FineReason::Lost);
        // 15000 overdue + 30000 damaged + 100000 lost
        assert_eq!(fine.amount, 145_000);
    }

    #[test]
    fn damage_fine_scales_per_copy() {
        let fine = assess_fine(&policy(), 100_000, day(10), day(9), 2, 0).unwrap();
        assert_eq!(fine.reason, FineReason::Damaged);
        assert_eq!(fine.amount, 60_000);
        assert_eq!(fine.note, "2 damaged book(s)");
    }

    #[test]
    fn zero_price_damage_yields_no_fine() {
        assert_eq!(assess_fine(&policy(), 0, day(10), day(9), 1, 0), None);
    }

    #[test]
    fn fractional_totals_round_once() {
        // 333 * 0.3 = 99.9 → rounds to 100
        let fine = assess_fine(&policy(), 333, day(10), day(9), 1, 0).unwrap();
        assert_eq!(fine.amount, 100);
    }
}
