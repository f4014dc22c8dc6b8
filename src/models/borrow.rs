//! Borrow record model and related types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Decode, Encode, FromRow, Postgres};
use validator::Validate;

use super::copy::{CopyCondition, CopySnapshot};
use super::fine::{Fine, FineReason};

/// Borrow record status slug (string identifier).
///
/// `declined`, `cancelled`, `returned` and `lost` are terminal. An overdue
/// record is observed (`borrowed` with a past due date), never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BorrowStatus {
    Pending,
    PendingPickup,
    Borrowed,
    Returned,
    Declined,
    Cancelled,
    Lost,
}

impl BorrowStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BorrowStatus::Pending => "pending",
            BorrowStatus::PendingPickup => "pendingPickup",
            BorrowStatus::Borrowed => "borrowed",
            BorrowStatus::Returned => "returned",
            BorrowStatus::Declined => "declined",
            BorrowStatus::Cancelled => "cancelled",
            BorrowStatus::Lost => "lost",
        }
    }

    /// Active requests block book deletion and further requests by the
    /// same user for the same book
    pub fn is_active(&self) -> bool {
        matches!(self, BorrowStatus::Pending | BorrowStatus::Borrowed)
    }
}

impl std::fmt::Display for BorrowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for BorrowStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(BorrowStatus::Pending),
            "pendingPickup" => Ok(BorrowStatus::PendingPickup),
            "borrowed" => Ok(BorrowStatus::Borrowed),
            "returned" => Ok(BorrowStatus::Returned),
            "declined" => Ok(BorrowStatus::Declined),
            "cancelled" => Ok(BorrowStatus::Cancelled),
            "lost" => Ok(BorrowStatus::Lost),
            _ => Err(format!("Invalid borrow status slug: {}", s)),
        }
    }
}

// SQLx conversion for BorrowStatus (stored as TEXT)
impl sqlx::Type<Postgres> for BorrowStatus {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        <String as sqlx::Type<Postgres>>::type_info()
    }
}

impl<'r> Decode<'r, Postgres> for BorrowStatus {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s: String = Decode::<Postgres>::decode(value)?;
        s.parse().map_err(|e: String| e.into())
    }
}

impl Encode<'_, Postgres> for BorrowStatus {
    fn encode_by_ref(&self, buf: &mut sqlx::postgres::PgArgumentBuffer) -> sqlx::encode::IsNull {
        <String as Encode<Postgres>>::encode(self.as_str().to_string(), buf)
    }
}

/// Borrow record from database. Never deleted; transitions end in a
/// terminal status and the row stays as audit trail.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct BorrowRecord {
    pub id: i32,
    pub user_id: i32,
    pub book_id: i32,
    pub fine_id: Option<i32>,
    pub status: BorrowStatus,
    pub quantity: i32,
    pub is_read_on_site: bool,
    /// Set when staff accept the request
    pub borrow_date: Option<DateTime<Utc>>,
    pub due_date: DateTime<Utc>,
    pub pickup_date: Option<DateTime<Utc>>,
    pub return_date: Option<DateTime<Utc>>,
    pub extended_at: Option<DateTime<Utc>>,
    pub processed_by: Option<i32>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Borrow record with its copy snapshot and fine, for detail responses
#[derive(Debug, Clone, Serialize)]
pub struct BorrowDetails {
    #[serde(flatten)]
    pub record: BorrowRecord,
    pub copies: Vec<CopySnapshot>,
    pub fine: Option<Fine>,
}

/// Borrow list entry with joined user/book display fields
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct BorrowListEntry {
    pub id: i32,
    pub user_id: i32,
    pub user_name: Option<String>,
    pub student_code: String,
    pub book_id: i32,
    pub book_title: Option<String>,
    pub isbn: Option<String>,
    pub status: BorrowStatus,
    pub quantity: i32,
    pub due_date: DateTime<Utc>,
    pub return_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    /// Derived on read: borrowed past the due date
    pub is_overdue: bool,
    // Joined fine summary, present on history listings
    pub fine_amount: Option<i64>,
    pub fine_reason: Option<FineReason>,
    pub fine_paid: Option<bool>,
}

/// Create borrow request
#[derive(Debug, Deserialize, Validate)]
pub struct CreateBorrowRequest {
    pub book_id: i32,
    #[validate(range(min = 1, max = 100, message = "Quantity must be at least 1"))]
    pub quantity: i32,
    pub due_date: DateTime<Utc>,
    #[serde(default)]
    pub is_read_on_site: bool,
    pub notes: Option<String>,
}

/// Per-copy condition supplied at return time, keyed by barcode
#[derive(Debug, Clone, Deserialize)]
pub struct CopyConditionEntry {
    pub barcode: String,
    pub condition: CopyCondition,
}

/// Return request. Either per-copy conditions or one uniform condition;
/// copies not mentioned default to good.
#[derive(Debug, Default, Deserialize)]
pub struct ReturnRequest {
    pub conditions: Option<Vec<CopyConditionEntry>>,
    pub condition: Option<CopyCondition>,
    pub notes: Option<String>,
}

/// Decline request
#[derive(Debug, Default, Deserialize)]
pub struct DeclineRequest {
    pub reason: Option<String>,
}

/// Extend request
#[derive(Debug, Default, Deserialize)]
pub struct ExtendRequest {
    pub days: Option<i64>,
}

/// Borrow list query parameters
#[derive(Debug, Default, Deserialize)]
pub struct BorrowQuery {
    /// Restrict the borrowed list to overdue records
    pub is_overdue: Option<bool>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}
