//! Fine model and related types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Decode, Encode, FromRow, Postgres};
use validator::Validate;

/// Fine reason slug (string identifier). When several conditions apply to
/// one return, a single reason is stored with priority lost > damaged >
/// overdue; the note carries the full breakdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FineReason {
    Overdue,
    Lost,
    Damaged,
}

impl FineReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FineReason::Overdue => "overdue",
            FineReason::Lost => "lost",
            FineReason::Damaged => "damaged",
        }
    }
}

impl std::fmt::Display for FineReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for FineReason {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "overdue" => Ok(FineReason::Overdue),
            "lost" => Ok(FineReason::Lost),
            "damaged" => Ok(FineReason::Damaged),
            _ => Err(format!("Invalid fine reason slug: {}", s)),
        }
    }
}

// SQLx conversion for FineReason (stored as TEXT)
impl sqlx::Type<Postgres> for FineReason {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        <String as sqlx::Type<Postgres>>::type_info()
    }
}

impl<'r> Decode<'r, Postgres> for FineReason {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s: String = Decode::<Postgres>::decode(value)?;
        s.parse().map_err(|e: String| e.into())
    }
}

impl Encode<'_, Postgres> for FineReason {
    fn encode_by_ref(&self, buf: &mut sqlx::postgres::PgArgumentBuffer) -> sqlx::encode::IsNull {
        <String as Encode<Postgres>>::encode(self.as_str().to_string(), buf)
    }
}

/// Fine model from database. At most one fine per borrow record; mutable
/// only while unpaid.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Fine {
    pub id: i32,
    pub borrow_id: Option<i32>,
    pub user_id: i32,
    pub reason: FineReason,
    /// Whole currency units
    pub amount: i64,
    pub paid: bool,
    pub paid_at: Option<DateTime<Utc>>,
    pub processed_by: Option<i32>,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Manual fine creation by staff
#[derive(Debug, Deserialize, Validate)]
pub struct CreateFine {
    pub user_id: i32,
    pub borrow_id: Option<i32>,
    pub reason: FineReason,
    #[validate(range(min = 1, message = "Amount must be positive"))]
    pub amount: i64,
    pub note: Option<String>,
}

/// Update fine request (rejected once paid)
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateFine {
    #[validate(range(min = 1, message = "Amount must be positive"))]
    pub amount: Option<i64>,
    pub reason: Option<FineReason>,
    pub note: Option<String>,
}

/// Mark-paid request
#[derive(Debug, Default, Deserialize)]
pub struct PayFineRequest {
    pub note: Option<String>,
}

/// Fine list query parameters
#[derive(Debug, Default, Deserialize)]
pub struct FineQuery {
    pub paid: Option<bool>,
    pub user_id: Option<i32>,
    pub reason: Option<FineReason>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

/// Per-user fine totals
#[derive(Debug, Clone, Serialize)]
pub struct FineSummary {
    pub total_fines: i64,
    pub total_amount: i64,
    pub paid_amount: i64,
    pub unpaid_amount: i64,
}
