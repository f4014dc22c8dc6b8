//! Physical copy model and related types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Decode, Encode, FromRow, Postgres};

/// Copy status slug (string identifier)
///
/// Lifecycle: `available → pending → borrowed → {available|damaged|lost}`,
/// with `pending → available` on decline/cancel. Only the borrow lifecycle
/// engine transitions copies along this machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CopyStatus {
    Available,
    Pending,
    Borrowed,
    Lost,
    Damaged,
}

impl CopyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CopyStatus::Available => "available",
            CopyStatus::Pending => "pending",
            CopyStatus::Borrowed => "borrowed",
            CopyStatus::Lost => "lost",
            CopyStatus::Damaged => "damaged",
        }
    }
}

impl std::fmt::Display for CopyStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for CopyStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "available" => Ok(CopyStatus::Available),
            "pending" => Ok(CopyStatus::Pending),
            "borrowed" => Ok(CopyStatus::Borrowed),
            "lost" => Ok(CopyStatus::Lost),
            "damaged" => Ok(CopyStatus::Damaged),
            _ => Err(format!("Invalid copy status slug: {}", s)),
        }
    }
}

// SQLx conversion for CopyStatus (stored as TEXT)
impl sqlx::Type<Postgres> for CopyStatus {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        <String as sqlx::Type<Postgres>>::type_info()
    }
}

impl<'r> Decode<'r, Postgres> for CopyStatus {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s: String = Decode::<Postgres>::decode(value)?;
        s.parse().map_err(|e: String| e.into())
    }
}

impl Encode<'_, Postgres> for CopyStatus {
    fn encode_by_ref(&self, buf: &mut sqlx::postgres::PgArgumentBuffer) -> sqlx::encode::IsNull {
        <String as Encode<Postgres>>::encode(self.as_str().to_string(), buf)
    }
}

/// Condition reported for a copy at return time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CopyCondition {
    Good,
    Damaged,
    Lost,
}

impl CopyCondition {
    /// Status a copy lands in when released with this condition
    pub fn released_status(&self) -> CopyStatus {
        match self {
            CopyCondition::Good => CopyStatus::Available,
            CopyCondition::Damaged => CopyStatus::Damaged,
            CopyCondition::Lost => CopyStatus::Lost,
        }
    }
}

/// Full copy model from database
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct BookCopy {
    pub id: i32,
    pub book_id: i32,
    /// Derived from the book's ISBN and id at creation, globally unique
    pub barcode: String,
    pub status: CopyStatus,
    pub current_borrower: Option<i32>,
    pub due_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Copy snapshot embedded in a borrow record.
///
/// status stays empty until the return records the copy's final condition.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CopySnapshot {
    pub copy_id: i32,
    pub barcode: String,
    pub status: Option<CopyStatus>,
}
