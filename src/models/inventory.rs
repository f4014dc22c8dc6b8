//! Per-book inventory counters

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Inventory model from database.
///
/// `available + borrowed + damaged + lost == total` holds after every
/// lifecycle transition; lost/damaged copies leave the available pool
/// without reducing total.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Inventory {
    pub book_id: i32,
    pub total: i32,
    pub available: i32,
    pub borrowed: i32,
    pub damaged: i32,
    pub lost: i32,
    pub updated_at: DateTime<Utc>,
}

/// Manual inventory correction request. Omitted fields keep their current
/// value; the result is validated against the sum invariant before commit.
#[derive(Debug, Deserialize)]
pub struct UpdateInventory {
    pub total: Option<i32>,
    pub available: Option<i32>,
    pub borrowed: Option<i32>,
    pub damaged: Option<i32>,
    pub lost: Option<i32>,
}
