//! Phone bill model
//!
//! A bill is the priced form of one completed call. Bills are derived data,
//! keyed by `(destination, start_timestamp)` and computed at most once.

use super::phone::PhoneNumber;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Phone bill entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhoneBill {
    /// Unique identifier (0 before persistence)
    pub id: i64,

    /// Called number
    pub destination: PhoneNumber,

    /// Instant the call started
    pub start_timestamp: DateTime<Utc>,

    /// Call duration in seconds
    pub duration: i64,

    /// Total charge including the base charge
    pub charge: Decimal,
}

impl PhoneBill {
    /// Duration rendered as `{h}h{m}m{s}s`
    pub fn formatted_duration(&self) -> String {
        let secs = self.duration.max(0);
        format!("{}h{}m{}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
