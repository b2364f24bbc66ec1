//! Cache key builders for Telbill
//!
//! # Key Patterns
//!
//! - `bill:{destination}:{start_unix_micros}` - Priced bill of one call
//!
//! # Example
//!
//! ```
//! use chrono::{TimeZone, Utc};
//! use telbill_cache::keys;
//! use telbill_core::models::PhoneNumber;
//!
//! let destination = PhoneNumber::parse("41000000000").unwrap();
//! let start = Utc.with_ymd_and_hms(2018, 2, 28, 21, 57, 13).unwrap();
//! assert_eq!(keys::bill_key(&destination, start), "bill:41000000000:1519855033000000");
//! ```

use chrono::{DateTime, Utc};
use telbill_core::models::PhoneNumber;

/// Prefix for cached phone bills
///
/// Format: `bill:{destination}:{start_unix_micros}`
pub const BILL_KEY_PREFIX: &str = "bill";

/// Build the cache key of a bill from its store key
pub fn bill_key(destination: &PhoneNumber, start_timestamp: DateTime<Utc>) -> String {
    format!(
        "{}:{}:{}",
        BILL_KEY_PREFIX,
        destination,
        start_timestamp.timestamp_micros()
    )
}

/// Pattern matching every key under a prefix
pub fn pattern(prefix: &str) -> String {
    format!("{}:*", prefix)
}
