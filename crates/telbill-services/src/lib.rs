//! Pricing and billing services for Telbill
//!
//! # Services
//!
//! - [`period`] - standard/reduced window classification
//! - [`pricing`] - per-segment call pricing
//! - [`reference_period`] - billing month parsing and bounds
//! - [`BillingService`] - bill assembly with tariff lookup and caching
//!
//! Classification and pricing are pure and synchronous. The billing service
//! is generic over the repository traits of telbill-core and shares its
//! dependencies through `Arc`.

pub mod billing;
pub mod period;
pub mod pricing;
pub mod reference_period;

pub use billing::{BillingService, MonthlyStatement};
pub use period::{classify, RatePeriod};
pub use pricing::{price, segments, Segment};
pub use reference_period::ReferencePeriod;

/// Business logic constants
pub mod constants {
    /// Hour (local wall clock) at which the reduced window opens
    pub const REDUCED_WINDOW_START_HOUR: u32 = 22;

    /// Hour (local wall clock) at which the reduced window closes
    pub const REDUCED_WINDOW_END_HOUR: u32 = 6;

    /// Seconds in a day
    pub const SECONDS_PER_DAY: i64 = 86_400;
}
