//! Domain models for Telbill
//!
//! This module contains all the core domain models used throughout the application.

pub mod bill;
pub mod phone;
pub mod record;
pub mod tariff;

pub use bill::PhoneBill;
pub use phone::PhoneNumber;
pub use record::{CallPair, CallRecord, RecordType};
pub use tariff::{RateWindow, TariffSchedule};
