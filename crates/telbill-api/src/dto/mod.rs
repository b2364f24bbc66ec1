//! Data Transfer Objects (DTOs) for API requests and responses

pub mod billing;
pub mod common;
pub mod record;
pub mod tariff;

pub use billing::*;
pub use common::*;
pub use record::*;
pub use tariff::*;
