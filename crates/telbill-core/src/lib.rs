//! Telbill Core Library
//!
//! This crate provides the foundational types, traits, and error handling
//! for the Telbill system. It includes:
//!
//! - Domain models (CallRecord, TariffSchedule, PhoneBill, PhoneNumber)
//! - Repository traits injected into validators and services
//! - The call-record consistency validator
//! - Unified error handling with HTTP response mapping
//! - Application configuration

pub mod config;
pub mod error;
pub mod models;
pub mod traits;
pub mod validation;

pub use config::AppConfig;
pub use error::AppError;

/// Result type alias using AppError
pub type AppResult<T> = Result<T, AppError>;
