//! Telbill Database Layer
//!
//! This crate provides storage for call records, tariff schedules and
//! phone bills. It includes:
//!
//! - Connection pool management with sqlx
//! - PostgreSQL repository implementations
//! - An atomic validate-then-insert path for call records
//! - An in-memory store implementing the same repository traits

pub mod memory;
pub mod pool;
pub mod repositories;

pub use memory::InMemoryStore;
pub use pool::{create_pool, run_migrations};
pub use repositories::*;

// Re-export commonly used types
pub use sqlx::{PgPool, Postgres, Transaction};
pub use telbill_core::{AppError, AppResult};
