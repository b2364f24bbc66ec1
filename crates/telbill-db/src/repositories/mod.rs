//! Repository implementations
//!
//! This module contains concrete implementations of the repository traits
//! defined in telbill-core, using sqlx for PostgreSQL access.

pub mod bill_repo;
pub mod record_repo;
pub mod tariff_repo;

pub use bill_repo::PgPhoneBillRepository;
pub use record_repo::PgCallRecordRepository;
pub use tariff_repo::PgTariffRepository;

/// True when a statement failed on a unique constraint
pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .map(|db| db.is_unique_violation())
        .unwrap_or(false)
}
