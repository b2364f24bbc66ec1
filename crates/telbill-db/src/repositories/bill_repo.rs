//! Phone bill repository implementation
//!
//! Bills are keyed by `(destination, start_timestamp)`. Concurrent writers
//! race through `ON CONFLICT DO NOTHING`; the losers read back the winner.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres};
use telbill_core::{
    models::{PhoneBill, PhoneNumber},
    traits::PhoneBillRepository,
    AppError, AppResult,
};
use tracing::{debug, error, instrument};

/// PostgreSQL implementation of PhoneBillRepository
pub struct PgPhoneBillRepository {
    pool: PgPool,
}

impl PgPhoneBillRepository {
    /// Create a new phone bill repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PhoneBillRepository for PgPhoneBillRepository {
    #[instrument(skip(self), fields(destination = %destination))]
    async fn find_by_key(
        &self,
        destination: &PhoneNumber,
        start_timestamp: DateTime<Utc>,
    ) -> AppResult<Option<PhoneBill>> {
        let row = sqlx::query_as::<Postgres, PhoneBillRow>(
            r#"
            SELECT id, destination, start_timestamp, duration, charge
            FROM phone_bills
            WHERE destination = $1 AND start_timestamp = $2
            "#,
        )
        .bind(destination.as_str())
        .bind(start_timestamp)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error finding bill for {}: {}", destination, e);
            AppError::Database(format!("Failed to find phone bill: {}", e))
        })?;

        row.map(TryInto::try_into).transpose()
    }

    #[instrument(skip(self, bill), fields(destination = %bill.destination))]
    async fn get_or_create(&self, bill: &PhoneBill) -> AppResult<PhoneBill> {
        let inserted = sqlx::query_as::<Postgres, PhoneBillRow>(
            r#"
            INSERT INTO phone_bills (destination, start_timestamp, duration, charge)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (destination, start_timestamp) DO NOTHING
            RETURNING id, destination, start_timestamp, duration, charge
            "#,
        )
        .bind(bill.destination.as_str())
        .bind(bill.start_timestamp)
        .bind(bill.duration)
        .bind(bill.charge)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error creating bill: {}", e);
            AppError::Database(format!("Failed to create phone bill: {}", e))
        })?;

        if let Some(row) = inserted {
            return row.try_into();
        }

        debug!("Bill already stored by another writer");
        self.find_by_key(&bill.destination, bill.start_timestamp)
            .await?
            .ok_or_else(|| {
                AppError::Internal(format!(
                    "Bill for {} at {} vanished after conflict",
                    bill.destination, bill.start_timestamp
                ))
            })
    }
}

/// Helper struct for mapping database rows
#[derive(Debug, sqlx::FromRow)]
struct PhoneBillRow {
    id: i64,
    destination: String,
    start_timestamp: DateTime<Utc>,
    duration: i64,
    charge: Decimal,
}

impl TryFrom<PhoneBillRow> for PhoneBill {
    type Error = AppError;

    fn try_from(row: PhoneBillRow) -> Result<Self, Self::Error> {
        let destination = PhoneNumber::try_from(row.destination).map_err(|e| {
            AppError::Database(format!("Corrupt phone bill {}: {}", row.id, e))
        })?;

        Ok(Self {
            id: row.id,
            destination,
            start_timestamp: row.start_timestamp,
            duration: row.duration,
            charge: row.charge,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    #[test]
    fn test_row_conversion() {
        let bill: PhoneBill = PhoneBillRow {
            id: 1,
            destination: "41000000000".to_string(),
            start_timestamp: Utc.with_ymd_and_hms(2018, 2, 28, 21, 57, 13).unwrap(),
            duration: 2142,
            charge: dec!(3.96),
        }
        .try_into()
        .unwrap();

        assert_eq!(bill.formatted_duration(), "0h35m42s");
    }

    #[tokio::test]
    #[ignore] // Requires database
    async fn test_get_or_create_single_winner() {
        let database_url = std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "postgresql://localhost/telbill".to_string());
        let pool = PgPool::connect(&database_url).await.unwrap();
        crate::run_migrations(&pool).await.unwrap();
        let repo = PgPhoneBillRepository::new(pool);

        let bill = PhoneBill {
            id: 0,
            destination: PhoneNumber::parse("41000000000").unwrap(),
            start_timestamp: Utc::now(),
            duration: 60,
            charge: dec!(0.45),
        };
        let first = repo.get_or_create(&bill).await.unwrap();
        let second = repo
            .get_or_create(&PhoneBill {
                charge: dec!(9.99),
                ..bill.clone()
            })
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.charge, dec!(0.45));
    }
}
