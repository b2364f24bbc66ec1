//! Tariff schedule repository implementation
//!
//! Schedules are versioned by `effective_from`; the lookup for a date picks
//! the latest schedule that is already in effect.

use super::is_unique_violation;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres};
use telbill_core::{
    models::TariffSchedule,
    traits::{Repository, TariffRepository},
    AppError, AppResult,
};
use tracing::{debug, error, info, instrument};

/// PostgreSQL implementation of TariffRepository
pub struct PgTariffRepository {
    pool: PgPool,
}

impl PgTariffRepository {
    /// Create a new tariff repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Repository<TariffSchedule, i32> for PgTariffRepository {
    #[instrument(skip(self))]
    async fn find_by_id(&self, id: i32) -> AppResult<Option<TariffSchedule>> {
        debug!("Finding tariff schedule by id: {}", id);

        let result = sqlx::query_as::<Postgres, TariffScheduleRow>(
            r#"
            SELECT id, base_charge, standard_minute_rate, reduced_minute_rate,
                   effective_from, created_at
            FROM tariff_schedules
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error finding tariff schedule {}: {}", id, e);
            AppError::Database(format!("Failed to find tariff schedule: {}", e))
        })?;

        Ok(result.map(Into::into))
    }

    #[instrument(skip(self))]
    async fn find_all(&self, limit: i64, offset: i64) -> AppResult<Vec<TariffSchedule>> {
        let rows = sqlx::query_as::<Postgres, TariffScheduleRow>(
            r#"
            SELECT id, base_charge, standard_minute_rate, reduced_minute_rate,
                   effective_from, created_at
            FROM tariff_schedules
            ORDER BY effective_from DESC
            LIMIT $1 OFFSET $2
            "#,
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error listing tariff schedules: {}", e);
            AppError::Database(format!("Failed to fetch tariff schedules: {}", e))
        })?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    #[instrument(skip(self))]
    async fn count(&self) -> AppResult<i64> {
        let result: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM tariff_schedules")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error counting tariff schedules: {}", e);
                AppError::Database(format!("Failed to count tariff schedules: {}", e))
            })?;

        Ok(result.0)
    }

    #[instrument(skip(self, entity), fields(effective_from = %entity.effective_from))]
    async fn create(&self, entity: &TariffSchedule) -> AppResult<TariffSchedule> {
        entity.validate()?;

        let row = sqlx::query_as::<Postgres, TariffScheduleRow>(
            r#"
            INSERT INTO tariff_schedules (
                base_charge, standard_minute_rate, reduced_minute_rate, effective_from
            )
            VALUES ($1, $2, $3, $4)
            RETURNING id, base_charge, standard_minute_rate, reduced_minute_rate,
                      effective_from, created_at
            "#,
        )
        .bind(entity.base_charge)
        .bind(entity.standard_minute_rate)
        .bind(entity.reduced_minute_rate)
        .bind(entity.effective_from)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error creating tariff schedule: {}", e);
            if is_unique_violation(&e) {
                AppError::AlreadyExists(format!(
                    "A tariff schedule effective from {} already exists",
                    entity.effective_from
                ))
            } else {
                AppError::Database(format!("Failed to create tariff schedule: {}", e))
            }
        })?;

        info!(id = row.id, "Tariff schedule created");
        Ok(row.into())
    }
}

#[async_trait]
impl TariffRepository for PgTariffRepository {
    #[instrument(skip(self))]
    async fn find_effective(&self, date: NaiveDate) -> AppResult<Option<TariffSchedule>> {
        let result = sqlx::query_as::<Postgres, TariffScheduleRow>(
            r#"
            SELECT id, base_charge, standard_minute_rate, reduced_minute_rate,
                   effective_from, created_at
            FROM tariff_schedules
            WHERE effective_from <= $1
            ORDER BY effective_from DESC
            LIMIT 1
            "#,
        )
        .bind(date)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error finding tariff for {}: {}", date, e);
            AppError::Database(format!("Failed to find tariff schedule: {}", e))
        })?;

        Ok(result.map(Into::into))
    }
}

/// Helper struct for mapping database rows
#[derive(Debug, sqlx::FromRow)]
struct TariffScheduleRow {
    id: i32,
    base_charge: Decimal,
    standard_minute_rate: Decimal,
    reduced_minute_rate: Decimal,
    effective_from: NaiveDate,
    created_at: DateTime<Utc>,
}

impl From<TariffScheduleRow> for TariffSchedule {
    fn from(row: TariffScheduleRow) -> Self {
        Self {
            id: row.id,
            base_charge: row.base_charge,
            standard_minute_rate: row.standard_minute_rate,
            reduced_minute_rate: row.reduced_minute_rate,
            effective_from: row.effective_from,
            created_at: row.created_at,
        }
    }
}
