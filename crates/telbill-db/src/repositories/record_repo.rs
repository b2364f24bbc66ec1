//! Call record repository implementation
//!
//! Records are append-only. The single write path takes a transaction-scoped
//! advisory lock, validates the candidate against a reader bound to the same
//! transaction, inserts and commits. Unique constraints on the table back the
//! uniqueness rules if a write ever bypasses the lock.

use super::is_unique_violation;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgExecutor, PgPool, Postgres, Transaction};
use telbill_core::{
    models::{CallPair, CallRecord, PhoneNumber, RecordType},
    traits::{CallRecordReader, CallRecordRepository, Repository},
    validation::validate_record,
    AppError, AppResult,
};
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, warn};

/// Advisory lock key serializing call record writes
const RECORD_WRITE_LOCK: i64 = 0x7465_6c62_696c_6c00;

const RECORD_COLUMNS: &str = "id, record_type, timestamp, call_id, source, destination";

/// PostgreSQL implementation of CallRecordRepository
pub struct PgCallRecordRepository {
    pool: PgPool,
}

impl PgCallRecordRepository {
    /// Create a new call record repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn begin(&self) -> AppResult<Transaction<'static, Postgres>> {
        self.pool.begin().await.map_err(|e| {
            error!("Failed to start transaction: {}", e);
            AppError::Transaction(format!("Failed to start transaction: {}", e))
        })
    }
}

#[async_trait]
impl Repository<CallRecord, i64> for PgCallRecordRepository {
    #[instrument(skip(self))]
    async fn find_by_id(&self, id: i64) -> AppResult<Option<CallRecord>> {
        debug!("Finding call record by id: {}", id);

        let row = sqlx::query_as::<Postgres, CallRecordRow>(&format!(
            "SELECT {} FROM call_records WHERE id = $1",
            RECORD_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error finding call record {}: {}", id, e);
            AppError::Database(format!("Failed to find call record: {}", e))
        })?;

        row.map(TryInto::try_into).transpose()
    }

    #[instrument(skip(self))]
    async fn find_all(&self, limit: i64, offset: i64) -> AppResult<Vec<CallRecord>> {
        let rows = sqlx::query_as::<Postgres, CallRecordRow>(&format!(
            "SELECT {} FROM call_records ORDER BY id LIMIT $1 OFFSET $2",
            RECORD_COLUMNS
        ))
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error listing call records: {}", e);
            AppError::Database(format!("Failed to fetch call records: {}", e))
        })?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    #[instrument(skip(self))]
    async fn count(&self) -> AppResult<i64> {
        let result: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM call_records")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error counting call records: {}", e);
                AppError::Database(format!("Failed to count call records: {}", e))
            })?;

        Ok(result.0)
    }

    /// Validate and insert a record as one unit of work
    #[instrument(skip(self, entity), fields(call_id = entity.call_id, record_type = %entity.record_type))]
    async fn create(&self, entity: &CallRecord) -> AppResult<CallRecord> {
        let mut tx = self.begin().await?;

        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(RECORD_WRITE_LOCK)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                error!("Failed to take record write lock: {}", e);
                AppError::Transaction(format!("Failed to lock call records: {}", e))
            })?;

        let reader = TxReader {
            tx: Mutex::new(tx),
        };
        if let Err(rejection) = validate_record(entity, &reader).await {
            warn!("Call record rejected: {}", rejection);
            return Err(rejection);
        }
        let mut tx = reader.tx.into_inner();

        let row = sqlx::query_as::<Postgres, CallRecordRow>(&format!(
            r#"
            INSERT INTO call_records (record_type, timestamp, call_id, source, destination)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {}
            "#,
            RECORD_COLUMNS
        ))
        .bind(entity.record_type.code())
        .bind(entity.timestamp)
        .bind(entity.call_id)
        .bind(entity.source.as_ref().map(PhoneNumber::as_str))
        .bind(entity.destination.as_ref().map(PhoneNumber::as_str))
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            error!("Database error creating call record: {}", e);
            if is_unique_violation(&e) {
                AppError::Uniqueness(format!(
                    "{} record for call {} conflicts with an existing record",
                    entity.record_type, entity.call_id
                ))
            } else {
                AppError::Database(format!("Failed to create call record: {}", e))
            }
        })?;

        tx.commit().await.map_err(|e| {
            error!("Failed to commit transaction: {}", e);
            AppError::Transaction(format!("Failed to commit transaction: {}", e))
        })?;

        let record: CallRecord = row.try_into()?;
        info!(id = record.id, "Call record stored");
        Ok(record)
    }
}

#[async_trait]
impl CallRecordReader for PgCallRecordRepository {
    async fn find_by_call(
        &self,
        record_type: RecordType,
        call_id: i64,
    ) -> AppResult<Option<CallRecord>> {
        fetch_by_call(&self.pool, record_type, call_id).await
    }

    async fn exists_for_call_at(&self, call_id: i64, timestamp: DateTime<Utc>) -> AppResult<bool> {
        exists_for_call_at(&self.pool, call_id, timestamp).await
    }

    async fn exists_from_source_at(
        &self,
        source: &PhoneNumber,
        timestamp: DateTime<Utc>,
    ) -> AppResult<bool> {
        exists_number_at(&self.pool, NumberColumn::Source, source, timestamp).await
    }

    async fn exists_to_destination_at(
        &self,
        destination: &PhoneNumber,
        timestamp: DateTime<Utc>,
    ) -> AppResult<bool> {
        exists_number_at(&self.pool, NumberColumn::Destination, destination, timestamp).await
    }

    async fn calls_from_source(&self, source: &PhoneNumber) -> AppResult<Vec<CallPair>> {
        fetch_calls_from_source(&self.pool, source).await
    }
}

#[async_trait]
impl CallRecordRepository for PgCallRecordRepository {
    #[instrument(skip(self), fields(source = %source))]
    async fn completed_calls_between(
        &self,
        source: &PhoneNumber,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> AppResult<Vec<CallRecord>> {
        debug!("Fetching completed calls between {} and {}", from, to);

        let rows = sqlx::query_as::<Postgres, CallRecordRow>(&format!(
            r#"
            SELECT {}
            FROM call_records
            WHERE call_id IN (
                SELECT s.call_id
                FROM call_records s
                JOIN call_records e ON e.call_id = s.call_id AND e.record_type = 'E'
                WHERE s.record_type = 'S'
                    AND s.source = $1
                    AND e.timestamp BETWEEN $2 AND $3
            )
            ORDER BY call_id, timestamp
            "#,
            RECORD_COLUMNS
        ))
        .bind(source.as_str())
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error fetching calls of {}: {}", source, e);
            AppError::Database(format!("Failed to fetch completed calls: {}", e))
        })?;

        rows.into_iter().map(TryInto::try_into).collect()
    }
}

/// Validator view of the store bound to an open write transaction
struct TxReader {
    tx: Mutex<Transaction<'static, Postgres>>,
}

#[async_trait]
impl CallRecordReader for TxReader {
    async fn find_by_call(
        &self,
        record_type: RecordType,
        call_id: i64,
    ) -> AppResult<Option<CallRecord>> {
        let mut tx = self.tx.lock().await;
        fetch_by_call(&mut **tx, record_type, call_id).await
    }

    async fn exists_for_call_at(&self, call_id: i64, timestamp: DateTime<Utc>) -> AppResult<bool> {
        let mut tx = self.tx.lock().await;
        exists_for_call_at(&mut **tx, call_id, timestamp).await
    }

    async fn exists_from_source_at(
        &self,
        source: &PhoneNumber,
        timestamp: DateTime<Utc>,
    ) -> AppResult<bool> {
        let mut tx = self.tx.lock().await;
        exists_number_at(&mut **tx, NumberColumn::Source, source, timestamp).await
    }

    async fn exists_to_destination_at(
        &self,
        destination: &PhoneNumber,
        timestamp: DateTime<Utc>,
    ) -> AppResult<bool> {
        let mut tx = self.tx.lock().await;
        exists_number_at(&mut **tx, NumberColumn::Destination, destination, timestamp).await
    }

    async fn calls_from_source(&self, source: &PhoneNumber) -> AppResult<Vec<CallPair>> {
        let mut tx = self.tx.lock().await;
        fetch_calls_from_source(&mut **tx, source).await
    }
}

async fn fetch_by_call<'e, E>(
    executor: E,
    record_type: RecordType,
    call_id: i64,
) -> AppResult<Option<CallRecord>>
where
    E: PgExecutor<'e>,
{
    let row = sqlx::query_as::<Postgres, CallRecordRow>(&format!(
        "SELECT {} FROM call_records WHERE record_type = $1 AND call_id = $2",
        RECORD_COLUMNS
    ))
    .bind(record_type.code())
    .bind(call_id)
    .fetch_optional(executor)
    .await
    .map_err(|e| {
        error!("Database error finding call {}: {}", call_id, e);
        AppError::Database(format!("Failed to find call record: {}", e))
    })?;

    row.map(TryInto::try_into).transpose()
}

async fn exists_for_call_at<'e, E>(
    executor: E,
    call_id: i64,
    timestamp: DateTime<Utc>,
) -> AppResult<bool>
where
    E: PgExecutor<'e>,
{
    let (exists,): (bool,) = sqlx::query_as(
        "SELECT EXISTS(SELECT 1 FROM call_records WHERE call_id = $1 AND timestamp = $2)",
    )
    .bind(call_id)
    .bind(timestamp)
    .fetch_one(executor)
    .await
    .map_err(|e| {
        error!("Database error checking call {}: {}", call_id, e);
        AppError::Database(format!("Failed to check call record: {}", e))
    })?;

    Ok(exists)
}

#[derive(Debug, Clone, Copy)]
enum NumberColumn {
    Source,
    Destination,
}

impl NumberColumn {
    fn name(self) -> &'static str {
        match self {
            Self::Source => "source",
            Self::Destination => "destination",
        }
    }
}

async fn exists_number_at<'e, E>(
    executor: E,
    column: NumberColumn,
    number: &PhoneNumber,
    timestamp: DateTime<Utc>,
) -> AppResult<bool>
where
    E: PgExecutor<'e>,
{
    let (exists,): (bool,) = sqlx::query_as(&format!(
        "SELECT EXISTS(SELECT 1 FROM call_records WHERE {} = $1 AND timestamp = $2)",
        column.name()
    ))
    .bind(number.as_str())
    .bind(timestamp)
    .fetch_one(executor)
    .await
    .map_err(|e| {
        error!("Database error checking {} {}: {}", column.name(), number, e);
        AppError::Database(format!("Failed to check call record: {}", e))
    })?;

    Ok(exists)
}

async fn fetch_calls_from_source<'e, E>(executor: E, source: &PhoneNumber) -> AppResult<Vec<CallPair>>
where
    E: PgExecutor<'e>,
{
    let rows = sqlx::query_as::<Postgres, CallPairRow>(
        r#"
        SELECT
            s.id, s.record_type, s.timestamp, s.call_id, s.source, s.destination,
            e.id AS end_id, e.timestamp AS end_timestamp
        FROM call_records s
        LEFT JOIN call_records e ON e.call_id = s.call_id AND e.record_type = 'E'
        WHERE s.record_type = 'S' AND s.source = $1
        ORDER BY s.timestamp
        "#,
    )
    .bind(source.as_str())
    .fetch_all(executor)
    .await
    .map_err(|e| {
        error!("Database error fetching calls from {}: {}", source, e);
        AppError::Database(format!("Failed to fetch calls: {}", e))
    })?;

    rows.into_iter().map(TryInto::try_into).collect()
}

/// Helper struct for mapping database rows
#[derive(Debug, sqlx::FromRow)]
struct CallRecordRow {
    id: i64,
    record_type: String,
    timestamp: DateTime<Utc>,
    call_id: i64,
    source: Option<String>,
    destination: Option<String>,
}

impl TryFrom<CallRecordRow> for CallRecord {
    type Error = AppError;

    fn try_from(row: CallRecordRow) -> Result<Self, Self::Error> {
        let corrupt = |e: AppError| {
            AppError::Database(format!("Corrupt call record {}: {}", row.id, e))
        };

        Ok(Self {
            id: row.id,
            record_type: row.record_type.trim().parse().map_err(corrupt)?,
            timestamp: row.timestamp,
            call_id: row.call_id,
            source: row
                .source
                .clone()
                .map(PhoneNumber::try_from)
                .transpose()
                .map_err(corrupt)?,
            destination: row
                .destination
                .clone()
                .map(PhoneNumber::try_from)
                .transpose()
                .map_err(corrupt)?,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct CallPairRow {
    #[sqlx(flatten)]
    start: CallRecordRow,
    end_id: Option<i64>,
    end_timestamp: Option<DateTime<Utc>>,
}

impl TryFrom<CallPairRow> for CallPair {
    type Error = AppError;

    fn try_from(row: CallPairRow) -> Result<Self, Self::Error> {
        let start: CallRecord = row.start.try_into()?;
        let end = match (row.end_id, row.end_timestamp) {
            (Some(id), Some(timestamp)) => Some(CallRecord {
                id,
                ..CallRecord::end(start.call_id, timestamp)
            }),
            _ => None,
        };

        Ok(Self { start, end })
    }
}
