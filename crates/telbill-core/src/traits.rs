//! Common traits for repositories and services
//!
//! Defines abstractions for record store access, bill storage and caching.
//! Validators and services receive these traits instead of a concrete store.

use crate::error::AppError;
use crate::models::{CallPair, CallRecord, PhoneBill, PhoneNumber, RecordType, TariffSchedule};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{de::DeserializeOwned, Serialize};

/// Generic repository trait for append-only entities
#[async_trait]
pub trait Repository<T, ID>: Send + Sync {
    /// Find entity by ID
    async fn find_by_id(&self, id: ID) -> Result<Option<T>, AppError>;

    /// Find all entities with pagination
    async fn find_all(&self, limit: i64, offset: i64) -> Result<Vec<T>, AppError>;

    /// Count total entities
    async fn count(&self) -> Result<i64, AppError>;

    /// Create a new entity
    async fn create(&self, entity: &T) -> Result<T, AppError>;
}

/// Read-only view of the call record store used by the record validator
#[async_trait]
pub trait CallRecordReader: Send + Sync {
    /// Find the Start or End record of a call
    async fn find_by_call(
        &self,
        record_type: RecordType,
        call_id: i64,
    ) -> Result<Option<CallRecord>, AppError>;

    /// Check whether any record of the call has exactly this timestamp
    async fn exists_for_call_at(
        &self,
        call_id: i64,
        timestamp: DateTime<Utc>,
    ) -> Result<bool, AppError>;

    /// Check whether a record with this source exists at this instant
    async fn exists_from_source_at(
        &self,
        source: &PhoneNumber,
        timestamp: DateTime<Utc>,
    ) -> Result<bool, AppError>;

    /// Check whether a record with this destination exists at this instant
    async fn exists_to_destination_at(
        &self,
        destination: &PhoneNumber,
        timestamp: DateTime<Utc>,
    ) -> Result<bool, AppError>;

    /// Every call started by a source, with its End record when present
    async fn calls_from_source(&self, source: &PhoneNumber) -> Result<Vec<CallPair>, AppError>;
}

/// Call record repository
///
/// `create` is the only write path and must run the record validator and
/// the insert as one serialized unit of work.
#[async_trait]
pub trait CallRecordRepository: Repository<CallRecord, i64> + CallRecordReader {
    /// Start and End records of the calls placed by `source` whose End
    /// timestamp falls within `[from, to]`
    async fn completed_calls_between(
        &self,
        source: &PhoneNumber,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<CallRecord>, AppError>;
}

/// Tariff schedule repository
#[async_trait]
pub trait TariffRepository: Repository<TariffSchedule, i32> {
    /// Schedule with the latest `effective_from` on or before `date`
    async fn find_effective(&self, date: NaiveDate) -> Result<Option<TariffSchedule>, AppError>;
}

/// Phone bill repository
#[async_trait]
pub trait PhoneBillRepository: Send + Sync {
    /// Find the bill of a call by its key
    async fn find_by_key(
        &self,
        destination: &PhoneNumber,
        start_timestamp: DateTime<Utc>,
    ) -> Result<Option<PhoneBill>, AppError>;

    /// Persist a bill unless one already exists for its key
    ///
    /// Returns the stored bill, which is the existing one when another
    /// writer got there first.
    async fn get_or_create(&self, bill: &PhoneBill) -> Result<PhoneBill, AppError>;
}

/// Cache service trait
#[async_trait]
pub trait CacheService: Send + Sync {
    /// Get value from cache
    async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, AppError>;

    /// Set value in cache with TTL
    async fn set<T: Serialize + Send + Sync>(
        &self,
        key: &str,
        value: &T,
        ttl_secs: u64,
    ) -> Result<(), AppError>;
}

/// Pagination parameters
#[derive(Debug, Clone, Default)]
pub struct Pagination {
    pub page: i64,
    pub per_page: i64,
}

impl Pagination {
    pub fn new(page: i64, per_page: i64) -> Self {
        Self {
            page: page.max(1),
            per_page: per_page.clamp(1, 1000),
        }
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1) * self.per_page
    }

    pub fn limit(&self) -> i64 {
        self.per_page
    }
}

/// Paginated response wrapper
#[derive(Debug, Clone, Serialize)]
pub struct PaginatedResponse<T> {
    pub data: Vec<T>,
    pub pagination: PaginationMeta,
}

/// Pagination metadata
#[derive(Debug, Clone, Serialize)]
pub struct PaginationMeta {
    pub total: i64,
    pub page: i64,
    pub per_page: i64,
    pub total_pages: i64,
}

impl PaginationMeta {
    pub fn new(total: i64, page: i64, per_page: i64) -> Self {
        let total_pages = if per_page > 0 {
            (total + per_page - 1) / per_page
        } else {
            0
        };

        Self {
            total,
            page,
            per_page,
            total_pages,
        }
    }
}
