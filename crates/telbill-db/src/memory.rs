//! In-memory store
//!
//! Implements every repository trait over process memory. Used by tests and
//! by servers started without a database URL. Data lives behind
//! `parking_lot` locks that are never held across an await; call record
//! writes are serialized by an async gate so validation and insertion form
//! one unit of work, mirroring the advisory lock of the PostgreSQL store.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use telbill_core::{
    models::{CallPair, CallRecord, PhoneBill, PhoneNumber, RecordType, TariffSchedule},
    traits::{
        CallRecordReader, CallRecordRepository, PhoneBillRepository, Repository,
        TariffRepository,
    },
    validation::validate_record,
    AppError, AppResult,
};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

type BillKey = (PhoneNumber, DateTime<Utc>);

/// Record, tariff and bill store held in process memory
#[derive(Default)]
pub struct InMemoryStore {
    records: RwLock<Vec<CallRecord>>,
    tariffs: RwLock<Vec<TariffSchedule>>,
    bills: RwLock<HashMap<BillKey, PhoneBill>>,
    write_gate: Mutex<()>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn any_record(&self, predicate: impl Fn(&CallRecord) -> bool) -> bool {
        self.records.read().iter().any(predicate)
    }
}

fn page<T: Clone>(items: &[T], limit: i64, offset: i64) -> Vec<T> {
    items
        .iter()
        .skip(offset.max(0) as usize)
        .take(limit.max(0) as usize)
        .cloned()
        .collect()
}

#[async_trait]
impl Repository<CallRecord, i64> for InMemoryStore {
    async fn find_by_id(&self, id: i64) -> AppResult<Option<CallRecord>> {
        Ok(self.records.read().iter().find(|r| r.id == id).cloned())
    }

    async fn find_all(&self, limit: i64, offset: i64) -> AppResult<Vec<CallRecord>> {
        Ok(page(&self.records.read(), limit, offset))
    }

    async fn count(&self) -> AppResult<i64> {
        Ok(self.records.read().len() as i64)
    }

    #[instrument(skip(self, entity), fields(call_id = entity.call_id, record_type = %entity.record_type))]
    async fn create(&self, entity: &CallRecord) -> AppResult<CallRecord> {
        let _gate = self.write_gate.lock().await;

        if let Err(rejection) = validate_record(entity, self).await {
            warn!("Call record rejected: {}", rejection);
            return Err(rejection);
        }

        let mut records = self.records.write();
        let stored = CallRecord {
            id: records.len() as i64 + 1,
            ..entity.clone()
        };
        records.push(stored.clone());

        info!(id = stored.id, "Call record stored");
        Ok(stored)
    }
}

#[async_trait]
impl CallRecordReader for InMemoryStore {
    async fn find_by_call(
        &self,
        record_type: RecordType,
        call_id: i64,
    ) -> AppResult<Option<CallRecord>> {
        Ok(self
            .records
            .read()
            .iter()
            .find(|r| r.record_type == record_type && r.call_id == call_id)
            .cloned())
    }

    async fn exists_for_call_at(&self, call_id: i64, timestamp: DateTime<Utc>) -> AppResult<bool> {
        Ok(self.any_record(|r| r.call_id == call_id && r.timestamp == timestamp))
    }

    async fn exists_from_source_at(
        &self,
        source: &PhoneNumber,
        timestamp: DateTime<Utc>,
    ) -> AppResult<bool> {
        Ok(self.any_record(|r| r.source.as_ref() == Some(source) && r.timestamp == timestamp))
    }

    async fn exists_to_destination_at(
        &self,
        destination: &PhoneNumber,
        timestamp: DateTime<Utc>,
    ) -> AppResult<bool> {
        Ok(self.any_record(|r| {
            r.destination.as_ref() == Some(destination) && r.timestamp == timestamp
        }))
    }

    async fn calls_from_source(&self, source: &PhoneNumber) -> AppResult<Vec<CallPair>> {
        let records = self.records.read();
        let ends: HashMap<i64, &CallRecord> = records
            .iter()
            .filter(|r| r.is_end())
            .map(|r| (r.call_id, r))
            .collect();

        let mut calls: Vec<CallPair> = records
            .iter()
            .filter(|r| r.is_start() && r.source.as_ref() == Some(source))
            .map(|start| CallPair {
                start: start.clone(),
                end: ends.get(&start.call_id).map(|end| (*end).clone()),
            })
            .collect();
        calls.sort_by_key(|call| call.start.timestamp);

        Ok(calls)
    }
}

#[async_trait]
impl CallRecordRepository for InMemoryStore {
    async fn completed_calls_between(
        &self,
        source: &PhoneNumber,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> AppResult<Vec<CallRecord>> {
        let calls = self.calls_from_source(source).await?;
        debug!("Scanning {} calls from {}", calls.len(), source);

        Ok(calls
            .into_iter()
            .filter(|call| {
                call.ended_at()
                    .map(|ended_at| from <= ended_at && ended_at <= to)
                    .unwrap_or(false)
            })
            .flat_map(|call| std::iter::once(call.start).chain(call.end))
            .collect())
    }
}

#[async_trait]
impl Repository<TariffSchedule, i32> for InMemoryStore {
    async fn find_by_id(&self, id: i32) -> AppResult<Option<TariffSchedule>> {
        Ok(self.tariffs.read().iter().find(|t| t.id == id).cloned())
    }

    async fn find_all(&self, limit: i64, offset: i64) -> AppResult<Vec<TariffSchedule>> {
        let mut tariffs = self.tariffs.read().clone();
        tariffs.sort_by(|a, b| b.effective_from.cmp(&a.effective_from));
        Ok(page(&tariffs, limit, offset))
    }

    async fn count(&self) -> AppResult<i64> {
        Ok(self.tariffs.read().len() as i64)
    }

    async fn create(&self, entity: &TariffSchedule) -> AppResult<TariffSchedule> {
        entity.validate()?;

        let mut tariffs = self.tariffs.write();
        if tariffs
            .iter()
            .any(|t| t.effective_from == entity.effective_from)
        {
            return Err(AppError::AlreadyExists(format!(
                "A tariff schedule effective from {} already exists",
                entity.effective_from
            )));
        }

        let stored = TariffSchedule {
            id: tariffs.len() as i32 + 1,
            created_at: Utc::now(),
            ..entity.clone()
        };
        tariffs.push(stored.clone());

        info!(id = stored.id, "Tariff schedule created");
        Ok(stored)
    }
}

#[async_trait]
impl TariffRepository for InMemoryStore {
    async fn find_effective(&self, date: NaiveDate) -> AppResult<Option<TariffSchedule>> {
        Ok(self
            .tariffs
            .read()
            .iter()
            .filter(|t| t.is_effective_on(date))
            .max_by_key(|t| t.effective_from)
            .cloned())
    }
}

#[async_trait]
impl PhoneBillRepository for InMemoryStore {
    async fn find_by_key(
        &self,
        destination: &PhoneNumber,
        start_timestamp: DateTime<Utc>,
    ) -> AppResult<Option<PhoneBill>> {
        Ok(self
            .bills
            .read()
            .get(&(destination.clone(), start_timestamp))
            .cloned())
    }

    async fn get_or_create(&self, bill: &PhoneBill) -> AppResult<PhoneBill> {
        let mut bills = self.bills.write();
        let next_id = bills.len() as i64 + 1;

        let stored = bills
            .entry((bill.destination.clone(), bill.start_timestamp))
            .or_insert_with(|| PhoneBill {
                id: next_id,
                ..bill.clone()
            });

        Ok(stored.clone())
    }
}
