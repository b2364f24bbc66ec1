//! Bill assembly
//!
//! Pairs Start and End records into calls, prices every call with the tariff
//! schedule in effect on its start date and materializes one bill per call.
//! Bills are looked up in the cache, then in the bill store, and computed
//! only when neither has them.

use crate::period::wall_clock;
use crate::pricing;
use crate::reference_period::ReferencePeriod;
use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use telbill_cache::{keys, Cache};
use telbill_core::{
    config::BillingConfig,
    models::{CallRecord, PhoneBill, PhoneNumber, TariffSchedule},
    traits::{CacheService, CallRecordRepository, PhoneBillRepository, TariffRepository},
    AppError, AppResult,
};
use tracing::{debug, info, instrument, warn};

/// Bills of one subscriber for one month
#[derive(Debug, Clone, Serialize)]
pub struct MonthlyStatement {
    pub subscriber: PhoneNumber,
    pub reference_period: ReferencePeriod,
    pub billed_calls: Vec<PhoneBill>,
}

impl MonthlyStatement {
    pub fn total_charge(&self) -> Decimal {
        self.billed_calls.iter().map(|bill| bill.charge).sum()
    }
}

/// Start and End timestamps of one completed call
#[derive(Debug, Clone, PartialEq, Eq)]
struct CompletedCall {
    call_id: i64,
    destination: PhoneNumber,
    started_at: DateTime<Utc>,
    ended_at: DateTime<Utc>,
}

/// Bill assembler
pub struct BillingService<R: ?Sized, T: ?Sized, B: ?Sized> {
    records: Arc<R>,
    tariffs: Arc<T>,
    bills: Arc<B>,
    cache: Arc<Cache>,
    tz: Tz,
    charge_scale: u32,
    cache_ttl_secs: u64,
}

impl<R, T, B> BillingService<R, T, B>
where
    R: CallRecordRepository + ?Sized,
    T: TariffRepository + ?Sized,
    B: PhoneBillRepository + ?Sized,
{
    /// Create a new billing service
    pub fn new(
        records: Arc<R>,
        tariffs: Arc<T>,
        bills: Arc<B>,
        cache: Arc<Cache>,
        config: &BillingConfig,
    ) -> AppResult<Self> {
        Ok(Self {
            records,
            tariffs,
            bills,
            cache,
            tz: config.tz()?,
            charge_scale: config.charge_scale,
            cache_ttl_secs: config.bill_cache_ttl_secs,
        })
    }

    /// Billing time zone
    pub fn timezone(&self) -> Tz {
        self.tz
    }

    /// Current date on the billing wall clock
    pub fn today(&self) -> NaiveDate {
        Utc::now().with_timezone(&self.tz).date_naive()
    }

    /// Requested period, or the previous month when none is given
    pub fn resolve_period(&self, requested: Option<&str>) -> AppResult<ReferencePeriod> {
        let today = self.today();
        match requested {
            Some(text) => ReferencePeriod::parse(text, today),
            None => Ok(ReferencePeriod::previous(today)),
        }
    }

    /// Bills of the calls placed by `subscriber` that ended in `period`
    #[instrument(skip(self), fields(subscriber = %subscriber, period = %period))]
    pub async fn monthly_statement(
        &self,
        subscriber: &PhoneNumber,
        period: ReferencePeriod,
    ) -> AppResult<MonthlyStatement> {
        let (from, to) = period.bounds(self.tz);
        let records = self
            .records
            .completed_calls_between(subscriber, from, to)
            .await?;
        debug!("Found {} records for the period", records.len());

        let billed_calls = self.calculate_bills(&records).await?;

        Ok(MonthlyStatement {
            subscriber: subscriber.clone(),
            reference_period: period,
            billed_calls,
        })
    }

    /// Bill every complete call found in `records`
    ///
    /// Records are grouped by call id in any order. Calls missing their Start
    /// or End are skipped. Bills come back ordered by start timestamp.
    #[instrument(skip(self, records), fields(records = records.len()))]
    pub async fn calculate_bills(&self, records: &[CallRecord]) -> AppResult<Vec<PhoneBill>> {
        let mut bills = Vec::new();

        for call in pair_calls(records) {
            bills.push(self.bill_for_call(&call).await?);
        }

        bills.sort_by_key(|bill| bill.start_timestamp);
        Ok(bills)
    }

    /// Tariff schedule in effect at an instant
    ///
    /// When no schedule exists yet the built-in one is stored and used.
    #[instrument(skip(self))]
    pub async fn lookup_tariff(&self, at: DateTime<Utc>) -> AppResult<TariffSchedule> {
        let date = at.with_timezone(&self.tz).date_naive();

        if let Some(schedule) = self.tariffs.find_effective(date).await? {
            return Ok(schedule);
        }

        info!("No tariff schedule effective on {}, installing the default", date);
        match self.tariffs.create(&TariffSchedule::fallback()).await {
            Ok(schedule) => Ok(schedule),
            Err(AppError::AlreadyExists(_)) => self
                .tariffs
                .find_effective(date)
                .await?
                .ok_or_else(|| AppError::Internal(format!("No tariff schedule for {}", date))),
            Err(e) => Err(e),
        }
    }

    /// Charge of a call, rounded to the configured scale
    ///
    /// The call is walked on the billing wall clock from its start for its
    /// real duration.
    pub fn price_call(
        &self,
        started_at: DateTime<Utc>,
        ended_at: DateTime<Utc>,
        schedule: &TariffSchedule,
    ) -> Decimal {
        let start = wall_clock(started_at, self.tz);
        let end = start + (ended_at - started_at);

        pricing::price(start, end, schedule)
            .round_dp_with_strategy(self.charge_scale, RoundingStrategy::MidpointAwayFromZero)
    }

    async fn bill_for_call(&self, call: &CompletedCall) -> AppResult<PhoneBill> {
        let key = keys::bill_key(&call.destination, call.started_at);

        match self.cache.get::<PhoneBill>(&key).await {
            Ok(Some(bill)) => return Ok(bill),
            Ok(None) => {}
            Err(e) => warn!("Cache error for bill {}: {}", key, e),
        }

        let bill = match self
            .bills
            .find_by_key(&call.destination, call.started_at)
            .await?
        {
            Some(bill) => bill,
            None => {
                let schedule = self.lookup_tariff(call.started_at).await?;
                let computed = PhoneBill {
                    id: 0,
                    destination: call.destination.clone(),
                    start_timestamp: call.started_at,
                    duration: (call.ended_at - call.started_at).num_seconds(),
                    charge: self.price_call(call.started_at, call.ended_at, &schedule),
                };
                debug!(call_id = call.call_id, charge = %computed.charge, "Priced call");
                self.bills.get_or_create(&computed).await?
            }
        };

        if let Err(e) = self.cache.set(&key, &bill, self.cache_ttl_secs).await {
            warn!("Failed to cache bill {}: {}", key, e);
        }

        Ok(bill)
    }
}

/// Group records into completed calls
fn pair_calls(records: &[CallRecord]) -> Vec<CompletedCall> {
    let mut halves: BTreeMap<i64, (Option<&CallRecord>, Option<&CallRecord>)> = BTreeMap::new();
    for record in records {
        let entry = halves.entry(record.call_id).or_default();
        if record.is_start() {
            entry.0 = Some(record);
        } else {
            entry.1 = Some(record);
        }
    }

    halves
        .into_iter()
        .filter_map(|(call_id, halves)| match halves {
            (Some(start), Some(end)) => {
                let Some(destination) = start.destination.clone() else {
                    warn!(call_id, "Start record without destination, skipping");
                    return None;
                };
                if end.timestamp < start.timestamp {
                    warn!(call_id, "Call ends before it starts, skipping");
                    return None;
                }
                Some(CompletedCall {
                    call_id,
                    destination,
                    started_at: start.timestamp,
                    ended_at: end.timestamp,
                })
            }
            _ => {
                warn!(call_id, "Incomplete call, skipping");
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{Duration, TimeZone};
    use rust_decimal_macros::dec;
    use std::sync::Mutex;
    use telbill_cache::MemoryCache;
    use telbill_core::traits::Repository;
    use telbill_db::InMemoryStore;

    type Service = BillingService<InMemoryStore, InMemoryStore, InMemoryStore>;

    fn phone(raw: &str) -> PhoneNumber {
        PhoneNumber::parse(raw).unwrap()
    }

    fn at(day: u32, h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2018, 2, day, h, m, s).unwrap()
    }

    fn service_with(store: Arc<InMemoryStore>, config: &BillingConfig) -> (Service, MemoryCache) {
        let memory = MemoryCache::new();
        let cache = Arc::new(Cache::Memory(memory.clone()));
        let service = BillingService::new(store.clone(), store.clone(), store, cache, config).unwrap();
        (service, memory)
    }

    fn service(store: Arc<InMemoryStore>) -> (Service, MemoryCache) {
        service_with(store, &BillingConfig::default())
    }

    async fn record_call(
        store: &InMemoryStore,
        call_id: i64,
        source: &str,
        destination: &str,
        started_at: DateTime<Utc>,
        ended_at: DateTime<Utc>,
    ) {
        let start = CallRecord::start(call_id, started_at, phone(source), phone(destination));
        Repository::<CallRecord, i64>::create(store, &start).await.unwrap();
        Repository::<CallRecord, i64>::create(store, &CallRecord::end(call_id, ended_at))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_statement_uses_default_tariff() {
        let store = Arc::new(InMemoryStore::new());
        // 21:57:13 -> 22:10:56: 2m47s standard, 10m56s reduced
        record_call(&store, 70, "2199999999", "2199999998", at(28, 21, 57, 13), at(28, 22, 10, 56)).await;
        let (service, _) = service(store.clone());

        let statement = service
            .monthly_statement(&phone("2199999999"), ReferencePeriod::new(2018, 2).unwrap())
            .await
            .unwrap();

        assert_eq!(statement.billed_calls.len(), 1);
        let bill = &statement.billed_calls[0];
        assert_eq!(bill.duration, 823);
        assert_eq!(bill.formatted_duration(), "0h13m43s");
        assert_eq!(bill.charge, dec!(0.54));
        assert_eq!(statement.total_charge(), dec!(0.54));

        assert_eq!(Repository::<TariffSchedule, i32>::count(&*store).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_statement_only_covers_calls_ending_in_month() {
        let store = Arc::new(InMemoryStore::new());
        record_call(&store, 1, "2199999999", "41000000000", at(1, 10, 0, 0), at(1, 10, 5, 0)).await;
        // Ends in March
        record_call(
            &store,
            2,
            "2199999999",
            "41000000001",
            at(28, 23, 58, 0),
            Utc.with_ymd_and_hms(2018, 3, 1, 0, 2, 0).unwrap(),
        )
        .await;
        let (service, _) = service(store);

        let feb = service
            .monthly_statement(&phone("2199999999"), ReferencePeriod::new(2018, 2).unwrap())
            .await
            .unwrap();
        let mar = service
            .monthly_statement(&phone("2199999999"), ReferencePeriod::new(2018, 3).unwrap())
            .await
            .unwrap();

        assert_eq!(feb.billed_calls.len(), 1);
        assert_eq!(mar.billed_calls.len(), 1);
        assert_eq!(mar.billed_calls[0].destination, phone("41000000001"));
    }

    #[tokio::test]
    async fn test_bills_are_cached_and_persisted_once() {
        let store = Arc::new(InMemoryStore::new());
        record_call(&store, 5, "2199999999", "41000000000", at(12, 12, 0, 0), at(12, 12, 3, 43)).await;
        let (service, memory) = service(store.clone());
        let period = ReferencePeriod::new(2018, 2).unwrap();

        let first = service.monthly_statement(&phone("2199999999"), period).await.unwrap();
        assert_eq!(memory.len(), 1);
        let second = service.monthly_statement(&phone("2199999999"), period).await.unwrap();

        assert_eq!(first.billed_calls, second.billed_calls);
        assert_eq!(first.billed_calls[0].charge, dec!(0.63));
        assert!(store
            .find_by_key(&phone("41000000000"), at(12, 12, 0, 0))
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_stored_bill_is_not_recomputed() {
        let store = Arc::new(InMemoryStore::new());
        record_call(&store, 5, "2199999999", "41000000000", at(12, 12, 0, 0), at(12, 12, 3, 43)).await;
        let stored = PhoneBill {
            id: 0,
            destination: phone("41000000000"),
            start_timestamp: at(12, 12, 0, 0),
            duration: 223,
            charge: dec!(9.99),
        };
        store.get_or_create(&stored).await.unwrap();
        let (service, _) = service(store);

        let statement = service
            .monthly_statement(&phone("2199999999"), ReferencePeriod::new(2018, 2).unwrap())
            .await
            .unwrap();
        assert_eq!(statement.billed_calls[0].charge, dec!(9.99));
    }

    #[tokio::test]
    async fn test_calculate_bills_skips_incomplete_and_orders() {
        let store = Arc::new(InMemoryStore::new());
        let (service, _) = service(store);

        let records = vec![
            CallRecord::end(2, at(10, 10, 1, 0)),
            CallRecord::start(3, at(11, 9, 0, 0), phone("2199999999"), phone("41000000003")),
            CallRecord::end(1, at(9, 10, 1, 0)),
            CallRecord::start(2, at(10, 10, 0, 0), phone("2199999999"), phone("41000000002")),
            CallRecord::start(1, at(9, 10, 0, 0), phone("2199999999"), phone("41000000001")),
            CallRecord::end(4, at(12, 10, 1, 0)),
        ];

        let bills = service.calculate_bills(&records).await.unwrap();
        let destinations: Vec<&str> = bills.iter().map(|b| b.destination.as_str()).collect();
        assert_eq!(destinations, vec!["41000000001", "41000000002"]);
    }

    #[tokio::test]
    async fn test_latest_effective_tariff_applies() {
        let store = Arc::new(InMemoryStore::new());
        let date = |y, m, d| NaiveDate::from_ymd_opt(y, m, d).unwrap();
        for (from, standard) in [(date(2017, 1, 1), dec!(0.10)), (date(2018, 2, 15), dec!(0.20))] {
            let schedule = TariffSchedule::new(dec!(0.50), standard, dec!(0.00), from).unwrap();
            Repository::<TariffSchedule, i32>::create(&*store, &schedule)
                .await
                .unwrap();
        }
        let (service, _) = service(store);

        let early = service.lookup_tariff(at(14, 23, 59, 59)).await.unwrap();
        let late = service.lookup_tariff(at(15, 0, 0, 0)).await.unwrap();
        assert_eq!(early.standard_minute_rate, dec!(0.10));
        assert_eq!(late.standard_minute_rate, dec!(0.20));
    }

    #[tokio::test]
    async fn test_price_call_in_zone_and_rounding() {
        let store = Arc::new(InMemoryStore::new());
        let config = BillingConfig {
            timezone: "America/Sao_Paulo".to_string(),
            ..Default::default()
        };
        let (service, _) = service_with(store, &config);
        let schedule =
            TariffSchedule::new(dec!(0.355), dec!(0.09), dec!(0.00), NaiveDate::MIN).unwrap();

        // 21:00 UTC is 19:00 local (summer time), standard window
        let started_at = at(12, 21, 0, 0);
        let charge = service.price_call(started_at, started_at + Duration::minutes(2), &schedule);
        assert_eq!(charge, dec!(0.54));

        // 02:00 UTC is midnight local, reduced window
        let started_at = at(13, 2, 0, 0);
        let charge = service.price_call(started_at, started_at + Duration::minutes(2), &schedule);
        assert_eq!(charge, dec!(0.36));
    }

    #[test]
    fn test_resolve_period() {
        let store = Arc::new(InMemoryStore::new());
        let (service, _) = service(store);

        assert_eq!(
            service.resolve_period(Some("mar-2018")).unwrap(),
            ReferencePeriod::new(2018, 3).unwrap()
        );
        assert_eq!(
            service.resolve_period(None).unwrap(),
            ReferencePeriod::previous(service.today())
        );
        assert!(matches!(
            service.resolve_period(Some("abc2017")),
            Err(AppError::PeriodParse(_))
        ));
    }

    /// Tariff store that loses the race to install the default schedule
    struct RacingTariffs {
        installed: Mutex<Option<TariffSchedule>>,
    }

    #[async_trait]
    impl Repository<TariffSchedule, i32> for RacingTariffs {
        async fn find_by_id(&self, _id: i32) -> AppResult<Option<TariffSchedule>> {
            Ok(None)
        }

        async fn find_all(&self, _limit: i64, _offset: i64) -> AppResult<Vec<TariffSchedule>> {
            Ok(vec![])
        }

        async fn count(&self) -> AppResult<i64> {
            Ok(0)
        }

        async fn create(&self, entity: &TariffSchedule) -> AppResult<TariffSchedule> {
            *self.installed.lock().unwrap() = Some(TariffSchedule {
                id: 99,
                ..entity.clone()
            });
            Err(AppError::AlreadyExists("installed concurrently".to_string()))
        }
    }

    #[async_trait]
    impl TariffRepository for RacingTariffs {
        async fn find_effective(&self, _date: NaiveDate) -> AppResult<Option<TariffSchedule>> {
            Ok(self.installed.lock().unwrap().clone())
        }
    }

    #[tokio::test]
    async fn test_default_tariff_race_reads_winner() {
        let store = Arc::new(InMemoryStore::new());
        let tariffs = Arc::new(RacingTariffs {
            installed: Mutex::new(None),
        });
        let cache = Arc::new(Cache::Memory(MemoryCache::new()));
        let service =
            BillingService::new(store.clone(), tariffs, store, cache, &BillingConfig::default())
                .unwrap();

        let schedule = service.lookup_tariff(at(1, 0, 0, 0)).await.unwrap();
        assert_eq!(schedule.id, 99);
        assert_eq!(schedule.base_charge, dec!(0.36));
    }
}
