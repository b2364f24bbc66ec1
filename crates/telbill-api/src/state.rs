//! Shared application state

use sqlx::PgPool;
use std::sync::Arc;
use telbill_cache::Cache;
use telbill_core::config::BillingConfig;
use telbill_core::traits::{CallRecordRepository, PhoneBillRepository, TariffRepository};
use telbill_core::AppResult;
use telbill_db::{InMemoryStore, PgCallRecordRepository, PgPhoneBillRepository, PgTariffRepository};
use telbill_services::BillingService;

/// Billing service over type-erased repositories
pub type SharedBillingService =
    BillingService<dyn CallRecordRepository, dyn TariffRepository, dyn PhoneBillRepository>;

/// State handed to every handler through `web::Data`
pub struct AppState {
    pub records: Arc<dyn CallRecordRepository>,
    pub tariffs: Arc<dyn TariffRepository>,
    pub billing: SharedBillingService,
}

impl AppState {
    pub fn new(
        records: Arc<dyn CallRecordRepository>,
        tariffs: Arc<dyn TariffRepository>,
        bills: Arc<dyn PhoneBillRepository>,
        cache: Arc<Cache>,
        config: &BillingConfig,
    ) -> AppResult<Self> {
        let billing = BillingService::new(
            Arc::clone(&records),
            Arc::clone(&tariffs),
            bills,
            cache,
            config,
        )?;

        Ok(Self {
            records,
            tariffs,
            billing,
        })
    }

    /// State backed by PostgreSQL repositories
    pub fn postgres(pool: PgPool, cache: Arc<Cache>, config: &BillingConfig) -> AppResult<Self> {
        Self::new(
            Arc::new(PgCallRecordRepository::new(pool.clone())),
            Arc::new(PgTariffRepository::new(pool.clone())),
            Arc::new(PgPhoneBillRepository::new(pool)),
            cache,
            config,
        )
    }

    /// State backed by a process-local store
    pub fn in_memory(cache: Arc<Cache>, config: &BillingConfig) -> AppResult<Self> {
        let store = Arc::new(InMemoryStore::new());
        Self::new(store.clone(), store.clone(), store, cache, config)
    }
}
