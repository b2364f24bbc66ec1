//! Tariff schedule DTOs

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use telbill_core::models::TariffSchedule;
use telbill_core::AppResult;

/// New tariff schedule
#[derive(Debug, Clone, Deserialize)]
pub struct TariffCreateRequest {
    pub base_charge: Decimal,
    pub standard_minute_rate: Decimal,
    pub reduced_minute_rate: Decimal,
    pub effective_from: NaiveDate,
}

impl TariffCreateRequest {
    /// Build a checked schedule
    pub fn to_schedule(&self) -> AppResult<TariffSchedule> {
        TariffSchedule::new(
            self.base_charge,
            self.standard_minute_rate,
            self.reduced_minute_rate,
            self.effective_from,
        )
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TariffResponse {
    pub id: i32,
    pub base_charge: Decimal,
    pub standard_minute_rate: Decimal,
    pub reduced_minute_rate: Decimal,
    pub effective_from: NaiveDate,
    pub created_at: DateTime<Utc>,
}

impl From<TariffSchedule> for TariffResponse {
    fn from(schedule: TariffSchedule) -> Self {
        Self {
            id: schedule.id,
            base_charge: schedule.base_charge,
            standard_minute_rate: schedule.standard_minute_rate,
            reduced_minute_rate: schedule.reduced_minute_rate,
            effective_from: schedule.effective_from,
            created_at: schedule.created_at,
        }
    }
}
