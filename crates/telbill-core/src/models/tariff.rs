//! Tariff schedule model
//!
//! A tariff schedule is a versioned rate card: a base charge per call and
//! two per-minute rates, one for the standard window and one for the
//! reduced-rate window. The schedule with the latest `effective_from` on or
//! before the call date applies.

use crate::error::AppError;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Base charge of the built-in schedule
pub const FALLBACK_BASE_CHARGE: Decimal = dec!(0.36);

/// Standard per-minute rate of the built-in schedule
pub const FALLBACK_STANDARD_RATE: Decimal = dec!(0.09);

/// Reduced per-minute rate of the built-in schedule
pub const FALLBACK_REDUCED_RATE: Decimal = dec!(0.00);

/// Daily billing window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RateWindow {
    /// 06:00 to 22:00
    Standard,
    /// 22:00 to 06:00
    Reduced,
}

impl RateWindow {
    #[inline]
    pub fn is_reduced(&self) -> bool {
        matches!(self, Self::Reduced)
    }
}

/// Tariff schedule entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TariffSchedule {
    /// Unique identifier (0 before persistence)
    pub id: i32,

    /// Charged once per call
    pub base_charge: Decimal,

    /// Per-minute rate inside the standard window
    pub standard_minute_rate: Decimal,

    /// Per-minute rate inside the reduced window
    pub reduced_minute_rate: Decimal,

    /// First day this schedule applies
    pub effective_from: NaiveDate,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl TariffSchedule {
    /// Build and check a new schedule
    pub fn new(
        base_charge: Decimal,
        standard_minute_rate: Decimal,
        reduced_minute_rate: Decimal,
        effective_from: NaiveDate,
    ) -> Result<Self, AppError> {
        let schedule = Self {
            id: 0,
            base_charge,
            standard_minute_rate,
            reduced_minute_rate,
            effective_from,
            created_at: Utc::now(),
        };
        schedule.validate()?;
        Ok(schedule)
    }

    /// Schedule used when none has been configured yet
    pub fn fallback() -> Self {
        Self {
            id: 0,
            base_charge: FALLBACK_BASE_CHARGE,
            standard_minute_rate: FALLBACK_STANDARD_RATE,
            reduced_minute_rate: FALLBACK_REDUCED_RATE,
            effective_from: NaiveDate::from_ymd_opt(1900, 1, 1).unwrap_or(NaiveDate::MIN),
            created_at: Utc::now(),
        }
    }

    /// Check the amount invariants
    ///
    /// All amounts must be non-negative and the reduced rate may not exceed
    /// the standard rate.
    pub fn validate(&self) -> Result<(), AppError> {
        for (name, amount) in [
            ("base_charge", self.base_charge),
            ("standard_minute_rate", self.standard_minute_rate),
            ("reduced_minute_rate", self.reduced_minute_rate),
        ] {
            if amount < Decimal::ZERO {
                return Err(AppError::Schedule(format!(
                    "{} must not be negative, got {}",
                    name, amount
                )));
            }
        }

        if self.reduced_minute_rate > self.standard_minute_rate {
            return Err(AppError::Schedule(format!(
                "reduced rate {} exceeds standard rate {}",
                self.reduced_minute_rate, self.standard_minute_rate
            )));
        }

        Ok(())
    }

    /// Per-minute rate for a window
    #[inline]
    pub fn minute_rate(&self, window: RateWindow) -> Decimal {
        match window {
            RateWindow::Standard => self.standard_minute_rate,
            RateWindow::Reduced => self.reduced_minute_rate,
        }
    }

    /// Check if the schedule can apply on a date
    pub fn is_effective_on(&self, date: NaiveDate) -> bool {
        self.effective_from <= date
    }
}
