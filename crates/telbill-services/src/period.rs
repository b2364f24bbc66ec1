//! Period classification
//!
//! The day is split into a standard window (06:00 to 22:00) and a reduced
//! window (22:00 to 06:00 the next day), both on the local wall clock of the
//! billing time zone.

use crate::constants::{REDUCED_WINDOW_END_HOUR, REDUCED_WINDOW_START_HOUR, SECONDS_PER_DAY};
use chrono::{DateTime, Duration, NaiveDateTime, Timelike, Utc};
use chrono_tz::Tz;
use telbill_core::models::RateWindow;

/// Window containing an instant and the time left until it changes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RatePeriod {
    pub window: RateWindow,
    /// Always strictly positive
    pub until_boundary: Duration,
}

impl RatePeriod {
    #[inline]
    pub fn is_reduced(&self) -> bool {
        self.window.is_reduced()
    }
}

/// Drop the sub-second part of a wall-clock time
#[inline]
pub fn truncate_subsec(at: NaiveDateTime) -> NaiveDateTime {
    at.with_nanosecond(0).unwrap_or(at)
}

/// Wall-clock time of an instant in the billing zone
pub fn wall_clock(at: DateTime<Utc>, tz: Tz) -> NaiveDateTime {
    at.with_timezone(&tz).naive_local()
}

/// Classify a wall-clock time
pub fn classify(at: NaiveDateTime) -> RatePeriod {
    let at = truncate_subsec(at);
    let secs = i64::from(at.num_seconds_from_midnight());
    let hour_secs = |h: u32| i64::from(h) * 3600;

    let (window, boundary_secs) = if at.hour() < REDUCED_WINDOW_END_HOUR {
        (RateWindow::Reduced, hour_secs(REDUCED_WINDOW_END_HOUR))
    } else if at.hour() < REDUCED_WINDOW_START_HOUR {
        (RateWindow::Standard, hour_secs(REDUCED_WINDOW_START_HOUR))
    } else {
        (
            RateWindow::Reduced,
            SECONDS_PER_DAY + hour_secs(REDUCED_WINDOW_END_HOUR),
        )
    };

    RatePeriod {
        window,
        until_boundary: Duration::seconds(boundary_secs - secs),
    }
}
