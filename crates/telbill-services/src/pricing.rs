//! Call pricing
//!
//! A call is split at every window boundary it crosses. Each segment is
//! charged for its whole minutes at the rate of its window; the remainder
//! seconds of a segment are dropped before moving on, so truncation happens
//! per segment and never on the call total. The base charge is added once.

use crate::period::{classify, truncate_subsec};
use chrono::{Duration, NaiveDateTime};
use rust_decimal::Decimal;
use telbill_core::models::{RateWindow, TariffSchedule};

/// A stretch of a call inside a single window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    pub start: NaiveDateTime,
    pub duration: Duration,
    pub window: RateWindow,
}

impl Segment {
    /// Whole minutes of the segment
    #[inline]
    pub fn billable_minutes(&self) -> i64 {
        self.duration.num_minutes()
    }

    pub fn charge(&self, schedule: &TariffSchedule) -> Decimal {
        Decimal::from(self.billable_minutes()) * schedule.minute_rate(self.window)
    }
}

/// Split `[start, end]` at window boundaries
///
/// # Panics
///
/// Panics if `end` is before `start`.
pub fn segments(start: NaiveDateTime, end: NaiveDateTime) -> Vec<Segment> {
    assert!(end >= start, "call ends at {} before it starts at {}", end, start);

    let mut current = truncate_subsec(start);
    let mut remaining = truncate_subsec(end) - current;
    let mut out = Vec::with_capacity(2);

    loop {
        let period = classify(current);
        if remaining > period.until_boundary {
            out.push(Segment {
                start: current,
                duration: period.until_boundary,
                window: period.window,
            });
            current += period.until_boundary;
            remaining -= period.until_boundary;
        } else {
            out.push(Segment {
                start: current,
                duration: remaining,
                window: period.window,
            });
            return out;
        }
    }
}

/// Per-minute part of the charge, without the base charge
pub fn minute_charges(start: NaiveDateTime, end: NaiveDateTime, schedule: &TariffSchedule) -> Decimal {
    segments(start, end)
        .iter()
        .map(|segment| segment.charge(schedule))
        .sum()
}

/// Price a call on the wall clock of the billing zone
///
/// # Panics
///
/// Panics if `end` is before `start`.
pub fn price(start: NaiveDateTime, end: NaiveDateTime, schedule: &TariffSchedule) -> Decimal {
    minute_charges(start, end, schedule) + schedule.base_charge
}
