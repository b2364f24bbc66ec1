//! Reference period of a monthly statement
//!
//! A reference period is one calendar month. Callers may name it in several
//! loose formats; when they name none, the month before the current one is
//! billed.

use chrono::{
    DateTime, Datelike, Duration, Month, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc,
};
use chrono_tz::Tz;
use serde::{Serialize, Serializer};
use std::fmt;
use telbill_core::{AppError, AppResult};

/// A calendar month
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ReferencePeriod {
    year: i32,
    month: u32,
}

impl ReferencePeriod {
    /// Build a period, rejecting months outside 1..=12
    ///
    /// The neighbouring months must exist too, so the bounds stay
    /// representable in any zone offset.
    pub fn new(year: i32, month: u32) -> AppResult<Self> {
        let period = Self { year, month };
        let first = NaiveDate::from_ymd_opt(year, month, 1);
        if !(1..=12).contains(&month)
            || first.and_then(|first| first.pred_opt()).is_none()
            || period.next_first_day().is_none()
        {
            return Err(AppError::PeriodParse(format!(
                "{}-{} is not a calendar month",
                year, month
            )));
        }
        Ok(period)
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    /// Calendar month before the one containing `today`
    pub fn previous(today: NaiveDate) -> Self {
        if today.month() == 1 {
            Self {
                year: today.year() - 1,
                month: 12,
            }
        } else {
            Self {
                year: today.year(),
                month: today.month() - 1,
            }
        }
    }

    /// Parse a loosely formatted month
    ///
    /// Accepted, tried in this order:
    ///
    /// - ISO date: `2018-03-15`
    /// - ISO datetime: `2018-03-15T10:00:00Z`, `2018-03-15 10:00:00`
    /// - month number: `6`, `06`
    /// - month abbreviation: `jun`
    /// - `MM-YYYY`, `Mon-YYYY`, `YYYY-Mon`, `MonYYYY`
    ///
    /// Bare months fall in the year of `today`. Abbreviations are
    /// case-insensitive.
    pub fn parse(text: &str, today: NaiveDate) -> AppResult<Self> {
        let text = text.trim();

        if let Some(date) = parse_date(text) {
            return Self::new(date.year(), date.month());
        }

        if let Some(month) = parse_month_number(text).or_else(|| parse_month_abbrev(text)) {
            return Self::new(today.year(), month);
        }

        if let Some((head, tail)) = text.split_once('-') {
            let month_year = parse_month_number(head)
                .or_else(|| parse_month_abbrev(head))
                .zip(parse_year(tail));
            let year_month = parse_year(head).zip(parse_month_abbrev(tail));

            if let Some((month, year)) = month_year.or(year_month.map(|(y, m)| (m, y))) {
                return Self::new(year, month);
            }
        }

        if text.is_char_boundary(3) {
            let (head, tail) = text.split_at(3);
            if let Some((month, year)) = parse_month_abbrev(head).zip(parse_year(tail)) {
                return Self::new(year, month);
            }
        }

        Err(AppError::PeriodParse(format!(
            "{:?} does not name a month",
            text
        )))
    }

    pub fn first_day(&self) -> NaiveDate {
        NaiveDate::from_ymd_opt(self.year, self.month, 1).unwrap_or(NaiveDate::MIN)
    }

    pub fn last_day(&self) -> NaiveDate {
        self.next_first_day()
            .and_then(|next| next.pred_opt())
            .unwrap_or(NaiveDate::MAX)
    }

    fn next_first_day(&self) -> Option<NaiveDate> {
        let (year, month) = if self.month == 12 {
            (self.year.checked_add(1)?, 1)
        } else {
            (self.year, self.month + 1)
        };
        NaiveDate::from_ymd_opt(year, month, 1)
    }

    /// First and last instant of the month on the wall clock of `tz`
    ///
    /// The last instant is the final microsecond of the last day, the
    /// resolution of the record store.
    pub fn bounds(&self, tz: Tz) -> (DateTime<Utc>, DateTime<Utc>) {
        let first = self.first_day().and_time(NaiveTime::MIN);
        let last = self
            .last_day()
            .and_hms_micro_opt(23, 59, 59, 999_999)
            .unwrap_or(NaiveDateTime::MAX);

        (resolve_local(tz, first), resolve_local(tz, last))
    }

    /// `M/YYYY`
    pub fn label(&self) -> String {
        format!("{}/{}", self.month, self.year)
    }
}

impl fmt::Display for ReferencePeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.month, self.year)
    }
}

impl Serialize for ReferencePeriod {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Map a wall-clock time to an instant, stepping past DST gaps
fn resolve_local(tz: Tz, local: NaiveDateTime) -> DateTime<Utc> {
    let mut probe = Some(local);
    for _ in 0..4 {
        let Some(current) = probe else { break };
        if let Some(resolved) = tz.from_local_datetime(&current).earliest() {
            return resolved.with_timezone(&Utc);
        }
        probe = current.checked_add_signed(Duration::minutes(30));
    }
    Utc.from_utc_datetime(&local)
}

fn parse_date(text: &str) -> Option<NaiveDate> {
    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return Some(date);
    }
    if let Ok(datetime) = DateTime::parse_from_rfc3339(text) {
        return Some(datetime.date_naive());
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
        .map(|datetime| datetime.date())
}

fn parse_month_number(text: &str) -> Option<u32> {
    if text.is_empty() || text.len() > 2 || !text.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    text.parse().ok().filter(|m| (1..=12).contains(m))
}

fn parse_month_abbrev(text: &str) -> Option<u32> {
    if text.len() != 3 || !text.bytes().all(|b| b.is_ascii_alphabetic()) {
        return None;
    }
    text.parse::<Month>().ok().map(|m| m.number_from_month())
}

fn parse_year(text: &str) -> Option<i32> {
    if text.len() != 4 || !text.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    text.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2018, 4, 10).unwrap()
    }

    fn parse(text: &str) -> AppResult<ReferencePeriod> {
        ReferencePeriod::parse(text, today())
    }

    fn period(year: i32, month: u32) -> ReferencePeriod {
        ReferencePeriod::new(year, month).unwrap()
    }

    #[test]
    fn test_iso_formats() {
        assert_eq!(parse("2018-03-15").unwrap(), period(2018, 3));
        assert_eq!(parse("2017-12-01T10:00:00Z").unwrap(), period(2017, 12));
        assert_eq!(parse("2017-12-31T23:00:00-03:00").unwrap(), period(2017, 12));
        assert_eq!(parse("2017-11-30 08:15:00").unwrap(), period(2017, 11));
    }

    #[test]
    fn test_bare_month_uses_current_year() {
        assert_eq!(parse("06").unwrap(), period(2018, 6));
        assert_eq!(parse("6").unwrap(), period(2018, 6));
        assert_eq!(parse("Jun").unwrap(), period(2018, 6));
        assert_eq!(parse("DEC").unwrap(), period(2018, 12));
    }

    #[test]
    fn test_month_year_formats() {
        assert_eq!(parse("03-2018").unwrap(), period(2018, 3));
        assert_eq!(parse("mar-2018").unwrap(), period(2018, 3));
        assert_eq!(parse("2018-Mar").unwrap(), period(2018, 3));
        assert_eq!(parse("mar2018").unwrap(), period(2018, 3));
        assert_eq!(parse("Feb2017").unwrap(), period(2017, 2));
    }

    #[test]
    fn test_unparseable() {
        for text in ["abc2017", "", "13", "0", "march-2018", "2018-13", "18-mar", "mar-18", "ção2018"] {
            assert!(
                matches!(parse(text), Err(AppError::PeriodParse(_))),
                "{:?} should not parse",
                text
            );
        }
    }

    #[test]
    fn test_previous_month() {
        assert_eq!(ReferencePeriod::previous(today()), period(2018, 3));
        let january = NaiveDate::from_ymd_opt(2018, 1, 31).unwrap();
        assert_eq!(ReferencePeriod::previous(january), period(2017, 12));
    }

    #[test]
    fn test_label() {
        assert_eq!(period(2018, 3).label(), "3/2018");
        assert_eq!(period(2017, 12).to_string(), "12/2017");
        assert_eq!(serde_json::to_string(&period(2018, 2)).unwrap(), "\"2/2018\"");
    }

    #[test]
    fn test_bounds_utc() {
        let (first, last) = period(2018, 2).bounds(chrono_tz::UTC);
        assert_eq!(first, Utc.with_ymd_and_hms(2018, 2, 1, 0, 0, 0).unwrap());
        assert_eq!(last.date_naive(), NaiveDate::from_ymd_opt(2018, 2, 28).unwrap());
        assert_eq!((last.hour(), last.minute(), last.second()), (23, 59, 59));
        assert!(last < Utc.with_ymd_and_hms(2018, 3, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_bounds_leap_year_and_december() {
        assert_eq!(period(2016, 2).last_day().day(), 29);
        assert_eq!(period(2017, 12).last_day(), NaiveDate::from_ymd_opt(2017, 12, 31).unwrap());
    }

    #[test]
    fn test_edge_of_calendar_rejected() {
        let last_month = NaiveDate::MAX.format("%Y-%m-01").to_string();
        let first_month = NaiveDate::MIN.format("%Y-%m-%d").to_string();

        for text in [
            last_month.clone(),
            format!("{}T10:00:00", last_month),
            first_month,
        ] {
            assert!(
                matches!(parse(&text), Err(AppError::PeriodParse(_))),
                "{:?} should not parse",
                text
            );
        }
        assert!(ReferencePeriod::new(NaiveDate::MAX.year(), 12).is_err());
        assert!(ReferencePeriod::new(NaiveDate::MIN.year(), 1).is_err());
    }

    #[test]
    fn test_bounds_near_edge_of_calendar() {
        let november = NaiveDate::from_ymd_opt(NaiveDate::MAX.year(), 11, 1).unwrap();
        let period = parse(&november.format("%Y-%m-%d").to_string()).unwrap();

        for tz in [chrono_tz::UTC, chrono_tz::America::Sao_Paulo, chrono_tz::Asia::Tokyo] {
            let (first, last) = period.bounds(tz);
            assert!(first < last);
        }
        let (_, last) = period.bounds(chrono_tz::UTC);
        assert_eq!(last.date_naive(), period.last_day());
    }

    #[test]
    fn test_bounds_in_zone() {
        let (first, _) = period(2018, 3).bounds(chrono_tz::America::Sao_Paulo);
        assert_eq!(first, Utc.with_ymd_and_hms(2018, 3, 1, 3, 0, 0).unwrap());
    }
}
