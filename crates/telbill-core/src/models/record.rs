//! Call record model
//!
//! A phone call is stored as two append-only records sharing a `call_id`:
//! a Start record carrying both numbers and an End record carrying none.

use super::phone::PhoneNumber;
use crate::error::AppError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which half of a call a record describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum RecordType {
    Start,
    End,
}

impl RecordType {
    /// Single-letter code used on the wire and in the database
    pub fn code(&self) -> &'static str {
        match self {
            Self::Start => "S",
            Self::End => "E",
        }
    }
}

impl FromStr for RecordType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "s" | "start" => Ok(Self::Start),
            "e" | "end" => Ok(Self::End),
            other => Err(AppError::Structural(format!(
                "unknown record type {:?}",
                other
            ))),
        }
    }
}

impl TryFrom<String> for RecordType {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<RecordType> for String {
    fn from(record_type: RecordType) -> Self {
        record_type.code().to_string()
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Call record entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallRecord {
    /// Store-assigned identifier (0 before persistence)
    #[serde(default)]
    pub id: i64,

    /// Start or End
    #[serde(rename = "type")]
    pub record_type: RecordType,

    /// Instant of the event
    pub timestamp: DateTime<Utc>,

    /// Identifier shared by the Start and End of one call
    pub call_id: i64,

    /// Caller number (Start only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<PhoneNumber>,

    /// Called number (Start only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination: Option<PhoneNumber>,
}

impl CallRecord {
    /// Build an unsaved Start record
    pub fn start(
        call_id: i64,
        timestamp: DateTime<Utc>,
        source: PhoneNumber,
        destination: PhoneNumber,
    ) -> Self {
        Self {
            id: 0,
            record_type: RecordType::Start,
            timestamp,
            call_id,
            source: Some(source),
            destination: Some(destination),
        }
    }

    /// Build an unsaved End record
    pub fn end(call_id: i64, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: 0,
            record_type: RecordType::End,
            timestamp,
            call_id,
            source: None,
            destination: None,
        }
    }

    #[inline]
    pub fn is_start(&self) -> bool {
        self.record_type == RecordType::Start
    }

    #[inline]
    pub fn is_end(&self) -> bool {
        self.record_type == RecordType::End
    }
}

/// A Start record and, once the call is over, its End record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallPair {
    pub start: CallRecord,
    pub end: Option<CallRecord>,
}

impl CallPair {
    /// True while the call has no End record
    #[inline]
    pub fn is_open(&self) -> bool {
        self.end.is_none()
    }

    pub fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.end.as_ref().map(|end| end.timestamp)
    }
}
