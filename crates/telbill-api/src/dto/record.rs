//! Call record DTOs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use telbill_core::models::{CallRecord, PhoneNumber, RecordType};
use telbill_core::{AppError, AppResult};
use validator::Validate;

/// Call record submission
///
/// Numbers and the record type arrive as plain strings so their errors can
/// be reported with the right classification.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RecordRequest {
    /// `S`/`E`, or `start`/`end`
    #[serde(rename = "type")]
    pub record_type: String,

    pub timestamp: DateTime<Utc>,

    #[validate(range(min = 0, message = "call_id must not be negative"))]
    pub call_id: i64,

    #[serde(default)]
    pub source: Option<String>,

    #[serde(default)]
    pub destination: Option<String>,
}

impl RecordRequest {
    /// Convert to an unsaved CallRecord
    pub fn to_record(&self) -> AppResult<CallRecord> {
        self.validate()
            .map_err(|e| AppError::Structural(e.to_string()))?;

        let parse_number = |raw: &Option<String>| raw.as_deref().map(PhoneNumber::parse).transpose();

        Ok(CallRecord {
            id: 0,
            record_type: self.record_type.parse::<RecordType>()?,
            timestamp: self.timestamp,
            call_id: self.call_id,
            source: parse_number(&self.source)?,
            destination: parse_number(&self.destination)?,
        })
    }
}

/// Stored call record
#[derive(Debug, Clone, Serialize)]
pub struct RecordResponse {
    pub id: i64,
    #[serde(rename = "type")]
    pub record_type: RecordType,
    pub timestamp: DateTime<Utc>,
    pub call_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<PhoneNumber>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination: Option<PhoneNumber>,
}

impl From<CallRecord> for RecordResponse {
    fn from(record: CallRecord) -> Self {
        Self {
            id: record.id,
            record_type: record.record_type,
            timestamp: record.timestamp,
            call_id: record.call_id,
            source: record.source,
            destination: record.destination,
        }
    }
}
