//! Billing DTOs

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use rust_decimal::Decimal;
use serde::Serialize;
use telbill_core::models::{PhoneBill, PhoneNumber};
use telbill_services::MonthlyStatement;

/// One billed call
#[derive(Debug, Clone, Serialize)]
pub struct BillItemResponse {
    pub destination: PhoneNumber,
    pub start_timestamp: DateTime<Utc>,
    /// Start date on the billing wall clock, `YYYY-MM-DD`
    pub call_start_date: String,
    /// Start time on the billing wall clock, `HH:MM:SS`
    pub call_start_time: String,
    /// Seconds
    pub duration: i64,
    /// `XhYmZs`
    pub call_duration: String,
    pub charge: Decimal,
}

impl BillItemResponse {
    pub fn from_bill(bill: &PhoneBill, tz: Tz) -> Self {
        let local = bill.start_timestamp.with_timezone(&tz);

        Self {
            destination: bill.destination.clone(),
            start_timestamp: bill.start_timestamp,
            call_start_date: local.format("%Y-%m-%d").to_string(),
            call_start_time: local.format("%H:%M:%S").to_string(),
            duration: bill.duration,
            call_duration: bill.formatted_duration(),
            charge: bill.charge,
        }
    }
}

/// Monthly statement of a subscriber
#[derive(Debug, Clone, Serialize)]
pub struct StatementResponse {
    pub subscriber: PhoneNumber,
    /// `M/YYYY`
    pub reference_period: String,
    pub total_charge: Decimal,
    pub billed_calls: Vec<BillItemResponse>,
}

impl StatementResponse {
    pub fn new(statement: &MonthlyStatement, tz: Tz) -> Self {
        Self {
            subscriber: statement.subscriber.clone(),
            reference_period: statement.reference_period.label(),
            total_charge: statement.total_charge(),
            billed_calls: statement
                .billed_calls
                .iter()
                .map(|bill| BillItemResponse::from_bill(bill, tz))
                .collect(),
        }
    }
}
