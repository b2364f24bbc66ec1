//! Call record consistency validation
//!
//! Every record goes through [`validate_record`] before it is persisted.
//! Checks run in a fixed order and the first failure is returned:
//!
//! 1. structure of the record itself
//! 2. uniqueness of its keys against the store
//! 3. End records: the referenced Start exists and precedes it
//! 4. Start records: the source has no open or later-ending call
//!
//! The store is only read through [`CallRecordReader`]; callers are
//! responsible for running validation and insertion atomically.

use crate::error::AppError;
use crate::models::{CallRecord, PhoneNumber, RecordType};
use crate::traits::CallRecordReader;
use crate::AppResult;
use tracing::{debug, instrument};

/// Validate a candidate record against the existing record set
#[instrument(
    skip(candidate, reader),
    fields(call_id = candidate.call_id, record_type = %candidate.record_type)
)]
pub async fn validate_record<R>(candidate: &CallRecord, reader: &R) -> AppResult<()>
where
    R: CallRecordReader + ?Sized,
{
    check_structure(candidate)?;
    check_uniqueness(candidate, reader).await?;

    match candidate.record_type {
        RecordType::End => check_reference(candidate, reader).await?,
        RecordType::Start => check_overlap(candidate, reader).await?,
    }

    debug!("Record accepted");
    Ok(())
}

/// Shape checks that need no store access
pub fn check_structure(candidate: &CallRecord) -> AppResult<()> {
    if candidate.call_id < 0 {
        return Err(AppError::Structural(format!(
            "call_id must not be negative, got {}",
            candidate.call_id
        )));
    }

    match candidate.record_type {
        RecordType::Start => {
            let (source, destination) = start_numbers(candidate)?;
            if source == destination {
                return Err(AppError::Structural(format!(
                    "source and destination are both {}",
                    source
                )));
            }
        }
        RecordType::End => {
            if candidate.source.is_some() || candidate.destination.is_some() {
                return Err(AppError::Structural(
                    "end records must not carry source or destination".to_string(),
                ));
            }
        }
    }

    Ok(())
}

fn start_numbers(candidate: &CallRecord) -> AppResult<(&PhoneNumber, &PhoneNumber)> {
    match (&candidate.source, &candidate.destination) {
        (Some(source), Some(destination)) => Ok((source, destination)),
        (None, _) => Err(AppError::Structural(
            "start records require a source".to_string(),
        )),
        (_, None) => Err(AppError::Structural(
            "start records require a destination".to_string(),
        )),
    }
}

async fn check_uniqueness<R>(candidate: &CallRecord, reader: &R) -> AppResult<()>
where
    R: CallRecordReader + ?Sized,
{
    if let Some(existing) = reader
        .find_by_call(candidate.record_type, candidate.call_id)
        .await?
    {
        return Err(AppError::Uniqueness(format!(
            "call {} already has a {} record (id {})",
            candidate.call_id, candidate.record_type, existing.id
        )));
    }

    if reader
        .exists_for_call_at(candidate.call_id, candidate.timestamp)
        .await?
    {
        return Err(AppError::Uniqueness(format!(
            "call {} already has a record at {}",
            candidate.call_id, candidate.timestamp
        )));
    }

    if let Some(source) = &candidate.source {
        if reader
            .exists_from_source_at(source, candidate.timestamp)
            .await?
        {
            return Err(AppError::Uniqueness(format!(
                "{} is already calling at {}",
                source, candidate.timestamp
            )));
        }
    }

    if let Some(destination) = &candidate.destination {
        if reader
            .exists_to_destination_at(destination, candidate.timestamp)
            .await?
        {
            return Err(AppError::Uniqueness(format!(
                "{} is already being called at {}",
                destination, candidate.timestamp
            )));
        }
    }

    Ok(())
}

async fn check_reference<R>(candidate: &CallRecord, reader: &R) -> AppResult<()>
where
    R: CallRecordReader + ?Sized,
{
    let start = reader
        .find_by_call(RecordType::Start, candidate.call_id)
        .await?
        .ok_or_else(|| {
            AppError::Referential(format!(
                "no start record for call {}",
                candidate.call_id
            ))
        })?;

    if start.timestamp >= candidate.timestamp {
        return Err(AppError::Temporal(format!(
            "call {} ends at {} but started at {}",
            candidate.call_id, candidate.timestamp, start.timestamp
        )));
    }

    Ok(())
}

async fn check_overlap<R>(candidate: &CallRecord, reader: &R) -> AppResult<()>
where
    R: CallRecordReader + ?Sized,
{
    let (source, _) = start_numbers(candidate)?;

    for call in reader.calls_from_source(source).await? {
        match call.ended_at() {
            None => {
                return Err(AppError::Temporal(format!(
                    "{} still has call {} in progress",
                    source, call.start.call_id
                )));
            }
            Some(ended_at) if ended_at >= candidate.timestamp => {
                return Err(AppError::Temporal(format!(
                    "{} has call {} ending at {}, not before {}",
                    source, call.start.call_id, ended_at, candidate.timestamp
                )));
            }
            Some(_) => {}
        }
    }

    Ok(())
}
