//! Billing handlers
//!
//! Statements are computed on demand. The subscriber number is checked
//! before any store access.

use crate::dto::{ApiResponse, StatementResponse};
use crate::state::AppState;
use actix_web::{web, HttpResponse};
use telbill_core::models::PhoneNumber;
use telbill_core::AppError;
use telbill_services::ReferencePeriod;
use tracing::{debug, instrument};

/// Statement for the previous month
///
/// GET /api/v1/billing/{subscriber}
#[instrument(skip(state))]
pub async fn get_current_statement(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let subscriber = PhoneNumber::parse(&path.into_inner())?;
    let period = state.billing.resolve_period(None)?;

    statement(&state, &subscriber, period).await
}

/// Statement for a named month
///
/// GET /api/v1/billing/{subscriber}/{period}
#[instrument(skip(state))]
pub async fn get_statement(
    state: web::Data<AppState>,
    path: web::Path<(String, String)>,
) -> Result<HttpResponse, AppError> {
    let (subscriber, period) = path.into_inner();
    let subscriber = PhoneNumber::parse(&subscriber)?;
    let period = state.billing.resolve_period(Some(&period))?;

    statement(&state, &subscriber, period).await
}

async fn statement(
    state: &AppState,
    subscriber: &PhoneNumber,
    period: ReferencePeriod,
) -> Result<HttpResponse, AppError> {
    let statement = state.billing.monthly_statement(subscriber, period).await?;
    debug!(
        calls = statement.billed_calls.len(),
        "Statement assembled for {} in {}",
        subscriber,
        period
    );

    let response = StatementResponse::new(&statement, state.billing.timezone());
    Ok(HttpResponse::Ok().json(ApiResponse::success(response)))
}

/// Configure billing routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/billing")
            .route("/{subscriber}", web::get().to(get_current_statement))
            .route("/{subscriber}/{period}", web::get().to(get_statement)),
    );
}
