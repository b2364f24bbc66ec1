//! Tariff schedule handlers

use crate::dto::{ApiResponse, PaginationParams, TariffCreateRequest, TariffResponse};
use crate::state::AppState;
use actix_web::{web, HttpResponse};
use telbill_core::traits::Repository;
use telbill_core::AppError;
use tracing::{debug, info, instrument, warn};
use validator::Validate;

/// List tariff schedules with pagination
///
/// GET /api/v1/tariffs
#[instrument(skip(state))]
pub async fn list_tariffs(
    state: web::Data<AppState>,
    query: web::Query<PaginationParams>,
) -> Result<HttpResponse, AppError> {
    query.validate().map_err(|e| {
        warn!("Pagination validation failed: {}", e);
        AppError::Validation(e.to_string())
    })?;

    debug!(page = query.page, per_page = query.per_page, "Listing tariffs");

    let schedules = state.tariffs.find_all(query.limit(), query.offset()).await?;
    let total = state.tariffs.count().await?;

    let data: Vec<TariffResponse> = schedules.into_iter().map(TariffResponse::from).collect();
    Ok(HttpResponse::Ok().json(query.paginate(data, total)))
}

/// Create a tariff schedule
///
/// POST /api/v1/tariffs
#[instrument(skip(state, req), fields(effective_from = %req.effective_from))]
pub async fn create_tariff(
    state: web::Data<AppState>,
    req: web::Json<TariffCreateRequest>,
) -> Result<HttpResponse, AppError> {
    let schedule = req.to_schedule()?;
    let created = state.tariffs.create(&schedule).await?;

    info!(id = created.id, "Tariff schedule created");
    Ok(HttpResponse::Created().json(ApiResponse::with_message(
        TariffResponse::from(created),
        "Tariff schedule created",
    )))
}

/// Get one tariff schedule
///
/// GET /api/v1/tariffs/{id}
#[instrument(skip(state))]
pub async fn get_tariff(
    state: web::Data<AppState>,
    path: web::Path<i32>,
) -> Result<HttpResponse, AppError> {
    let id = path.into_inner();

    let schedule = state
        .tariffs
        .find_by_id(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Tariff schedule {} not found", id)))?;

    Ok(HttpResponse::Ok().json(ApiResponse::success(TariffResponse::from(schedule))))
}

/// Configure tariff routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/tariffs")
            .route("", web::get().to(list_tariffs))
            .route("", web::post().to(create_tariff))
            .route("/{id}", web::get().to(get_tariff)),
    );
}
