//! Call record handlers

use crate::dto::{ApiResponse, RecordRequest, RecordResponse};
use crate::state::AppState;
use actix_web::{web, HttpRequest, HttpResponse};
use telbill_core::traits::Repository;
use telbill_core::AppError;
use tracing::{debug, info, instrument, warn};

/// Validate and store a call record
///
/// POST /api/v1/records
#[instrument(skip(state, req), fields(call_id = req.call_id, record_type = %req.record_type))]
pub async fn create_record(
    state: web::Data<AppState>,
    req: web::Json<RecordRequest>,
) -> Result<HttpResponse, AppError> {
    let record = req.to_record()?;

    let created = state.records.create(&record).await.map_err(|e| {
        if e.is_rejection() {
            warn!("Record rejected: {}", e);
        }
        e
    })?;

    info!(id = created.id, "Record stored");
    Ok(HttpResponse::Created().json(ApiResponse::success(RecordResponse::from(created))))
}

/// Fetch a stored record
///
/// GET /api/v1/records/{id}
#[instrument(skip(state))]
pub async fn get_record(
    state: web::Data<AppState>,
    path: web::Path<i64>,
) -> Result<HttpResponse, AppError> {
    let id = path.into_inner();
    debug!("Fetching record {}", id);

    let record = state
        .records
        .find_by_id(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Record {} not found", id)))?;

    Ok(HttpResponse::Ok().json(ApiResponse::success(RecordResponse::from(record))))
}

async fn method_not_allowed(req: HttpRequest) -> Result<HttpResponse, AppError> {
    Err(AppError::MethodNotAllowed(format!(
        "{} is not supported on {}",
        req.method(),
        req.path()
    )))
}

/// Configure record routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("/records")
            .route(web::post().to(create_record))
            .default_service(web::to(method_not_allowed)),
    )
    .route("/records/{id}", web::get().to(get_record));
}
