//! HTTP request handlers

pub mod billing;
pub mod health;
pub mod record;
pub mod tariff;

pub use billing::configure as configure_billing;
pub use health::health_check;
pub use record::configure as configure_records;
pub use tariff::configure as configure_tariffs;

use actix_web::error::JsonPayloadError;
use actix_web::web;
use telbill_core::AppError;
use tracing::warn;

/// Request body limit for JSON payloads
const JSON_LIMIT_BYTES: usize = 64 * 1024;

/// Register every route under `/api/v1`
pub fn configure_api(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .route("/health", web::get().to(health_check))
            .configure(configure_records)
            .configure(configure_billing)
            .configure(configure_tariffs),
    );
}

/// JSON extractor settings
///
/// Body errors are reported through `AppError` so they share the error body
/// of every other rejection.
pub fn json_config() -> web::JsonConfig {
    web::JsonConfig::default()
        .limit(JSON_LIMIT_BYTES)
        .error_handler(|err, _req| {
            warn!("Rejected JSON body: {}", err);
            let app_err = match err {
                JsonPayloadError::ContentType => {
                    AppError::UnsupportedMediaType("Expected application/json".to_string())
                }
                JsonPayloadError::Deserialize(e) => AppError::Structural(e.to_string()),
                other => AppError::InvalidInput(other.to_string()),
            };
            app_err.into()
        })
}
