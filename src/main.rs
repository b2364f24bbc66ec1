//! Telbill server
//!
//! Accepts call records over HTTP, validates them against the stored call
//! history and serves monthly phone bill statements.

use actix_cors::Cors;
use actix_web::{http::header, middleware, web, App, HttpResponse, HttpServer};
use anyhow::Context;
use std::sync::Arc;
use std::time::Duration;
use telbill_api::{configure_api, handlers::health_check, json_config, AppState};
use telbill_cache::Cache;
use telbill_core::config::{AppConfig, LoggingConfig};
use telbill_core::AppError;
use telbill_db::{create_pool, run_migrations};
use tracing::{info, warn};
use tracing_actix_web::TracingLogger;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize tracing/logging
fn init_tracing(config: &LoggingConfig) {
    let level = &config.level;

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "telbill={level},telbill_api={level},telbill_db={level},telbill_services={level},\
             telbill_cache={level},actix_web=info,sqlx=warn"
        ))
    });

    let registry = tracing_subscriber::registry().with(env_filter);

    if config.is_json() {
        registry
            .with(fmt::layer().json().with_current_span(true))
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_file(true)
                    .with_line_number(true),
            )
            .init();
    }
}

/// Build the application state from the configured backends
async fn build_state(config: &AppConfig) -> anyhow::Result<AppState> {
    let connected = match Cache::connect(config.redis.url.as_deref()).await {
        Ok(cache) => cache.ping().await.map(|_| cache),
        Err(e) => Err(e),
    };
    let cache = match connected {
        Ok(cache) => cache,
        Err(e) => {
            warn!("Redis unavailable ({}), caching bills in memory", e);
            Cache::connect(None).await?
        }
    };
    info!("Bill cache backend: {}", cache.backend());
    let cache = Arc::new(cache);

    let state = match config.database.url.as_deref() {
        Some(url) => {
            info!("Connecting to database...");
            let pool = create_pool(url, &config.database)
                .await
                .context("Failed to create database pool")?;

            if config.database.run_migrations {
                run_migrations(&pool)
                    .await
                    .context("Failed to run migrations")?;
            }

            info!(
                "Database connection established with {} max connections",
                config.database.max_connections
            );
            AppState::postgres(pool, cache, &config.billing)?
        }
        None => {
            warn!("No database URL configured, records are kept in memory only");
            AppState::in_memory(cache, &config.billing)?
        }
    };

    Ok(state)
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    let config = AppConfig::load().context("Failed to load configuration")?;
    init_tracing(&config.logging);

    info!("Starting Telbill v{}", env!("CARGO_PKG_VERSION"));

    let state = web::Data::new(build_state(&config).await?);
    info!("Billing time zone: {}", state.billing.timezone());

    let bind_addr = config.server_addr();
    let workers = config.server.workers.max(1);
    let cors_origins = config.server.cors_origins.clone();
    info!(
        "Starting HTTP server on {} with {} workers",
        bind_addr, workers
    );

    HttpServer::new(move || {
        let cors_origins_inner = cors_origins.clone();
        let cors = Cors::default()
            .allowed_origin_fn(move |origin, _req_head| {
                origin
                    .to_str()
                    .map(|origin| cors_origins_inner.split(',').any(|o| o.trim() == origin))
                    .unwrap_or(false)
            })
            .allowed_methods(vec!["GET", "POST", "OPTIONS"])
            .allowed_headers(vec![header::ACCEPT, header::CONTENT_TYPE])
            .max_age(3600);

        App::new()
            .app_data(state.clone())
            .app_data(json_config())
            .app_data(web::QueryConfig::default().error_handler(|err, _req| {
                AppError::InvalidInput(err.to_string()).into()
            }))
            // Middleware
            .wrap(cors)
            .wrap(TracingLogger::default())
            .wrap(middleware::Compress::default())
            .wrap(middleware::NormalizePath::trim())
            .configure(configure_api)
            .route("/health", web::get().to(health_check))
            .route(
                "/",
                web::get().to(|| async {
                    HttpResponse::Found()
                        .append_header(("Location", "/api/v1/health"))
                        .finish()
                }),
            )
    })
    .workers(workers)
    .client_request_timeout(Duration::from_secs(config.server.timeout_secs))
    .bind(&bind_addr)
    .with_context(|| format!("Failed to bind {}", bind_addr))?
    .run()
    .await?;

    Ok(())
}
