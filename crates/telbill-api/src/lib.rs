//! API layer for Telbill
//!
//! HTTP handlers for call record ingestion, monthly billing statements and
//! tariff administration.

#![forbid(unsafe_code)]

pub mod dto;
pub mod handlers;
pub mod state;

pub use dto::{ApiResponse, PaginationParams};
pub use handlers::{configure_api, json_config};
pub use state::AppState;
