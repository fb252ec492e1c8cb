//! HTTP API layer.
//!
//! - **[`handlers`]**: axum route handlers
//! - **[`models`]**: request/response DTOs
//!
//! Routes live under `/api/v1`. Every endpoint carries OpenAPI annotations;
//! the rendered docs are served at `/docs` and the raw document at
//! `/api-docs/openapi.json`.

pub mod handlers;
pub mod models;

use axum::Router;
use axum::routing::{get, post};
use utoipa::OpenApi;

use crate::AppState;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "vgctl",
        description = "Credit-metered frontend for queue-based video generation"
    ),
    paths(
        handlers::generations::submit_generation,
        handlers::generations::list_generations,
        handlers::generations::processing_count,
        handlers::status::check_status,
        handlers::status::trigger_reconcile,
        handlers::uploads::upload_asset,
    ),
    tags(
        (name = "generations", description = "Submission and history"),
        (name = "status", description = "Provider status checks and reconciliation"),
        (name = "uploads", description = "Input asset uploads"),
    )
)]
pub struct ApiDoc;

/// All `/api/v1` routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/v1/generations", post(handlers::generations::submit_generation))
        .route(
            "/api/v1/accounts/{account_id}/generations",
            get(handlers::generations::list_generations),
        )
        .route(
            "/api/v1/accounts/{account_id}/generations/processing-count",
            get(handlers::generations::processing_count),
        )
        .route("/api/v1/status-checks", post(handlers::status::check_status))
        .route("/api/v1/reconcile", post(handlers::status::trigger_reconcile))
        .route("/api/v1/uploads", post(handlers::uploads::upload_asset))
}
