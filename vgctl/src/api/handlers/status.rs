//! Direct status checks and the reconciliation trigger.

use axum::extract::State;
use axum::response::Json;

use crate::AppState;
use crate::api::models::{StatusCheckRequest, StatusCheckResponse};
use crate::errors::Error;
use crate::provider::JobStatus;
use crate::reconciler::ReconcileReport;

/// Check a queued job directly against the provider
///
/// Polls the provider with a caller-supplied credential. Touches neither
/// generation records nor credits; refunds only ever happen through the
/// reconciler.
#[utoipa::path(
    post,
    path = "/api/v1/status-checks",
    request_body = StatusCheckRequest,
    responses(
        (status = 200, description = "Current provider-side status", body = StatusCheckResponse),
        (status = 502, description = "Provider rejected or unreachable"),
    ),
    tag = "status",
)]
#[tracing::instrument(skip_all, fields(request_id = %request.request_id, endpoint = %request.endpoint))]
pub async fn check_status(
    State(state): State<AppState>,
    Json(request): Json<StatusCheckRequest>,
) -> Result<Json<StatusCheckResponse>, Error> {
    let base = state.provider.base_url();
    let status_url = format!("{}/{}/requests/{}/status", base, request.endpoint, request.request_id);

    let status = state.provider.status(&status_url, &request.api_key).await?;

    let video_url = if status.status == JobStatus::Completed {
        let result_url = format!("{}/{}/requests/{}", base, request.endpoint, request.request_id);
        let result = state.provider.result(&result_url, &request.api_key).await?;
        result.video_url().map(str::to_string)
    } else {
        None
    };

    Ok(Json(StatusCheckResponse {
        status: status.status,
        queue_position: status.queue_position,
        video_url,
    }))
}

/// Run one reconciliation sweep immediately
///
/// Same sweep the background loop runs on its interval. Useful for operator
/// tooling and for environments that drive reconciliation from an external
/// scheduler instead of the built-in loop.
#[utoipa::path(
    post,
    path = "/api/v1/reconcile",
    responses(
        (status = 200, description = "Sweep summary", body = ReconcileReport),
        (status = 500, description = "Sweep could not be started"),
    ),
    tag = "status",
)]
#[tracing::instrument(skip_all)]
pub async fn trigger_reconcile(State(state): State<AppState>) -> Result<Json<ReconcileReport>, Error> {
    let report = state.reconciler.reconcile_once().await?;
    Ok(Json(report))
}
