//! Generation submission and history handlers.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::Json;

use crate::AppState;
use crate::api::models::{CreateGenerationRequest, GenerationAccepted, Pagination, ProcessingCount};
use crate::errors::Error;
use crate::models::GenerationRecord;
use crate::pipeline::GenerationRequest;
use crate::types::AccountId;

/// Submit a video generation job
///
/// Resolves the price for the requested model, debits a funding source and
/// forwards the job to the provider queue. Credits are refunded automatically
/// if the provider rejects the submission.
#[utoipa::path(
    post,
    path = "/api/v1/generations",
    request_body = CreateGenerationRequest,
    responses(
        (status = 201, description = "Job accepted by the provider queue", body = GenerationAccepted),
        (status = 400, description = "Invalid request or unsupported model configuration"),
        (status = 402, description = "No funding source can cover the request"),
        (status = 403, description = "Model access denied for this account"),
        (status = 404, description = "Account not found"),
        (status = 429, description = "Too many jobs already processing"),
        (status = 502, description = "Provider rejected or unreachable"),
    ),
    tag = "generations",
)]
#[tracing::instrument(skip_all, fields(account_id = %request.account_id))]
pub async fn submit_generation(
    State(state): State<AppState>,
    Json(request): Json<CreateGenerationRequest>,
) -> Result<(StatusCode, Json<GenerationAccepted>), Error> {
    let outcome = state
        .pipeline
        .submit(GenerationRequest {
            account_id: request.account_id,
            model_type: request.model_type,
            model_version: request.model_version,
            variant: request.variant,
            prompt: request.prompt,
            image_url: request.image_url,
            tail_image_url: request.tail_image_url,
            video_url: request.video_url,
            aspect_ratio: request.aspect_ratio,
            duration: request.duration,
            generate_audio: request.generate_audio,
            character_orientation: request.character_orientation,
            keep_original_sound: request.keep_original_sound,
        })
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(GenerationAccepted {
            record_id: outcome.record_id,
            request_id: outcome.request_id,
            credits_used: outcome.credits_used,
            funded_by_grant: outcome.funded_by_grant,
        }),
    ))
}

/// List an account's generation records, newest first
#[utoipa::path(
    get,
    path = "/api/v1/accounts/{account_id}/generations",
    params(
        ("account_id" = uuid::Uuid, Path, description = "Account id"),
        ("skip" = Option<i64>, Query, description = "Rows to skip"),
        ("limit" = Option<i64>, Query, description = "Page size, clamped to 100"),
    ),
    responses(
        (status = 200, description = "Generation records", body = Vec<GenerationRecord>),
    ),
    tag = "generations",
)]
#[tracing::instrument(skip_all, fields(account_id = %account_id))]
pub async fn list_generations(
    State(state): State<AppState>,
    Path(account_id): Path<AccountId>,
    Query(pagination): Query<Pagination>,
) -> Result<Json<Vec<GenerationRecord>>, Error> {
    let (skip, limit) = pagination.clamped();
    let records = state.storage.history(account_id, skip, limit).await?;
    Ok(Json(records))
}

/// Count an account's in-flight generations
#[utoipa::path(
    get,
    path = "/api/v1/accounts/{account_id}/generations/processing-count",
    params(
        ("account_id" = uuid::Uuid, Path, description = "Account id"),
    ),
    responses(
        (status = 200, description = "Number of records still processing", body = ProcessingCount),
    ),
    tag = "generations",
)]
#[tracing::instrument(skip_all, fields(account_id = %account_id))]
pub async fn processing_count(
    State(state): State<AppState>,
    Path(account_id): Path<AccountId>,
) -> Result<Json<ProcessingCount>, Error> {
    let count = state.storage.count_processing(account_id).await?;
    Ok(Json(ProcessingCount { count }))
}
