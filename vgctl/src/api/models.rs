//! Request/response DTOs for the HTTP API.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::provider::JobStatus;
use crate::types::{AccountId, GrantId, RecordId};

/// Body of `POST /api/v1/generations`. The account id is carried in the body
/// because this service sits behind a trusted frontend, mirroring the system
/// it replaces.
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct CreateGenerationRequest {
    #[schema(value_type = uuid::Uuid)]
    pub account_id: AccountId,
    pub model_type: String,
    pub model_version: String,
    pub variant: String,
    pub prompt: String,
    #[serde(default)]
    pub image_url: Option<String>,
    /// Tail frame for first/last-frame interpolation variants.
    #[serde(default)]
    pub tail_image_url: Option<String>,
    /// Source clip for motion-control variants.
    #[serde(default)]
    pub video_url: Option<String>,
    #[serde(default)]
    pub aspect_ratio: Option<String>,
    #[serde(default)]
    pub duration: Option<i32>,
    #[serde(default)]
    pub generate_audio: Option<bool>,
    #[serde(default)]
    pub character_orientation: Option<String>,
    #[serde(default)]
    pub keep_original_sound: Option<bool>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct GenerationAccepted {
    #[schema(value_type = uuid::Uuid)]
    pub record_id: RecordId,
    pub request_id: String,
    #[schema(value_type = String)]
    pub credits_used: Decimal,
    /// `None` when the legacy account balance funded the request.
    #[schema(value_type = Option<uuid::Uuid>)]
    pub funded_by_grant: Option<GrantId>,
}

/// Pagination for history listings.
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(default)]
pub struct Pagination {
    pub skip: i64,
    pub limit: i64,
}

impl Default for Pagination {
    fn default() -> Self {
        Self { skip: 0, limit: 50 }
    }
}

impl Pagination {
    pub fn clamped(&self) -> (i64, i64) {
        (self.skip.max(0), self.limit.clamp(1, 100))
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ProcessingCount {
    pub count: i64,
}

/// Body of `POST /api/v1/status-checks`: a direct provider query that touches
/// neither records nor credits.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct StatusCheckRequest {
    pub request_id: String,
    pub api_key: String,
    /// Provider queue path, e.g. `fal-ai/kling-video/v2.6/pro/text-to-video`.
    pub endpoint: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct StatusCheckResponse {
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue_position: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct UploadResponse {
    pub url: String,
}
