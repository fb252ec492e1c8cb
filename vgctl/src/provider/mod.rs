//! Queue-based video provider contract.
//!
//! The provider exposes three operations: submit a job to a model queue path,
//! poll its status, and fetch the finished result. The trait seam exists so
//! the pipeline and reconciler can run against a scripted provider in tests.

pub mod endpoint;
pub mod queue;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::ProviderHandle;

pub use endpoint::queue_path;
pub use queue::QueueClient;

/// Default queue base URL.
pub const DEFAULT_BASE_URL: &str = "https://queue.fal.run";

#[derive(Error, Debug)]
pub enum ProviderError {
    /// The provider answered with a non-success status and (usually) an error body
    #[error("provider rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// The provider could not be reached or the connection broke
    #[error(transparent)]
    Transport(#[from] reqwest::Error),

    /// A success response that does not match the expected shape
    #[error("invalid provider response: {message}")]
    InvalidResponse { message: String },
}

/// Job submission payload. Optional fields are omitted from the wire entirely
/// rather than sent as null; the provider treats explicit nulls as invalid.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SubmitPayload {
    pub prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tail_image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aspect_ratio: Option<String>,
    /// The provider expects the duration as a string, not a number.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generate_audio: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub character_orientation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keep_original_sound: Option<bool>,
}

/// Provider-side job state. Unrecognized values deserialize to [`JobStatus::Other`]
/// and are treated as still running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Queued,
    InProgress,
    Completed,
    Failed,
    Cancelled,
    #[serde(other)]
    Other,
}

impl JobStatus {
    /// Terminal failure states that trigger a refund.
    pub fn is_failure(&self) -> bool {
        matches!(self, JobStatus::Failed | JobStatus::Cancelled)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StatusResponse {
    pub status: JobStatus,
    pub queue_position: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResultResponse {
    pub video: Option<VideoOutput>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VideoOutput {
    pub url: String,
}

impl ResultResponse {
    pub fn video_url(&self) -> Option<&str> {
        self.video.as_ref().map(|v| v.url.as_str())
    }
}

#[async_trait]
pub trait VideoProvider: Send + Sync {
    /// Submit a job to the queue path for a model.
    async fn submit(&self, endpoint: &str, credential: &str, payload: &SubmitPayload)
    -> Result<ProviderHandle, ProviderError>;

    /// Poll the status URL of a submitted job.
    async fn status(&self, url: &str, credential: &str) -> Result<StatusResponse, ProviderError>;

    /// Fetch the result of a completed job.
    async fn result(&self, url: &str, credential: &str) -> Result<ResultResponse, ProviderError>;

    /// Base URL used to reconstruct callback URLs for records that predate
    /// the provider returning them.
    fn base_url(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_omits_unset_fields() {
        let payload = SubmitPayload {
            prompt: "a fox in the snow".to_string(),
            aspect_ratio: Some("16:9".to_string()),
            duration: Some("5".to_string()),
            generate_audio: Some(false),
            ..Default::default()
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "prompt": "a fox in the snow",
                "aspect_ratio": "16:9",
                "duration": "5",
                "generate_audio": false,
            })
        );
    }

    #[test]
    fn unknown_status_maps_to_other() {
        let parsed: StatusResponse = serde_json::from_value(serde_json::json!({
            "status": "IN_QUEUE_REBALANCING",
            "queue_position": 4,
        }))
        .unwrap();
        assert_eq!(parsed.status, JobStatus::Other);
        assert!(!parsed.status.is_failure());
    }

    #[test]
    fn failure_states() {
        assert!(JobStatus::Failed.is_failure());
        assert!(JobStatus::Cancelled.is_failure());
        assert!(!JobStatus::Completed.is_failure());
        assert!(!JobStatus::Queued.is_failure());
        assert!(!JobStatus::InProgress.is_failure());
    }
}
