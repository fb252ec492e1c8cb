//! HTTP client for the provider's queue API.

use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use serde::Deserialize;
use std::time::Duration;
use tracing::instrument;

use crate::models::ProviderHandle;

use super::{ProviderError, ResultResponse, StatusResponse, SubmitPayload, VideoProvider};

#[derive(Debug, Clone)]
pub struct QueueClient {
    http: reqwest::Client,
    base_url: String,
}

/// Submission response. The callback URLs are optional: older queue paths do
/// not return them and records fall back to reconstructed URLs.
#[derive(Debug, Deserialize)]
struct SubmitResponse {
    request_id: Option<String>,
    status_url: Option<String>,
    response_url: Option<String>,
    cancel_url: Option<String>,
}

impl QueueClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ProviderError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn auth_value(credential: &str) -> String {
        format!("Key {credential}")
    }
}

/// Pull a human-readable message out of a rejection body. The provider puts
/// it under `error` or `detail`, but not consistently.
async fn rejection_message(response: reqwest::Response) -> String {
    let status = response.status();
    let text = response.text().await.unwrap_or_default();

    if let Ok(body) = serde_json::from_str::<serde_json::Value>(&text) {
        for field in ["error", "detail"] {
            match body.get(field) {
                Some(serde_json::Value::String(s)) => return s.clone(),
                Some(other) if !other.is_null() => return other.to_string(),
                _ => {}
            }
        }
    }

    if text.is_empty() { format!("HTTP {status}") } else { text }
}

#[async_trait]
impl VideoProvider for QueueClient {
    #[instrument(skip(self, credential, payload), fields(endpoint))]
    async fn submit(
        &self,
        endpoint: &str,
        credential: &str,
        payload: &SubmitPayload,
    ) -> Result<ProviderHandle, ProviderError> {
        let url = format!("{}/{}", self.base_url, endpoint);
        let response = self
            .http
            .post(&url)
            .header(AUTHORIZATION, Self::auth_value(credential))
            .json(payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::Rejected {
                status: status.as_u16(),
                message: rejection_message(response).await,
            });
        }

        let body: SubmitResponse = response.json().await.map_err(|e| ProviderError::InvalidResponse {
            message: format!("malformed submission response: {e}"),
        })?;
        let request_id = body.request_id.ok_or_else(|| ProviderError::InvalidResponse {
            message: "submission response missing request_id".to_string(),
        })?;

        Ok(ProviderHandle {
            request_id,
            status_url: body.status_url,
            response_url: body.response_url,
            cancel_url: body.cancel_url,
        })
    }

    #[instrument(skip(self, credential))]
    async fn status(&self, url: &str, credential: &str) -> Result<StatusResponse, ProviderError> {
        let response = self
            .http
            .get(url)
            .header(AUTHORIZATION, Self::auth_value(credential))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::Rejected {
                status: status.as_u16(),
                message: rejection_message(response).await,
            });
        }

        response.json().await.map_err(|e| ProviderError::InvalidResponse {
            message: format!("malformed status response: {e}"),
        })
    }

    #[instrument(skip(self, credential))]
    async fn result(&self, url: &str, credential: &str) -> Result<ResultResponse, ProviderError> {
        let response = self
            .http
            .get(url)
            .header(AUTHORIZATION, Self::auth_value(credential))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::Rejected {
                status: status.as_u16(),
                message: rejection_message(response).await,
            });
        }

        response.json().await.map_err(|e| ProviderError::InvalidResponse {
            message: format!("malformed result response: {e}"),
        })
    }

    fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::JobStatus;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> QueueClient {
        // reqwest is built with rustls-no-provider; the binary installs the
        // provider in main, tests have to do it themselves.
        let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
        QueueClient::new(server.uri(), Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn submit_returns_queue_handle() {
        let server = MockServer::start().await;
        let payload = SubmitPayload {
            prompt: "waves at dusk".to_string(),
            duration: Some("5".to_string()),
            ..Default::default()
        };

        Mock::given(method("POST"))
            .and(path("/fal-ai/kling-video/v2.6/pro/text-to-video"))
            .and(header("authorization", "Key test-key"))
            .and(body_json(&payload))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "request_id": "req-123",
                "status_url": "https://queue.example/requests/req-123/status",
                "response_url": "https://queue.example/requests/req-123",
                "cancel_url": "https://queue.example/requests/req-123/cancel",
            })))
            .expect(1)
            .mount(&server)
            .await;

        let handle = client(&server)
            .submit("fal-ai/kling-video/v2.6/pro/text-to-video", "test-key", &payload)
            .await
            .unwrap();
        assert_eq!(handle.request_id, "req-123");
        assert_eq!(handle.status_url.as_deref(), Some("https://queue.example/requests/req-123/status"));
    }

    #[tokio::test]
    async fn submit_rejection_extracts_detail_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(422).set_body_json(serde_json::json!({
                "detail": "image_url is required for image-to-video",
            })))
            .mount(&server)
            .await;

        let err = client(&server)
            .submit("fal-ai/kling-video/v2.6/pro/image-to-video", "k", &SubmitPayload::default())
            .await
            .unwrap_err();
        match err {
            ProviderError::Rejected { status, message } => {
                assert_eq!(status, 422);
                assert_eq!(message, "image_url is required for image-to-video");
            }
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn submit_without_request_id_is_invalid() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .mount(&server)
            .await;

        let err = client(&server)
            .submit("fal-ai/kling-video/v2.6/pro/text-to-video", "k", &SubmitPayload::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::InvalidResponse { .. }));
    }

    #[tokio::test]
    async fn status_and_result_round_trip() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/requests/req-9/status"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "IN_PROGRESS",
                "queue_position": 2,
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/requests/req-9"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "video": { "url": "https://cdn.example/req-9.mp4" },
            })))
            .mount(&server)
            .await;

        let c = client(&server);
        let status = c.status(&format!("{}/requests/req-9/status", server.uri()), "k").await.unwrap();
        assert_eq!(status.status, JobStatus::InProgress);
        assert_eq!(status.queue_position, Some(2));

        let result = c.result(&format!("{}/requests/req-9", server.uri()), "k").await.unwrap();
        assert_eq!(result.video_url(), Some("https://cdn.example/req-9.mp4"));
    }
}
