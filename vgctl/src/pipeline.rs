//! Generation request pipeline: policy checks, quoting, debit-then-submit.
//!
//! Ordering is the contract here. Money moves only after every check passes,
//! the record is created in the same transaction as the debit, and a provider
//! failure after the debit refunds the exact reserved amount back to the same
//! source. A record this pipeline returns is always `processing`; terminal
//! transitions belong to the reconciler.

use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

use crate::errors::{Error, Result};
use crate::funding::{self, FundingSource};
use crate::models::NewGeneration;
use crate::policy;
use crate::pricing::{self, PriceKey};
use crate::provider::{SubmitPayload, VideoProvider, queue_path};
use crate::storage::Storage;
use crate::types::{AccountId, GrantId, RecordId, abbrev_uuid};

/// A validated submission request, as accepted by the API layer.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub account_id: AccountId,
    pub model_type: String,
    pub model_version: String,
    pub variant: String,
    pub prompt: String,
    pub image_url: Option<String>,
    pub tail_image_url: Option<String>,
    pub video_url: Option<String>,
    pub aspect_ratio: Option<String>,
    pub duration: Option<i32>,
    pub generate_audio: Option<bool>,
    pub character_orientation: Option<String>,
    pub keep_original_sound: Option<bool>,
}

/// What the caller gets back from a successful submission.
#[derive(Debug, Clone)]
pub struct SubmitOutcome {
    pub record_id: RecordId,
    pub request_id: String,
    pub credits_used: Decimal,
    /// `None` when the legacy account balance funded the request.
    pub funded_by_grant: Option<GrantId>,
}

pub struct GenerationPipeline {
    storage: Arc<dyn Storage>,
    provider: Arc<dyn VideoProvider>,
}

impl GenerationPipeline {
    pub fn new(storage: Arc<dyn Storage>, provider: Arc<dyn VideoProvider>) -> Self {
        Self { storage, provider }
    }

    #[instrument(skip(self, request), fields(account_id = %request.account_id, variant = %request.variant))]
    pub async fn submit(&self, request: GenerationRequest) -> Result<SubmitOutcome> {
        let storage = self.storage.as_ref();

        let account = storage
            .get_account(request.account_id)
            .await?
            .ok_or_else(|| Error::NotFound {
                resource: "Account".to_string(),
                id: request.account_id.to_string(),
            })?;

        policy::check_access(storage, &account, &request.model_version, &request.variant).await?;
        policy::check_concurrency(storage, &account).await?;

        let audio_enabled = request.generate_audio.unwrap_or(false);
        let duration = request.duration.unwrap_or(0);

        let key = PriceKey::for_request(
            &request.model_type,
            &request.model_version,
            &request.variant,
            account.role,
            duration,
            audio_enabled,
        );
        let quote = pricing::resolve_quote(storage, &key, duration)
            .await?
            .ok_or(Error::InvalidConfig)?;

        // Resolve the queue path before any money moves.
        let endpoint = queue_path(&request.model_version, &request.variant).ok_or(Error::InvalidConfig)?;

        let source = funding::select_source(storage, &account, quote.credits_needed)
            .await?
            .ok_or(Error::InsufficientCredits)?;

        let generation = NewGeneration {
            account_id: account.id,
            prompt: request.prompt.clone(),
            model_type: request.model_type.clone(),
            model_version: request.model_version.clone(),
            variant: request.variant.clone(),
            image_url: request.image_url.clone(),
            tail_image_url: request.tail_image_url.clone(),
            source_video_url: request.video_url.clone(),
            aspect_ratio: request.aspect_ratio.clone().unwrap_or_else(|| "default".to_string()),
            duration,
            audio_enabled,
            character_orientation: request.character_orientation.clone(),
            keep_original_sound: request.keep_original_sound,
            credits_used: quote.credits_needed,
            endpoint: endpoint.to_string(),
        };

        // Conditional debit + record insert. None means the source was drained
        // between selection and reservation.
        let record = storage
            .reserve(&source, &generation)
            .await?
            .ok_or(Error::InsufficientCredits)?;

        let payload = build_payload(&request, audio_enabled);
        match self.provider.submit(endpoint, source.credential(), &payload).await {
            Ok(handle) => {
                storage.attach_handle(record.id, &handle).await?;
                info!(
                    record_id = %abbrev_uuid(&record.id),
                    request_id = %handle.request_id,
                    credits = %quote.credits_needed,
                    "generation submitted"
                );
                Ok(SubmitOutcome {
                    record_id: record.id,
                    request_id: handle.request_id,
                    credits_used: quote.credits_needed,
                    funded_by_grant: match source {
                        FundingSource::Grant { id, .. } => Some(id),
                        FundingSource::Legacy { .. } => None,
                    },
                })
            }
            Err(provider_err) => {
                // Unwind the reservation. If this fails the record stays
                // processing and the staleness backstop settles it later.
                match storage.fail_and_refund(&record).await {
                    Ok(true) => {}
                    Ok(false) => warn!(record_id = %abbrev_uuid(&record.id), "record already settled during refund"),
                    Err(e) => error!(
                        record_id = %abbrev_uuid(&record.id),
                        "failed to refund after provider error: {e:#}"
                    ),
                }
                Err(provider_err.into())
            }
        }
    }
}

/// Build the provider payload from the request, omitting empty inputs.
fn build_payload(request: &GenerationRequest, audio_enabled: bool) -> SubmitPayload {
    SubmitPayload {
        prompt: request.prompt.clone(),
        image_url: non_empty(request.image_url.clone()),
        tail_image_url: non_empty(request.tail_image_url.clone()),
        video_url: non_empty(request.video_url.clone()),
        aspect_ratio: non_empty(request.aspect_ratio.clone()),
        duration: request.duration.filter(|d| *d > 0).map(|d| d.to_string()),
        generate_audio: Some(audio_enabled),
        character_orientation: non_empty(request.character_orientation.clone()),
        keep_original_sound: request.keep_original_sound,
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}
