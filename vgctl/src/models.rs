//! Domain rows and enums shared across storage, pipeline and API layers.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

use crate::types::{AccountId, GrantId, RecordId};

/// Account role. `None` on the account means the role system does not apply
/// and the account is treated as unrestricted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "text", rename_all = "lowercase")]
pub enum Role {
    User,
    Premium,
    Admin,
}

impl Role {
    /// Elevated roles bypass access overrides and the concurrency cap.
    pub fn is_elevated(&self) -> bool {
        matches!(self, Role::Premium | Role::Admin)
    }
}

/// Lifecycle of a generation record. Only `processing` records are ever
/// picked up by the reconciler; both terminal states are final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "text", rename_all = "lowercase")]
pub enum RecordStatus {
    Processing,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Account {
    #[schema(value_type = uuid::Uuid)]
    pub id: AccountId,
    pub username: String,
    pub role: Option<Role>,
    #[schema(value_type = String)]
    pub credits: Decimal,
    /// Legacy account-level provider credential, used only when no grant can
    /// fund a request.
    pub provider_key: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A credit grant: a bucket of credits tied to its own provider credential.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct CreditGrant {
    #[schema(value_type = uuid::Uuid)]
    pub id: GrantId,
    #[schema(value_type = uuid::Uuid)]
    pub account_id: AccountId,
    #[serde(skip_serializing)]
    pub provider_key: String,
    #[schema(value_type = String)]
    pub credits: Decimal,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One row of the pricing table.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct PricingEntry {
    #[schema(value_type = String)]
    pub price: Decimal,
    pub is_per_second: bool,
}

/// A generation record: the unit the reconciler settles against.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct GenerationRecord {
    #[schema(value_type = uuid::Uuid)]
    pub id: RecordId,
    #[schema(value_type = uuid::Uuid)]
    pub account_id: AccountId,
    #[schema(value_type = Option<uuid::Uuid>)]
    pub grant_id: Option<GrantId>,
    pub prompt: String,
    pub model_type: String,
    pub model_version: String,
    pub variant: String,
    pub image_url: Option<String>,
    pub tail_image_url: Option<String>,
    pub source_video_url: Option<String>,
    pub aspect_ratio: String,
    pub duration: i32,
    pub audio_enabled: bool,
    pub character_orientation: Option<String>,
    pub keep_original_sound: Option<bool>,
    /// Amount debited at submission. Refunds always use this value, never a
    /// fresh price lookup.
    #[schema(value_type = String)]
    pub credits_used: Decimal,
    pub status: RecordStatus,
    pub endpoint: String,
    pub request_id: Option<String>,
    pub status_url: Option<String>,
    pub response_url: Option<String>,
    pub cancel_url: Option<String>,
    pub output_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl GenerationRecord {
    /// Provider status URL: the stored one if the submission response carried
    /// it, otherwise reconstructed from the endpoint and request id.
    pub fn resolve_status_url(&self, base: &str, request_id: &str) -> String {
        self.status_url
            .clone()
            .unwrap_or_else(|| format!("{}/{}/requests/{}/status", base, self.endpoint, request_id))
    }

    /// Provider result URL, stored or reconstructed.
    pub fn resolve_response_url(&self, base: &str, request_id: &str) -> String {
        self.response_url
            .clone()
            .unwrap_or_else(|| format!("{}/{}/requests/{}", base, self.endpoint, request_id))
    }
}

/// Insert payload for a new generation record. The record is created inside
/// the same transaction that debits the funding source.
#[derive(Debug, Clone)]
pub struct NewGeneration {
    pub account_id: AccountId,
    pub prompt: String,
    pub model_type: String,
    pub model_version: String,
    pub variant: String,
    pub image_url: Option<String>,
    pub tail_image_url: Option<String>,
    pub source_video_url: Option<String>,
    pub aspect_ratio: String,
    pub duration: i32,
    pub audio_enabled: bool,
    pub character_orientation: Option<String>,
    pub keep_original_sound: Option<bool>,
    pub credits_used: Decimal,
    pub endpoint: String,
}

/// Queue handle returned by a successful provider submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderHandle {
    pub request_id: String,
    pub status_url: Option<String>,
    pub response_url: Option<String>,
    pub cancel_url: Option<String>,
}
