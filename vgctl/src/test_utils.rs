//! Shared test fixtures: an in-memory [`Storage`] and a scripted provider.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rust_decimal::Decimal;
use std::collections::{HashMap, VecDeque};
use std::str::FromStr;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::funding::FundingSource;
use crate::models::{
    Account, CreditGrant, GenerationRecord, NewGeneration, PricingEntry, ProviderHandle, RecordStatus, Role,
};
use crate::pricing::PriceKey;
use crate::provider::{JobStatus, ProviderError, ResultResponse, StatusResponse, SubmitPayload, VideoOutput, VideoProvider};
use crate::storage::{Result, Storage};
use crate::types::{AccountId, GrantId, RecordId};

pub fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

pub fn account(role: Option<Role>, credits: Decimal, provider_key: Option<&str>) -> Account {
    let id = Uuid::new_v4();
    Account {
        id,
        username: format!("acct-{}", crate::types::abbrev_uuid(&id)),
        role,
        credits,
        provider_key: provider_key.map(|k| k.to_string()),
        created_at: Utc::now(),
    }
}

pub fn pricing_row(
    model_type: &str,
    model_version: &str,
    variant: &str,
    role: Role,
    duration: Option<i32>,
    audio_enabled: Option<bool>,
) -> PriceKey {
    PriceKey {
        model_type: model_type.to_string(),
        model_version: model_version.to_string(),
        variant: variant.to_string(),
        role,
        duration,
        audio_enabled,
    }
}

pub fn new_generation(account_id: AccountId, credits_used: Decimal) -> NewGeneration {
    NewGeneration {
        account_id,
        prompt: "a fox in the snow".to_string(),
        model_type: "kling".to_string(),
        model_version: "v2.6".to_string(),
        variant: "text-to-video".to_string(),
        image_url: None,
        tail_image_url: None,
        source_video_url: None,
        aspect_ratio: "default".to_string(),
        duration: 5,
        audio_enabled: false,
        character_orientation: None,
        keep_original_sound: None,
        credits_used,
        endpoint: "fal-ai/kling-video/v2.6/pro/text-to-video".to_string(),
    }
}

pub fn minimal_generation(account_id: AccountId) -> NewGeneration {
    new_generation(account_id, dec("0.1"))
}

pub fn handle(request_id: &str) -> ProviderHandle {
    ProviderHandle {
        request_id: request_id.to_string(),
        status_url: Some(format!("https://queue.test/requests/{request_id}/status")),
        response_url: Some(format!("https://queue.test/requests/{request_id}")),
        cancel_url: Some(format!("https://queue.test/requests/{request_id}/cancel")),
    }
}

pub fn rejected(message: &str) -> ProviderError {
    ProviderError::Rejected {
        status: 400,
        message: message.to_string(),
    }
}

/// In-memory [`Storage`] with the same atomicity semantics as the Postgres
/// implementation (single lock per operation).
#[derive(Default)]
pub struct MemoryStorage {
    accounts: Mutex<HashMap<AccountId, Account>>,
    grants: Mutex<Vec<CreditGrant>>,
    pricing: Mutex<Vec<(PriceKey, PricingEntry)>>,
    overrides: Mutex<HashMap<(AccountId, String, String), bool>>,
    records: Mutex<Vec<GenerationRecord>>,
    clock: AtomicI64,
}

impl MemoryStorage {
    /// Monotonic timestamps so FIFO ordering is deterministic.
    fn next_instant(&self) -> DateTime<Utc> {
        let tick = self.clock.fetch_add(1, Ordering::SeqCst);
        Utc::now() + ChronoDuration::microseconds(tick)
    }

    pub async fn add_account(&self, account: Account) {
        self.accounts.lock().await.insert(account.id, account);
    }

    pub async fn add_grant(&self, account_id: AccountId, provider_key: &str, credits: Decimal) -> GrantId {
        let now = self.next_instant();
        let grant = CreditGrant {
            id: Uuid::new_v4(),
            account_id,
            provider_key: provider_key.to_string(),
            credits,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        let id = grant.id;
        self.grants.lock().await.push(grant);
        id
    }

    pub async fn deactivate_grant(&self, id: GrantId) {
        let mut grants = self.grants.lock().await;
        if let Some(grant) = grants.iter_mut().find(|g| g.id == id) {
            grant.is_active = false;
        }
    }

    pub async fn add_pricing(&self, key: PriceKey, price: Decimal, is_per_second: bool) {
        self.pricing.lock().await.push((key, PricingEntry { price, is_per_second }));
    }

    pub async fn add_access_override(&self, account_id: AccountId, model_version: &str, variant: &str, enabled: bool) {
        self.overrides
            .lock()
            .await
            .insert((account_id, model_version.to_string(), variant.to_string()), enabled);
    }

    fn build_record(&self, generation: &NewGeneration, grant_id: Option<GrantId>) -> GenerationRecord {
        GenerationRecord {
            id: Uuid::new_v4(),
            account_id: generation.account_id,
            grant_id,
            prompt: generation.prompt.clone(),
            model_type: generation.model_type.clone(),
            model_version: generation.model_version.clone(),
            variant: generation.variant.clone(),
            image_url: generation.image_url.clone(),
            tail_image_url: generation.tail_image_url.clone(),
            source_video_url: generation.source_video_url.clone(),
            aspect_ratio: generation.aspect_ratio.clone(),
            duration: generation.duration,
            audio_enabled: generation.audio_enabled,
            character_orientation: generation.character_orientation.clone(),
            keep_original_sound: generation.keep_original_sound,
            credits_used: generation.credits_used,
            status: RecordStatus::Processing,
            endpoint: generation.endpoint.clone(),
            request_id: None,
            status_url: None,
            response_url: None,
            cancel_url: None,
            output_url: None,
            created_at: self.next_instant(),
            completed_at: None,
        }
    }

    /// Insert a processing record directly, without touching any balance.
    pub async fn add_processing_record(&self, generation: NewGeneration) -> RecordId {
        let record = self.build_record(&generation, None);
        let id = record.id;
        self.records.lock().await.push(record);
        id
    }

    pub async fn complete_oldest(&self, account_id: AccountId) {
        let mut records = self.records.lock().await;
        if let Some(record) = records
            .iter_mut()
            .filter(|r| r.account_id == account_id && r.status == RecordStatus::Processing)
            .min_by_key(|r| r.created_at)
        {
            record.status = RecordStatus::Completed;
            record.completed_at = Some(Utc::now());
        }
    }

    pub async fn backdate_record(&self, id: RecordId, age: Duration) {
        let mut records = self.records.lock().await;
        if let Some(record) = records.iter_mut().find(|r| r.id == id) {
            record.created_at = Utc::now() - ChronoDuration::from_std(age).unwrap();
        }
    }

    pub async fn grant_balance(&self, id: GrantId) -> Decimal {
        self.grants.lock().await.iter().find(|g| g.id == id).unwrap().credits
    }

    pub async fn account_balance(&self, id: AccountId) -> Decimal {
        self.accounts.lock().await.get(&id).unwrap().credits
    }

    pub async fn get_record(&self, id: RecordId) -> Option<GenerationRecord> {
        self.records.lock().await.iter().find(|r| r.id == id).cloned()
    }

    pub async fn all_records(&self) -> Vec<GenerationRecord> {
        self.records.lock().await.clone()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn get_account(&self, id: AccountId) -> Result<Option<Account>> {
        Ok(self.accounts.lock().await.get(&id).cloned())
    }

    async fn oldest_sufficient_grant(&self, account_id: AccountId, amount: Decimal) -> Result<Option<CreditGrant>> {
        let grants = self.grants.lock().await;
        Ok(grants
            .iter()
            .filter(|g| g.account_id == account_id && g.is_active && g.credits >= amount)
            .min_by_key(|g| g.created_at)
            .cloned())
    }

    async fn reserve(&self, source: &FundingSource, generation: &NewGeneration) -> Result<Option<GenerationRecord>> {
        let grant_id = match source {
            FundingSource::Grant { id, .. } => {
                let mut grants = self.grants.lock().await;
                let Some(grant) = grants
                    .iter_mut()
                    .find(|g| g.id == *id && g.is_active && g.credits >= generation.credits_used)
                else {
                    return Ok(None);
                };
                grant.credits -= generation.credits_used;
                Some(*id)
            }
            FundingSource::Legacy { account_id, .. } => {
                let mut accounts = self.accounts.lock().await;
                let Some(account) = accounts
                    .get_mut(account_id)
                    .filter(|a| a.credits >= generation.credits_used)
                else {
                    return Ok(None);
                };
                account.credits -= generation.credits_used;
                None
            }
        };

        let record = self.build_record(generation, grant_id);
        self.records.lock().await.push(record.clone());
        Ok(Some(record))
    }

    async fn attach_handle(&self, record_id: RecordId, handle: &ProviderHandle) -> Result<()> {
        let mut records = self.records.lock().await;
        if let Some(record) = records.iter_mut().find(|r| r.id == record_id) {
            record.request_id = Some(handle.request_id.clone());
            record.status_url = handle.status_url.clone();
            record.response_url = handle.response_url.clone();
            record.cancel_url = handle.cancel_url.clone();
        }
        Ok(())
    }

    async fn fail_and_refund(&self, record: &GenerationRecord) -> Result<bool> {
        {
            let mut records = self.records.lock().await;
            let Some(stored) = records
                .iter_mut()
                .find(|r| r.id == record.id && r.status == RecordStatus::Processing)
            else {
                return Ok(false);
            };
            stored.status = RecordStatus::Failed;
        }

        match record.grant_id {
            Some(grant_id) => {
                let mut grants = self.grants.lock().await;
                if let Some(grant) = grants.iter_mut().find(|g| g.id == grant_id) {
                    grant.credits += record.credits_used;
                }
            }
            None => {
                let mut accounts = self.accounts.lock().await;
                if let Some(account) = accounts.get_mut(&record.account_id) {
                    account.credits += record.credits_used;
                }
            }
        }
        Ok(true)
    }

    async fn complete(&self, record_id: RecordId, output_url: Option<&str>) -> Result<bool> {
        let mut records = self.records.lock().await;
        let Some(record) = records
            .iter_mut()
            .find(|r| r.id == record_id && r.status == RecordStatus::Processing)
        else {
            return Ok(false);
        };
        record.status = RecordStatus::Completed;
        record.output_url = output_url.map(|u| u.to_string());
        record.completed_at = Some(Utc::now());
        Ok(true)
    }

    async fn processing_batch(&self, limit: i64) -> Result<Vec<GenerationRecord>> {
        let records = self.records.lock().await;
        let mut batch: Vec<_> = records
            .iter()
            .filter(|r| r.status == RecordStatus::Processing && r.request_id.is_some())
            .cloned()
            .collect();
        batch.sort_by_key(|r| r.created_at);
        batch.truncate(limit as usize);
        Ok(batch)
    }

    async fn stale_processing(&self, cutoff: DateTime<Utc>, limit: i64) -> Result<Vec<GenerationRecord>> {
        let records = self.records.lock().await;
        let mut batch: Vec<_> = records
            .iter()
            .filter(|r| r.status == RecordStatus::Processing && r.created_at < cutoff)
            .cloned()
            .collect();
        batch.sort_by_key(|r| r.created_at);
        batch.truncate(limit as usize);
        Ok(batch)
    }

    async fn count_processing(&self, account_id: AccountId) -> Result<i64> {
        let records = self.records.lock().await;
        Ok(records
            .iter()
            .filter(|r| r.account_id == account_id && r.status == RecordStatus::Processing)
            .count() as i64)
    }

    async fn access_override(&self, account_id: AccountId, model_version: &str, variant: &str) -> Result<Option<bool>> {
        let overrides = self.overrides.lock().await;
        Ok(overrides
            .get(&(account_id, model_version.to_string(), variant.to_string()))
            .copied())
    }

    async fn resolve_price(&self, key: &PriceKey) -> Result<Option<PricingEntry>> {
        let pricing = self.pricing.lock().await;
        Ok(pricing.iter().find(|(k, _)| k == key).map(|(_, entry)| entry.clone()))
    }

    async fn grant_credential(&self, grant_id: GrantId) -> Result<Option<String>> {
        let grants = self.grants.lock().await;
        Ok(grants.iter().find(|g| g.id == grant_id).map(|g| g.provider_key.clone()))
    }

    async fn history(&self, account_id: AccountId, skip: i64, limit: i64) -> Result<Vec<GenerationRecord>> {
        let records = self.records.lock().await;
        let mut history: Vec<_> = records.iter().filter(|r| r.account_id == account_id).cloned().collect();
        history.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(history.into_iter().skip(skip as usize).take(limit as usize).collect())
    }
}

enum StatusScript {
    Status(JobStatus),
    Error(String),
}

/// Scripted [`VideoProvider`]. Status and result scripts are keyed by request
/// id and matched against the polled URL.
#[derive(Default)]
pub struct MockProvider {
    submits: Mutex<VecDeque<std::result::Result<ProviderHandle, ProviderError>>>,
    statuses: Mutex<HashMap<String, StatusScript>>,
    results: Mutex<HashMap<String, Option<String>>>,
    submit_log: Mutex<Vec<(String, String, SubmitPayload)>>,
    status_log: Mutex<Vec<String>>,
}

impl MockProvider {
    pub async fn script_submit(&self, response: std::result::Result<ProviderHandle, ProviderError>) {
        self.submits.lock().await.push_back(response);
    }

    pub async fn script_status(&self, request_id: &str, status: JobStatus) {
        self.statuses
            .lock()
            .await
            .insert(request_id.to_string(), StatusScript::Status(status));
    }

    pub async fn script_status_error(&self, request_id: &str, message: &str) {
        self.statuses
            .lock()
            .await
            .insert(request_id.to_string(), StatusScript::Error(message.to_string()));
    }

    pub async fn script_result(&self, request_id: &str, video_url: Option<&str>) {
        self.results
            .lock()
            .await
            .insert(request_id.to_string(), video_url.map(|u| u.to_string()));
    }

    pub async fn submit_calls(&self) -> Vec<(String, String, SubmitPayload)> {
        self.submit_log.lock().await.clone()
    }

    pub async fn status_calls(&self) -> Vec<String> {
        self.status_log.lock().await.clone()
    }
}

#[async_trait]
impl VideoProvider for MockProvider {
    async fn submit(
        &self,
        endpoint: &str,
        credential: &str,
        payload: &SubmitPayload,
    ) -> std::result::Result<ProviderHandle, ProviderError> {
        self.submit_log
            .lock()
            .await
            .push((endpoint.to_string(), credential.to_string(), payload.clone()));
        self.submits
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| panic!("no scripted submission response"))
    }

    async fn status(&self, url: &str, _credential: &str) -> std::result::Result<StatusResponse, ProviderError> {
        self.status_log.lock().await.push(url.to_string());
        let statuses = self.statuses.lock().await;
        match statuses.iter().find(|(id, _)| url.contains(id.as_str())) {
            Some((_, StatusScript::Status(status))) => Ok(StatusResponse {
                status: *status,
                queue_position: None,
            }),
            Some((_, StatusScript::Error(message))) => Err(ProviderError::Rejected {
                status: 500,
                message: message.clone(),
            }),
            None => Err(ProviderError::Rejected {
                status: 404,
                message: format!("no scripted status for {url}"),
            }),
        }
    }

    async fn result(&self, url: &str, _credential: &str) -> std::result::Result<ResultResponse, ProviderError> {
        let results = self.results.lock().await;
        match results.iter().find(|(id, _)| url.contains(id.as_str())) {
            Some((_, video_url)) => Ok(ResultResponse {
                video: video_url.clone().map(|url| VideoOutput { url }),
            }),
            None => Err(ProviderError::Rejected {
                status: 404,
                message: format!("no scripted result for {url}"),
            }),
        }
    }

    fn base_url(&self) -> &str {
        "https://queue.test"
    }
}
