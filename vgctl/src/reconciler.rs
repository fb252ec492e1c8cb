//! Job status reconciler.
//!
//! Periodically sweeps `processing` records that have a provider request id,
//! polls the provider, and settles terminal outcomes: completed jobs get their
//! output URL, failed or cancelled jobs get their reserved credits refunded to
//! the original funding source. The sweep filter (`status = 'processing'`)
//! plus status-guarded transitions make repeated sweeps idempotent, so the
//! periodic daemon and the HTTP trigger can run concurrently without
//! double-settling.

use chrono::Utc;
use futures::{StreamExt, stream};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use utoipa::ToSchema;

use crate::errors::Result;
use crate::models::GenerationRecord;
use crate::provider::VideoProvider;
use crate::storage::Storage;
use crate::types::abbrev_uuid;

/// Outcome counts of one reconciliation sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct ReconcileReport {
    /// Records picked up by the sweep.
    pub total: usize,
    /// Records settled as completed.
    pub updated: usize,
    /// Records settled as failed (and refunded).
    pub failed: usize,
    /// Records the provider reports as still running.
    pub still_processing: usize,
}

enum Outcome {
    Completed,
    Failed,
    StillProcessing,
    /// Nothing settled this sweep: missing credential, provider error, or the
    /// record was settled concurrently. Retried next sweep if still open.
    Skipped,
}

pub struct Reconciler {
    storage: Arc<dyn Storage>,
    provider: Arc<dyn VideoProvider>,
    batch_size: i64,
    concurrency: usize,
    stale_after: Option<Duration>,
}

impl Reconciler {
    pub fn new(
        storage: Arc<dyn Storage>,
        provider: Arc<dyn VideoProvider>,
        batch_size: i64,
        concurrency: usize,
        stale_after: Option<Duration>,
    ) -> Self {
        Self {
            storage,
            provider,
            batch_size,
            concurrency,
            stale_after,
        }
    }

    /// One sweep over in-flight records. Per-record failures are logged and
    /// retried on the next sweep; they never abort the batch.
    #[instrument(skip(self))]
    pub async fn reconcile_once(&self) -> Result<ReconcileReport> {
        let batch = self.storage.processing_batch(self.batch_size).await?;
        let total = batch.len();

        let outcomes: Vec<Outcome> = stream::iter(batch)
            .map(|record| self.reconcile_record(record))
            .buffer_unordered(self.concurrency.max(1))
            .collect()
            .await;

        let mut report = ReconcileReport {
            total,
            ..Default::default()
        };
        for outcome in outcomes {
            match outcome {
                Outcome::Completed => report.updated += 1,
                Outcome::Failed => report.failed += 1,
                Outcome::StillProcessing => report.still_processing += 1,
                Outcome::Skipped => {}
            }
        }

        if self.stale_after.is_some() {
            report.failed += self.expire_stale().await?;
        }

        debug!(?report, "reconciliation sweep finished");
        Ok(report)
    }

    async fn reconcile_record(&self, record: GenerationRecord) -> Outcome {
        let record_id = abbrev_uuid(&record.id);
        let Some(request_id) = record.request_id.clone() else {
            return Outcome::Skipped;
        };

        let Some(credential) = self.credential_for(&record).await else {
            warn!(record_id, "no provider credential available, skipping");
            return Outcome::Skipped;
        };

        let status_url = record.resolve_status_url(self.provider.base_url(), &request_id);
        let status = match self.provider.status(&status_url, &credential).await {
            Ok(response) => response.status,
            Err(e) => {
                warn!(record_id, "status poll failed: {e}");
                return Outcome::Skipped;
            }
        };

        if status.is_failure() {
            return match self.storage.fail_and_refund(&record).await {
                Ok(true) => {
                    info!(record_id, credits = %record.credits_used, "generation failed, credits refunded");
                    Outcome::Failed
                }
                Ok(false) => Outcome::Skipped,
                Err(e) => {
                    error!(record_id, "failed to settle failed generation: {e:#}");
                    Outcome::Skipped
                }
            };
        }

        if status != crate::provider::JobStatus::Completed {
            return Outcome::StillProcessing;
        }

        let response_url = record.resolve_response_url(self.provider.base_url(), &request_id);
        let output_url = match self.provider.result(&response_url, &credential).await {
            Ok(result) => result.video_url().map(|u| u.to_string()),
            Err(e) => {
                // Status said completed but the result is not fetchable yet.
                warn!(record_id, "result fetch failed: {e}");
                return Outcome::Skipped;
            }
        };

        match self.storage.complete(record.id, output_url.as_deref()).await {
            Ok(true) => {
                info!(record_id, "generation completed");
                Outcome::Completed
            }
            Ok(false) => Outcome::Skipped,
            Err(e) => {
                error!(record_id, "failed to settle completed generation: {e:#}");
                Outcome::Skipped
            }
        }
    }

    /// Grant credential first, legacy account credential as fallback.
    async fn credential_for(&self, record: &GenerationRecord) -> Option<String> {
        if let Some(grant_id) = record.grant_id {
            match self.storage.grant_credential(grant_id).await {
                Ok(Some(key)) => return Some(key),
                Ok(None) => {}
                Err(e) => {
                    warn!("grant credential lookup failed: {e}");
                    return None;
                }
            }
        }

        match self.storage.get_account(record.account_id).await {
            Ok(Some(account)) => account.provider_key.filter(|k| !k.is_empty()),
            Ok(None) => None,
            Err(e) => {
                warn!("account credential lookup failed: {e}");
                None
            }
        }
    }

    /// Force-fail and refund records stuck in `processing` longer than the
    /// configured threshold, including ones that never got a provider handle.
    #[instrument(skip(self))]
    pub async fn expire_stale(&self) -> Result<usize> {
        let Some(stale_after) = self.stale_after else {
            return Ok(0);
        };
        let cutoff = Utc::now()
            - chrono::Duration::from_std(stale_after).unwrap_or_else(|_| chrono::Duration::seconds(i64::MAX / 1000));

        let stale = self.storage.stale_processing(cutoff, self.batch_size).await?;
        let mut expired = 0;
        for record in stale {
            match self.storage.fail_and_refund(&record).await {
                Ok(true) => {
                    warn!(
                        record_id = %abbrev_uuid(&record.id),
                        created_at = %record.created_at,
                        "expired stale generation, credits refunded"
                    );
                    expired += 1;
                }
                Ok(false) => {}
                Err(e) => error!(record_id = %abbrev_uuid(&record.id), "failed to expire stale generation: {e:#}"),
            }
        }
        Ok(expired)
    }

    /// Periodic sweep loop, run as a background task until cancelled.
    pub async fn run(self: Arc<Self>, poll_interval: Duration, shutdown: CancellationToken) {
        let mut interval = tokio::time::interval(poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(interval = ?poll_interval, "reconciler daemon started");
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("reconciler daemon shutting down");
                    break;
                }
                _ = interval.tick() => {
                    if let Err(e) = self.reconcile_once().await {
                        error!("reconciliation sweep failed: {e:#}");
                    }
                }
            }
        }
    }
}
