//! Postgres implementation of [`Storage`].
//!
//! Queries are runtime-bound. The two money-moving operations (`reserve`,
//! `fail_and_refund`) run inside transactions with conditional UPDATEs so a
//! lost race shows up as zero affected rows instead of a negative balance.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use tracing::instrument;

use crate::funding::FundingSource;
use crate::models::{Account, CreditGrant, GenerationRecord, NewGeneration, PricingEntry, ProviderHandle};
use crate::pricing::PriceKey;
use crate::types::{AccountId, GrantId, RecordId};

use super::{Result, Storage};

#[derive(Debug, Clone)]
pub struct PostgresStorage {
    pool: PgPool,
}

impl PostgresStorage {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Storage for PostgresStorage {
    async fn get_account(&self, id: AccountId) -> Result<Option<Account>> {
        let account = sqlx::query_as::<_, Account>(
            "SELECT id, username, role, credits, provider_key, created_at FROM accounts WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(account)
    }

    async fn oldest_sufficient_grant(&self, account_id: AccountId, amount: Decimal) -> Result<Option<CreditGrant>> {
        let grant = sqlx::query_as::<_, CreditGrant>(
            r#"
            SELECT id, account_id, provider_key, credits, is_active, created_at, updated_at
            FROM credit_grants
            WHERE account_id = $1 AND is_active AND credits >= $2
            ORDER BY created_at ASC
            LIMIT 1
            "#,
        )
        .bind(account_id)
        .bind(amount)
        .fetch_optional(&self.pool)
        .await?;
        Ok(grant)
    }

    #[instrument(skip(self, source, generation), fields(account_id = %generation.account_id))]
    async fn reserve(&self, source: &FundingSource, generation: &NewGeneration) -> Result<Option<GenerationRecord>> {
        let mut tx = self.pool.begin().await?;

        let debited = match source {
            FundingSource::Grant { id, .. } => {
                sqlx::query(
                    r#"
                    UPDATE credit_grants
                    SET credits = credits - $2, updated_at = now()
                    WHERE id = $1 AND is_active AND credits >= $2
                    "#,
                )
                .bind(id)
                .bind(generation.credits_used)
                .execute(&mut *tx)
                .await?
            }
            FundingSource::Legacy { account_id, .. } => {
                sqlx::query("UPDATE accounts SET credits = credits - $2 WHERE id = $1 AND credits >= $2")
                    .bind(account_id)
                    .bind(generation.credits_used)
                    .execute(&mut *tx)
                    .await?
            }
        };

        if debited.rows_affected() == 0 {
            // Raced by a concurrent reservation since the source was selected.
            tx.rollback().await?;
            return Ok(None);
        }

        let grant_id = match source {
            FundingSource::Grant { id, .. } => Some(*id),
            FundingSource::Legacy { .. } => None,
        };

        let record = sqlx::query_as::<_, GenerationRecord>(
            r#"
            INSERT INTO generations (
                account_id, grant_id, prompt, model_type, model_version, variant,
                image_url, tail_image_url, source_video_url, aspect_ratio, duration,
                audio_enabled, character_orientation, keep_original_sound,
                credits_used, status, endpoint
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, 'processing', $16)
            RETURNING *
            "#,
        )
        .bind(generation.account_id)
        .bind(grant_id)
        .bind(&generation.prompt)
        .bind(&generation.model_type)
        .bind(&generation.model_version)
        .bind(&generation.variant)
        .bind(&generation.image_url)
        .bind(&generation.tail_image_url)
        .bind(&generation.source_video_url)
        .bind(&generation.aspect_ratio)
        .bind(generation.duration)
        .bind(generation.audio_enabled)
        .bind(&generation.character_orientation)
        .bind(generation.keep_original_sound)
        .bind(generation.credits_used)
        .bind(&generation.endpoint)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Some(record))
    }

    async fn attach_handle(&self, record_id: RecordId, handle: &ProviderHandle) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE generations
            SET request_id = $2, status_url = $3, response_url = $4, cancel_url = $5
            WHERE id = $1
            "#,
        )
        .bind(record_id)
        .bind(&handle.request_id)
        .bind(&handle.status_url)
        .bind(&handle.response_url)
        .bind(&handle.cancel_url)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    #[instrument(skip(self, record), fields(record_id = %record.id))]
    async fn fail_and_refund(&self, record: &GenerationRecord) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        // The status guard makes settlement idempotent: a record already
        // settled by another sweep refunds nothing.
        let transitioned = sqlx::query("UPDATE generations SET status = 'failed' WHERE id = $1 AND status = 'processing'")
            .bind(record.id)
            .execute(&mut *tx)
            .await?;

        if transitioned.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        match record.grant_id {
            Some(grant_id) => {
                sqlx::query("UPDATE credit_grants SET credits = credits + $2, updated_at = now() WHERE id = $1")
                    .bind(grant_id)
                    .bind(record.credits_used)
                    .execute(&mut *tx)
                    .await?;
            }
            None => {
                sqlx::query("UPDATE accounts SET credits = credits + $2 WHERE id = $1")
                    .bind(record.account_id)
                    .bind(record.credits_used)
                    .execute(&mut *tx)
                    .await?;
            }
        }

        tx.commit().await?;
        Ok(true)
    }

    async fn complete(&self, record_id: RecordId, output_url: Option<&str>) -> Result<bool> {
        let updated = sqlx::query(
            r#"
            UPDATE generations
            SET status = 'completed', completed_at = now(), output_url = $2
            WHERE id = $1 AND status = 'processing'
            "#,
        )
        .bind(record_id)
        .bind(output_url)
        .execute(&self.pool)
        .await?;
        Ok(updated.rows_affected() > 0)
    }

    async fn processing_batch(&self, limit: i64) -> Result<Vec<GenerationRecord>> {
        let records = sqlx::query_as::<_, GenerationRecord>(
            r#"
            SELECT * FROM generations
            WHERE status = 'processing' AND request_id IS NOT NULL
            ORDER BY created_at ASC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(records)
    }

    async fn stale_processing(&self, cutoff: DateTime<Utc>, limit: i64) -> Result<Vec<GenerationRecord>> {
        let records = sqlx::query_as::<_, GenerationRecord>(
            r#"
            SELECT * FROM generations
            WHERE status = 'processing' AND created_at < $1
            ORDER BY created_at ASC
            LIMIT $2
            "#,
        )
        .bind(cutoff)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(records)
    }

    async fn count_processing(&self, account_id: AccountId) -> Result<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM generations WHERE account_id = $1 AND status = 'processing'")
                .bind(account_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }

    async fn access_override(&self, account_id: AccountId, model_version: &str, variant: &str) -> Result<Option<bool>> {
        let enabled: Option<bool> = sqlx::query_scalar(
            "SELECT is_enabled FROM model_access WHERE account_id = $1 AND model_version = $2 AND variant = $3",
        )
        .bind(account_id)
        .bind(model_version)
        .bind(variant)
        .fetch_optional(&self.pool)
        .await?;
        Ok(enabled)
    }

    async fn resolve_price(&self, key: &PriceKey) -> Result<Option<PricingEntry>> {
        // Duration and audio filters only apply when they are part of the key.
        let entry = sqlx::query_as::<_, PricingEntry>(
            r#"
            SELECT price, is_per_second FROM pricing
            WHERE model_type = $1 AND model_version = $2 AND variant = $3 AND role = $4
              AND ($5::integer IS NULL OR duration = $5)
              AND ($6::boolean IS NULL OR audio_enabled = $6)
            LIMIT 1
            "#,
        )
        .bind(&key.model_type)
        .bind(&key.model_version)
        .bind(&key.variant)
        .bind(key.role)
        .bind(key.duration)
        .bind(key.audio_enabled)
        .fetch_optional(&self.pool)
        .await?;
        Ok(entry)
    }

    async fn grant_credential(&self, grant_id: GrantId) -> Result<Option<String>> {
        let credential: Option<String> = sqlx::query_scalar("SELECT provider_key FROM credit_grants WHERE id = $1")
            .bind(grant_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(credential)
    }

    async fn history(&self, account_id: AccountId, skip: i64, limit: i64) -> Result<Vec<GenerationRecord>> {
        let records = sqlx::query_as::<_, GenerationRecord>(
            r#"
            SELECT * FROM generations
            WHERE account_id = $1
            ORDER BY created_at DESC
            OFFSET $2 LIMIT $3
            "#,
        )
        .bind(account_id)
        .bind(skip)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(records)
    }
}
