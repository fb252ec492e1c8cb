//! Persistence layer behind a trait so the pipeline and reconciler can be
//! exercised without a live database.
//!
//! Every method on [`Storage`] is a single atomic operation. The invariants
//! the rest of the crate leans on:
//!
//! - [`Storage::reserve`] debits the funding source and inserts the record in
//!   one transaction. A `None` return means the conditional debit touched zero
//!   rows (another request drained the source first).
//! - [`Storage::fail_and_refund`] and [`Storage::complete`] are guarded on
//!   `status = 'processing'`, so repeated reconciler sweeps settle each record
//!   exactly once.

pub mod errors;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::funding::FundingSource;
use crate::models::{Account, CreditGrant, GenerationRecord, NewGeneration, PricingEntry, ProviderHandle};
use crate::pricing::PriceKey;
use crate::types::{AccountId, GrantId, RecordId};

pub use errors::{DbError, Result};
pub use postgres::PostgresStorage;

#[async_trait]
pub trait Storage: Send + Sync {
    async fn get_account(&self, id: AccountId) -> Result<Option<Account>>;

    /// Oldest active grant of the account whose balance covers `amount`.
    /// FIFO by creation time, deliberately not balance-optimal.
    async fn oldest_sufficient_grant(&self, account_id: AccountId, amount: Decimal) -> Result<Option<CreditGrant>>;

    /// Debit the funding source and insert the generation record atomically.
    /// Returns `None` when the debit no longer covers (raced by a concurrent
    /// request); nothing is inserted in that case.
    async fn reserve(&self, source: &FundingSource, generation: &NewGeneration) -> Result<Option<GenerationRecord>>;

    /// Store the provider queue handle on a freshly submitted record.
    async fn attach_handle(&self, record_id: RecordId, handle: &ProviderHandle) -> Result<()>;

    /// Mark the record failed and refund its `credits_used` to the original
    /// funding source, in one transaction. Returns `false` when the record
    /// already left `processing` (nothing happens, including the refund).
    async fn fail_and_refund(&self, record: &GenerationRecord) -> Result<bool>;

    /// Mark the record completed with its output URL. Returns `false` when
    /// the record already left `processing`.
    async fn complete(&self, record_id: RecordId, output_url: Option<&str>) -> Result<bool>;

    /// Processing records that have a provider request id, oldest first.
    async fn processing_batch(&self, limit: i64) -> Result<Vec<GenerationRecord>>;

    /// Processing records created before `cutoff`, with or without a provider
    /// request id. Used by the staleness backstop.
    async fn stale_processing(&self, cutoff: DateTime<Utc>, limit: i64) -> Result<Vec<GenerationRecord>>;

    async fn count_processing(&self, account_id: AccountId) -> Result<i64>;

    /// Explicit per-account access override for a (version, variant) pair.
    /// `None` means no override row exists.
    async fn access_override(&self, account_id: AccountId, model_version: &str, variant: &str) -> Result<Option<bool>>;

    async fn resolve_price(&self, key: &PriceKey) -> Result<Option<PricingEntry>>;

    /// Provider credential of a grant, for reconciliation.
    async fn grant_credential(&self, grant_id: GrantId) -> Result<Option<String>>;

    /// Generation history for an account, newest first.
    async fn history(&self, account_id: AccountId, skip: i64, limit: i64) -> Result<Vec<GenerationRecord>>;
}
