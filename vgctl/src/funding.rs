//! Credit source selection.
//!
//! Grants are consumed before the legacy account balance, oldest grant first.
//! Selection picks the oldest active grant that can cover the full amount on
//! its own; costs are never split across sources.

use rust_decimal::Decimal;
use tracing::instrument;

use crate::models::Account;
use crate::storage::{Result, Storage};
use crate::types::{AccountId, GrantId};

/// Where the credits for a request come from. Carries the provider credential
/// so the pipeline does not refetch the source before submitting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FundingSource {
    Grant { id: GrantId, credential: String },
    /// Legacy account-level balance paired with the account-level credential.
    Legacy { account_id: AccountId, credential: String },
}

impl FundingSource {
    pub fn credential(&self) -> &str {
        match self {
            FundingSource::Grant { credential, .. } => credential,
            FundingSource::Legacy { credential, .. } => credential,
        }
    }
}

/// Pick a funding source able to cover `amount`, or `None` if neither grants
/// nor the legacy balance can.
#[instrument(skip(storage, account), fields(account_id = %account.id, %amount))]
pub async fn select_source(storage: &dyn Storage, account: &Account, amount: Decimal) -> Result<Option<FundingSource>> {
    if let Some(grant) = storage.oldest_sufficient_grant(account.id, amount).await? {
        return Ok(Some(FundingSource::Grant {
            id: grant.id,
            credential: grant.provider_key,
        }));
    }

    // Legacy fallback needs both a usable credential and a covering balance.
    match &account.provider_key {
        Some(key) if !key.is_empty() && account.credits >= amount => Ok(Some(FundingSource::Legacy {
            account_id: account.id,
            credential: key.clone(),
        })),
        _ => Ok(None),
    }
}
