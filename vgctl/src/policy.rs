//! Access and concurrency policy.
//!
//! Both checks fail open: a storage error during a lookup logs a warning and
//! lets the request through. Denials come only from an explicit disable row
//! or a genuine over-cap count.

use tracing::{instrument, warn};

use crate::errors::{Error, Result};
use crate::models::{Account, Role};
use crate::storage::Storage;

/// Concurrent processing generations allowed for standard-role accounts.
pub const MAX_CONCURRENT_STANDARD: i64 = 3;

/// Deny only when a standard-role account has an explicit `is_enabled = false`
/// override for this exact (version, variant) pair.
#[instrument(skip(storage, account), fields(account_id = %account.id, model_version, variant))]
pub async fn check_access(storage: &dyn Storage, account: &Account, model_version: &str, variant: &str) -> Result<()> {
    match account.role {
        None => return Ok(()),
        Some(role) if role.is_elevated() => return Ok(()),
        Some(_) => {}
    }

    match storage.access_override(account.id, model_version, variant).await {
        Ok(Some(false)) => Err(Error::AccessDenied {
            model_version: model_version.to_string(),
            variant: variant.to_string(),
        }),
        Ok(_) => Ok(()),
        Err(e) => {
            warn!("Access override lookup failed, allowing request: {e}");
            Ok(())
        }
    }
}

/// Cap standard-role accounts at [`MAX_CONCURRENT_STANDARD`] in-flight
/// generations. Elevated and unset roles are uncapped.
#[instrument(skip(storage, account), fields(account_id = %account.id))]
pub async fn check_concurrency(storage: &dyn Storage, account: &Account) -> Result<()> {
    if account.role != Some(Role::User) {
        return Ok(());
    }

    match storage.count_processing(account.id).await {
        Ok(current) if current >= MAX_CONCURRENT_STANDARD => Err(Error::ConcurrencyLimitExceeded { current }),
        Ok(_) => Ok(()),
        Err(e) => {
            warn!("Concurrency count failed, allowing request: {e}");
            Ok(())
        }
    }
}
