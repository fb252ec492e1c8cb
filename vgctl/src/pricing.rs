//! Pricing table lookup and quoting.
//!
//! The pricing table is keyed on model selector plus role, with two wrinkles
//! inherited from how the table is populated:
//!
//! - variants whose name contains `motion-control` are priced per second, and
//!   their rows are stored without a duration, so duration is excluded from
//!   the lookup key;
//! - only the `text-to-video` / `image-to-video` family has audio-dependent
//!   rows, so the audio flag is part of the key only for those variants.
//!
//! There is no cross-role fallback: a missing row for the caller's role is a
//! missing price, even if another role has one.

use rust_decimal::Decimal;
use tracing::instrument;

use crate::models::Role;
use crate::storage::{Result, Storage};

/// Variants priced per second of requested output.
pub fn is_per_second_variant(variant: &str) -> bool {
    variant.contains("motion-control")
}

fn audio_keyed(variant: &str) -> bool {
    variant == "text-to-video" || variant == "image-to-video"
}

/// Lookup key into the pricing table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceKey {
    pub model_type: String,
    pub model_version: String,
    pub variant: String,
    pub role: Role,
    /// Part of the key only for flat-priced variants with a nonzero duration.
    pub duration: Option<i32>,
    /// Part of the key only for the audio-keyed variant family.
    pub audio_enabled: Option<bool>,
}

impl PriceKey {
    /// Build the key for a request. An account without a role prices as
    /// [`Role::User`].
    pub fn for_request(
        model_type: &str,
        model_version: &str,
        variant: &str,
        role: Option<Role>,
        duration: i32,
        audio_enabled: bool,
    ) -> Self {
        let duration_key = if !is_per_second_variant(variant) && duration > 0 {
            Some(duration)
        } else {
            None
        };
        let audio_key = audio_keyed(variant).then_some(audio_enabled);

        Self {
            model_type: model_type.to_string(),
            model_version: model_version.to_string(),
            variant: variant.to_string(),
            role: role.unwrap_or(Role::User),
            duration: duration_key,
            audio_enabled: audio_key,
        }
    }
}

/// A resolved price quote for a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Quote {
    pub unit_price: Decimal,
    pub per_second: bool,
    /// The amount that will be debited: `unit_price * duration` for per-second
    /// rows with a positive duration, otherwise the flat price.
    pub credits_needed: Decimal,
}

/// Look up the pricing row for `key` and turn it into a quote.
/// `None` means no row matches, which callers surface as invalid configuration.
#[instrument(skip(storage), fields(variant = %key.variant, role = ?key.role))]
pub async fn resolve_quote(storage: &dyn Storage, key: &PriceKey, duration: i32) -> Result<Option<Quote>> {
    let Some(entry) = storage.resolve_price(key).await? else {
        return Ok(None);
    };

    let credits_needed = if entry.is_per_second && duration > 0 {
        entry.price * Decimal::from(duration)
    } else {
        entry.price
    };

    Ok(Some(Quote {
        unit_price: entry.price,
        per_second: entry.is_per_second,
        credits_needed,
    }))
}
