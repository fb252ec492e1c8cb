//! Common type aliases and small utilities.
//!
//! All entity IDs are UUIDs wrapped in type aliases:
//!
//! - [`AccountId`]: account (tenant) identifier
//! - [`GrantId`]: credit grant identifier
//! - [`RecordId`]: generation record identifier

use uuid::Uuid;

pub type AccountId = Uuid;
pub type GrantId = Uuid;
pub type RecordId = Uuid;

/// Abbreviate a UUID to its first 8 characters for more readable logs and traces
/// Example: "550e8400-e29b-41d4-a716-446655440000" -> "550e8400"
pub fn abbrev_uuid(uuid: &Uuid) -> String {
    uuid.to_string().chars().take(8).collect()
}
