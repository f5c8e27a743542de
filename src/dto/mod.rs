//! Wire-facing request/response types. All payloads use camelCase names.

use time::{OffsetDateTime, format_description::well_known::Rfc3339};

pub mod clips;
pub mod commentary;
pub mod events;
pub mod feed;
pub mod health;
pub mod live;
pub mod moderation;

pub(crate) fn format_timestamp(at: OffsetDateTime) -> String {
    at.format(&Rfc3339).unwrap_or_else(|_| "invalid-timestamp".into())
}

pub(crate) fn format_timestamp_opt(at: Option<OffsetDateTime>) -> Option<String> {
    at.map(format_timestamp)
}
