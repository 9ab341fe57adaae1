//! Wall-clock helpers shared by payloads and verification records.

use time::{OffsetDateTime, format_description::well_known::Rfc3339};

/// Current UTC timestamp formatted as RFC 3339.
pub(crate) fn current_timestamp_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}
