//! Cloud resource tag constants used by the janitor
//!
//! ## Tag Schema
//!
//! | Tag Key | Description |
//! |---------|-------------|
//! | `expiration_time` | `never` exempts the resource from cleanup permanently |
//! | `janitor:marked-at` | RFC 3339 timestamp of the first mark |
//! | `janitor:deletion-date` | RFC 3339 timestamp after which the resource may be deleted |

/// Tag key recognised by the cloud provider tooling for resource expiry
pub const TAG_EXPIRATION_TIME: &str = "expiration_time";

/// Value of [`TAG_EXPIRATION_TIME`] that exempts a resource from cleanup
pub const EXPIRATION_NEVER: &str = "never";

/// Tag key recording when the janitor first marked a resource
pub const TAG_MARKED_AT: &str = "janitor:marked-at";

/// Tag key recording the scheduled deletion date
pub const TAG_DELETION_DATE: &str = "janitor:deletion-date";

/// Helper to format a timestamp for tags
pub fn format_timestamp(time: chrono::DateTime<chrono::Utc>) -> String {
    time.to_rfc3339()
}

/// Helper to parse a timestamp from tags
pub fn parse_timestamp(s: &str) -> Option<chrono::DateTime<chrono::Utc>> {
    chrono::DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&chrono::Utc))
}

/// Whether a tag pair marks the resource as permanently exempt
pub fn is_exempt(key: &str, value: &str) -> bool {
    key.eq_ignore_ascii_case(TAG_EXPIRATION_TIME) && value.eq_ignore_ascii_case(EXPIRATION_NEVER)
}
