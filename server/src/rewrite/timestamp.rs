//! Timestamp normalization for WebDAV `getlastmodified` values
//!
//! Zurg reports modification times as RFC3339 (often with milliseconds).
//! RFC 4918 wants RFC1123 dates there and some clients refuse anything else.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use tracing::warn;

use super::CompiledRule;

/// Matches one `getlastmodified` element and captures its text
pub const LAST_MODIFIED_PATTERN: &str = r"<d:getlastmodified>([^<]*)</d:getlastmodified>";

const RFC1123_FORMAT: &str = "%a, %d %b %Y %H:%M:%S GMT";

/// Naive date-time layouts, read as UTC
const NAIVE_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"];

static LAST_MODIFIED: Lazy<Regex> = Lazy::new(|| Regex::new(LAST_MODIFIED_PATTERN).unwrap());

static FRACTION_BEFORE_Z: Lazy<Regex> = Lazy::new(|| Regex::new(r"\.\d+Z$").unwrap());

/// Convert a timestamp to RFC1123.
///
/// Blank input is returned unchanged. Input that cannot be parsed yields an
/// empty string, which callers treat as "leave the original text alone".
pub fn normalize(input: &str) -> String {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return input.to_string();
    }

    let without_fraction = FRACTION_BEFORE_Z.replace(trimmed, "Z");
    let rfc1123 = [trimmed, without_fraction.as_ref()]
        .into_iter()
        .find_map(parse_timestamp)
        .map(|dt| dt.format(RFC1123_FORMAT).to_string())
        .unwrap_or_default();
    rfc1123
}

/// Try each accepted layout in turn
fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .or_else(|| DateTime::parse_from_rfc2822(value).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|| {
            NAIVE_FORMATS
                .iter()
                .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
                .map(|naive| Utc.from_utc_datetime(&naive))
        })
        .or_else(|| {
            NaiveDate::parse_from_str(value, "%Y-%m-%d")
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
                .map(|naive| Utc.from_utc_datetime(&naive))
        })
}

/// The computed rule that rewrites every `getlastmodified` element
pub fn last_modified_rule() -> CompiledRule {
    CompiledRule::computed(LAST_MODIFIED.clone(), replace_last_modified)
}

fn replace_last_modified(caps: &Captures<'_>) -> String {
    let original = &caps[0];
    let timestamp = caps[1].trim();
    if timestamp.is_empty() {
        return original.to_string();
    }

    let rfc1123 = normalize(timestamp);
    if rfc1123.is_empty() {
        warn!(timestamp = %timestamp, "Failed to convert timestamp, leaving it unchanged");
        crate::metrics::record_timestamp_failure();
        return original.to_string();
    }

    format!("<d:getlastmodified>{rfc1123}</d:getlastmodified>")
}
