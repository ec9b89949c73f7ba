//! Business-day clock for Sama Wi-Fi POS.
//!
//! The shop operates in a fixed UTC+2 timezone. Staff devices are frequently
//! misconfigured (wrong locale, wrong timezone, drifting clocks set by hand),
//! so every date computation in the app goes through this module instead of
//! the host's local timezone. A "business day" is the calendar date of an
//! instant as observed in the fixed offset, never a UTC date prefix.

use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, Utc};

/// Fixed business timezone offset in seconds east of UTC (UTC+2).
const BUSINESS_UTC_OFFSET_SECS: i32 = 2 * 3600;

/// The fixed business timezone.
pub fn business_tz() -> FixedOffset {
    // 2 * 3600 is always a valid offset
    FixedOffset::east_opt(BUSINESS_UTC_OFFSET_SECS).expect("valid fixed offset")
}

/// Current instant rendered in the business timezone.
pub fn now() -> DateTime<FixedOffset> {
    Utc::now().with_timezone(&business_tz())
}

/// Current instant as an RFC3339 string (business timezone).
pub fn now_rfc3339() -> String {
    now().to_rfc3339()
}

/// Today's business-day key, `YYYY-MM-DD`.
pub fn today_key() -> String {
    date_key_of(&now())
}

/// Business-day key of an already-parsed instant.
pub fn date_key_of(instant: &DateTime<FixedOffset>) -> String {
    let local = instant.with_timezone(&business_tz());
    format!(
        "{:04}-{:02}-{:02}",
        local.year(),
        local.month(),
        local.day()
    )
}

/// Business-day key of an RFC3339 instant string.
///
/// Returns an empty string when the instant does not parse. Callers must
/// treat the empty string as "no match", never as a wildcard.
pub fn date_key(instant: &str) -> String {
    match DateTime::parse_from_rfc3339(instant.trim()) {
        Ok(parsed) => date_key_of(&parsed),
        Err(_) => String::new(),
    }
}

/// Parse a `YYYY-MM-DD` business-day key.
pub fn parse_day_key(key: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(key.trim(), "%Y-%m-%d").ok()
}

/// The business-day key following `key`, or `None` when `key` is malformed.
pub fn next_day_key(key: &str) -> Option<String> {
    parse_day_key(key)?
        .succ_opt()
        .map(|d| d.format("%Y-%m-%d").to_string())
}

/// All business-day keys in `[from, until)`, in chronological order.
///
/// Used by the archival engine to enumerate days that ended while the app
/// was not running: the old marker day itself up to (but excluding) today.
/// Returns an empty vec when either key is malformed or the range is empty.
pub fn day_keys_range(from: &str, until: &str) -> Vec<String> {
    let (Some(start), Some(end)) = (parse_day_key(from), parse_day_key(until)) else {
        return Vec::new();
    };

    let mut keys = Vec::new();
    let mut cursor = start;
    while cursor < end {
        keys.push(cursor.format("%Y-%m-%d").to_string());
        match cursor.succ_opt() {
            Some(next) => cursor = next,
            None => break,
        }
    }
    keys
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn date_key_uses_business_timezone_not_utc() {
        // 23:30 UTC is already 01:30 the next day in UTC+2.
        assert_eq!(date_key("2026-03-14T23:30:00Z"), "2026-03-15");
        // 21:59 UTC is still 23:59 the same day in UTC+2.
        assert_eq!(date_key("2026-03-14T21:59:00Z"), "2026-03-14");
    }

    #[test]
    fn date_key_stable_across_utc_midnight() {
        // Both instants fall on 2026-03-15 in UTC+2 even though their raw
        // UTC dates differ.
        let before_utc_midnight = date_key("2026-03-14T22:10:00Z");
        let after_utc_midnight = date_key("2026-03-15T06:00:00Z");
        assert_eq!(before_utc_midnight, after_utc_midnight);
        assert_eq!(before_utc_midnight, "2026-03-15");
    }

    #[test]
    fn date_key_respects_source_offsets() {
        // Same physical instant expressed in two offsets maps to one key.
        assert_eq!(
            date_key("2026-03-14T23:30:00+00:00"),
            date_key("2026-03-15T02:30:00+03:00"),
        );
    }

    #[test]
    fn date_key_of_garbage_is_empty() {
        assert_eq!(date_key(""), "");
        assert_eq!(date_key("not a date"), "");
        assert_eq!(date_key("2026-13-40T99:99:99Z"), "");
    }

    #[test]
    fn day_keys_range_enumerates_missed_days() {
        assert_eq!(
            day_keys_range("2026-02-27", "2026-03-02"),
            vec!["2026-02-27", "2026-02-28", "2026-03-01"],
        );
        assert!(day_keys_range("2026-03-02", "2026-03-02").is_empty());
        assert!(day_keys_range("2026-03-05", "2026-03-02").is_empty());
        assert!(day_keys_range("garbage", "2026-03-02").is_empty());
    }
}
