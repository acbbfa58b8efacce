//! Conversion between the record store's free-form date strings and [`Ms`].
//!
//! The store is filled from a web form, so start times arrive as RFC 3339
//! strings, as naive `datetime-local` values, as bare dates, or not at all.
//! Naive values are read in the ward's configured UTC offset.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, TimeZone};

use crate::model::Ms;

/// Placeholder the ward display uses for "no instant".
pub const NO_INSTANT: &str = "--:--";

const NAIVE_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
];

/// Parse an allocation start. `None` for blanks, placeholders and garbage.
pub fn parse_start(raw: &str, offset: FixedOffset) -> Option<Ms> {
    let raw = raw.trim();
    if raw.is_empty() || raw == "-" || raw == NO_INSTANT {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.timestamp_millis());
    }

    for format in NAIVE_DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return local_millis(naive, offset);
        }
    }

    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return local_millis(date.and_hms_opt(0, 0, 0)?, offset);
    }

    // Some exports carry raw epoch milliseconds.
    if raw.bytes().all(|b| b.is_ascii_digit()) {
        return raw.parse().ok();
    }

    None
}

fn local_millis(naive: NaiveDateTime, offset: FixedOffset) -> Option<Ms> {
    offset
        .from_local_datetime(&naive)
        .single()
        .map(|dt| dt.timestamp_millis())
}

/// `HH:MM:SS DD/MM` in the given offset, as shown on the ward board.
pub fn format_instant(ms: Ms, offset: FixedOffset) -> Option<String> {
    let dt = DateTime::from_timestamp_millis(ms)?.with_timezone(&offset);
    Some(dt.format("%H:%M:%S %d/%m").to_string())
}

/// Parse `+07:00`, `-0330`, `+7`, `Z` or `UTC` into a fixed offset.
pub fn parse_utc_offset(raw: &str) -> Option<FixedOffset> {
    let raw = raw.trim();
    if raw.eq_ignore_ascii_case("z") || raw.eq_ignore_ascii_case("utc") {
        return FixedOffset::east_opt(0);
    }

    let (sign, rest) = match raw.as_bytes().first()? {
        b'+' => (1, &raw[1..]),
        b'-' => (-1, &raw[1..]),
        _ => return None,
    };
    let (hours, minutes) = match rest.split_once(':') {
        Some((h, m)) => (h, m),
        None if rest.len() == 4 => rest.split_at(2),
        None => (rest, "0"),
    };
    let hours: i32 = hours.parse().ok()?;
    let minutes: i32 = minutes.parse().ok()?;
    if !(0..=23).contains(&hours) || !(0..=59).contains(&minutes) {
        return None;
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}
