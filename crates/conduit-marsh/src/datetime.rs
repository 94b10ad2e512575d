//! Datetime/duration JSON encoding, ported from
//! `vow/marsh/impl/json_into.py`/`json_from.py`.

use crate::error::{MarshError, Reason};
use chrono::{DateTime, NaiveDateTime, SecondsFormat, TimeZone, Utc};

/// The only wire shape this crate ever produces or accepts — strict, not
/// merely RFC-3339-compatible: exactly six fractional digits and a
/// literal `Z`, no numeric UTC offsets (`+00:00` is valid RFC-3339 but
/// not this format), matching Python's `strptime(obj,
/// '%Y-%m-%dT%H:%M:%S.%fZ')` in `vow/marsh/impl/json_from.py`.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6fZ";

/// `YYYY-MM-DDTHH:MM:SS.ffffffZ`, UTC, six fractional digits.
pub fn encode_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Rejects anything `chrono`'s looser RFC-3339 parser would accept but
/// the strict format wouldn't: a numeric offset instead of `Z`, or a
/// fractional-second count other than exactly six digits.
pub fn decode_timestamp(s: &str) -> Result<DateTime<Utc>, MarshError> {
    let naive = NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT).map_err(|e| {
        MarshError::new(
            Reason::Json,
            format!("invalid timestamp {s:?}: expected YYYY-MM-DDTHH:MM:SS.ffffffZ"),
        )
        .with_cause(e)
    })?;
    Ok(Utc.from_utc_datetime(&naive))
}

/// Durations encode as a JSON number of seconds (floating point).
pub fn encode_duration(d: &chrono::Duration) -> f64 {
    d.num_nanoseconds().map_or_else(
        || d.num_milliseconds() as f64 / 1_000.0,
        |ns| ns as f64 / 1_000_000_000.0,
    )
}

pub fn decode_duration(seconds: f64) -> chrono::Duration {
    chrono::Duration::nanoseconds((seconds * 1_000_000_000.0).round() as i64)
}
