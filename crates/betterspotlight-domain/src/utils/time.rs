//! Wall-clock helpers. Timestamps are persisted as epoch seconds (`f64`),
//! matching the store schema.

/// Current time as fractional epoch seconds.
#[must_use]
pub fn epoch_secs() -> f64 {
    let now = chrono::Utc::now();
    now.timestamp() as f64 + f64::from(now.timestamp_subsec_millis()) / 1000.0
}

/// Current time as epoch milliseconds.
#[must_use]
pub fn epoch_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Current time as an ISO-8601 string with millisecond precision (UTC).
#[must_use]
pub fn iso_now() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}
