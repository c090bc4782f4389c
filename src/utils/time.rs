use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Utc};

/// Returns the current time in seconds since the Unix epoch
pub fn current_time() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Render a Unix timestamp as an RFC 3339 string in UTC
pub fn format_timestamp(timestamp: u64) -> String {
    i64::try_from(timestamp)
        .ok()
        .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_else(|| format!("@{}", timestamp))
}

/// Format a span of seconds as `1d 2h 3m 4s`, dropping zero units
pub fn format_duration(seconds: u64) -> String {
    if seconds == 0 {
        return String::from("0s");
    }

    let units = [(86_400, "d"), (3_600, "h"), (60, "m"), (1, "s")];
    let mut remaining = seconds;
    let mut parts = Vec::new();
    for (size, suffix) in units {
        let count = remaining / size;
        if count > 0 {
            parts.push(format!("{}{}", count, suffix));
            remaining %= size;
        }
    }
    parts.join(" ")
}

/// Seconds from `now` until `deadline`, 0 once it has passed
pub fn time_until(deadline: u64, now: u64) -> u64 {
    deadline.saturating_sub(now)
}
