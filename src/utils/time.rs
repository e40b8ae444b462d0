use chrono::{DateTime, Utc};

/// Formats a second count as `MM:SS`, or `H:MM:SS` from one hour up.
pub fn format_clock(total_seconds: i64) -> String {
    let safe = total_seconds.max(0);
    let hours = safe / 3600;
    let minutes = (safe % 3600) / 60;
    let seconds = safe % 60;

    if hours > 0 {
        format!("{hours}:{minutes:02}:{seconds:02}")
    } else {
        format!("{minutes:02}:{seconds:02}")
    }
}

/// Whole seconds from `from` to `to`, floored at zero.
pub fn seconds_between(from: DateTime<Utc>, to: DateTime<Utc>) -> u64 {
    (to - from).num_seconds().max(0) as u64
}
