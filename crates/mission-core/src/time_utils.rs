use std::time::{Duration, SystemTime, UNIX_EPOCH};

fn since_epoch() -> Duration {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
}

/// Wall-clock milliseconds since the Unix epoch, saturating at `u64::MAX`.
pub fn current_unix_timestamp_ms() -> u64 {
    u64::try_from(since_epoch().as_millis()).unwrap_or(u64::MAX)
}

/// Wall-clock seconds since the Unix epoch, as reported in lifecycle notifications.
pub fn current_unix_timestamp() -> u64 {
    since_epoch().as_secs()
}
