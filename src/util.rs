//! Shared utility functions.

pub const SECONDS_PER_DAY: i64 = 86400;

/// Compute an access expiration timestamp.
///
/// `base_time` is typically `Utc::now().timestamp()` when recording a new
/// purchase.
pub fn expiry_from_days(base_time: i64, days: i64) -> i64 {
    base_time + days * SECONDS_PER_DAY
}
