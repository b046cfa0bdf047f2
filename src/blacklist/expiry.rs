use chrono::{DateTime, Utc};

use super::store::BlacklistRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ExpiryStatus {
    Active,
    Expired,
    Permanent,
}

/// Classify a record at `now`. Expiry is exclusive of the exact instant:
/// a record is still active when `now == expire_time`.
pub(crate) fn classify(record: &BlacklistRecord, now: DateTime<Utc>) -> ExpiryStatus {
    match record.expire_time {
        None => ExpiryStatus::Permanent,
        Some(expire_time) if now > expire_time => ExpiryStatus::Expired,
        Some(_) => ExpiryStatus::Active,
    }
}
