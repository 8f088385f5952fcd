//! Canonical Redis key names and TTLs for every persisted record.
use std::time::Duration;

pub const IDEMPOTENCY_KEY_PREFIX: &str = "idem:";
pub const JOB_KEY_PREFIX: &str = "job:";
pub const JOB_DATA_KEY_PREFIX: &str = "job:data:";
pub const ATTEMPT_KEY_PREFIX: &str = "attempt:";

pub const RETRY_JOBS_KEY: &str = "retry:jobs";
pub const RETRY_LOCK_KEY: &str = "retry:lock";

pub const DEDUPE_TTL: Duration = Duration::from_secs(72 * 3600);
pub const JOB_STATUS_TTL: Duration = Duration::from_secs(14 * 24 * 3600);
pub const JOB_DATA_TTL: Duration = Duration::from_secs(14 * 24 * 3600);
pub const ATTEMPT_TTL: Duration = JOB_DATA_TTL;
pub const DLQ_TTL: Duration = Duration::from_secs(14 * 24 * 3600);

pub fn idempotency_key(key: &str) -> String {
    format!("{IDEMPOTENCY_KEY_PREFIX}{key}")
}

pub fn job_key(job_id: &str) -> String {
    format!("{JOB_KEY_PREFIX}{job_id}")
}

pub fn job_data_key(job_id: &str) -> String {
    format!("{JOB_DATA_KEY_PREFIX}{job_id}")
}

pub fn attempt_key(job_id: &str) -> String {
    format!("{ATTEMPT_KEY_PREFIX}{job_id}")
}

/// The retry lock's TTL, expressed as a multiple of the dispatcher's poll interval, so a lock
/// held by a dispatcher that died mid-tick is reclaimed within a few ticks rather than forever.
pub fn retry_lock_ttl(poll_interval: Duration) -> Duration {
    poll_interval * 5
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_expected_key_strings() {
        assert_eq!(idempotency_key("k1"), "idem:k1");
        assert_eq!(job_key("abc"), "job:abc");
        assert_eq!(job_data_key("abc"), "job:data:abc");
        assert_eq!(attempt_key("abc"), "attempt:abc");
    }

    #[test]
    fn lock_ttl_scales_with_poll_interval() {
        assert_eq!(
            retry_lock_ttl(Duration::from_secs(1)),
            Duration::from_secs(5)
        );
    }
}
