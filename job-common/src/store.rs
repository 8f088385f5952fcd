//! The idempotent job store: dedupe, status, payload, attempt counter, and the time-ordered
//! retry set, all addressed through one capability-set trait so tests can swap in an in-memory
//! implementation without touching Redis.
use async_trait::async_trait;
use common_redis::{Client as RedisClientTrait, CustomRedisError, RedisValueFormat};

use crate::keys;
use crate::state::JobState;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The backing store could not be reached; the caller may fail open.
    #[error("store unavailable: {0}")]
    Unavailable(String),
    /// The idempotency key was already claimed by a concurrent `create`.
    #[error("idempotency key already exists")]
    AlreadyExists,
    /// Anything else: a bug, or a fault the caller should surface as internal.
    #[error("store error: {0}")]
    Other(String),
}

impl From<CustomRedisError> for StoreError {
    fn from(err: CustomRedisError) -> Self {
        match err {
            CustomRedisError::Timeout => {
                StoreError::Unavailable("redis operation timed out".into())
            }
            CustomRedisError::Other(msg) => StoreError::Unavailable(msg),
            CustomRedisError::NotFound => StoreError::Other("not found".into()),
            CustomRedisError::ParseError(msg) => StoreError::Other(msg),
        }
    }
}

/// Outcome of `lookup`.
pub struct LookupResult {
    pub job_id: Option<String>,
    pub found: bool,
}

#[async_trait]
pub trait JobStore: Send + Sync {
    async fn lookup(&self, idempotency_key: &str) -> Result<LookupResult, StoreError>;

    /// Atomically creates the idempotency→job_id mapping, the job status, and the job payload.
    /// Returns `StoreError::AlreadyExists` if another writer won the race for `idempotency_key`.
    async fn create(
        &self,
        idempotency_key: &str,
        job_id: &str,
        payload: &[u8],
    ) -> Result<(), StoreError>;

    async fn fetch_payload(&self, job_id: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Best-effort status write. Failures are logged by the caller, never propagated as fatal.
    async fn set_status(&self, job_id: &str, state: JobState) -> Result<(), StoreError>;

    /// Atomically increments the attempt counter, applying its TTL on the first increment.
    async fn bump_attempt(&self, job_id: &str) -> Result<i64, StoreError>;

    /// Upserts `(score, job_id)` into the time-ordered retry set; re-adds overwrite.
    async fn schedule_retry(&self, job_id: &str, due_score_millis: f64) -> Result<(), StoreError>;

    /// Atomically fetches and removes all retry entries due at or before `now_millis`.
    async fn fetch_due_retries(&self, now_millis: f64) -> Result<Vec<String>, StoreError>;

    /// Re-inserts a job into the retry set after a failed republish attempt.
    async fn reschedule_retry(
        &self,
        job_id: &str,
        due_score_millis: f64,
    ) -> Result<(), StoreError> {
        self.schedule_retry(job_id, due_score_millis).await
    }

    /// Attempts to acquire the single-writer retry lock, returning whether it was claimed.
    async fn acquire_lock(
        &self,
        holder: &str,
        ttl: std::time::Duration,
    ) -> Result<bool, StoreError>;

    /// Releases the lock iff it is still held by `holder` (get-check-then-del; see DESIGN.md for
    /// why this is not a compare-and-delete Lua script).
    async fn release_lock(&self, holder: &str) -> Result<(), StoreError>;
}

pub struct RedisJobStore<C: RedisClientTrait> {
    client: C,
}

impl<C: RedisClientTrait> RedisJobStore<C> {
    pub fn new(client: C) -> Self {
        Self { client }
    }
}

#[async_trait]
impl<C: RedisClientTrait + Send + Sync> JobStore for RedisJobStore<C> {
    async fn lookup(&self, idempotency_key: &str) -> Result<LookupResult, StoreError> {
        let key = keys::idempotency_key(idempotency_key);
        match self.client.get_raw_bytes(key).await {
            Ok(bytes) => {
                let job_id = String::from_utf8(bytes)
                    .map_err(|e| StoreError::Other(format!("non-utf8 idempotency value: {e}")))?;
                Ok(LookupResult {
                    job_id: Some(job_id),
                    found: true,
                })
            }
            Err(CustomRedisError::NotFound) => Ok(LookupResult {
                job_id: None,
                found: false,
            }),
            Err(err) => Err(err.into()),
        }
    }

    /// Claims `idem:<key>` and writes the job's status and payload in the same round trip via a
    /// single script invocation, so the idempotency record, status, and payload are created as
    /// one atomic unit (see DESIGN.md: this is the stand-in for the original's WATCH/MULTI
    /// transaction). The idempotency value is written and read back as raw UTF-8 bytes, never
    /// pickled, so `lookup`'s `get_raw_bytes` + `from_utf8` sees exactly what `create` wrote.
    async fn create(
        &self,
        idempotency_key: &str,
        job_id: &str,
        payload: &[u8],
    ) -> Result<(), StoreError> {
        let idem_key = keys::idempotency_key(idempotency_key);
        let claimed = self
            .client
            .set_nx_ex_with_follow_up(
                idem_key,
                job_id.as_bytes().to_vec(),
                keys::DEDUPE_TTL.as_secs(),
                vec![
                    (
                        keys::job_key(job_id),
                        JobState::Queued.as_str().as_bytes().to_vec(),
                        keys::JOB_STATUS_TTL.as_secs(),
                    ),
                    (
                        keys::job_data_key(job_id),
                        payload.to_vec(),
                        keys::JOB_DATA_TTL.as_secs(),
                    ),
                ],
            )
            .await
            .map_err(StoreError::from)?;

        if !claimed {
            return Err(StoreError::AlreadyExists);
        }

        Ok(())
    }

    async fn fetch_payload(&self, job_id: &str) -> Result<Option<Vec<u8>>, StoreError> {
        match self.client.get_raw_bytes(keys::job_data_key(job_id)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(CustomRedisError::NotFound) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    async fn set_status(&self, job_id: &str, state: JobState) -> Result<(), StoreError> {
        let ttl = if state == JobState::Dlq {
            keys::DLQ_TTL
        } else {
            keys::JOB_STATUS_TTL
        };
        self.client
            .setex_raw_bytes(
                keys::job_key(job_id),
                state.as_str().as_bytes().to_vec(),
                ttl.as_secs(),
            )
            .await
            .map_err(StoreError::from)
    }

    async fn bump_attempt(&self, job_id: &str) -> Result<i64, StoreError> {
        let key = keys::attempt_key(job_id);
        let attempt = self
            .client
            .incr(key.clone())
            .await
            .map_err(StoreError::from)?;
        if attempt == 1 {
            self.client
                .expire(key, keys::ATTEMPT_TTL.as_secs())
                .await
                .map_err(StoreError::from)?;
        }
        Ok(attempt)
    }

    async fn schedule_retry(&self, job_id: &str, due_score_millis: f64) -> Result<(), StoreError> {
        self.client
            .zadd(
                keys::RETRY_JOBS_KEY.to_string(),
                job_id.to_string(),
                due_score_millis,
            )
            .await
            .map_err(StoreError::from)
    }

    async fn fetch_due_retries(&self, now_millis: f64) -> Result<Vec<String>, StoreError> {
        let due = self
            .client
            .zrangebyscore(
                keys::RETRY_JOBS_KEY.to_string(),
                "-inf".to_string(),
                now_millis.to_string(),
            )
            .await
            .map_err(StoreError::from)?;

        let mut removed = Vec::with_capacity(due.len());
        for job_id in due {
            let was_present = self
                .client
                .zrem(keys::RETRY_JOBS_KEY.to_string(), job_id.clone())
                .await
                .map_err(StoreError::from)?;
            if was_present {
                removed.push(job_id);
            }
        }
        Ok(removed)
    }

    /// Written with an explicit UTF-8 format, matching `release_lock`'s raw-bytes read: the
    /// default `set_nx_ex` pickles its value, which would make the `get_raw_bytes` compare in
    /// `release_lock` never match and strand the lock until its TTL expires.
    async fn acquire_lock(
        &self,
        holder: &str,
        ttl: std::time::Duration,
    ) -> Result<bool, StoreError> {
        self.client
            .set_nx_ex_with_format(
                keys::RETRY_LOCK_KEY.to_string(),
                holder.to_owned(),
                ttl.as_secs(),
                RedisValueFormat::Utf8,
            )
            .await
            .map_err(StoreError::from)
    }

    async fn release_lock(&self, holder: &str) -> Result<(), StoreError> {
        match self
            .client
            .get_raw_bytes(keys::RETRY_LOCK_KEY.to_string())
            .await
        {
            Ok(bytes) => {
                if bytes == holder.as_bytes() {
                    self.client
                        .del(keys::RETRY_LOCK_KEY.to_string())
                        .await
                        .map_err(StoreError::from)?;
                }
                Ok(())
            }
            Err(CustomRedisError::NotFound) => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}
