//! In-memory doubles for `JobStore`, `Producer`, and `Consumer`, used by handler/worker unit
//! tests that want the real control flow without a live Redis or Kafka.
use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::bus::{BusError, Producer};
use crate::state::JobState;
use crate::store::{JobStore, LookupResult, StoreError};

#[derive(Default)]
struct Records {
    idempotency: HashMap<String, String>,
    status: HashMap<String, JobState>,
    payload: HashMap<String, Vec<u8>>,
    attempts: HashMap<String, i64>,
    retry_set: HashMap<String, f64>,
    lock_holder: Option<String>,
}

/// An in-memory `JobStore`. Optionally simulates an unavailable backing store so fail-open paths
/// can be exercised deterministically.
pub struct InMemoryJobStore {
    records: Mutex<Records>,
    unavailable: bool,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(Records::default()),
            unavailable: false,
        }
    }

    pub fn unavailable() -> Self {
        Self {
            records: Mutex::new(Records::default()),
            unavailable: true,
        }
    }

    pub fn status_of(&self, job_id: &str) -> Option<JobState> {
        self.records.lock().unwrap().status.get(job_id).copied()
    }

    pub fn attempt_of(&self, job_id: &str) -> i64 {
        *self.records.lock().unwrap().attempts.get(job_id).unwrap_or(&0)
    }

    pub fn retry_score_of(&self, job_id: &str) -> Option<f64> {
        self.records.lock().unwrap().retry_set.get(job_id).copied()
    }
}

impl Default for InMemoryJobStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn lookup(&self, idempotency_key: &str) -> Result<LookupResult, StoreError> {
        if self.unavailable {
            return Err(StoreError::Unavailable("simulated outage".into()));
        }
        let records = self.records.lock().unwrap();
        match records.idempotency.get(idempotency_key) {
            Some(job_id) => Ok(LookupResult {
                job_id: Some(job_id.clone()),
                found: true,
            }),
            None => Ok(LookupResult {
                job_id: None,
                found: false,
            }),
        }
    }

    async fn create(
        &self,
        idempotency_key: &str,
        job_id: &str,
        payload: &[u8],
    ) -> Result<(), StoreError> {
        if self.unavailable {
            return Err(StoreError::Unavailable("simulated outage".into()));
        }
        let mut records = self.records.lock().unwrap();
        if records.idempotency.contains_key(idempotency_key) {
            return Err(StoreError::AlreadyExists);
        }
        records
            .idempotency
            .insert(idempotency_key.to_string(), job_id.to_string());
        records.status.insert(job_id.to_string(), JobState::Queued);
        records.payload.insert(job_id.to_string(), payload.to_vec());
        Ok(())
    }

    async fn fetch_payload(&self, job_id: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.records.lock().unwrap().payload.get(job_id).cloned())
    }

    async fn set_status(&self, job_id: &str, state: JobState) -> Result<(), StoreError> {
        self.records
            .lock()
            .unwrap()
            .status
            .insert(job_id.to_string(), state);
        Ok(())
    }

    async fn bump_attempt(&self, job_id: &str) -> Result<i64, StoreError> {
        let mut records = self.records.lock().unwrap();
        let entry = records.attempts.entry(job_id.to_string()).or_insert(0);
        *entry += 1;
        Ok(*entry)
    }

    async fn schedule_retry(&self, job_id: &str, due_score_millis: f64) -> Result<(), StoreError> {
        self.records
            .lock()
            .unwrap()
            .retry_set
            .insert(job_id.to_string(), due_score_millis);
        Ok(())
    }

    async fn fetch_due_retries(&self, now_millis: f64) -> Result<Vec<String>, StoreError> {
        let mut records = self.records.lock().unwrap();
        let due: Vec<String> = records
            .retry_set
            .iter()
            .filter(|(_, score)| **score <= now_millis)
            .map(|(job_id, _)| job_id.clone())
            .collect();
        for job_id in &due {
            records.retry_set.remove(job_id);
        }
        Ok(due)
    }

    async fn acquire_lock(
        &self,
        holder: &str,
        _ttl: std::time::Duration,
    ) -> Result<bool, StoreError> {
        let mut records = self.records.lock().unwrap();
        if records.lock_holder.is_some() {
            return Ok(false);
        }
        records.lock_holder = Some(holder.to_string());
        Ok(true)
    }

    async fn release_lock(&self, holder: &str) -> Result<(), StoreError> {
        let mut records = self.records.lock().unwrap();
        if records.lock_holder.as_deref() == Some(holder) {
            records.lock_holder = None;
        }
        Ok(())
    }
}

/// An in-memory `Producer` recording every publish for assertions.
#[derive(Default)]
pub struct InMemoryProducer {
    published: Mutex<Vec<(String, String, Vec<u8>)>>,
}

impl InMemoryProducer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn published(&self) -> Vec<(String, String, Vec<u8>)> {
        self.published.lock().unwrap().clone()
    }
}

#[async_trait]
impl Producer for InMemoryProducer {
    async fn publish(&self, topic: &str, key: &str, payload: &[u8]) -> Result<(), BusError> {
        self.published
            .lock()
            .unwrap()
            .push((topic.to_string(), key.to_string(), payload.to_vec()));
        Ok(())
    }
}
