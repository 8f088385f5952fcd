//! Retry-dispatcher tick: a single logical instance, enforced by a time-bounded lock, republishes
//! due retries from the time-ordered retry set back onto the jobs topic.
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::bus::Producer;
use crate::state::JobState;
use crate::store::JobStore;

#[derive(Clone, Debug)]
pub struct DispatcherConfig {
    pub jobs_topic: String,
    pub poll_interval: Duration,
}

/// One tick's outcome, for logging/metrics at the call site.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct TickReport {
    pub lock_acquired: bool,
    pub republished: usize,
    pub rescheduled_after_failure: usize,
}

/// Runs one dispatcher tick. `holder` identifies this dispatcher instance for the lock
/// (hostname+pid is typical); the caller is responsible for sleeping `poll_interval` between
/// ticks and for retrying promptly when the lock isn't acquired.
pub async fn tick<S, P>(store: &S, producer: &P, cfg: &DispatcherConfig, holder: &str) -> TickReport
where
    S: JobStore,
    P: Producer,
{
    let lock_ttl = crate::keys::retry_lock_ttl(cfg.poll_interval);
    let acquired = match store.acquire_lock(holder, lock_ttl).await {
        Ok(acquired) => acquired,
        Err(err) => {
            tracing::warn!(error = %err, "failed to acquire retry lock");
            false
        }
    };
    if !acquired {
        return TickReport::default();
    }

    let mut report = TickReport {
        lock_acquired: true,
        ..Default::default()
    };

    let now_ms = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as f64;

    match store.fetch_due_retries(now_ms).await {
        Ok(due) => {
            for job_id in due {
                republish_one(store, producer, cfg, &job_id, now_ms, &mut report).await;
            }
        }
        Err(err) => {
            tracing::error!(error = %err, "failed to fetch due retries");
        }
    }

    if let Err(err) = store.release_lock(holder).await {
        tracing::warn!(error = %err, "failed to release retry lock");
    }

    report
}

async fn republish_one<S, P>(
    store: &S,
    producer: &P,
    cfg: &DispatcherConfig,
    job_id: &str,
    original_score: f64,
    report: &mut TickReport,
) where
    S: JobStore,
    P: Producer,
{
    let payload = match store.fetch_payload(job_id).await {
        Ok(Some(bytes)) => bytes,
        Ok(None) => {
            tracing::error!(job_id, "due retry has no stored payload; dropping");
            return;
        }
        Err(err) => {
            tracing::error!(job_id, error = %err, "failed to fetch payload for due retry");
            reschedule(store, cfg, job_id, original_score, report).await;
            return;
        }
    };

    match producer.publish(&cfg.jobs_topic, job_id, &payload).await {
        Ok(()) => {
            if let Err(err) = store.set_status(job_id, JobState::Queued).await {
                tracing::warn!(job_id, error = %err, "failed to record queued status");
            }
            report.republished += 1;
            metrics::counter!("retry_dispatcher_republished_total").increment(1);
        }
        Err(err) => {
            tracing::warn!(job_id, error = %err, "failed to republish due retry");
            reschedule(store, cfg, job_id, original_score, report).await;
        }
    }
}

async fn reschedule<S: JobStore>(
    store: &S,
    cfg: &DispatcherConfig,
    job_id: &str,
    original_score: f64,
    report: &mut TickReport,
) {
    // Refresh the score by one poll interval rather than reusing `original_score` verbatim: the
    // entry would otherwise be immediately due again on the very next tick and starve the ones
    // behind it if the failure is persistent (e.g. the bus itself is down).
    let refreshed = original_score + cfg.poll_interval.as_millis() as f64;
    if let Err(err) = store.reschedule_retry(job_id, refreshed).await {
        tracing::error!(job_id, error = %err, "failed to reschedule retry after publish failure");
    } else {
        report.rescheduled_after_failure += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{InMemoryJobStore, InMemoryProducer};

    fn cfg() -> DispatcherConfig {
        DispatcherConfig {
            jobs_topic: "jobs".to_string(),
            poll_interval: Duration::from_secs(1),
        }
    }

    #[tokio::test]
    async fn republishes_due_entries_and_marks_queued() {
        let store = InMemoryJobStore::new();
        store.create("k1", "job-1", b"{}").await.unwrap();
        store.schedule_retry("job-1", 0.0).await.unwrap();

        let producer = InMemoryProducer::new();
        let report = tick(&store, &producer, &cfg(), "dispatcher-1").await;

        assert!(report.lock_acquired);
        assert_eq!(report.republished, 1);
        assert_eq!(store.status_of("job-1"), Some(JobState::Queued));
        let published = producer.published();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].1, "job-1");
    }

    #[tokio::test]
    async fn leaves_future_entries_untouched() {
        let store = InMemoryJobStore::new();
        store.create("k2", "job-2", b"{}").await.unwrap();
        let far_future = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_millis() as f64
            + 3_600_000.0;
        store.schedule_retry("job-2", far_future).await.unwrap();

        let producer = InMemoryProducer::new();
        let report = tick(&store, &producer, &cfg(), "dispatcher-1").await;

        assert_eq!(report.republished, 0);
        assert!(producer.published().is_empty());
        assert!(store.retry_score_of("job-2").is_some());
    }

    #[tokio::test]
    async fn second_dispatcher_cannot_acquire_held_lock() {
        let store = InMemoryJobStore::new();
        assert!(store
            .acquire_lock("holder-a", Duration::from_secs(5))
            .await
            .unwrap());

        let producer = InMemoryProducer::new();
        let report = tick(&store, &producer, &cfg(), "holder-b").await;
        assert!(!report.lock_acquired);
    }

    #[tokio::test]
    async fn publish_failure_reschedules_instead_of_dropping() {
        struct FailingProducer;
        #[async_trait::async_trait]
        impl Producer for FailingProducer {
            async fn publish(
                &self,
                _topic: &str,
                _key: &str,
                _payload: &[u8],
            ) -> Result<(), crate::bus::BusError> {
                Err(crate::bus::BusError::Receive(
                    common_kafka::kafka_consumer::RecvErr::Empty,
                ))
            }
        }

        let store = InMemoryJobStore::new();
        store.create("k3", "job-3", b"{}").await.unwrap();
        store.schedule_retry("job-3", 0.0).await.unwrap();

        let report = tick(&store, &FailingProducer, &cfg(), "dispatcher-1").await;
        assert_eq!(report.republished, 0);
        assert_eq!(report.rescheduled_after_failure, 1);
        assert!(store.retry_score_of("job-3").is_some());
    }
}
