//! Per-message worker handling: processing → done, or attempt bump → retrying/dlq. The loop that
//! repeatedly polls and calls [`handle_message`] lives in the worker binary; this module is the
//! part worth unit-testing without a live bus.
use std::time::SystemTime;

use crate::bus::{BusError, Consumer, Producer};
use crate::processor::Processor;
use crate::retry_policy::{JitterSource, RetryPolicy};
use crate::state::JobState;
use crate::store::JobStore;

#[derive(Clone, Debug)]
pub struct WorkerConfig {
    pub dlq_topic: String,
    /// Attempts (inclusive) that still retry instead of going to the DLQ. The original mq-redis
    /// worker hardcodes this to 1; exposed here as a config knob per the retry-policy section of
    /// the config schema. Default 1.
    pub max_attempts_before_dlq: i64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            dlq_topic: "jobs.dlq".to_string(),
            max_attempts_before_dlq: 1,
        }
    }
}

/// What happened to one polled message, for logging/metrics at the call site.
#[derive(Debug, PartialEq, Eq)]
pub enum HandleOutcome {
    Done,
    Retrying { attempt: i64 },
    DeadLettered { attempt: i64 },
    /// The message key was empty; nothing could be tied to a job. The offset is still committed
    /// since redelivery would only repeat the same unprocessable message.
    Dropped,
}

/// Polls one message and drives it through the lifecycle. Propagates bus errors from the poll
/// itself (cancellation included) so the caller can log-and-continue; errors from processing are
/// handled internally and reflected in the outcome.
pub async fn run_once<C, S, P, Proc>(
    consumer: &C,
    store: &S,
    dlq_producer: &P,
    processor: &Proc,
    retry_policy: &RetryPolicy,
    cfg: &WorkerConfig,
    rng: &mut dyn JitterSource,
) -> Result<HandleOutcome, BusError>
where
    C: Consumer,
    S: JobStore,
    P: Producer,
    Proc: Processor,
{
    let message = consumer.poll().await?;
    let outcome = handle_message(
        store,
        dlq_producer,
        processor,
        retry_policy,
        cfg,
        rng,
        message.key.as_deref(),
        &message.payload,
    )
    .await;
    // Commit only once the terminal write for this delivery has been attempted.
    if let Err(err) = message.commit() {
        tracing::warn!(error = %err, "failed to commit bus offset after handling message");
    }
    Ok(outcome)
}

async fn handle_message<S, P, Proc>(
    store: &S,
    dlq_producer: &P,
    processor: &Proc,
    retry_policy: &RetryPolicy,
    cfg: &WorkerConfig,
    rng: &mut dyn JitterSource,
    key: Option<&str>,
    payload: &[u8],
) -> HandleOutcome
where
    S: JobStore,
    P: Producer,
    Proc: Processor,
{
    let job_id = match key {
        Some(key) if !key.is_empty() => key,
        _ => {
            tracing::error!("received message with empty key; dropping");
            return HandleOutcome::Dropped;
        }
    };

    if let Err(err) = store.set_status(job_id, JobState::Processing).await {
        tracing::warn!(job_id, error = %err, "failed to record processing status");
    }

    let started = std::time::Instant::now();
    let outcome = match processor.process(job_id, payload).await {
        Ok(()) => {
            if let Err(err) = store.set_status(job_id, JobState::Done).await {
                tracing::warn!(job_id, error = %err, "failed to record done status");
            }
            let labels = [("outcome", "done")];
            metrics::counter!("jobs_processed_total", &labels).increment(1);
            HandleOutcome::Done
        }
        Err(err) => {
            tracing::warn!(job_id, error = %err, "processor failed");
            handle_processor_failure(store, dlq_producer, retry_policy, cfg, rng, job_id, payload)
                .await
        }
    };
    let labels = [("outcome", outcome_label(&outcome))];
    metrics::histogram!("job_processing_duration_seconds", &labels)
        .record(started.elapsed().as_secs_f64());
    outcome
}

fn outcome_label(outcome: &HandleOutcome) -> &'static str {
    match outcome {
        HandleOutcome::Done => "done",
        HandleOutcome::Retrying { .. } => "retrying",
        HandleOutcome::DeadLettered { .. } => "dlq",
        HandleOutcome::Dropped => "dropped",
    }
}

async fn handle_processor_failure<S, P>(
    store: &S,
    dlq_producer: &P,
    retry_policy: &RetryPolicy,
    cfg: &WorkerConfig,
    rng: &mut dyn JitterSource,
    job_id: &str,
    payload: &[u8],
) -> HandleOutcome
where
    S: JobStore,
    P: Producer,
{
    let attempt = match store.bump_attempt(job_id).await {
        Ok(n) => n,
        Err(err) => {
            tracing::warn!(job_id, error = %err, "failed to bump attempt counter, assuming 1");
            1
        }
    };

    if attempt <= cfg.max_attempts_before_dlq {
        if let Err(err) = store.set_status(job_id, JobState::Retrying).await {
            tracing::warn!(job_id, error = %err, "failed to record retrying status");
        }
        let due = retry_policy.due_score_millis(attempt as u32, SystemTime::now(), rng);
        if let Err(err) = store.schedule_retry(job_id, due).await {
            tracing::error!(job_id, error = %err, "failed to schedule retry");
        }
        let labels = [("outcome", "retrying")];
        metrics::counter!("jobs_processed_total", &labels).increment(1);
        HandleOutcome::Retrying { attempt }
    } else {
        if let Err(err) = store.set_status(job_id, JobState::Dlq).await {
            tracing::warn!(job_id, error = %err, "failed to record dlq status");
        }
        if let Err(err) = dlq_producer.publish(&cfg.dlq_topic, job_id, payload).await {
            tracing::error!(job_id, error = %err, "failed to publish to dlq topic");
        }
        let labels = [("outcome", "dlq")];
        metrics::counter!("jobs_processed_total", &labels).increment(1);
        HandleOutcome::DeadLettered { attempt }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processor::ProcessorError;
    use crate::testing::{InMemoryJobStore, InMemoryProducer};
    use async_trait::async_trait;
    use std::time::Duration;

    struct FixedJitter(f64);
    impl JitterSource for FixedJitter {
        fn next_unit(&mut self) -> f64 {
            self.0
        }
    }

    struct AlwaysFail;
    #[async_trait]
    impl Processor for AlwaysFail {
        async fn process(&self, _job_id: &str, _payload: &[u8]) -> Result<(), ProcessorError> {
            Err(ProcessorError::new("boom"))
        }
    }

    struct AlwaysSucceed;
    #[async_trait]
    impl Processor for AlwaysSucceed {
        async fn process(&self, _job_id: &str, _payload: &[u8]) -> Result<(), ProcessorError> {
            Ok(())
        }
    }

    fn policy() -> RetryPolicy {
        RetryPolicy::new(Duration::from_secs(1), Duration::from_secs(60), 0.0).unwrap()
    }

    #[tokio::test]
    async fn successful_processing_marks_done() {
        let store = InMemoryJobStore::new();
        let dlq = InMemoryProducer::new();
        let mut rng = FixedJitter(0.0);
        let outcome = handle_message(
            &store,
            &dlq,
            &AlwaysSucceed,
            &policy(),
            &WorkerConfig::default(),
            &mut rng,
            Some("job-1"),
            b"{}",
        )
        .await;
        assert_eq!(outcome, HandleOutcome::Done);
        assert_eq!(store.status_of("job-1"), Some(JobState::Done));
    }

    #[tokio::test]
    async fn first_failure_schedules_retry() {
        let store = InMemoryJobStore::new();
        let dlq = InMemoryProducer::new();
        let mut rng = FixedJitter(0.0);
        let outcome = handle_message(
            &store,
            &dlq,
            &AlwaysFail,
            &policy(),
            &WorkerConfig::default(),
            &mut rng,
            Some("job-2"),
            b"{}",
        )
        .await;
        assert_eq!(outcome, HandleOutcome::Retrying { attempt: 1 });
        assert_eq!(store.status_of("job-2"), Some(JobState::Retrying));
        assert!(store.retry_score_of("job-2").is_some());
        assert!(dlq.published().is_empty());
    }

    #[tokio::test]
    async fn second_failure_dead_letters() {
        let store = InMemoryJobStore::new();
        let dlq = InMemoryProducer::new();
        let cfg = WorkerConfig::default();
        let mut rng = FixedJitter(0.0);

        handle_message(&store, &dlq, &AlwaysFail, &policy(), &cfg, &mut rng, Some("job-3"), b"{}")
            .await;
        let outcome = handle_message(
            &store,
            &dlq,
            &AlwaysFail,
            &policy(),
            &cfg,
            &mut rng,
            Some("job-3"),
            b"{}",
        )
        .await;

        assert_eq!(outcome, HandleOutcome::DeadLettered { attempt: 2 });
        assert_eq!(store.status_of("job-3"), Some(JobState::Dlq));
        let published = dlq.published();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].1, "job-3");
    }

    #[tokio::test]
    async fn empty_key_is_dropped_without_touching_store() {
        let store = InMemoryJobStore::new();
        let dlq = InMemoryProducer::new();
        let mut rng = FixedJitter(0.0);
        let outcome = handle_message(
            &store,
            &dlq,
            &AlwaysSucceed,
            &policy(),
            &WorkerConfig::default(),
            &mut rng,
            Some(""),
            b"{}",
        )
        .await;
        assert_eq!(outcome, HandleOutcome::Dropped);
    }
}
