//! Core of the ingestion path (`POST /jobs`): normalize → dedupe → create → publish. Framework
//! agnostic — the `api` binary's axum handler does nothing but parse JSON and translate
//! [`SubmissionOutcome`] into an HTTP response, so this logic is unit-testable without HTTP or a
//! live store/bus.
use crate::bus::Producer;
use crate::idempotency::{self, CreateDecision, DuplicateDecision, LookupDecision};
use crate::job;
use crate::payload::{self, PayloadDecision, PayloadInput};
use crate::store::JobStore;

#[derive(Clone, Debug)]
pub struct IngestionConfig {
    pub jobs_topic: String,
    pub max_inline_bytes: usize,
}

/// The error tokens `POST /jobs` can surface; `api` maps each to an HTTP status.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubmissionError {
    MissingIdempotencyKey,
    MissingPayload,
    PayloadTooLarge,
    PayloadConflict,
    /// A reference payload was supplied without a usable size/hash. The decision table has one
    /// outcome here (`ref_meta_missing`), collapsing the separate `payload_ref_required` token
    /// into this one; we emit `payload_ref_invalid` uniformly — see DESIGN.md.
    PayloadRefInvalid,
    PayloadEncodingFailed,
    StoreError,
    PublishFailed,
}

impl SubmissionError {
    pub fn token(&self) -> &'static str {
        match self {
            SubmissionError::MissingIdempotencyKey => "missing_idempotency_key",
            SubmissionError::MissingPayload => "missing_payload",
            SubmissionError::PayloadTooLarge => "payload_too_large",
            SubmissionError::PayloadConflict => "payload_conflict",
            SubmissionError::PayloadRefInvalid => "payload_ref_invalid",
            SubmissionError::PayloadEncodingFailed => "payload_encoding_failed",
            SubmissionError::StoreError => "store_error",
            SubmissionError::PublishFailed => "publish_failed",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SubmissionOutcome {
    /// 201: the job is durably recorded and its submission acknowledged by the bus.
    Created { job_id: String },
    /// 202: the bus acknowledged but dedupe is degraded (store was unavailable).
    Accepted { job_id: String },
    /// 4xx/5xx: nothing was published.
    Rejected(SubmissionError),
}

/// Runs normalize → dedupe → create → publish end to end. `idempotency_key` is trimmed internally; callers only need to have
/// already rejected a key that is empty after JSON parsing produced no field at all.
pub async fn submit<S, P>(
    store: &S,
    producer: &P,
    cfg: &IngestionConfig,
    idempotency_key: &str,
    payload: &PayloadInput,
) -> SubmissionOutcome
where
    S: JobStore,
    P: Producer,
{
    let key = idempotency_key.trim();
    if key.is_empty() {
        return SubmissionOutcome::Rejected(SubmissionError::MissingIdempotencyKey);
    }

    let (decision, bytes) = match payload::normalize(payload, cfg.max_inline_bytes) {
        Ok(v) => v,
        Err(_) => return SubmissionOutcome::Rejected(SubmissionError::PayloadEncodingFailed),
    };
    let payload_bytes = match decision {
        PayloadDecision::Missing => {
            return SubmissionOutcome::Rejected(SubmissionError::MissingPayload)
        }
        PayloadDecision::Conflict => {
            return SubmissionOutcome::Rejected(SubmissionError::PayloadConflict)
        }
        PayloadDecision::InlineTooLarge => {
            return SubmissionOutcome::Rejected(SubmissionError::PayloadTooLarge)
        }
        PayloadDecision::RefMetaMissing => {
            return SubmissionOutcome::Rejected(SubmissionError::PayloadRefInvalid)
        }
        PayloadDecision::Inline | PayloadDecision::Ref => {
            bytes.expect("normalize emits bytes alongside Inline/Ref decisions")
        }
    };

    let lookup = store.lookup(key).await;
    let (found, err) = split(&lookup);
    match idempotency::decide_lookup(found, err) {
        LookupDecision::Existing => {
            let job_id = lookup
                .expect("Existing implies Ok")
                .job_id
                .expect("found implies job_id");
            return SubmissionOutcome::Created { job_id };
        }
        LookupDecision::FailOpen => {
            return fail_open(producer, &cfg.jobs_topic, &payload_bytes).await;
        }
        LookupDecision::Error => return SubmissionOutcome::Rejected(SubmissionError::StoreError),
        LookupDecision::Proceed => {}
    }

    let job_id = job::generate_job_id();

    let create_result = store.create(key, &job_id, &payload_bytes).await;
    match idempotency::decide_create(create_result.as_ref().err()) {
        CreateDecision::Ok => {}
        CreateDecision::AlreadyExists => {
            let relookup = store.lookup(key).await;
            let (found2, err2) = split(&relookup);
            return match idempotency::decide_duplicate(found2, err2) {
                DuplicateDecision::ReturnExisting => SubmissionOutcome::Created {
                    job_id: relookup
                        .expect("ReturnExisting implies Ok")
                        .job_id
                        .expect("found implies job_id"),
                },
                DuplicateDecision::Error => {
                    SubmissionOutcome::Rejected(SubmissionError::StoreError)
                }
            };
        }
        CreateDecision::FailOpen => {
            return fail_open_with_id(producer, &cfg.jobs_topic, &job_id, &payload_bytes).await;
        }
        CreateDecision::Error => return SubmissionOutcome::Rejected(SubmissionError::StoreError),
    }

    match producer.publish(&cfg.jobs_topic, &job_id, &payload_bytes).await {
        Ok(()) => SubmissionOutcome::Created { job_id },
        Err(_) => SubmissionOutcome::Rejected(SubmissionError::PublishFailed),
    }
}

fn split(
    result: &Result<crate::store::LookupResult, crate::store::StoreError>,
) -> (bool, Option<&crate::store::StoreError>) {
    match result {
        Ok(r) => (r.found, None),
        Err(e) => (false, Some(e)),
    }
}

async fn fail_open<P: Producer>(producer: &P, topic: &str, payload: &[u8]) -> SubmissionOutcome {
    let job_id = job::generate_job_id();
    fail_open_with_id(producer, topic, &job_id, payload).await
}

async fn fail_open_with_id<P: Producer>(
    producer: &P,
    topic: &str,
    job_id: &str,
    payload: &[u8],
) -> SubmissionOutcome {
    match producer.publish(topic, job_id, payload).await {
        Ok(()) => SubmissionOutcome::Accepted {
            job_id: job_id.to_string(),
        },
        Err(_) => SubmissionOutcome::Rejected(SubmissionError::PublishFailed),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{InMemoryJobStore, InMemoryProducer};

    fn cfg() -> IngestionConfig {
        IngestionConfig {
            jobs_topic: "jobs".to_string(),
            max_inline_bytes: payload::MAX_INLINE_BYTES,
        }
    }

    fn inline_payload(bytes: &[u8]) -> PayloadInput {
        PayloadInput {
            inline: Some(bytes.to_vec()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn happy_path_creates_and_publishes_once() {
        let store = InMemoryJobStore::new();
        let producer = InMemoryProducer::new();
        let outcome = submit(
            &store,
            &producer,
            &cfg(),
            "k1",
            &inline_payload(br#"{"hello":"world"}"#),
        )
        .await;

        let job_id = match outcome {
            SubmissionOutcome::Created { job_id } => job_id,
            other => panic!("expected Created, got {other:?}"),
        };
        assert_eq!(store.status_of(&job_id), Some(crate::state::JobState::Queued));
        let published = producer.published();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].1, job_id);
        assert_eq!(published[0].2, br#"{"hello":"world"}"#.to_vec());
    }

    #[tokio::test]
    async fn rejects_whitespace_only_idempotency_key() {
        let store = InMemoryJobStore::new();
        let producer = InMemoryProducer::new();
        let outcome = submit(&store, &producer, &cfg(), "   ", &inline_payload(b"{}")).await;
        assert_eq!(
            outcome,
            SubmissionOutcome::Rejected(SubmissionError::MissingIdempotencyKey)
        );
    }

    #[tokio::test]
    async fn duplicate_submission_returns_same_job_id_without_republishing() {
        let store = InMemoryJobStore::new();
        let producer = InMemoryProducer::new();
        let first = submit(&store, &producer, &cfg(), "k2", &inline_payload(b"{}")).await;
        let first_id = match first {
            SubmissionOutcome::Created { job_id } => job_id,
            other => panic!("expected Created, got {other:?}"),
        };

        let second = submit(&store, &producer, &cfg(), "k2", &inline_payload(b"{}")).await;
        assert_eq!(second, SubmissionOutcome::Created { job_id: first_id });
        assert_eq!(producer.published().len(), 1);
    }

    #[tokio::test]
    async fn fail_open_publishes_without_store_write() {
        let store = InMemoryJobStore::unavailable();
        let producer = InMemoryProducer::new();
        let outcome = submit(&store, &producer, &cfg(), "k3", &inline_payload(b"{\"x\":1}")).await;

        let job_id = match outcome {
            SubmissionOutcome::Accepted { job_id } => job_id,
            other => panic!("expected Accepted, got {other:?}"),
        };
        assert_eq!(producer.published().len(), 1);
        assert_eq!(producer.published()[0].1, job_id);
    }

    #[tokio::test]
    async fn oversize_payload_is_rejected_before_any_write() {
        let store = InMemoryJobStore::new();
        let producer = InMemoryProducer::new();
        let big = vec![0u8; 300_000];
        let outcome = submit(&store, &producer, &cfg(), "k5", &inline_payload(&big)).await;
        assert_eq!(
            outcome,
            SubmissionOutcome::Rejected(SubmissionError::PayloadTooLarge)
        );
        assert!(producer.published().is_empty());
    }

    #[tokio::test]
    async fn missing_payload_is_rejected() {
        let store = InMemoryJobStore::new();
        let producer = InMemoryProducer::new();
        let outcome = submit(&store, &producer, &cfg(), "k6", &PayloadInput::default()).await;
        assert_eq!(
            outcome,
            SubmissionOutcome::Rejected(SubmissionError::MissingPayload)
        );
    }

    #[tokio::test]
    async fn conflicting_payload_is_rejected() {
        let store = InMemoryJobStore::new();
        let producer = InMemoryProducer::new();
        let input = PayloadInput {
            inline: Some(b"hi".to_vec()),
            reference: Some("s3://bucket/obj".to_string()),
            size: Some(1),
            hash: Some("abc".to_string()),
        };
        let outcome = submit(&store, &producer, &cfg(), "k7", &input).await;
        assert_eq!(
            outcome,
            SubmissionOutcome::Rejected(SubmissionError::PayloadConflict)
        );
    }
}
