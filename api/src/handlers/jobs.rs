use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use job_common::bus::Producer;
use job_common::ingestion::{self, IngestionConfig, SubmissionOutcome};
use job_common::payload::PayloadInput;
use job_common::store::JobStore;
use serde::{Deserialize, Serialize};

#[derive(Clone)]
pub struct JobsState {
    pub store: Arc<dyn JobStore>,
    pub producer: Arc<dyn Producer>,
    pub ingestion: IngestionConfig,
}

#[derive(Deserialize)]
pub struct JobRequest {
    #[serde(default)]
    idempotency_key: String,
    payload: Option<serde_json::Value>,
    payload_ref: Option<String>,
    payload_size: Option<i64>,
    payload_hash: Option<String>,
}

#[derive(Serialize)]
pub struct JobResponse {
    job_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    status: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    warning: Option<&'static str>,
}

#[derive(Serialize)]
pub struct ErrorResponse {
    error: &'static str,
}

pub async fn post_jobs(
    State(state): State<JobsState>,
    body: Result<Json<JobRequest>, JsonRejection>,
) -> (StatusCode, Json<serde_json::Value>) {
    let Json(request) = match body {
        Ok(body) => body,
        Err(_) => {
            let labels = [("outcome", "invalid_json")];
            metrics::counter!("job_submissions_total", &labels).increment(1);
            return (
                StatusCode::BAD_REQUEST,
                Json(
                    serde_json::to_value(ErrorResponse {
                        error: "invalid_json",
                    })
                    .expect("ErrorResponse always serializes"),
                ),
            );
        }
    };

    let inline = request
        .payload
        .as_ref()
        .map(serde_json::to_vec)
        .transpose()
        .ok()
        .flatten();
    let input = PayloadInput {
        inline,
        reference: request.payload_ref,
        size: request.payload_size,
        hash: request.payload_hash,
    };

    let outcome = ingestion::submit(
        state.store.as_ref(),
        state.producer.as_ref(),
        &state.ingestion,
        &request.idempotency_key,
        &input,
    )
    .await;

    match outcome {
        SubmissionOutcome::Created { job_id } => {
            let labels = [("outcome", "created")];
            metrics::counter!("job_submissions_total", &labels).increment(1);
            (
                StatusCode::CREATED,
                Json(
                    serde_json::to_value(JobResponse {
                        job_id,
                        status: Some("queued"),
                        warning: None,
                    })
                    .expect("JobResponse always serializes"),
                ),
            )
        }
        SubmissionOutcome::Accepted { job_id } => {
            let labels = [("outcome", "dedupe_degraded")];
            metrics::counter!("job_submissions_total", &labels).increment(1);
            (
                StatusCode::ACCEPTED,
                Json(
                    serde_json::to_value(JobResponse {
                        job_id,
                        status: Some("queued"),
                        warning: Some("dedupe_degraded"),
                    })
                    .expect("JobResponse always serializes"),
                ),
            )
        }
        SubmissionOutcome::Rejected(err) => {
            let labels = [("outcome", err.token())];
            metrics::counter!("job_submissions_total", &labels).increment(1);
            (
                status_for(&err),
                Json(
                    serde_json::to_value(ErrorResponse { error: err.token() })
                        .expect("ErrorResponse always serializes"),
                ),
            )
        }
    }
}

fn status_for(err: &ingestion::SubmissionError) -> StatusCode {
    use ingestion::SubmissionError::*;
    match err {
        MissingIdempotencyKey | MissingPayload | PayloadConflict | PayloadRefInvalid => {
            StatusCode::BAD_REQUEST
        }
        PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
        PayloadEncodingFailed | StoreError => StatusCode::INTERNAL_SERVER_ERROR,
        PublishFailed => StatusCode::SERVICE_UNAVAILABLE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use axum::routing::post;
    use axum::Router;
    use job_common::testing::{InMemoryJobStore, InMemoryProducer};
    use tower::ServiceExt;

    fn app() -> Router {
        let state = JobsState {
            store: Arc::new(InMemoryJobStore::new()),
            producer: Arc::new(InMemoryProducer::new()),
            ingestion: IngestionConfig {
                jobs_topic: "jobs".to_string(),
                max_inline_bytes: job_common::payload::MAX_INLINE_BYTES,
            },
        };
        Router::new()
            .route("/jobs", post(post_jobs))
            .with_state(state)
    }

    #[tokio::test]
    async fn happy_path_returns_created() {
        let response = app()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/jobs")
                    .header("content-type", "application/json")
                    .body(Body::from(
                        serde_json::json!({"idempotency_key": "k1", "payload": {"hello": "world"}})
                            .to_string(),
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
    }

    #[tokio::test]
    async fn missing_idempotency_key_returns_bad_request() {
        let response = app()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/jobs")
                    .header("content-type", "application/json")
                    .body(Body::from(
                        serde_json::json!({"payload": {"hello": "world"}}).to_string(),
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn malformed_json_body_returns_invalid_json() {
        let response = app()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/jobs")
                    .header("content-type", "application/json")
                    .body(Body::from("not json"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn oversize_payload_returns_payload_too_large() {
        let big = "x".repeat(job_common::payload::MAX_INLINE_BYTES + 1);
        let response = app()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/jobs")
                    .header("content-type", "application/json")
                    .body(Body::from(
                        serde_json::json!({"idempotency_key": "k2", "payload": big}).to_string(),
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }
}
