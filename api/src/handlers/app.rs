use axum::{routing, Json, Router};
use health::HealthRegistry;
use serde::Serialize;

use super::jobs::{post_jobs, JobsState};

#[derive(Serialize)]
struct HealthzResponse {
    status: &'static str,
}

pub fn add_routes(router: Router, state: JobsState, liveness: HealthRegistry) -> Router {
    router
        .route("/", routing::get(index))
        .route("/jobs", routing::post(post_jobs).with_state(state))
        .route(
            "/healthz",
            routing::get(move || healthz(liveness.clone())),
        )
}

pub async fn index() -> &'static str {
    "job ingestion api"
}

async fn healthz(liveness: HealthRegistry) -> Json<HealthzResponse> {
    let status = liveness.get_status();
    Json(HealthzResponse {
        status: if status.healthy { "ok" } else { "unhealthy" },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use job_common::ingestion::IngestionConfig;
    use job_common::testing::{InMemoryJobStore, InMemoryProducer};
    use std::sync::Arc;
    use tower::ServiceExt;

    #[tokio::test]
    async fn index_returns_ok() {
        let state = JobsState {
            store: Arc::new(InMemoryJobStore::new()),
            producer: Arc::new(InMemoryProducer::new()),
            ingestion: IngestionConfig {
                jobs_topic: "jobs".to_string(),
                max_inline_bytes: job_common::payload::MAX_INLINE_BYTES,
            },
        };
        let liveness = HealthRegistry::new("liveness");
        let app = add_routes(Router::new(), state, liveness);

        let response = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
