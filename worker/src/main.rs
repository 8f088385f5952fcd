//! Consumes the jobs topic and drives each message through `job_common::worker_loop`.
use std::future::ready;
use std::sync::Arc;
use std::time::Duration;

use axum::routing::get;
use axum::Router;
use common_kafka::config::{ConsumerConfig, KafkaConfig};
use common_kafka::kafka_consumer::SingleTopicConsumer;
use common_kafka::kafka_producer::create_kafka_producer;
use common_redis::RedisClient;
use health::HealthRegistry;
use job_common::bus::{KafkaBusConsumer, KafkaBusProducer};
use job_common::config::Config;
use job_common::processor::NoopProcessor;
use job_common::retry_policy::RetryPolicy;
use job_common::store::RedisJobStore;
use job_common::worker_loop::{self, WorkerConfig as RuntimeWorkerConfig};
use rand::rngs::StdRng;
use rand::SeedableRng;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let config_path = std::env::var("CONFIG_PATH")
        .unwrap_or_else(|_| job_common::config::DEFAULT_CONFIG_PATH.to_string());
    let config = Config::load(&config_path).expect("failed to load configuration");
    config
        .validate_for_worker()
        .expect("invalid configuration for worker");

    let liveness = HealthRegistry::new("liveness");
    let kafka_liveness = liveness
        .register("kafka_producer".to_string(), time::Duration::seconds(30))
        .await;

    let retry_policy = RetryPolicy::new(
        Duration::from_millis(config.worker.retry_base_ms),
        Duration::from_millis(config.worker.retry_max_ms),
        config.worker.retry_jitter,
    )
    .expect("invalid worker retry policy configuration");

    let kafka_config = KafkaConfig {
        kafka_hosts: config.kafka.brokers.join(","),
        kafka_client_id: if config.kafka.client_id.is_empty() {
            None
        } else {
            Some(config.kafka.client_id.clone())
        },
        ..Default::default()
    };

    let redis_client = RedisClient::new(config.redis.addr.clone())
        .await
        .expect("failed to connect to redis");
    let store = Arc::new(RedisJobStore::new(redis_client));

    let dlq_producer = create_kafka_producer(&kafka_config, kafka_liveness)
        .await
        .expect("failed to construct kafka producer");
    let dlq_producer = Arc::new(KafkaBusProducer::new(dlq_producer));

    let worker_cfg = RuntimeWorkerConfig {
        dlq_topic: config.kafka.dlq_topic.clone(),
        max_attempts_before_dlq: config.worker.max_attempts_before_dlq as i64,
    };

    let shutdown = lifecycle::Shutdown::new();
    shutdown.trap_signals();

    let mut tasks = Vec::new();
    for i in 0..config.worker.concurrency {
        let store = store.clone();
        let dlq_producer = dlq_producer.clone();
        let worker_cfg = worker_cfg.clone();
        let retry_policy = retry_policy;
        let liveness_handle = liveness
            .register(format!("worker-{i}"), time::Duration::seconds(60))
            .await;
        let consumer_config =
            ConsumerConfig::new(config.worker.group_id.clone(), config.kafka.jobs_topic.clone());
        let kafka_config = kafka_config.clone();
        let shutdown = shutdown.clone();

        tasks.push(tokio::spawn(async move {
            let consumer = SingleTopicConsumer::new(kafka_config, consumer_config)
                .expect("failed to construct kafka consumer");
            let consumer = KafkaBusConsumer::new(consumer);
            let processor = NoopProcessor;
            let mut rng = StdRng::from_entropy();

            loop {
                if shutdown.is_cancelled() {
                    break;
                }
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    result = worker_loop::run_once(
                        &consumer,
                        store.as_ref(),
                        dlq_producer.as_ref(),
                        &processor,
                        &retry_policy,
                        &worker_cfg,
                        &mut rng,
                    ) => {
                        match result {
                            Ok(outcome) => tracing::debug!(?outcome, "handled message"),
                            Err(err) => tracing::warn!(error = %err, "worker poll failed"),
                        }
                    }
                }
                liveness_handle.report_healthy().await;
            }
        }));
    }

    let router = Router::new()
        .route("/", get(index))
        .route("/_readiness", get(index))
        .route("/_liveness", get(move || ready(liveness.get_status())));
    let router = serve_metrics::setup_metrics_routes(router);
    // The config schema exposes one HTTP bind address; each binary runs in its own process and
    // binds it independently for its own health/metrics listener.
    let bind = config.api.addr.clone();
    tokio::task::spawn(async move {
        serve_metrics::serve(router, &bind)
            .await
            .expect("failed to start serving metrics");
    });

    shutdown
        .run_until_shutdown(async {
            for task in tasks {
                let _ = task.await;
            }
        })
        .await;
}

pub async fn index() -> &'static str {
    "job worker"
}
