//! Ticks `job_common::dispatcher::tick` every `retry_dispatcher.poll_interval`, draining due
//! entries from the retry set back onto the jobs topic under the single-writer lock.
use std::sync::Arc;

use common_kafka::config::KafkaConfig;
use common_kafka::kafka_producer::create_kafka_producer;
use common_redis::RedisClient;
use health::HealthRegistry;
use job_common::bus::KafkaBusProducer;
use job_common::config::Config;
use job_common::dispatcher::{self, DispatcherConfig};
use job_common::store::RedisJobStore;

mod handlers;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let config_path = std::env::var("CONFIG_PATH")
        .unwrap_or_else(|_| job_common::config::DEFAULT_CONFIG_PATH.to_string());
    let config = Config::load(&config_path).expect("failed to load configuration");
    config
        .validate_for_retry_dispatcher()
        .expect("invalid configuration for retry-dispatcher");

    let liveness = HealthRegistry::new("liveness");
    let kafka_liveness = liveness
        .register("kafka_producer".to_string(), time::Duration::seconds(30))
        .await;

    let redis_client = RedisClient::new(config.redis.addr.clone())
        .await
        .expect("failed to connect to redis");
    let store = Arc::new(RedisJobStore::new(redis_client));

    let kafka_config = KafkaConfig {
        kafka_hosts: config.kafka.brokers.join(","),
        kafka_client_id: if config.kafka.client_id.is_empty() {
            None
        } else {
            Some(config.kafka.client_id.clone())
        },
        ..Default::default()
    };
    let kafka_producer = create_kafka_producer(&kafka_config, kafka_liveness)
        .await
        .expect("failed to construct kafka producer");
    let producer = Arc::new(KafkaBusProducer::new(kafka_producer));

    let dispatcher_cfg = DispatcherConfig {
        jobs_topic: config.kafka.jobs_topic.clone(),
        poll_interval: config.retry_dispatcher_poll_interval(),
    };

    let shutdown = lifecycle::Shutdown::new();
    shutdown.trap_signals();

    let holder = format!("retry-dispatcher-{}-{}", hostname(), std::process::id());

    let dispatch_liveness = liveness
        .register("retry_dispatcher".to_string(), time::Duration::seconds(60))
        .await;

    let ticker = {
        let store = store.clone();
        let producer = producer.clone();
        let shutdown = shutdown.clone();
        let poll_interval = dispatcher_cfg.poll_interval;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(poll_interval);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = interval.tick() => {}
                }
                let report = dispatcher::tick(
                    store.as_ref(),
                    producer.as_ref(),
                    &dispatcher_cfg,
                    &holder,
                )
                .await;
                tracing::debug!(?report, "retry-dispatcher tick");
                dispatch_liveness.report_healthy().await;
            }
        })
    };

    let router = handlers::app::app(liveness);
    let router = serve_metrics::setup_metrics_routes(router);
    let bind = config.api.addr.clone();

    tokio::select! {
        _ = shutdown.cancelled() => {}
        result = serve_metrics::serve(router, &bind) => {
            if let Err(e) = result {
                tracing::error!("failed to start retry-dispatcher http server, {}", e);
            }
        }
    }

    shutdown
        .run_until_shutdown(async {
            let _ = ticker.await;
        })
        .await;
}

fn hostname() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "unknown-host".to_string())
}
