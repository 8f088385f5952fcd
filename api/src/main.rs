use std::sync::Arc;

use axum::Router;
use common_kafka::config::KafkaConfig;
use common_kafka::kafka_producer::create_kafka_producer;
use common_redis::RedisClient;
use health::HealthRegistry;
use job_common::bus::KafkaBusProducer;
use job_common::config::Config;
use job_common::ingestion::IngestionConfig;
use job_common::store::RedisJobStore;

mod handlers;

use handlers::jobs::JobsState;

async fn listen(app: Router, bind: String) -> eyre::Result<()> {
    let listener = tokio::net::TcpListener::bind(&bind).await?;
    let shutdown = lifecycle::Shutdown::new();
    shutdown.trap_signals();
    let graceful = shutdown.clone();
    shutdown
        .run_until_shutdown(async move {
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(async move { graceful.cancelled().await })
                .await
            {
                tracing::error!("api http server error: {}", e);
            }
        })
        .await;
    Ok(())
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let config_path =
        std::env::var("CONFIG_PATH").unwrap_or_else(|_| job_common::config::DEFAULT_CONFIG_PATH.to_string());
    let config = Config::load(&config_path).expect("failed to load configuration");
    config
        .validate_for_api()
        .expect("invalid configuration for api");

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

    let state = JobsState {
        store,
        producer,
        ingestion: IngestionConfig {
            jobs_topic: config.kafka.jobs_topic.clone(),
            max_inline_bytes: job_common::payload::MAX_INLINE_BYTES,
        },
    };

    let app = handlers::app::add_routes(Router::new(), state, liveness);
    let app = serve_metrics::setup_metrics_routes(app);

    match listen(app, config.api.addr.clone()).await {
        Ok(()) => {}
        Err(e) => tracing::error!("failed to start api http server, {}", e),
    }
}
