use crate::config::KafkaConfig;

use futures::future::join_all;
use health::HealthHandle;
use rdkafka::error::KafkaError;
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::ClientConfig;
use thiserror::Error;
use tracing::debug;

pub struct KafkaContext {
    liveness: HealthHandle,
}

impl rdkafka::ClientContext for KafkaContext {
    fn stats(&self, _: rdkafka::Statistics) {
        // Signal liveness, as the main rdkafka loop is running and calling us
        self.liveness.report_healthy_blocking();
    }
}

/// Build a producer from config. Does not probe brokers at construction time; a misconfigured
/// or unreachable cluster surfaces as delivery failures on the first publish, not as a startup
/// error here.
pub async fn create_kafka_producer(
    config: &KafkaConfig,
    liveness: HealthHandle,
) -> Result<FutureProducer<KafkaContext>, KafkaError> {
    let mut client_config = ClientConfig::new();
    client_config
        .set("bootstrap.servers", &config.kafka_hosts)
        .set("statistics.interval.ms", "10000")
        .set("linger.ms", config.kafka_producer_linger_ms.to_string())
        .set(
            "message.timeout.ms",
            config.kafka_message_timeout_ms.to_string(),
        )
        .set(
            "compression.codec",
            config.kafka_compression_codec.to_owned(),
        )
        .set(
            "queue.buffering.max.kbytes",
            (config.kafka_producer_queue_mib * 1024).to_string(),
        );

    if let Some(client_id) = &config.kafka_client_id {
        client_config.set("client.id", client_id);
    }

    if config.kafka_tls {
        client_config
            .set("security.protocol", "ssl")
            .set("enable.ssl.certificate.verification", "false");
    };

    debug!("rdkafka configuration: {:?}", client_config);
    let api: FutureProducer<KafkaContext> =
        client_config.create_with_context(KafkaContext { liveness })?;

    Ok(api)
}

#[derive(Error, Debug)]
pub enum KafkaProduceError {
    #[error("failed to produce to kafka: {error}")]
    KafkaProduceError { error: KafkaError },
    #[error("failed to produce to kafka (timeout)")]
    KafkaProduceCanceled,
}

/// Publish one key-addressed, opaque-bytes message. The key routes the message to a partition
/// (same `job_id` always lands on the same partition for as long as the topic is stable).
pub async fn send_keyed_message(
    kafka_producer: &FutureProducer<KafkaContext>,
    topic: &str,
    key: &str,
    payload: &[u8],
) -> Result<(), KafkaProduceError> {
    send_keyed_iter_to_kafka(kafka_producer, topic, std::iter::once((key, payload.to_vec())))
        .await
}

/// Publish a batch of key-addressed, opaque-bytes messages concurrently, awaiting every
/// delivery before returning. Used by the retry dispatcher, which may have many due entries to
/// republish on a single tick.
pub async fn send_keyed_iter_to_kafka<'a>(
    kafka_producer: &FutureProducer<KafkaContext>,
    topic: &str,
    iter: impl IntoIterator<Item = (&'a str, Vec<u8>)>,
) -> Result<(), KafkaProduceError> {
    let mut delivery_futures = Vec::new();

    for (key, payload) in iter {
        match kafka_producer.send_result(FutureRecord {
            topic,
            payload: Some(&payload),
            partition: None,
            key: Some(key),
            timestamp: None,
            headers: None,
        }) {
            Ok(future) => delivery_futures.push(future),
            Err((error, _)) => return Err(KafkaProduceError::KafkaProduceError { error }),
        }
    }

    for result in join_all(delivery_futures).await {
        match result {
            Ok(Ok(_)) => {}
            Ok(Err((error, _))) => return Err(KafkaProduceError::KafkaProduceError { error }),
            Err(_) => {
                // Cancelled due to timeout while retrying
                return Err(KafkaProduceError::KafkaProduceCanceled);
            }
        }
    }

    Ok(())
}
