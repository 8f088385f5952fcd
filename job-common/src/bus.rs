//! The message bus: a thin capability-set wrapper over `common_kafka`'s producer and consumer so
//! the ingestion handler, worker, and retry dispatcher depend on a small trait rather than the
//! `rdkafka` types directly. Mirrors the producer/consumer split of a Kafka-backed job queue.
use async_trait::async_trait;
use common_kafka::kafka_consumer::{RecvErr, SingleTopicConsumer};
use common_kafka::kafka_producer::{send_keyed_message, KafkaContext, KafkaProduceError};
use rdkafka::producer::FutureProducer;

#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("publish failed: {0}")]
    Publish(#[from] KafkaProduceError),
    #[error("receive failed: {0}")]
    Receive(#[from] RecvErr),
}

/// Publishes key-addressed, opaque-bytes messages. `key` is always the `job_id`, which routes a
/// job's messages to a single partition for as long as the topic is stable.
#[async_trait]
pub trait Producer: Send + Sync {
    async fn publish(&self, topic: &str, key: &str, payload: &[u8]) -> Result<(), BusError>;
}

pub struct KafkaBusProducer {
    producer: FutureProducer<KafkaContext>,
}

impl KafkaBusProducer {
    pub fn new(producer: FutureProducer<KafkaContext>) -> Self {
        Self { producer }
    }
}

#[async_trait]
impl Producer for KafkaBusProducer {
    async fn publish(&self, topic: &str, key: &str, payload: &[u8]) -> Result<(), BusError> {
        send_keyed_message(&self.producer, topic, key, payload).await?;
        Ok(())
    }
}

/// A received message: the key (expected to be the `job_id`), the raw payload bytes, and a
/// handle that commits the consumer offset once the caller is done with the message.
pub struct ReceivedMessage {
    pub key: Option<String>,
    pub payload: Vec<u8>,
    offset: common_kafka::kafka_consumer::Offset,
}

impl ReceivedMessage {
    /// Commits the bus offset for this message. Per the worker loop's contract, this is only
    /// called after the job has reached `done`, `retrying`, or `dlq` — never before.
    pub fn commit(self) -> Result<(), BusError> {
        match self.offset.store() {
            Ok(()) => Ok(()),
            Err(common_kafka::kafka_consumer::OffsetErr::Kafka(k)) => {
                Err(BusError::Receive(RecvErr::Kafka(k)))
            }
            Err(common_kafka::kafka_consumer::OffsetErr::Gone) => {
                Err(BusError::Receive(RecvErr::Empty))
            }
        }
    }
}

#[async_trait]
pub trait Consumer: Send + Sync {
    async fn poll(&self) -> Result<ReceivedMessage, BusError>;
}

pub struct KafkaBusConsumer {
    consumer: SingleTopicConsumer,
}

impl KafkaBusConsumer {
    pub fn new(consumer: SingleTopicConsumer) -> Self {
        Self { consumer }
    }
}

#[async_trait]
impl Consumer for KafkaBusConsumer {
    async fn poll(&self) -> Result<ReceivedMessage, BusError> {
        let (key, payload, offset) = self.consumer.recv_raw().await?;
        Ok(ReceivedMessage {
            key,
            payload,
            offset,
        })
    }
}
