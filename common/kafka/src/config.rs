//! Transport-level tuning knobs for the underlying `rdkafka` client. These are constructed
//! programmatically by callers rather than read directly from the environment, so that a single
//! YAML config file can drive every binary; see `job_common::config`.

#[derive(Clone, Debug)]
pub struct KafkaConfig {
    pub kafka_hosts: String,
    pub kafka_client_id: Option<String>,

    pub kafka_producer_linger_ms: u32, // Maximum time between producer batches during low traffic
    pub kafka_producer_queue_mib: u32, // Size of the in-memory producer queue in mebibytes
    pub kafka_message_timeout_ms: u32, // Time before we stop retrying producing a message
    pub kafka_compression_codec: String, // none, gzip, snappy, lz4, zstd
    pub kafka_tls: bool,
}

impl Default for KafkaConfig {
    fn default() -> Self {
        Self {
            kafka_hosts: "localhost:9092".to_string(),
            kafka_client_id: None,
            kafka_producer_linger_ms: 20,
            kafka_producer_queue_mib: 400,
            kafka_message_timeout_ms: 20_000,
            kafka_compression_codec: "none".to_string(),
            kafka_tls: false,
        }
    }
}

#[derive(Clone, Debug)]
pub struct ConsumerConfig {
    pub kafka_consumer_group: String,
    pub kafka_consumer_topic: String,
    // We default to "earliest"; a new consumer group replaying history is the safer failure mode
    // for a job queue than silently skipping work produced before it first connected.
    pub kafka_consumer_offset_reset: String,
}

impl ConsumerConfig {
    pub fn new(group: impl Into<String>, topic: impl Into<String>) -> Self {
        Self {
            kafka_consumer_group: group.into(),
            kafka_consumer_topic: topic.into(),
            kafka_consumer_offset_reset: "earliest".to_string(),
        }
    }
}
