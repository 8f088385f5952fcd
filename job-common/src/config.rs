//! YAML configuration for the three binaries (API, worker, retry-dispatcher), loaded from
//! `CONFIG_PATH` (default `config/config.yaml`). Each binary validates only the section of the
//! schema it needs; `postgres`/`saga` are accepted but unused on the hot path.
use std::time::Duration;

use serde::Deserialize;

pub const DEFAULT_CONFIG_PATH: &str = "config/config.yaml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api: ApiConfig,
    pub worker: WorkerConfig,
    pub retry_dispatcher: RetryDispatcherConfig,
    pub redis: RedisConfig,
    pub kafka: KafkaBusConfig,
    pub postgres: PostgresConfig,
    pub saga: SagaConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub addr: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub group_id: String,
    pub concurrency: u32,
    /// How many failed attempts a job may accumulate before it is routed to the DLQ instead of
    /// rescheduled. The source hardcodes this at 1 (retry once, then DLQ); exposed as a config
    /// knob per the open question on whether that threshold was deliberate.
    pub max_attempts_before_dlq: u32,
    pub retry_base_ms: u64,
    pub retry_max_ms: u64,
    pub retry_jitter: f64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RetryDispatcherConfig {
    pub poll_interval_ms: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RedisConfig {
    pub addr: String,
    pub password: String,
    pub db: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct KafkaBusConfig {
    pub brokers: Vec<String>,
    pub jobs_topic: String,
    pub dlq_topic: String,
    pub client_id: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PostgresConfig {
    pub dsn: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SagaConfig {
    pub enabled: bool,
}

impl Config {
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let data = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_string(),
            source,
        })?;
        Self::parse(&data)
    }

    pub fn parse(data: &str) -> Result<Self, ConfigError> {
        let mut cfg: Config = serde_yaml::from_str(data)?;
        cfg.apply_defaults();
        Ok(cfg)
    }

    fn apply_defaults(&mut self) {
        if self.api.addr.trim().is_empty() {
            self.api.addr = ":8080".to_string();
        }
        if self.worker.group_id.trim().is_empty() {
            self.worker.group_id = "mq-worker".to_string();
        }
        if self.worker.concurrency == 0 {
            self.worker.concurrency = 1;
        }
        if self.worker.max_attempts_before_dlq == 0 {
            self.worker.max_attempts_before_dlq = 1;
        }
        if self.worker.retry_base_ms == 0 {
            self.worker.retry_base_ms = 1_000;
        }
        if self.worker.retry_max_ms == 0 {
            self.worker.retry_max_ms = 60_000;
        }
        if self.retry_dispatcher.poll_interval_ms == 0 {
            self.retry_dispatcher.poll_interval_ms = 1_000;
        }
    }

    pub fn retry_dispatcher_poll_interval(&self) -> Duration {
        Duration::from_millis(self.retry_dispatcher.poll_interval_ms)
    }

    fn validate_redis(&self) -> Result<(), ConfigError> {
        if self.redis.addr.trim().is_empty() {
            return Err(ConfigError::Invalid("redis.addr is required".into()));
        }
        Ok(())
    }

    fn validate_kafka(&self) -> Result<(), ConfigError> {
        if self.kafka.brokers.is_empty() {
            return Err(ConfigError::Invalid("kafka.brokers is required".into()));
        }
        if self.kafka.jobs_topic.trim().is_empty() {
            return Err(ConfigError::Invalid("kafka.jobs_topic is required".into()));
        }
        Ok(())
    }

    pub fn validate_for_api(&self) -> Result<(), ConfigError> {
        if self.api.addr.trim().is_empty() {
            return Err(ConfigError::Invalid("api.addr is required".into()));
        }
        self.validate_redis()?;
        self.validate_kafka()
    }

    pub fn validate_for_worker(&self) -> Result<(), ConfigError> {
        if self.worker.group_id.trim().is_empty() {
            return Err(ConfigError::Invalid("worker.group_id is required".into()));
        }
        self.validate_redis()?;
        self.validate_kafka()
    }

    pub fn validate_for_retry_dispatcher(&self) -> Result<(), ConfigError> {
        if self.retry_dispatcher.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "retry_dispatcher.poll_interval is required".into(),
            ));
        }
        self.validate_redis()?;
        self.validate_kafka()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn applies_defaults_on_empty_document() {
        let cfg = Config::parse("{}").unwrap();
        assert_eq!(cfg.api.addr, ":8080");
        assert_eq!(cfg.worker.group_id, "mq-worker");
        assert_eq!(cfg.worker.concurrency, 1);
        assert_eq!(cfg.worker.max_attempts_before_dlq, 1);
        assert_eq!(cfg.retry_dispatcher.poll_interval_ms, 1_000);
    }

    #[test]
    fn parses_full_document() {
        let yaml = r#"
api:
  addr: ":9000"
worker:
  group_id: "workers"
  concurrency: 4
redis:
  addr: "127.0.0.1:6379"
kafka:
  brokers: ["localhost:9092"]
  jobs_topic: "jobs"
  dlq_topic: "jobs.dlq"
"#;
        let cfg = Config::parse(yaml).unwrap();
        assert_eq!(cfg.api.addr, ":9000");
        assert_eq!(cfg.worker.concurrency, 4);
        assert_eq!(cfg.kafka.brokers, vec!["localhost:9092".to_string()]);
        assert!(cfg.validate_for_api().is_ok());
        assert!(cfg.validate_for_worker().is_ok());
    }

    #[test]
    fn rejects_missing_redis_addr() {
        let yaml = r#"
kafka:
  brokers: ["localhost:9092"]
  jobs_topic: "jobs"
"#;
        let cfg = Config::parse(yaml).unwrap();
        assert!(cfg.validate_for_api().is_err());
    }

    #[test]
    fn rejects_missing_kafka_brokers() {
        let yaml = r#"
redis:
  addr: "127.0.0.1:6379"
"#;
        let cfg = Config::parse(yaml).unwrap();
        assert!(cfg.validate_for_worker().is_err());
    }
}
