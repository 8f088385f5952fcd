//! The pluggable unit of work a worker drives through the job lifecycle. What a job actually
//! *does* (call a webhook, run a saga step, whatever) is deployment-specific and out of scope
//! here; the worker loop only needs something that processes a payload and can fail.
use async_trait::async_trait;

#[derive(Debug, thiserror::Error)]
#[error("processor failed: {0}")]
pub struct ProcessorError(pub String);

impl ProcessorError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

#[async_trait]
pub trait Processor: Send + Sync {
    async fn process(&self, job_id: &str, payload: &[u8]) -> Result<(), ProcessorError>;
}

/// A processor that always succeeds. Useful for wiring and testing the worker loop itself
/// without a real downstream effect.
pub struct NoopProcessor;

#[async_trait]
impl Processor for NoopProcessor {
    async fn process(&self, _job_id: &str, _payload: &[u8]) -> Result<(), ProcessorError> {
        Ok(())
    }
}
