use crate::domain::jobs::{AckToken, QueueMessage};
use crate::error::BoxError;
use async_trait::async_trait;
use std::time::Duration;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MessageQueuePort: Send + Sync {
    /// Long-poll for at most one message, waiting up to `wait` for one to arrive.
    async fn receive(&self, wait: Duration) -> Result<Option<QueueMessage>, BoxError>;

    /// Acknowledge a message so it is not redelivered.
    async fn delete(&self, ack_token: &AckToken) -> Result<(), BoxError>;
}
