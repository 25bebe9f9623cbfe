use crate::domain::jobs::{AckToken, QueueMessage};
use crate::error::BoxError;
use crate::ports::queue::MessageQueuePort;
use async_trait::async_trait;
use aws_sdk_sqs::Client;
use std::time::Duration;
use tracing::warn;

/// SQS rejects long-poll waits above 20 seconds.
const MAX_WAIT_SECS: u64 = 20;

/// SqsAdapter implements MessageQueuePort for AWS SQS.
#[derive(Clone, Debug)]
pub struct SqsAdapter {
    client: Client,
    queue_url: String,
}

impl SqsAdapter {
    pub fn new(client: Client, queue_url: String) -> Self {
        Self { client, queue_url }
    }
}

#[async_trait]
impl MessageQueuePort for SqsAdapter {
    async fn receive(&self, wait: Duration) -> Result<Option<QueueMessage>, BoxError> {
        let wait_time = wait.as_secs().min(MAX_WAIT_SECS) as i32;
        let resp = self
            .client
            .receive_message()
            .queue_url(&self.queue_url)
            .max_number_of_messages(1)
            .wait_time_seconds(wait_time)
            .send()
            .await?;

        let Some(msg) = resp.messages.and_then(|messages| messages.into_iter().next()) else {
            return Ok(None);
        };

        let Some(receipt_handle) = msg.receipt_handle else {
            warn!(message_id = ?msg.message_id, "message without receipt handle, skipping");
            return Ok(None);
        };

        Ok(Some(QueueMessage {
            id: msg.message_id,
            body: msg.body.unwrap_or_default(),
            ack_token: AckToken(receipt_handle),
        }))
    }

    async fn delete(&self, ack_token: &AckToken) -> Result<(), BoxError> {
        self.client
            .delete_message()
            .queue_url(&self.queue_url)
            .receipt_handle(&ack_token.0)
            .send()
            .await?;
        Ok(())
    }
}
