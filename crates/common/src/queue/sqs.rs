//! SQS topic source
//!
//! Provides:
//! - SQS client wrapper
//! - A `TopicSource` that long-polls one queue per topic and deletes each
//!   message once it has been dispatched

use super::{Delivery, TopicSource};
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use aws_sdk_sqs::types::Message;
use aws_sdk_sqs::Client as SqsClient;
use std::collections::VecDeque;
use tracing::{debug, warn};

/// SQS queue configuration
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Queue URL
    pub url: String,
    /// Wait time for long polling (seconds)
    pub wait_time_seconds: i32,
    /// Maximum number of messages per poll
    pub max_messages: i32,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            wait_time_seconds: 20,
            max_messages: 10,
        }
    }
}

/// SQS Queue client wrapper
pub struct Queue {
    client: SqsClient,
    config: QueueConfig,
}

impl Queue {
    /// Create a new queue client
    pub async fn new(config: QueueConfig) -> Result<Self> {
        let aws_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        let client = SqsClient::new(&aws_config);

        Ok(Self { client, config })
    }

    /// Receive messages from the queue
    pub async fn receive(&self) -> Result<Vec<Message>> {
        let result = self.client
            .receive_message()
            .queue_url(&self.config.url)
            .max_number_of_messages(self.config.max_messages)
            .wait_time_seconds(self.config.wait_time_seconds)
            .send()
            .await
            .map_err(|e| AppError::QueueError {
                message: format!("Failed to receive messages: {}", e),
            })?;

        let messages = result.messages.unwrap_or_default();
        debug!(count = messages.len(), "Received messages from queue");

        Ok(messages)
    }

    /// Delete a message after processing
    pub async fn delete(&self, receipt_handle: &str) -> Result<()> {
        self.client
            .delete_message()
            .queue_url(&self.config.url)
            .receipt_handle(receipt_handle)
            .send()
            .await
            .map_err(|e| AppError::QueueError {
                message: format!("Failed to delete message: {}", e),
            })?;

        debug!("Message deleted from queue");
        Ok(())
    }
}

/// Turn a received message into a delivery; messages without a receipt
/// handle cannot be acknowledged and are dropped
fn into_delivery(message: Message) -> Option<Delivery> {
    let Some(receipt_handle) = message.receipt_handle else {
        warn!(message_id = ?message.message_id, "Message has no receipt handle, dropping");
        return None;
    };

    Some(Delivery {
        id: receipt_handle,
        payload: message.body.unwrap_or_default(),
    })
}

/// One SQS queue consumed as a topic
pub struct SqsTopicSource {
    queue: Queue,
    buffer: VecDeque<Delivery>,
}

impl SqsTopicSource {
    pub fn new(queue: Queue) -> Self {
        Self {
            queue,
            buffer: VecDeque::new(),
        }
    }
}

#[async_trait]
impl TopicSource for SqsTopicSource {
    async fn next(&mut self) -> Result<Option<Delivery>> {
        loop {
            if let Some(delivery) = self.buffer.pop_front() {
                return Ok(Some(delivery));
            }

            let messages = self.queue.receive().await?;
            self.buffer.extend(messages.into_iter().filter_map(into_delivery));
        }
    }

    async fn ack(&mut self, delivery: &Delivery) -> Result<()> {
        self.queue.delete(&delivery.id).await
    }
}
