//! Topic consumption
//!
//! Provides:
//! - The `TopicSource` seam every ingestion worker pulls from
//! - Redis Streams source, replayed from the oldest retained entry
//! - SQS source, long-polled and deleted after dispatch
//! - Typed, lenient event payloads

pub mod events;
mod redis_stream;
mod sqs;

#[cfg(any(test, feature = "test-utils"))]
mod memory;

pub use redis_stream::{RedisStreamConfig, RedisStreamSource};
pub use sqs::{Queue, QueueConfig, SqsTopicSource};

#[cfg(any(test, feature = "test-utils"))]
pub use memory::{MemoryTopic, MemoryTopicHandle};

use crate::errors::Result;
use async_trait::async_trait;
use std::fmt;

/// The two inbound topics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    /// Channel declarations
    Channels,
    /// Posts with nested replies
    Posts,
}

impl Topic {
    pub fn as_str(&self) -> &'static str {
        match self {
            Topic::Channels => "channels",
            Topic::Posts => "posts",
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One raw event pulled from a topic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Stream entry id or receipt handle, depending on the source
    pub id: String,
    /// Undecoded JSON body
    pub payload: String,
}

/// A stream of raw events.
///
/// `next` returning `Err` is a terminal transport failure: the caller stops
/// consuming and does not reconnect. `Ok(None)` means the source is closed.
#[async_trait]
pub trait TopicSource: Send {
    /// Wait for the next event
    async fn next(&mut self) -> Result<Option<Delivery>>;

    /// Mark a delivery as handled
    async fn ack(&mut self, _delivery: &Delivery) -> Result<()> {
        Ok(())
    }
}
