//! Redis Streams topic source
//!
//! Reads a stream from its oldest retained entry (`0-0`) with blocking
//! `XREAD`, without consumer groups. The last delivered id is kept in
//! memory only, so every restart replays the retained backlog.

use super::{Delivery, TopicSource};
use crate::errors::Result;
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::streams::{StreamReadOptions, StreamReadReply};
use redis::{AsyncCommands, Client};
use std::collections::VecDeque;
use tracing::{debug, info};

/// Id preceding every entry of a stream
const STREAM_START: &str = "0-0";

/// Redis stream source configuration
#[derive(Debug, Clone)]
pub struct RedisStreamConfig {
    /// Redis URL (redis://host:port)
    pub url: String,
    /// Stream key
    pub key: String,
    /// Entry field holding the JSON payload
    pub payload_field: String,
    /// How long one XREAD waits for new entries
    pub block_ms: usize,
    /// Maximum entries per XREAD
    pub batch_size: usize,
}

impl Default for RedisStreamConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379".to_string(),
            key: String::new(),
            payload_field: "payload".to_string(),
            block_ms: 5000,
            batch_size: 100,
        }
    }
}

pub struct RedisStreamSource {
    connection: MultiplexedConnection,
    config: RedisStreamConfig,
    last_id: String,
    buffer: VecDeque<Delivery>,
}

impl RedisStreamSource {
    /// Connect and position the cursor before the oldest retained entry
    pub async fn connect(config: RedisStreamConfig) -> Result<Self> {
        let client = Client::open(config.url.as_str())?;
        let connection = client.get_multiplexed_async_connection().await?;

        info!(stream = %config.key, "Connected to stream, replaying from oldest entry");

        Ok(Self {
            connection,
            config,
            last_id: STREAM_START.to_string(),
            buffer: VecDeque::new(),
        })
    }

    /// Block until at least one entry past `last_id` is buffered
    async fn fill(&mut self) -> Result<()> {
        let options = StreamReadOptions::default()
            .block(self.config.block_ms)
            .count(self.config.batch_size);

        let reply: Option<StreamReadReply> = self
            .connection
            .xread_options(&[&self.config.key], &[&self.last_id], &options)
            .await?;

        for stream in reply.map(|r| r.keys).unwrap_or_default() {
            for entry in stream.ids {
                // Entries without the payload field decode as empty and get skipped downstream
                let payload: String = entry.get(&self.config.payload_field).unwrap_or_default();
                self.last_id = entry.id.clone();
                self.buffer.push_back(Delivery {
                    id: entry.id,
                    payload,
                });
            }
        }

        debug!(
            stream = %self.config.key,
            buffered = self.buffer.len(),
            last_id = %self.last_id,
            "Stream read complete"
        );

        Ok(())
    }
}

#[async_trait]
impl TopicSource for RedisStreamSource {
    async fn next(&mut self) -> Result<Option<Delivery>> {
        loop {
            if let Some(delivery) = self.buffer.pop_front() {
                return Ok(Some(delivery));
            }
            self.fill().await?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RedisStreamConfig::default();
        assert_eq!(config.payload_field, "payload");
        assert!(config.block_ms > 0);
        assert_eq!(STREAM_START, "0-0");
    }
}
