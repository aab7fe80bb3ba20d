//! In-memory topic for tests
//!
//! Events are pushed through a [`MemoryTopicHandle`]. Closing it, or
//! dropping every clone of it, ends the topic once its backlog is drained.

use super::{Delivery, TopicSource};
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

enum Item {
    Event(String),
    TransportError(String),
}

/// Producer side of a [`MemoryTopic`]
#[derive(Clone)]
pub struct MemoryTopicHandle {
    tx: Arc<Mutex<Option<mpsc::UnboundedSender<Item>>>>,
    acked: Arc<Mutex<Vec<String>>>,
}

impl MemoryTopicHandle {
    /// Append a raw payload
    pub fn publish(&self, payload: impl Into<String>) {
        self.send(Item::Event(payload.into()));
    }

    /// Append a terminal transport failure
    pub fn fail(&self, message: impl Into<String>) {
        self.send(Item::TransportError(message.into()));
    }

    /// End the topic after the events already published
    pub fn close(&self) {
        self.tx.lock().unwrap_or_else(|p| p.into_inner()).take();
    }

    fn send(&self, item: Item) {
        if let Some(tx) = self.tx.lock().unwrap_or_else(|p| p.into_inner()).as_ref() {
            let _ = tx.send(item);
        }
    }

    /// Ids of every delivery acknowledged so far
    pub fn acked(&self) -> Vec<String> {
        self.acked.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }
}

/// Consumer side, handed to a worker
pub struct MemoryTopic {
    rx: mpsc::UnboundedReceiver<Item>,
    acked: Arc<Mutex<Vec<String>>>,
    offset: u64,
}

impl MemoryTopic {
    pub fn new() -> (MemoryTopicHandle, MemoryTopic) {
        let (tx, rx) = mpsc::unbounded_channel();
        let acked = Arc::new(Mutex::new(Vec::new()));

        let handle = MemoryTopicHandle {
            tx: Arc::new(Mutex::new(Some(tx))),
            acked: acked.clone(),
        };
        let topic = MemoryTopic { rx, acked, offset: 0 };
        (handle, topic)
    }
}

#[async_trait]
impl TopicSource for MemoryTopic {
    async fn next(&mut self) -> Result<Option<Delivery>> {
        match self.rx.recv().await {
            Some(Item::Event(payload)) => {
                self.offset += 1;
                Ok(Some(Delivery {
                    id: self.offset.to_string(),
                    payload,
                }))
            }
            Some(Item::TransportError(message)) => Err(AppError::QueueError { message }),
            None => Ok(None),
        }
    }

    async fn ack(&mut self, delivery: &Delivery) -> Result<()> {
        self.acked
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(delivery.id.clone());
        Ok(())
    }
}
