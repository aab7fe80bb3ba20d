//! Per-topic worker loop
//!
//! Pulls deliveries from one [`TopicSource`], hands each to the
//! [`EventProcessor`] and acknowledges it afterwards. A bad event is logged
//! and skipped; only a transport failure or a closed topic ends the loop.

use crate::errors::{IngestionError, Stage};
use crate::processor::EventProcessor;
use chanfeed_common::metrics::{self, EventTimer};
use chanfeed_common::queue::{Topic, TopicSource};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Counters for one worker run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub received: u64,
    pub applied: u64,
    pub failed: u64,
}

/// Why a worker stopped
#[derive(Debug)]
pub enum WorkerExit {
    /// The source reported end of stream
    Closed,
    /// The source failed; the worker does not reconnect
    Transport(IngestionError),
}

#[derive(Debug)]
pub struct WorkerReport {
    pub topic: Topic,
    pub stats: WorkerStats,
    pub exit: WorkerExit,
}

pub struct TopicWorker {
    topic: Topic,
    source: Box<dyn TopicSource>,
    processor: Arc<EventProcessor>,
}

impl TopicWorker {
    pub fn new(topic: Topic, source: Box<dyn TopicSource>, processor: Arc<EventProcessor>) -> Self {
        Self {
            topic,
            source,
            processor,
        }
    }

    /// Consume the topic until the source closes or fails
    pub async fn run(mut self) -> WorkerReport {
        let topic = self.topic;
        let mut stats = WorkerStats::default();
        info!(%topic, "Topic worker started");

        let exit = loop {
            let delivery = match self.source.next().await {
                Ok(Some(delivery)) => delivery,
                Ok(None) => {
                    info!(%topic, "Topic closed, stopping worker");
                    break WorkerExit::Closed;
                }
                Err(e) => {
                    let e = IngestionError::Transport(e);
                    metrics::record_failure(topic.as_str(), e.stage().as_str());
                    error!(%topic, error = %e, "Topic transport failed, stopping worker");
                    break WorkerExit::Transport(e);
                }
            };

            stats.received += 1;
            let timer = EventTimer::start(topic.as_str());

            match self.processor.process(topic, &delivery.payload).await {
                Ok(()) => stats.applied += 1,
                Err(e) => {
                    stats.failed += 1;
                    report_failure(topic, &delivery.id, &e);
                }
            }

            timer.finish();

            if let Err(e) = self.source.ack(&delivery).await {
                metrics::record_failure(topic.as_str(), Stage::Ack.as_str());
                warn!(%topic, delivery_id = %delivery.id, error = %e, "Failed to acknowledge delivery");
            }
        };

        info!(
            %topic,
            received = stats.received,
            applied = stats.applied,
            failed = stats.failed,
            "Topic worker stopped"
        );

        WorkerReport { topic, stats, exit }
    }
}

fn report_failure(topic: Topic, delivery_id: &str, e: &IngestionError) {
    let stage = e.stage();
    metrics::record_failure(topic.as_str(), stage.as_str());

    match e {
        IngestionError::UnknownChannel { username } => {
            warn!(%topic, delivery_id, %stage, channel = %username, "Skipping post for unknown channel");
        }
        IngestionError::MissingChannelName => {
            warn!(%topic, delivery_id, %stage, "Skipping event without channel username");
        }
        _ => {
            error!(%topic, delivery_id, %stage, error = %e, "Failed to process event, skipping");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chanfeed_common::db::MemoryStore;
    use chanfeed_common::queue::MemoryTopic;
    use chanfeed_common::{EntityService, Feed};

    fn setup() -> (Arc<MemoryStore>, Arc<EventProcessor>) {
        let store = Arc::new(MemoryStore::new());
        let processor = Arc::new(EventProcessor::new(EntityService::new(store.clone())));
        (store, processor)
    }

    const ALPHA: &str = r#"{"id": 1, "username": "alpha", "title": "Alpha", "imageUrl": "alpha.png"}"#;

    #[tokio::test]
    async fn test_bad_events_are_skipped_and_acked() {
        let (store, processor) = setup();
        let (handle, topic) = MemoryTopic::new();

        handle.publish(ALPHA);
        handle.publish("{garbage");
        handle.publish(ALPHA);
        handle.close();

        let report = TopicWorker::new(Topic::Channels, Box::new(topic), processor).run().await;

        assert!(matches!(report.exit, WorkerExit::Closed));
        assert_eq!(
            report.stats,
            WorkerStats { received: 3, applied: 2, failed: 1 }
        );
        assert_eq!(store.channels().len(), 1);
        assert_eq!(handle.acked(), vec!["1", "2", "3"]);
    }

    #[tokio::test]
    async fn test_transport_failure_stops_worker() {
        let (store, processor) = setup();
        let (handle, topic) = MemoryTopic::new();

        handle.publish(ALPHA);
        handle.fail("connection reset");
        handle.publish(r#"{"username": "beta"}"#);

        let report = TopicWorker::new(Topic::Channels, Box::new(topic), processor).run().await;

        assert!(matches!(report.exit, WorkerExit::Transport(_)));
        assert_eq!(report.stats.received, 1);
        assert_eq!(store.channels().len(), 1);
        assert_eq!(handle.acked(), vec!["1"]);
    }

    #[tokio::test]
    async fn test_unknown_channel_does_not_stop_worker() {
        let (store, processor) = setup();
        let (handle, topic) = MemoryTopic::new();

        processor.process(Topic::Channels, ALPHA).await.unwrap();
        handle.publish(r#"{"body": "lost", "author": {"username": "bob"}, "channel": {"username": "ghost"}}"#);
        handle.publish(r#"{"body": "kept", "author": {"username": "bob"}, "channel": {"username": "alpha"}}"#);
        handle.close();

        let report = TopicWorker::new(Topic::Posts, Box::new(topic), processor).run().await;

        assert_eq!(report.stats.failed, 1);
        assert_eq!(report.stats.applied, 1);
        assert_eq!(store.messages().len(), 1);
        assert_eq!(store.messages()[0].title, "kept");
        assert_eq!(handle.acked().len(), 2);
    }

    #[tokio::test]
    async fn test_ingested_events_are_readable() {
        let (store, processor) = setup();

        let (channels, channel_topic) = MemoryTopic::new();
        channels.publish(ALPHA);
        channels.publish(ALPHA);
        channels.close();
        TopicWorker::new(Topic::Channels, Box::new(channel_topic), processor.clone())
            .run()
            .await;

        let (posts, post_topic) = MemoryTopic::new();
        posts.publish(
            r#"{
                "body": "first",
                "url": "https://t.me/alpha/1",
                "author": {"username": "alice", "fullname": "Alice"},
                "channel": {"username": "alpha"},
                "replies": [
                    {"author": {"username": "bob"}, "body": "hi"},
                    {"author": {"username": "carol"}, "body": "hey"}
                ]
            }"#,
        );
        posts.publish(
            r#"{"body": "second", "author": {"username": "alice"}, "channel": {"username": "alpha"}, "replies": null}"#,
        );
        posts.close();
        let report = TopicWorker::new(Topic::Posts, Box::new(post_topic), processor)
            .run()
            .await;
        assert_eq!(report.stats.applied, 2);

        let feed = Feed::new(store.clone());
        let alpha = feed.channel_by_name("alpha").await.unwrap().unwrap();

        let stats = feed.channel_stats(alpha.id).await.unwrap();
        assert_eq!(stats.messages_count, 2);
        assert_eq!(stats.replies_count, 2);

        let page = feed.full_messages_by_page(1).await.unwrap();
        let titles: Vec<&str> = page.iter().map(|m| m.title.as_str()).collect();
        assert_eq!(titles, vec!["second", "first"]);
        assert_eq!(page[1].replies_count, 2);
        assert_eq!(page[1].user_full_name, "Alice");

        let by_channel = feed.full_messages_by_channel_id(alpha.id, 1).await.unwrap();
        assert_eq!(by_channel[0].title, "first");

        let full = feed.full_message_by_id(page[1].id).await.unwrap().unwrap();
        let replies: Vec<&str> = full.replies.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(replies, vec!["hi", "hey"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_topic_workers_share_one_store() {
        let (store, processor) = setup();
        processor.process(Topic::Channels, ALPHA).await.unwrap();

        let (channels, channel_topic) = MemoryTopic::new();
        let (posts, post_topic) = MemoryTopic::new();

        for name in ["beta", "gamma", "alpha", "delta"] {
            channels.publish(format!(r#"{{"username": "{}"}}"#, name));
        }
        for i in 0..20 {
            posts.publish(format!(
                r#"{{"body": "post {}", "author": {{"username": "alice"}}, "channel": {{"username": "alpha"}},
                    "replies": [{{"author": {{"username": "bob"}}, "body": "re {}"}}]}}"#,
                i, i
            ));
        }
        channels.close();
        posts.close();

        let channel_worker = tokio::spawn(
            TopicWorker::new(Topic::Channels, Box::new(channel_topic), processor.clone()).run(),
        );
        let post_worker =
            tokio::spawn(TopicWorker::new(Topic::Posts, Box::new(post_topic), processor).run());

        let channel_report = channel_worker.await.unwrap();
        let post_report = post_worker.await.unwrap();

        assert!(matches!(channel_report.exit, WorkerExit::Closed));
        assert!(matches!(post_report.exit, WorkerExit::Closed));
        assert_eq!(channel_report.stats.applied, 4);
        assert_eq!(post_report.stats.applied, 20);

        let mut names: Vec<String> = store.channels().into_iter().map(|c| c.name).collect();
        names.sort();
        assert_eq!(names, vec!["alpha", "beta", "delta", "gamma"]);

        assert_eq!(store.users().len(), 2);
        assert_eq!(store.messages().len(), 20);
        assert_eq!(store.replies().len(), 20);

        let feed = Feed::new(store.clone());
        let alpha = feed.channel_by_name("alpha").await.unwrap().unwrap();
        let stats = feed.channel_stats(alpha.id).await.unwrap();
        assert_eq!(stats.messages_count, 20);
        assert_eq!(stats.replies_count, 20);
        assert_eq!(channels.acked().len(), 4);
        assert_eq!(posts.acked().len(), 20);
    }
}
