//! Chanfeed Ingestion Service
//!
//! Consumes the two inbound topics concurrently:
//! 1. Channel declarations, created once per name
//! 2. Posts with their author and replies
//!
//! Each topic gets its own worker; a worker stops only when its transport
//! fails or the topic closes. Ctrl+C / SIGTERM stops both.

mod errors;
mod processor;
mod worker;

use anyhow::Context;
use chanfeed_common::config::{AppConfig, ObservabilityConfig, TopicBackend, TopicsConfig};
use chanfeed_common::db::{schema, DbPool, EntityStore, Repository};
use chanfeed_common::queue::{
    Queue, QueueConfig, RedisStreamConfig, RedisStreamSource, SqsTopicSource, Topic, TopicSource,
};
use chanfeed_common::{metrics, AppError, EntityService, VERSION};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};
use processor::EventProcessor;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use worker::{TopicWorker, WorkerExit, WorkerReport};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config = AppConfig::load().context("failed to load configuration")?;

    init_tracing(&config.observability);
    info!(service = %config.observability.service_name, "Starting Chanfeed Ingestion Service v{}", VERSION);

    if config.observability.metrics_port != 0 {
        install_metrics_exporter(config.observability.metrics_port)?;
    }
    metrics::register_metrics();

    // Initialize database connection
    info!("Connecting to database...");
    let db = DbPool::new(&config.database).await?;
    db.ping().await?;
    if config.database.bootstrap_schema {
        schema::bootstrap(db.write()).await?;
    }

    let store: Arc<dyn EntityStore> = Arc::new(Repository::new(db));
    let processor = Arc::new(EventProcessor::new(EntityService::new(store)));

    let channel_source = open_source(&config.topics, Topic::Channels).await?;
    let post_source = open_source(&config.topics, Topic::Posts).await?;

    let channels = tokio::spawn(
        TopicWorker::new(Topic::Channels, channel_source, processor.clone()).run(),
    );
    let posts = tokio::spawn(TopicWorker::new(Topic::Posts, post_source, processor).run());

    info!(backend = ?config.topics.backend, "Ingestion service ready");

    tokio::select! {
        _ = shutdown_signal() => {}
        (channels, posts) = async { tokio::join!(channels, posts) } => {
            for report in [channels, posts] {
                match report {
                    Ok(report) => log_report(&report),
                    Err(e) => error!(error = %e, "Topic worker panicked"),
                }
            }
            warn!("All topic workers stopped");
        }
    }

    info!("Ingestion service shutdown complete");
    Ok(())
}

fn init_tracing(config: &ObservabilityConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    if config.json_logging {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn install_metrics_exporter(port: u16) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .set_buckets_for_metric(
            Matcher::Suffix("duration_seconds".to_string()),
            metrics::EVENT_BUCKETS,
        )?
        .install()
        .context("failed to install Prometheus exporter")?;

    info!("Metrics exposed on {}", addr);
    Ok(())
}

/// Open the configured source for one topic
async fn open_source(config: &TopicsConfig, topic: Topic) -> anyhow::Result<Box<dyn TopicSource>> {
    match config.backend {
        TopicBackend::Redis => {
            let key = match topic {
                Topic::Channels => &config.channel_stream,
                Topic::Posts => &config.post_stream,
            };
            let source = RedisStreamSource::connect(RedisStreamConfig {
                url: config.redis_url.clone(),
                key: key.clone(),
                payload_field: config.payload_field.clone(),
                block_ms: config.block_ms,
                batch_size: config.batch_size,
            })
            .await?;
            Ok(Box::new(source))
        }
        TopicBackend::Sqs => {
            let url = match topic {
                Topic::Channels => config.channel_queue_url.clone(),
                Topic::Posts => config.post_queue_url.clone(),
            }
            .ok_or_else(|| AppError::Configuration {
                message: format!("no queue URL configured for the {} topic", topic),
            })?;

            info!(%topic, url = %url, "Connecting to queue...");
            let queue = Queue::new(QueueConfig {
                url,
                wait_time_seconds: config.wait_time_seconds,
                ..Default::default()
            })
            .await?;
            Ok(Box::new(SqsTopicSource::new(queue)))
        }
    }
}

fn log_report(report: &WorkerReport) {
    let stats = &report.stats;
    match &report.exit {
        WorkerExit::Closed => info!(
            topic = %report.topic,
            received = stats.received,
            failed = stats.failed,
            "Topic worker finished, topic closed"
        ),
        WorkerExit::Transport(e) => error!(
            topic = %report.topic,
            received = stats.received,
            failed = stats.failed,
            error = %e,
            "Topic worker finished after transport failure"
        ),
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, starting shutdown..."),
        _ = terminate => info!("Received SIGTERM, starting shutdown..."),
    }
}
