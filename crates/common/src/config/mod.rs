//! Configuration management for Chanfeed services
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with APP__)
//! - Configuration files (config.toml, config.yaml)
//! - Default values

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    /// Database configuration
    pub database: DatabaseConfig,

    /// Inbound topic configuration
    #[serde(default)]
    pub topics: TopicsConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// Primary database URL (for writes)
    pub url: String,

    /// Read replica URL (optional, falls back to primary)
    pub read_url: Option<String>,

    /// Maximum number of connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum number of connections
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// Connection timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Idle timeout in seconds
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,

    /// Create missing tables and indexes on startup
    #[serde(default = "default_bootstrap_schema")]
    pub bootstrap_schema: bool,
}

/// Where topic events come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TopicBackend {
    /// Redis Streams, replayed from the oldest retained entry
    Redis,
    /// AWS SQS, one queue per topic
    Sqs,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TopicsConfig {
    #[serde(default = "default_topic_backend")]
    pub backend: TopicBackend,

    /// Redis URL for the stream backend
    #[serde(default = "default_redis_url")]
    pub redis_url: String,

    /// Stream key carrying channel declarations
    #[serde(default = "default_channel_stream")]
    pub channel_stream: String,

    /// Stream key carrying posts with replies
    #[serde(default = "default_post_stream")]
    pub post_stream: String,

    /// Stream entry field holding the JSON payload
    #[serde(default = "default_payload_field")]
    pub payload_field: String,

    /// XREAD block timeout in milliseconds
    #[serde(default = "default_block_ms")]
    pub block_ms: usize,

    /// Maximum entries fetched per read
    #[serde(default = "default_topic_batch_size")]
    pub batch_size: usize,

    /// SQS queue URL for channel declarations
    pub channel_queue_url: Option<String>,

    /// SQS queue URL for posts
    pub post_queue_url: Option<String>,

    /// Long polling timeout in seconds
    #[serde(default = "default_wait_time")]
    pub wait_time_seconds: i32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level filter (debug, info, warn, error or a full EnvFilter directive)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default = "default_json_logging")]
    pub json_logging: bool,

    /// Metrics port (0 to disable)
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,

    /// Service name for logs
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

// Default value functions
fn default_max_connections() -> u32 { 50 }
fn default_min_connections() -> u32 { 5 }
fn default_connect_timeout() -> u64 { 10 }
fn default_idle_timeout() -> u64 { 300 }
fn default_bootstrap_schema() -> bool { true }
fn default_topic_backend() -> TopicBackend { TopicBackend::Redis }
fn default_redis_url() -> String { "redis://localhost:6379".to_string() }
fn default_channel_stream() -> String { "chanfeed:channels".to_string() }
fn default_post_stream() -> String { "chanfeed:posts".to_string() }
fn default_payload_field() -> String { "payload".to_string() }
fn default_block_ms() -> usize { 5000 }
fn default_topic_batch_size() -> usize { 100 }
fn default_wait_time() -> i32 { 20 }
fn default_log_level() -> String { "info".to_string() }
fn default_json_logging() -> bool { true }
fn default_metrics_port() -> u16 { 9090 }
fn default_service_name() -> String { "chanfeed".to_string() }

impl Default for TopicsConfig {
    fn default() -> Self {
        Self {
            backend: default_topic_backend(),
            redis_url: default_redis_url(),
            channel_stream: default_channel_stream(),
            post_stream: default_post_stream(),
            payload_field: default_payload_field(),
            block_ms: default_block_ms(),
            batch_size: default_topic_batch_size(),
            channel_queue_url: None,
            post_queue_url: None,
            wait_time_seconds: default_wait_time(),
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logging: default_json_logging(),
            metrics_port: default_metrics_port(),
            service_name: default_service_name(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment and files
    pub fn load() -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Load base config file
            .add_source(File::with_name("config/default").required(false))

            // Load environment-specific config
            .add_source(File::with_name(&format!("config/{}", env)).required(false))

            // Load local overrides
            .add_source(File::with_name("config/local").required(false))

            // Load from environment variables with APP__ prefix
            // e.g., APP__DATABASE__URL=postgres://...
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true)
            )

            .build()?;

        config.try_deserialize()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "postgres://localhost/chanfeed".to_string(),
                read_url: None,
                max_connections: default_max_connections(),
                min_connections: default_min_connections(),
                connect_timeout_secs: default_connect_timeout(),
                idle_timeout_secs: default_idle_timeout(),
                bootstrap_schema: default_bootstrap_schema(),
            },
            topics: TopicsConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}
