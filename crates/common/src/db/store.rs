//! Storage seam between the entity service and the backing store
//!
//! Lookups return `Ok(None)` or an empty `Vec` when nothing matches and
//! `Err` only on operational failure. Inserts that hit a uniqueness
//! constraint fail with `AppError::Duplicate`.

use crate::db::models::{
    Channel, FullMessage, FullReply, Message, NewChannel, NewMessage, NewReply, NewUser, Reply,
    Stat, User,
};
use crate::errors::Result;
use async_trait::async_trait;

/// Which messages a full-message query selects
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageFilter {
    All,
    Id(i64),
    Channel(i64),
    User(i64),
}

/// Sort order of a full-message query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageOrder {
    /// Message id descending
    Newest,
    /// Reply count descending, ties broken by message id descending
    MostReplied,
}

/// A joined full-message read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FullMessageQuery {
    pub filter: MessageFilter,
    pub order: MessageOrder,
    /// `(offset, limit)`; `None` reads every matching row
    pub window: Option<(u64, u64)>,
}

impl FullMessageQuery {
    pub fn new(filter: MessageFilter, order: MessageOrder) -> Self {
        Self { filter, order, window: None }
    }

    pub fn window(mut self, offset: u64, limit: u64) -> Self {
        self.window = Some((offset, limit));
        self
    }
}

/// Typed CRUD and aggregate queries over the four entity kinds
#[async_trait]
pub trait EntityStore: Send + Sync {
    // Channels
    async fn find_channel_by_name(&self, name: &str) -> Result<Option<Channel>>;

    async fn find_channel_by_id(&self, id: i64) -> Result<Option<Channel>>;

    async fn insert_channel(&self, channel: NewChannel) -> Result<Channel>;

    /// Channels ordered by id; `limit = None` lists all of them
    async fn list_channels(&self, offset: u64, limit: Option<u64>) -> Result<Vec<Channel>>;

    async fn count_channels(&self) -> Result<u64>;

    // Users

    /// Blank usernames never match
    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>>;

    async fn find_user_by_id(&self, id: i64) -> Result<Option<User>>;

    async fn insert_user(&self, user: NewUser) -> Result<User>;

    // Messages and replies
    async fn insert_message(&self, message: NewMessage) -> Result<Message>;

    async fn insert_reply(&self, reply: NewReply) -> Result<Reply>;

    /// Number of messages, optionally restricted to one channel
    async fn count_messages(&self, channel_id: Option<i64>) -> Result<u64>;

    // Aggregates
    async fn full_messages(&self, query: FullMessageQuery) -> Result<Vec<FullMessage>>;

    /// Replies of a message in insertion order
    async fn full_replies_by_message_id(&self, message_id: i64) -> Result<Vec<FullReply>>;

    async fn channel_stats(&self, channel_id: i64) -> Result<Stat>;
}
