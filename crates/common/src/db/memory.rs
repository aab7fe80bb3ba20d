//! In-memory [`EntityStore`] for tests
//!
//! Mirrors the Postgres schema rules: unique channel names, unique
//! non-blank usernames, and foreign keys on messages and replies. Failures
//! can be injected to exercise the operational error paths.

use crate::db::models::*;
use crate::db::store::{EntityStore, FullMessageQuery, MessageFilter, MessageOrder};
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use sea_orm::DbErr;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

#[derive(Default)]
struct Tables {
    channels: Vec<Channel>,
    users: Vec<User>,
    messages: Vec<Message>,
    replies: Vec<Reply>,
    next_id: i64,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn full_message(&self, message: &Message) -> Option<FullMessage> {
        let channel = self.channels.iter().find(|c| c.id == message.channel_id)?;
        let user = self.users.iter().find(|u| u.id == message.user_id)?;
        let replies_count = self
            .replies
            .iter()
            .filter(|r| r.message_id == message.id)
            .count() as i64;

        Some(FullMessage {
            id: message.id,
            channel_id: channel.id,
            channel_name: channel.name.clone(),
            channel_title: channel.title.clone(),
            channel_image_url: channel.image_url.clone(),
            user_id: user.id,
            username: user.username.clone(),
            user_full_name: user.full_name.clone(),
            user_image_url: user.image_url.clone(),
            title: message.title.clone(),
            message_url: message.message_url.clone(),
            image_url: message.image_url.clone(),
            replies_count,
            replies: Vec::new(),
        })
    }
}

/// Thread-safe in-memory store
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    unavailable: AtomicBool,
    blind_lookups: AtomicUsize,
    failing_usernames: Mutex<HashSet<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call fail as if the database were unreachable
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Make lookups of `username` fail with an operational error
    pub fn fail_username(&self, username: &str) {
        self.lock_failing().insert(username.to_string());
    }

    /// Make the next `count` name/username lookups miss, as if another
    /// producer inserted the row right after the lookup ran
    pub fn blind_next_lookups(&self, count: usize) {
        self.blind_lookups.store(count, Ordering::SeqCst);
    }

    pub fn channels(&self) -> Vec<Channel> {
        self.lock().channels.clone()
    }

    pub fn users(&self) -> Vec<User> {
        self.lock().users.clone()
    }

    pub fn messages(&self) -> Vec<Message> {
        self.lock().messages.clone()
    }

    pub fn replies(&self) -> Vec<Reply> {
        self.lock().replies.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_failing(&self) -> std::sync::MutexGuard<'_, HashSet<String>> {
        self.failing_usernames.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(AppError::Database(DbErr::Conn(sea_orm::RuntimeErr::Internal(
                "connection refused".to_string(),
            ))));
        }
        Ok(())
    }

    fn take_blind_lookup(&self) -> bool {
        self.blind_lookups
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

fn foreign_key_violation(what: &str) -> AppError {
    AppError::Database(DbErr::Custom(format!("foreign key violation: {}", what)))
}

#[async_trait]
impl EntityStore for MemoryStore {
    async fn find_channel_by_name(&self, name: &str) -> Result<Option<Channel>> {
        self.check_available()?;
        if self.take_blind_lookup() {
            return Ok(None);
        }
        Ok(self.lock().channels.iter().find(|c| c.name == name).cloned())
    }

    async fn find_channel_by_id(&self, id: i64) -> Result<Option<Channel>> {
        self.check_available()?;
        Ok(self.lock().channels.iter().find(|c| c.id == id).cloned())
    }

    async fn insert_channel(&self, channel: NewChannel) -> Result<Channel> {
        self.check_available()?;
        let mut tables = self.lock();

        if tables.channels.iter().any(|c| c.name == channel.name) {
            return Err(AppError::Duplicate {
                message: format!("channel {}", channel.name),
            });
        }

        let row = Channel {
            id: tables.next_id(),
            name: channel.name,
            title: channel.title,
            image_url: channel.image_url,
        };
        tables.channels.push(row.clone());
        Ok(row)
    }

    async fn list_channels(&self, offset: u64, limit: Option<u64>) -> Result<Vec<Channel>> {
        self.check_available()?;
        let tables = self.lock();
        let take = limit.map(|l| l as usize).unwrap_or(usize::MAX);

        Ok(tables
            .channels
            .iter()
            .skip(offset as usize)
            .take(take)
            .cloned()
            .collect())
    }

    async fn count_channels(&self) -> Result<u64> {
        self.check_available()?;
        Ok(self.lock().channels.len() as u64)
    }

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>> {
        self.check_available()?;
        if self.lock_failing().contains(username) {
            return Err(AppError::Database(DbErr::Custom(format!(
                "lookup of {} timed out",
                username
            ))));
        }
        if username.trim().is_empty() || self.take_blind_lookup() {
            return Ok(None);
        }
        Ok(self.lock().users.iter().find(|u| u.username == username).cloned())
    }

    async fn find_user_by_id(&self, id: i64) -> Result<Option<User>> {
        self.check_available()?;
        Ok(self.lock().users.iter().find(|u| u.id == id).cloned())
    }

    async fn insert_user(&self, user: NewUser) -> Result<User> {
        self.check_available()?;
        let mut tables = self.lock();

        let blank = user.username.trim().is_empty();
        if !blank && tables.users.iter().any(|u| u.username == user.username) {
            return Err(AppError::Duplicate {
                message: format!("user {}", user.username),
            });
        }

        let row = User {
            id: tables.next_id(),
            username: user.username,
            full_name: user.full_name,
            image_url: user.image_url,
        };
        tables.users.push(row.clone());
        Ok(row)
    }

    async fn insert_message(&self, message: NewMessage) -> Result<Message> {
        self.check_available()?;
        let mut tables = self.lock();

        if !tables.channels.iter().any(|c| c.id == message.channel_id) {
            return Err(foreign_key_violation("message.channel_id"));
        }
        if !tables.users.iter().any(|u| u.id == message.user_id) {
            return Err(foreign_key_violation("message.user_id"));
        }

        let row = Message {
            id: tables.next_id(),
            channel_id: message.channel_id,
            user_id: message.user_id,
            title: message.title,
            message_url: message.message_url,
            image_url: message.image_url,
        };
        tables.messages.push(row.clone());
        Ok(row)
    }

    async fn insert_reply(&self, reply: NewReply) -> Result<Reply> {
        self.check_available()?;
        let mut tables = self.lock();

        if !tables.messages.iter().any(|m| m.id == reply.message_id) {
            return Err(foreign_key_violation("reply.message_id"));
        }
        if !tables.users.iter().any(|u| u.id == reply.user_id) {
            return Err(foreign_key_violation("reply.user_id"));
        }

        let row = Reply {
            id: tables.next_id(),
            message_id: reply.message_id,
            user_id: reply.user_id,
            title: reply.title,
            image_url: reply.image_url,
        };
        tables.replies.push(row.clone());
        Ok(row)
    }

    async fn count_messages(&self, channel_id: Option<i64>) -> Result<u64> {
        self.check_available()?;
        let tables = self.lock();

        Ok(tables
            .messages
            .iter()
            .filter(|m| channel_id.map_or(true, |id| m.channel_id == id))
            .count() as u64)
    }

    async fn full_messages(&self, query: FullMessageQuery) -> Result<Vec<FullMessage>> {
        self.check_available()?;
        let tables = self.lock();

        let mut rows: Vec<FullMessage> = tables
            .messages
            .iter()
            .filter(|m| match query.filter {
                MessageFilter::All => true,
                MessageFilter::Id(id) => m.id == id,
                MessageFilter::Channel(id) => m.channel_id == id,
                MessageFilter::User(id) => m.user_id == id,
            })
            .filter_map(|m| tables.full_message(m))
            .collect();

        match query.order {
            MessageOrder::Newest => rows.sort_by(|a, b| b.id.cmp(&a.id)),
            MessageOrder::MostReplied => rows.sort_by(|a, b| {
                b.replies_count
                    .cmp(&a.replies_count)
                    .then_with(|| b.id.cmp(&a.id))
            }),
        }

        if let Some((offset, limit)) = query.window {
            rows = rows
                .into_iter()
                .skip(offset as usize)
                .take(limit as usize)
                .collect();
        }

        Ok(rows)
    }

    async fn full_replies_by_message_id(&self, message_id: i64) -> Result<Vec<FullReply>> {
        self.check_available()?;
        let tables = self.lock();

        Ok(tables
            .replies
            .iter()
            .filter(|r| r.message_id == message_id)
            .filter_map(|r| {
                let user = tables.users.iter().find(|u| u.id == r.user_id)?;
                Some(FullReply {
                    id: r.id,
                    message_id: r.message_id,
                    user_id: user.id,
                    username: user.username.clone(),
                    user_full_name: user.full_name.clone(),
                    user_image_url: user.image_url.clone(),
                    title: r.title.clone(),
                    image_url: r.image_url.clone(),
                })
            })
            .collect())
    }

    async fn channel_stats(&self, channel_id: i64) -> Result<Stat> {
        self.check_available()?;
        let tables = self.lock();

        let message_ids: HashSet<i64> = tables
            .messages
            .iter()
            .filter(|m| m.channel_id == channel_id)
            .map(|m| m.id)
            .collect();
        let replies_count = tables
            .replies
            .iter()
            .filter(|r| message_ids.contains(&r.message_id))
            .count();

        Ok(Stat {
            messages_count: message_ids.len() as i64,
            replies_count: replies_count as i64,
        })
    }
}
