//! Insert payloads and read-time projections
//!
//! None of the projections are persisted; they are assembled by joins and
//! aggregates when read.

use sea_orm::FromQueryResult;
use serde::{Deserialize, Serialize};

/// Channel to insert
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewChannel {
    pub name: String,
    pub title: String,
    pub image_url: String,
}

/// User to insert
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    pub username: String,
    pub full_name: String,
    pub image_url: String,
}

/// Message to insert; both references must already exist
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    pub channel_id: i64,
    pub user_id: i64,
    pub title: String,
    pub message_url: String,
    pub image_url: String,
}

/// Reply to insert under an existing message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewReply {
    pub message_id: i64,
    pub user_id: i64,
    pub title: String,
    pub image_url: String,
}

/// Message joined with its channel, its author and its reply count
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FullMessage {
    pub id: i64,
    pub channel_id: i64,
    pub channel_name: String,
    pub channel_title: String,
    pub channel_image_url: String,
    pub user_id: i64,
    pub username: String,
    pub user_full_name: String,
    pub user_image_url: String,
    pub title: String,
    pub message_url: String,
    pub image_url: String,
    pub replies_count: i64,
    /// Populated only by single-message lookups
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub replies: Vec<FullReply>,
}

/// Reply joined with its author
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromQueryResult)]
pub struct FullReply {
    pub id: i64,
    pub message_id: i64,
    pub user_id: i64,
    pub username: String,
    pub user_full_name: String,
    pub user_image_url: String,
    pub title: String,
    pub image_url: String,
}

/// Per-channel aggregate
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, FromQueryResult)]
pub struct Stat {
    pub messages_count: i64,
    pub replies_count: i64,
}
