//! Event processor
//!
//! Turns decoded topic events into entity writes through the
//! [`EntityService`]. A post is applied step by step: parent channel,
//! author, message, then each reply on its own.

use crate::errors::{IngestionError, Stage};
use chanfeed_common::db::models::{Channel, NewMessage, NewReply};
use chanfeed_common::metrics;
use chanfeed_common::queue::events::{self, ChannelEvent, PostEvent, ReplyEvent};
use chanfeed_common::queue::Topic;
use chanfeed_common::{AppError, EntityService, Resolution};
use tracing::{debug, error, info, instrument};

/// What a post event produced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PostOutcome {
    pub message_id: i64,
    pub replies_created: usize,
    pub replies_failed: usize,
}

pub struct EventProcessor {
    service: EntityService,
}

impl EventProcessor {
    pub fn new(service: EntityService) -> Self {
        Self { service }
    }

    /// Decode a raw payload from `topic` and apply it
    pub async fn process(&self, topic: Topic, payload: &str) -> Result<(), IngestionError> {
        match topic {
            Topic::Channels => {
                let event: ChannelEvent = events::decode(payload)?;
                self.handle_channel(event).await?;
            }
            Topic::Posts => {
                let event: PostEvent = events::decode(payload)?;
                self.handle_post(event).await?;
            }
        }
        Ok(())
    }

    /// Create the declared channel unless it is already stored
    #[instrument(skip(self, event), fields(channel = %event.username))]
    pub async fn handle_channel(
        &self,
        event: ChannelEvent,
    ) -> Result<Resolution<Channel>, IngestionError> {
        if event.username.trim().is_empty() {
            return Err(IngestionError::MissingChannelName);
        }

        let resolution = self
            .service
            .ensure_channel(&event.username, &event.title, &event.image_url)
            .await
            .map_err(IngestionError::store(Stage::EnsureChannel))?;

        match &resolution {
            Resolution::Created(channel) => {
                info!(channel_id = channel.id, "Channel created");
            }
            Resolution::Existing(channel) => {
                debug!(channel_id = channel.id, "Channel already exists");
            }
        }

        Ok(resolution)
    }

    /// Store a post and its replies.
    ///
    /// Fails only when the channel, author or message cannot be stored.
    /// Reply failures are logged and counted in the outcome.
    #[instrument(skip(self, event), fields(channel = %event.channel.username))]
    pub async fn handle_post(&self, event: PostEvent) -> Result<PostOutcome, IngestionError> {
        if event.channel.username.trim().is_empty() {
            return Err(IngestionError::MissingChannelName);
        }

        let channel = match self.service.require_channel(&event.channel.username).await {
            Ok(channel) => channel,
            Err(AppError::ChannelNotFound { name }) => {
                return Err(IngestionError::UnknownChannel { username: name });
            }
            Err(e) => return Err(IngestionError::store(Stage::ResolveChannel)(e)),
        };

        let author = &event.author;
        let user_id = self
            .service
            .resolve_user(&author.username, &author.full_name, &author.image_url)
            .await
            .map_err(IngestionError::store(Stage::ResolveAuthor))?
            .into_inner();

        let message_id = self
            .service
            .create_message(NewMessage {
                channel_id: channel.id,
                user_id,
                title: event.body,
                message_url: event.url,
                image_url: event.image_url,
            })
            .await
            .map_err(IngestionError::store(Stage::CreateMessage))?;

        let mut outcome = PostOutcome {
            message_id,
            replies_created: 0,
            replies_failed: 0,
        };

        for (index, reply) in event.replies.into_iter().enumerate() {
            match self.handle_reply(message_id, reply).await {
                Ok(reply_id) => {
                    debug!(message_id, reply_id, "Reply created");
                    outcome.replies_created += 1;
                }
                Err(e) => {
                    metrics::record_failure(Topic::Posts.as_str(), e.stage().as_str());
                    error!(
                        message_id,
                        reply_index = index,
                        stage = %e.stage(),
                        error = %e,
                        "Failed to store reply"
                    );
                    outcome.replies_failed += 1;
                }
            }
        }

        info!(
            message_id = outcome.message_id,
            replies = outcome.replies_created,
            failed_replies = outcome.replies_failed,
            "Post stored"
        );

        Ok(outcome)
    }

    async fn handle_reply(&self, message_id: i64, reply: ReplyEvent) -> Result<i64, IngestionError> {
        let author = &reply.author;
        let user_id = self
            .service
            .resolve_user(&author.username, &author.full_name, &author.image_url)
            .await
            .map_err(IngestionError::store(Stage::ResolveReplyAuthor))?
            .into_inner();

        self.service
            .create_reply(NewReply {
                message_id,
                user_id,
                title: reply.body,
                image_url: reply.image_url,
            })
            .await
            .map_err(IngestionError::store(Stage::CreateReply))
    }
}
