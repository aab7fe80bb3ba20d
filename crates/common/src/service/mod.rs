//! Entity service
//!
//! Wraps an [`EntityStore`] with existence checks and the idempotency
//! policy of the ingestion path:
//! - channels are created once per name and never updated
//! - users are found or created by username, first write wins
//! - messages and replies are plain inserts with no dedup key
//!
//! Uniqueness races between concurrent producers are settled by the store's
//! constraints: a conflicting insert is followed by a fresh lookup and
//! reported as an existing entity.

use crate::db::models::{Channel, NewChannel, NewMessage, NewReply, NewUser};
use crate::db::EntityStore;
use crate::errors::{AppError, Result};
use crate::metrics;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Outcome of an idempotent create
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution<T> {
    /// The entity did not exist and was inserted
    Created(T),
    /// The entity was already stored; nothing was written
    Existing(T),
}

impl<T> Resolution<T> {
    pub fn is_created(&self) -> bool {
        matches!(self, Resolution::Created(_))
    }

    pub fn get(&self) -> &T {
        match self {
            Resolution::Created(v) | Resolution::Existing(v) => v,
        }
    }

    pub fn into_inner(self) -> T {
        match self {
            Resolution::Created(v) | Resolution::Existing(v) => v,
        }
    }
}

/// Domain operations over the entity graph
#[derive(Clone)]
pub struct EntityService {
    store: Arc<dyn EntityStore>,
}

impl EntityService {
    pub fn new(store: Arc<dyn EntityStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn EntityStore> {
        &self.store
    }

    /// Create the channel unless one with the same name is stored
    #[instrument(skip(self, title, image_url))]
    pub async fn ensure_channel(
        &self,
        name: &str,
        title: &str,
        image_url: &str,
    ) -> Result<Resolution<Channel>> {
        if let Some(existing) = self.store.find_channel_by_name(name).await? {
            return Ok(Resolution::Existing(existing));
        }

        let new_channel = NewChannel {
            name: name.to_string(),
            title: title.to_string(),
            image_url: image_url.to_string(),
        };

        match self.store.insert_channel(new_channel).await {
            Ok(channel) => {
                metrics::record_entity_created("channel");
                Ok(Resolution::Created(channel))
            }
            Err(e) if e.is_conflict() => {
                debug!("Channel inserted concurrently, reusing stored row");
                let existing = self
                    .store
                    .find_channel_by_name(name)
                    .await?
                    .ok_or(e)?;
                Ok(Resolution::Existing(existing))
            }
            Err(e) => Err(e),
        }
    }

    /// Find the user id for `username`, inserting the user when absent.
    ///
    /// Display attributes of an existing user are left untouched. Blank
    /// usernames never match, so each call with one inserts a new row.
    #[instrument(skip(self, full_name, image_url))]
    pub async fn resolve_user(
        &self,
        username: &str,
        full_name: &str,
        image_url: &str,
    ) -> Result<Resolution<i64>> {
        if let Some(existing) = self.store.find_user_by_username(username).await? {
            return Ok(Resolution::Existing(existing.id));
        }

        let new_user = NewUser {
            username: username.to_string(),
            full_name: full_name.to_string(),
            image_url: image_url.to_string(),
        };

        match self.store.insert_user(new_user).await {
            Ok(user) => {
                metrics::record_entity_created("user");
                Ok(Resolution::Created(user.id))
            }
            Err(e) if e.is_conflict() => {
                debug!("User inserted concurrently, reusing stored row");
                let existing = self
                    .store
                    .find_user_by_username(username)
                    .await?
                    .ok_or(e)?;
                Ok(Resolution::Existing(existing.id))
            }
            Err(e) => Err(e),
        }
    }

    /// Look up a channel that may legitimately be absent
    pub async fn channel_by_name(&self, name: &str) -> Result<Option<Channel>> {
        self.store.find_channel_by_name(name).await
    }

    /// Look up a channel whose absence is an error for the caller
    pub async fn require_channel(&self, name: &str) -> Result<Channel> {
        self.store
            .find_channel_by_name(name)
            .await?
            .ok_or_else(|| AppError::ChannelNotFound { name: name.to_string() })
    }

    /// Insert a message; returns its id
    pub async fn create_message(&self, message: NewMessage) -> Result<i64> {
        let message = self.store.insert_message(message).await?;
        metrics::record_entity_created("message");
        Ok(message.id)
    }

    /// Insert a reply under an existing message; returns its id
    pub async fn create_reply(&self, reply: NewReply) -> Result<i64> {
        let reply = self.store.insert_reply(reply).await?;
        metrics::record_entity_created("reply");
        Ok(reply.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;

    fn service() -> (Arc<MemoryStore>, EntityService) {
        let store = Arc::new(MemoryStore::new());
        (store.clone(), EntityService::new(store))
    }

    #[tokio::test]
    async fn test_ensure_channel_is_idempotent() {
        let (store, service) = service();

        let first = service.ensure_channel("alpha", "Alpha", "a.png").await.unwrap();
        let second = service.ensure_channel("alpha", "Alpha again", "b.png").await.unwrap();

        assert!(first.is_created());
        assert!(!second.is_created());
        assert_eq!(first.get().id, second.get().id);
        assert_eq!(second.get().title, "Alpha");
        assert_eq!(store.channels().len(), 1);
    }

    #[tokio::test]
    async fn test_ensure_channel_settles_insert_race() {
        let (store, service) = service();
        service.ensure_channel("alpha", "Alpha", "").await.unwrap();

        // The lookup misses, the insert conflicts, the re-lookup finds the row
        store.blind_next_lookups(1);
        let again = service.ensure_channel("alpha", "Alpha", "").await.unwrap();

        assert!(!again.is_created());
        assert_eq!(store.channels().len(), 1);
    }

    #[tokio::test]
    async fn test_ensure_channel_propagates_storage_failure() {
        let (store, service) = service();
        store.set_unavailable(true);

        let err = service.ensure_channel("alpha", "Alpha", "").await.unwrap_err();
        assert!(err.is_operational());
    }

    #[tokio::test]
    async fn test_resolve_user_is_stable() {
        let (store, service) = service();

        let first = service.resolve_user("bob", "Bob", "bob.png").await.unwrap();
        let second = service.resolve_user("bob", "Robert", "other.png").await.unwrap();

        assert!(first.is_created());
        assert_eq!(second, Resolution::Existing(*first.get()));

        let users = store.users();
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].full_name, "Bob");
    }

    #[tokio::test]
    async fn test_resolve_user_settles_insert_race() {
        let (store, service) = service();
        let first = service.resolve_user("bob", "Bob", "").await.unwrap();

        store.blind_next_lookups(1);
        let again = service.resolve_user("bob", "Bob", "").await.unwrap();

        assert_eq!(again, Resolution::Existing(first.into_inner()));
        assert_eq!(store.users().len(), 1);
    }

    #[tokio::test]
    async fn test_blank_usernames_are_not_merged() {
        let (store, service) = service();

        let a = service.resolve_user("", "Anon", "").await.unwrap();
        let b = service.resolve_user("", "Anon", "").await.unwrap();

        assert!(a.is_created() && b.is_created());
        assert_ne!(a.get(), b.get());
        assert_eq!(store.users().len(), 2);
    }

    #[tokio::test]
    async fn test_require_channel_names_missing_channel() {
        let (_, service) = service();

        assert_eq!(service.channel_by_name("ghost").await.unwrap(), None);

        let err = service.require_channel("ghost").await.unwrap_err();
        assert!(matches!(err, AppError::ChannelNotFound { ref name } if name == "ghost"));
    }

    #[tokio::test]
    async fn test_message_and_reply_are_plain_inserts() {
        let (store, service) = service();
        let channel = service.ensure_channel("alpha", "", "").await.unwrap().into_inner();
        let user_id = service.resolve_user("bob", "", "").await.unwrap().into_inner();

        let message = NewMessage {
            channel_id: channel.id,
            user_id,
            title: "hello".to_string(),
            message_url: String::new(),
            image_url: String::new(),
        };
        let first = service.create_message(message.clone()).await.unwrap();
        let second = service.create_message(message).await.unwrap();
        assert_ne!(first, second);

        service
            .create_reply(NewReply {
                message_id: first,
                user_id,
                title: "hi".to_string(),
                image_url: String::new(),
            })
            .await
            .unwrap();

        assert_eq!(store.messages().len(), 2);
        assert_eq!(store.replies().len(), 1);
    }
}
