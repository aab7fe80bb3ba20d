//! Read-side aggregation
//!
//! Paginated, joined views of the entity graph for the presentation
//! layer. Every query reads whatever the ingesters have committed so far;
//! nothing here takes locks or blocks the write path.
//!
//! Absence is never an error: missing rows come back as `None` or an empty
//! `Vec`, and only storage failures surface as `Err`.

use crate::db::models::{Channel, FullMessage, FullReply, Stat, User};
use crate::db::{EntityStore, FullMessageQuery, MessageFilter, MessageOrder};
use crate::errors::Result;
use std::sync::Arc;

/// Rows per page for every paginated view
pub const PAGE_SIZE: u64 = 10;

/// Row offset of a 1-based page; pages below 1 clamp to the first page.
/// The result never exceeds `i64::MAX`, the largest offset Postgres accepts.
pub fn page_offset(page: i64) -> u64 {
    if page <= 0 {
        0
    } else {
        (page as u64 - 1).saturating_mul(PAGE_SIZE).min(i64::MAX as u64)
    }
}

/// Number of pages needed to show `total` rows
pub fn page_count(total: u64) -> u64 {
    total.div_ceil(PAGE_SIZE)
}

/// Query facade over an [`EntityStore`]
#[derive(Clone)]
pub struct Feed {
    store: Arc<dyn EntityStore>,
}

impl Feed {
    pub fn new(store: Arc<dyn EntityStore>) -> Self {
        Self { store }
    }

    // ========================================================================
    // Channels
    // ========================================================================

    pub async fn channels(&self) -> Result<Vec<Channel>> {
        self.store.list_channels(0, None).await
    }

    pub async fn channels_by_page(&self, page: i64) -> Result<Vec<Channel>> {
        self.store.list_channels(page_offset(page), Some(PAGE_SIZE)).await
    }

    pub async fn channel_by_name(&self, name: &str) -> Result<Option<Channel>> {
        self.store.find_channel_by_name(name).await
    }

    pub async fn channel_stats(&self, channel_id: i64) -> Result<Stat> {
        self.store.channel_stats(channel_id).await
    }

    pub async fn channel_count(&self) -> Result<u64> {
        self.store.count_channels().await
    }

    // ========================================================================
    // Users
    // ========================================================================

    pub async fn user_by_id(&self, id: i64) -> Result<Option<User>> {
        self.store.find_user_by_id(id).await
    }

    // ========================================================================
    // Messages
    // ========================================================================

    /// Most recent messages first
    pub async fn full_messages_by_page(&self, page: i64) -> Result<Vec<FullMessage>> {
        let query = FullMessageQuery::new(MessageFilter::All, MessageOrder::Newest)
            .window(page_offset(page), PAGE_SIZE);
        self.store.full_messages(query).await
    }

    /// Most discussed messages of a channel first
    pub async fn full_messages_by_channel_id(
        &self,
        channel_id: i64,
        page: i64,
    ) -> Result<Vec<FullMessage>> {
        let query = FullMessageQuery::new(MessageFilter::Channel(channel_id), MessageOrder::MostReplied)
            .window(page_offset(page), PAGE_SIZE);
        self.store.full_messages(query).await
    }

    /// Whole history of a user, most discussed first
    pub async fn full_messages_by_user_id(&self, user_id: i64) -> Result<Vec<FullMessage>> {
        let query = FullMessageQuery::new(MessageFilter::User(user_id), MessageOrder::MostReplied);
        self.store.full_messages(query).await
    }

    /// One message with its replies attached
    pub async fn full_message_by_id(&self, id: i64) -> Result<Option<FullMessage>> {
        let query = FullMessageQuery::new(MessageFilter::Id(id), MessageOrder::Newest);
        let Some(mut message) = self.store.full_messages(query).await?.into_iter().next() else {
            return Ok(None);
        };

        message.replies = self.store.full_replies_by_message_id(id).await?;
        Ok(Some(message))
    }

    pub async fn full_replies_by_message_id(&self, message_id: i64) -> Result<Vec<FullReply>> {
        self.store.full_replies_by_message_id(message_id).await
    }

    pub async fn message_count(&self) -> Result<u64> {
        self.store.count_messages(None).await
    }

    pub async fn message_count_by_channel(&self, channel_id: i64) -> Result<u64> {
        self.store.count_messages(Some(channel_id)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::{NewMessage, NewReply};
    use crate::db::MemoryStore;
    use crate::service::EntityService;

    #[test]
    fn test_page_offset_law() {
        assert_eq!(page_offset(1), 0);
        assert_eq!(page_offset(2), 10);
        assert_eq!(page_offset(10), 90);
        assert_eq!(page_offset(0), 0);
        assert_eq!(page_offset(-3), 0);
        assert_eq!(page_offset(i64::MIN), 0);
    }

    #[test]
    fn test_page_offset_is_bounded() {
        assert_eq!(page_offset(i64::MAX), i64::MAX as u64);
        assert_eq!(page_offset(1_000_000_000_000_000_000), i64::MAX as u64);
        assert_eq!(page_offset(922_337_203_685_477_580), 9_223_372_036_854_775_790);
    }

    #[tokio::test]
    async fn test_far_page_is_empty() {
        let store = Arc::new(MemoryStore::new());
        let feed = Feed::new(store);

        assert!(feed.full_messages_by_page(i64::MAX).await.unwrap().is_empty());
        assert!(feed.channels_by_page(i64::MAX).await.unwrap().is_empty());
    }

    #[test]
    fn test_page_count() {
        assert_eq!(page_count(0), 0);
        assert_eq!(page_count(10), 1);
        assert_eq!(page_count(11), 2);
    }

    struct Fixture {
        store: Arc<MemoryStore>,
        service: EntityService,
        feed: Feed,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        Fixture {
            store: store.clone(),
            service: EntityService::new(store.clone()),
            feed: Feed::new(store),
        }
    }

    impl Fixture {
        async fn post(&self, channel_id: i64, author: &str, title: &str, replies: usize) -> i64 {
            let user_id = self.service.resolve_user(author, author, "").await.unwrap().into_inner();
            let message_id = self
                .service
                .create_message(NewMessage {
                    channel_id,
                    user_id,
                    title: title.to_string(),
                    message_url: format!("https://t.me/{}", title),
                    image_url: String::new(),
                })
                .await
                .unwrap();

            for i in 0..replies {
                self.service
                    .create_reply(NewReply {
                        message_id,
                        user_id,
                        title: format!("reply {}", i),
                        image_url: String::new(),
                    })
                    .await
                    .unwrap();
            }
            message_id
        }
    }

    #[tokio::test]
    async fn test_channel_view_and_stats_agree() {
        let f = fixture();
        let alpha = f.service.ensure_channel("alpha", "Alpha", "").await.unwrap().into_inner();
        f.post(alpha.id, "bob", "first", 2).await;

        let messages = f.feed.full_messages_by_channel_id(alpha.id, 1).await.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].replies_count, 2);
        assert_eq!(messages[0].channel_name, "alpha");
        assert_eq!(messages[0].username, "bob");

        let stats = f.feed.channel_stats(alpha.id).await.unwrap();
        assert_eq!(stats, Stat { messages_count: 1, replies_count: 2 });
    }

    #[tokio::test]
    async fn test_empty_channel_is_not_an_error() {
        let f = fixture();
        let alpha = f.service.ensure_channel("alpha", "Alpha", "").await.unwrap().into_inner();

        assert!(f.feed.full_messages_by_channel_id(alpha.id, 1).await.unwrap().is_empty());
        assert_eq!(f.feed.channel_stats(alpha.id).await.unwrap(), Stat::default());
        assert_eq!(f.feed.full_message_by_id(404).await.unwrap(), None);
        assert!(f.feed.full_replies_by_message_id(404).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_store_is_an_error() {
        let f = fixture();
        f.store.set_unavailable(true);

        assert!(f.feed.full_messages_by_channel_id(1, 1).await.is_err());
        assert!(f.feed.channel_stats(1).await.is_err());
        assert!(f.feed.channels().await.is_err());
    }

    #[tokio::test]
    async fn test_pages_are_newest_first() {
        let f = fixture();
        let alpha = f.service.ensure_channel("alpha", "", "").await.unwrap().into_inner();

        let mut ids = Vec::new();
        for i in 0..12 {
            ids.push(f.post(alpha.id, "bob", &format!("m{}", i), 0).await);
        }

        let first = f.feed.full_messages_by_page(1).await.unwrap();
        let second = f.feed.full_messages_by_page(2).await.unwrap();
        let clamped = f.feed.full_messages_by_page(0).await.unwrap();

        assert_eq!(first.len(), 10);
        assert_eq!(first[0].id, *ids.last().unwrap());
        assert_eq!(second.len(), 2);
        assert_eq!(second[1].id, ids[0]);
        assert_eq!(clamped, first);
        assert_eq!(f.feed.message_count().await.unwrap(), 12);
    }

    #[tokio::test]
    async fn test_channel_view_orders_by_discussion() {
        let f = fixture();
        let alpha = f.service.ensure_channel("alpha", "", "").await.unwrap().into_inner();
        let beta = f.service.ensure_channel("beta", "", "").await.unwrap().into_inner();

        let quiet = f.post(alpha.id, "bob", "quiet", 0).await;
        let busy = f.post(alpha.id, "bob", "busy", 3).await;
        let recent_quiet = f.post(alpha.id, "bob", "recent", 0).await;
        f.post(beta.id, "bob", "elsewhere", 5).await;

        let ids: Vec<i64> = f
            .feed
            .full_messages_by_channel_id(alpha.id, 1)
            .await
            .unwrap()
            .iter()
            .map(|m| m.id)
            .collect();

        assert_eq!(ids, vec![busy, recent_quiet, quiet]);
        assert_eq!(f.feed.message_count_by_channel(alpha.id).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_user_history_is_unpaginated() {
        let f = fixture();
        let alpha = f.service.ensure_channel("alpha", "", "").await.unwrap().into_inner();

        for i in 0..11 {
            f.post(alpha.id, "carol", &format!("c{}", i), i % 3).await;
        }
        f.post(alpha.id, "dave", "other", 0).await;

        let carol = f.store.users().into_iter().find(|u| u.username == "carol").unwrap();
        let history = f.feed.full_messages_by_user_id(carol.id).await.unwrap();

        assert_eq!(history.len(), 11);
        assert!(history.windows(2).all(|w| w[0].replies_count >= w[1].replies_count));
        assert_eq!(f.feed.user_by_id(carol.id).await.unwrap().unwrap().username, "carol");
    }

    #[tokio::test]
    async fn test_full_message_carries_ordered_replies() {
        let f = fixture();
        let alpha = f.service.ensure_channel("alpha", "", "").await.unwrap().into_inner();
        let id = f.post(alpha.id, "bob", "thread", 3).await;

        let message = f.feed.full_message_by_id(id).await.unwrap().unwrap();
        let titles: Vec<&str> = message.replies.iter().map(|r| r.title.as_str()).collect();

        assert_eq!(message.replies_count, 3);
        assert_eq!(titles, vec!["reply 0", "reply 1", "reply 2"]);
    }

    #[tokio::test]
    async fn test_channel_pages() {
        let f = fixture();
        for i in 0..15 {
            f.service.ensure_channel(&format!("ch{}", i), "", "").await.unwrap();
        }

        assert_eq!(f.feed.channels().await.unwrap().len(), 15);
        assert_eq!(f.feed.channels_by_page(1).await.unwrap().len(), 10);
        assert_eq!(f.feed.channels_by_page(2).await.unwrap().len(), 5);
        assert!(f.feed.channels_by_page(3).await.unwrap().is_empty());
        assert_eq!(f.feed.channel_count().await.unwrap(), 15);
        assert_eq!(page_count(f.feed.channel_count().await.unwrap()), 2);
        assert!(f.feed.channel_by_name("ch3").await.unwrap().is_some());
        assert!(f.feed.channel_by_name("nope").await.unwrap().is_none());
    }
}
