//! Inbound event payloads
//!
//! Decoding is deliberately lenient: unknown fields are ignored, and
//! missing or `null` fields fall back to zero values. Only malformed JSON
//! or a wrongly typed value is a decode error.

use serde::{de::DeserializeOwned, Deserialize, Deserializer, Serialize};

/// Treat an explicit `null` like a missing field
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Decode a raw payload
pub fn decode<T: DeserializeOwned>(payload: &str) -> serde_json::Result<T> {
    serde_json::from_str(payload)
}

/// Channel declaration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ChannelEvent {
    /// Producer-side id; the store assigns its own
    #[serde(deserialize_with = "null_as_default")]
    pub id: i64,

    /// Handle, used as the channel name
    #[serde(deserialize_with = "null_as_default")]
    pub username: String,

    #[serde(deserialize_with = "null_as_default")]
    pub title: String,

    #[serde(alias = "image_url", deserialize_with = "null_as_default")]
    pub image_url: String,
}

/// Author of a post or reply
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AuthorRef {
    #[serde(deserialize_with = "null_as_default")]
    pub username: String,

    #[serde(
        rename = "fullname",
        alias = "fullName",
        alias = "full_name",
        deserialize_with = "null_as_default"
    )]
    pub full_name: String,

    #[serde(alias = "image_url", deserialize_with = "null_as_default")]
    pub image_url: String,
}

/// Reference to the channel a post belongs to
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelRef {
    #[serde(deserialize_with = "null_as_default")]
    pub username: String,
}

/// Reply nested in a post
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ReplyEvent {
    #[serde(deserialize_with = "null_as_default")]
    pub author: AuthorRef,

    #[serde(deserialize_with = "null_as_default")]
    pub body: String,

    #[serde(alias = "image_url", deserialize_with = "null_as_default")]
    pub image_url: String,
}

/// Post with its author, parent channel and replies
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PostEvent {
    #[serde(deserialize_with = "null_as_default")]
    pub body: String,

    #[serde(deserialize_with = "null_as_default")]
    pub url: String,

    #[serde(alias = "image_url", deserialize_with = "null_as_default")]
    pub image_url: String,

    #[serde(deserialize_with = "null_as_default")]
    pub author: AuthorRef,

    #[serde(deserialize_with = "null_as_default")]
    pub channel: ChannelRef,

    #[serde(deserialize_with = "null_as_default")]
    pub replies: Vec<ReplyEvent>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_event_tolerates_missing_and_unknown_fields() {
        let event: ChannelEvent =
            decode(r#"{"username": "alpha", "subscribers": 1200, "verified": true}"#).unwrap();

        assert_eq!(event.username, "alpha");
        assert_eq!(event.id, 0);
        assert_eq!(event.title, "");
        assert_eq!(event.image_url, "");
    }

    #[test]
    fn test_nulls_become_defaults() {
        let event: PostEvent = decode(
            r#"{"body": null, "author": null, "channel": {"username": "alpha"}, "replies": null}"#,
        )
        .unwrap();

        assert_eq!(event.body, "");
        assert_eq!(event.author, AuthorRef::default());
        assert_eq!(event.channel.username, "alpha");
        assert!(event.replies.is_empty());
    }

    #[test]
    fn test_post_event_shape() {
        let event: PostEvent = decode(
            r#"{
                "body": "launch day",
                "url": "https://t.me/alpha/1",
                "imageUrl": "https://cdn/1.jpg",
                "author": {"username": "bob", "fullname": "Bob B", "imageUrl": "https://cdn/bob.jpg"},
                "channel": {"username": "alpha"},
                "replies": [
                    {"author": {"username": "carol", "fullName": "Carol"}, "body": "congrats"},
                    {"body": "anon reply"}
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(event.author.full_name, "Bob B");
        assert_eq!(event.image_url, "https://cdn/1.jpg");
        assert_eq!(event.replies.len(), 2);
        assert_eq!(event.replies[0].author.full_name, "Carol");
        assert_eq!(event.replies[1].author.username, "");
    }

    #[test]
    fn test_wrong_types_are_decode_errors() {
        assert!(decode::<ChannelEvent>(r#"{"username": 42}"#).is_err());
        assert!(decode::<PostEvent>("not json").is_err());
        assert!(decode::<PostEvent>("").is_err());
    }
}
