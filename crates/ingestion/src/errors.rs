//! Ingestion service error types

use chanfeed_common::AppError;
use std::fmt;
use thiserror::Error;

/// Step of event handling an error happened in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Receive,
    Decode,
    Validate,
    EnsureChannel,
    ResolveChannel,
    ResolveAuthor,
    CreateMessage,
    ResolveReplyAuthor,
    CreateReply,
    Ack,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Receive => "receive",
            Stage::Decode => "decode",
            Stage::Validate => "validate",
            Stage::EnsureChannel => "ensure_channel",
            Stage::ResolveChannel => "resolve_channel",
            Stage::ResolveAuthor => "resolve_author",
            Stage::CreateMessage => "create_message",
            Stage::ResolveReplyAuthor => "resolve_reply_author",
            Stage::CreateReply => "create_reply",
            Stage::Ack => "ack",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug)]
pub enum IngestionError {
    #[error("Decode error: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Event has no channel username")]
    MissingChannelName,

    #[error("Unknown channel: {username}")]
    UnknownChannel { username: String },

    #[error("Store error during {stage}: {source}")]
    Store {
        stage: Stage,
        #[source]
        source: AppError,
    },

    #[error("Transport error: {0}")]
    Transport(#[source] AppError),
}

impl IngestionError {
    pub fn store(stage: Stage) -> impl FnOnce(AppError) -> Self {
        move |source| IngestionError::Store { stage, source }
    }

    pub fn stage(&self) -> Stage {
        match self {
            IngestionError::Decode(_) => Stage::Decode,
            IngestionError::MissingChannelName => Stage::Validate,
            IngestionError::UnknownChannel { .. } => Stage::ResolveChannel,
            IngestionError::Store { stage, .. } => *stage,
            IngestionError::Transport(_) => Stage::Receive,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_of_each_error() {
        let decode = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        assert_eq!(IngestionError::from(decode).stage(), Stage::Decode);

        assert_eq!(IngestionError::MissingChannelName.stage().as_str(), "validate");

        let unknown = IngestionError::UnknownChannel { username: "ghost".into() };
        assert_eq!(unknown.stage().as_str(), "resolve_channel");

        let store = IngestionError::store(Stage::CreateReply)(AppError::Internal {
            message: "boom".into(),
        });
        assert_eq!(store.stage(), Stage::CreateReply);
        assert!(store.to_string().contains("create_reply"));

        let transport = IngestionError::Transport(AppError::QueueError {
            message: "connection reset".into(),
        });
        assert_eq!(transport.stage(), Stage::Receive);
    }
}
