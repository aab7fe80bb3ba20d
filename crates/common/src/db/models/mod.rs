//! SeaORM entity models
//!
//! Base tables (`channel`, `tg_user`, `message`, `reply`) plus the
//! read-time projections built from them.

mod channel;
mod message;
mod reply;
mod user;
mod views;

pub use channel::{
    Entity as ChannelEntity,
    Model as Channel,
    ActiveModel as ChannelActiveModel,
    Column as ChannelColumn,
};

pub use user::{
    Entity as UserEntity,
    Model as User,
    ActiveModel as UserActiveModel,
    Column as UserColumn,
};

pub use message::{
    Entity as MessageEntity,
    Model as Message,
    ActiveModel as MessageActiveModel,
    Column as MessageColumn,
};

pub use reply::{
    Entity as ReplyEntity,
    Model as Reply,
    ActiveModel as ReplyActiveModel,
    Column as ReplyColumn,
};

pub use views::{FullMessage, FullReply, NewChannel, NewMessage, NewReply, NewUser, Stat};
