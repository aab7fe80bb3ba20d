//! Repository pattern for database operations
//!
//! Postgres implementation of [`EntityStore`]. Lookups the ingestion path
//! depends on go to the primary so they observe its own inserts; joined
//! and aggregate reads go to the replica when one is configured.

use crate::db::models::*;
use crate::db::store::{EntityStore, FullMessageQuery, MessageFilter, MessageOrder};
use crate::db::DbPool;
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbBackend, DbErr, EntityTrait,
    FromQueryResult, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set, SqlErr,
    Statement, Value,
};

const FULL_MESSAGE_SELECT: &str = r#"
    SELECT
        m.id,
        m.channel_id,
        c.name AS channel_name,
        c.title AS channel_title,
        c.image_url AS channel_image_url,
        m.user_id,
        u.username,
        u.full_name AS user_full_name,
        u.image_url AS user_image_url,
        m.title,
        m.message_url,
        m.image_url,
        COUNT(r.id) AS replies_count
    FROM message m
    JOIN channel c ON c.id = m.channel_id
    JOIN tg_user u ON u.id = m.user_id
    LEFT JOIN reply r ON r.message_id = m.id
"#;

/// Row shape of [`FULL_MESSAGE_SELECT`]
#[derive(Debug, FromQueryResult)]
struct FullMessageRow {
    id: i64,
    channel_id: i64,
    channel_name: String,
    channel_title: String,
    channel_image_url: String,
    user_id: i64,
    username: String,
    user_full_name: String,
    user_image_url: String,
    title: String,
    message_url: String,
    image_url: String,
    replies_count: i64,
}

impl From<FullMessageRow> for FullMessage {
    fn from(row: FullMessageRow) -> Self {
        Self {
            id: row.id,
            channel_id: row.channel_id,
            channel_name: row.channel_name,
            channel_title: row.channel_title,
            channel_image_url: row.channel_image_url,
            user_id: row.user_id,
            username: row.username,
            user_full_name: row.user_full_name,
            user_image_url: row.user_image_url,
            title: row.title,
            message_url: row.message_url,
            image_url: row.image_url,
            replies_count: row.replies_count,
            replies: Vec::new(),
        }
    }
}

/// Build the SQL and bind values for a full-message query
fn full_message_sql(query: &FullMessageQuery) -> (String, Vec<Value>) {
    let mut values: Vec<Value> = Vec::new();

    let filter = match query.filter {
        MessageFilter::All => String::new(),
        MessageFilter::Id(id) => {
            values.push(id.into());
            "WHERE m.id = $1".to_string()
        }
        MessageFilter::Channel(id) => {
            values.push(id.into());
            "WHERE m.channel_id = $1".to_string()
        }
        MessageFilter::User(id) => {
            values.push(id.into());
            "WHERE m.user_id = $1".to_string()
        }
    };

    let order = match query.order {
        MessageOrder::Newest => "ORDER BY m.id DESC",
        MessageOrder::MostReplied => "ORDER BY replies_count DESC, m.id DESC",
    };

    let window = match query.window {
        Some((offset, limit)) => {
            let limit_idx = values.len() + 1;
            values.push(i64::try_from(limit).unwrap_or(i64::MAX).into());
            values.push(i64::try_from(offset).unwrap_or(i64::MAX).into());
            format!("LIMIT ${} OFFSET ${}", limit_idx, limit_idx + 1)
        }
        None => String::new(),
    };

    let sql = format!(
        "{} {} GROUP BY m.id, c.id, u.id {} {}",
        FULL_MESSAGE_SELECT, filter, order, window
    );

    (sql, values)
}

/// Translate a failed insert, surfacing uniqueness violations as conflicts
fn insert_error(err: DbErr, what: impl FnOnce() -> String) -> AppError {
    match err.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(_)) => AppError::Duplicate { message: what() },
        _ => AppError::Database(err),
    }
}

fn is_blank(username: &str) -> bool {
    username.trim().is_empty()
}

/// Repository for data access operations
#[derive(Clone)]
pub struct Repository {
    pool: DbPool,
}

impl Repository {
    /// Create a new repository with the given connection pool
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Get the read connection
    fn read_conn(&self) -> &DatabaseConnection {
        self.pool.read()
    }

    /// Get the write connection
    fn write_conn(&self) -> &DatabaseConnection {
        self.pool.write()
    }

    /// Ping the database
    pub async fn ping(&self) -> Result<()> {
        self.pool.ping().await
    }
}

#[async_trait]
impl EntityStore for Repository {
    // ========================================================================
    // Channel Operations
    // ========================================================================

    async fn find_channel_by_name(&self, name: &str) -> Result<Option<Channel>> {
        ChannelEntity::find()
            .filter(ChannelColumn::Name.eq(name))
            .one(self.write_conn())
            .await
            .map_err(Into::into)
    }

    async fn find_channel_by_id(&self, id: i64) -> Result<Option<Channel>> {
        ChannelEntity::find_by_id(id)
            .one(self.read_conn())
            .await
            .map_err(Into::into)
    }

    async fn insert_channel(&self, channel: NewChannel) -> Result<Channel> {
        let name = channel.name.clone();

        let model = ChannelActiveModel {
            name: Set(channel.name),
            title: Set(channel.title),
            image_url: Set(channel.image_url),
            ..Default::default()
        };

        model
            .insert(self.write_conn())
            .await
            .map_err(|e| insert_error(e, || format!("channel {}", name)))
    }

    async fn list_channels(&self, offset: u64, limit: Option<u64>) -> Result<Vec<Channel>> {
        ChannelEntity::find()
            .order_by_asc(ChannelColumn::Id)
            .offset(offset)
            .limit(limit)
            .all(self.read_conn())
            .await
            .map_err(Into::into)
    }

    async fn count_channels(&self) -> Result<u64> {
        ChannelEntity::find()
            .count(self.read_conn())
            .await
            .map_err(Into::into)
    }

    // ========================================================================
    // User Operations
    // ========================================================================

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>> {
        if is_blank(username) {
            return Ok(None);
        }

        UserEntity::find()
            .filter(UserColumn::Username.eq(username))
            .one(self.write_conn())
            .await
            .map_err(Into::into)
    }

    async fn find_user_by_id(&self, id: i64) -> Result<Option<User>> {
        UserEntity::find_by_id(id)
            .one(self.read_conn())
            .await
            .map_err(Into::into)
    }

    async fn insert_user(&self, user: NewUser) -> Result<User> {
        let username = user.username.clone();

        let model = UserActiveModel {
            username: Set(user.username),
            full_name: Set(user.full_name),
            image_url: Set(user.image_url),
            ..Default::default()
        };

        model
            .insert(self.write_conn())
            .await
            .map_err(|e| insert_error(e, || format!("user {}", username)))
    }

    // ========================================================================
    // Message Operations
    // ========================================================================

    async fn insert_message(&self, message: NewMessage) -> Result<Message> {
        let model = MessageActiveModel {
            channel_id: Set(message.channel_id),
            user_id: Set(message.user_id),
            title: Set(message.title),
            message_url: Set(message.message_url),
            image_url: Set(message.image_url),
            ..Default::default()
        };

        model.insert(self.write_conn()).await.map_err(Into::into)
    }

    async fn insert_reply(&self, reply: NewReply) -> Result<Reply> {
        let model = ReplyActiveModel {
            message_id: Set(reply.message_id),
            user_id: Set(reply.user_id),
            title: Set(reply.title),
            image_url: Set(reply.image_url),
            ..Default::default()
        };

        model.insert(self.write_conn()).await.map_err(Into::into)
    }

    async fn count_messages(&self, channel_id: Option<i64>) -> Result<u64> {
        let mut select = MessageEntity::find();

        if let Some(id) = channel_id {
            select = select.filter(MessageColumn::ChannelId.eq(id));
        }

        select.count(self.read_conn()).await.map_err(Into::into)
    }

    // ========================================================================
    // Aggregates
    // ========================================================================

    async fn full_messages(&self, query: FullMessageQuery) -> Result<Vec<FullMessage>> {
        let (sql, values) = full_message_sql(&query);
        let stmt = Statement::from_sql_and_values(DbBackend::Postgres, &sql, values);

        let rows = FullMessageRow::find_by_statement(stmt)
            .all(self.read_conn())
            .await?;

        Ok(rows.into_iter().map(FullMessage::from).collect())
    }

    async fn full_replies_by_message_id(&self, message_id: i64) -> Result<Vec<FullReply>> {
        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            r#"
            SELECT
                r.id,
                r.message_id,
                r.user_id,
                u.username,
                u.full_name AS user_full_name,
                u.image_url AS user_image_url,
                r.title,
                r.image_url
            FROM reply r
            JOIN tg_user u ON u.id = r.user_id
            WHERE r.message_id = $1
            ORDER BY r.id ASC
            "#,
            vec![message_id.into()],
        );

        FullReply::find_by_statement(stmt)
            .all(self.read_conn())
            .await
            .map_err(Into::into)
    }

    async fn channel_stats(&self, channel_id: i64) -> Result<Stat> {
        // Aggregates without GROUP BY always yield one row, zeros included
        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            r#"
            SELECT
                COUNT(DISTINCT m.id) AS messages_count,
                COUNT(r.id) AS replies_count
            FROM message m
            LEFT JOIN reply r ON r.message_id = m.id
            WHERE m.channel_id = $1
            "#,
            vec![channel_id.into()],
        );

        let stat = Stat::find_by_statement(stmt)
            .one(self.read_conn())
            .await?;

        Ok(stat.unwrap_or_default())
    }
}
