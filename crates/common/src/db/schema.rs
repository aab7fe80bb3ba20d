//! Idempotent schema bootstrap
//!
//! Creates the four base tables and their indexes if they are missing.
//! Channel names are unique outright. Usernames are unique only when not
//! blank, so blank-username authors still get a row per event.

use crate::errors::Result;
use sea_orm::{ConnectionTrait, DatabaseConnection};
use tracing::info;

pub const STATEMENTS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS channel (
        id BIGSERIAL PRIMARY KEY,
        name TEXT NOT NULL,
        title TEXT NOT NULL DEFAULT '',
        image_url TEXT NOT NULL DEFAULT '',
        CONSTRAINT channel_name_key UNIQUE (name)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS tg_user (
        id BIGSERIAL PRIMARY KEY,
        username TEXT NOT NULL DEFAULT '',
        full_name TEXT NOT NULL DEFAULT '',
        image_url TEXT NOT NULL DEFAULT ''
    )
    "#,
    r#"
    CREATE UNIQUE INDEX IF NOT EXISTS tg_user_username_key
        ON tg_user (username)
        WHERE btrim(username) <> ''
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS message (
        id BIGSERIAL PRIMARY KEY,
        channel_id BIGINT NOT NULL REFERENCES channel (id),
        user_id BIGINT NOT NULL REFERENCES tg_user (id),
        title TEXT NOT NULL DEFAULT '',
        message_url TEXT NOT NULL DEFAULT '',
        image_url TEXT NOT NULL DEFAULT ''
    )
    "#,
    "CREATE INDEX IF NOT EXISTS message_channel_id_idx ON message (channel_id)",
    "CREATE INDEX IF NOT EXISTS message_user_id_idx ON message (user_id)",
    r#"
    CREATE TABLE IF NOT EXISTS reply (
        id BIGSERIAL PRIMARY KEY,
        message_id BIGINT NOT NULL REFERENCES message (id) ON DELETE CASCADE,
        user_id BIGINT NOT NULL REFERENCES tg_user (id),
        title TEXT NOT NULL DEFAULT '',
        image_url TEXT NOT NULL DEFAULT ''
    )
    "#,
    "CREATE INDEX IF NOT EXISTS reply_message_id_idx ON reply (message_id)",
];

/// Create missing tables and indexes on the given connection
pub async fn bootstrap(conn: &DatabaseConnection) -> Result<()> {
    for statement in STATEMENTS {
        conn.execute_unprepared(statement).await?;
    }

    info!(statements = STATEMENTS.len(), "Schema bootstrap complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_statements_are_idempotent() {
        for statement in STATEMENTS {
            assert!(statement.contains("IF NOT EXISTS"), "{}", statement);
        }
    }

    #[test]
    fn test_blank_usernames_are_not_unique() {
        let index = STATEMENTS
            .iter()
            .find(|s| s.contains("tg_user_username_key"))
            .unwrap();
        assert!(index.contains("WHERE btrim(username) <> ''"));
    }
}
