//! Durable, ordered message store.
//!
//! Every state transition is a single conditional SQL statement, so the check and
//! the write are atomic without any lock held by the application:
//!
//! * `append` validates `replyTo` inside the `INSERT ... SELECT ... WHERE EXISTS`;
//! * `edit` and `soft_delete` are `UPDATE ... WHERE deleted = 0`;
//! * `mark_read` is an `INSERT OR IGNORE` into a table keyed by `(message_id, user_id)`,
//!   so concurrent readers can never overwrite each other's receipt.
//!
//! Messages are ordered by `(created_ms, seq)`: creation time at millisecond precision,
//! ties broken by insertion order.

use std::collections::HashMap;

use chiacchiera_core::{
    models::{Message, MessageKind, ReplyPreview, User},
    utils::{format_timestamp, now_utc_millis, unix_millis},
};
use sqlx::{sqlite::SqliteRow, QueryBuilder, Row, Sqlite, SqlitePool};

use crate::error::{ChatError, Result};

const SELECT_MESSAGE: &str = r#"
    SELECT m.message_id    AS message_id,
           m.group_id      AS group_id,
           m.sender_id     AS sender_id,
           m.sender_name   AS sender_name,
           m.sender_avatar AS sender_avatar,
           m.content       AS content,
           m.kind          AS kind,
           m.media_url     AS media_url,
           m.media_type    AS media_type,
           m.reply_to      AS reply_to,
           m.deleted       AS deleted,
           m.deleted_by    AS deleted_by,
           m.edited        AS edited,
           m.edited_at     AS edited_at,
           m.created_at    AS created_at,
           m.updated_at    AS updated_at,
           p.message_id    AS parent_id,
           p.sender_name   AS parent_sender,
           p.content       AS parent_content,
           p.deleted       AS parent_deleted
    FROM messages m
    LEFT JOIN messages p ON p.message_id = m.reply_to
"#;

/// A message about to be appended. Sender fields come from the authenticated user.
#[derive(Debug, Clone)]
pub struct NewMessage {
    /// Chosen by the caller, so the write can be locked before it happens.
    pub message_id: String,
    pub group_id: String,
    pub sender: User,
    pub content: String,
    pub kind: MessageKind,
    pub media_url: Option<String>,
    pub media_type: Option<String>,
    pub reply_to: Option<String>,
}

#[derive(Clone)]
pub struct MessageStore {
    pool: SqlitePool,
}

impl MessageStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Persists a new message; `readBy` starts as `[sender]`.
    ///
    /// Fails with `NotFound` if `reply_to` does not name a non-deleted message of the same group.
    pub async fn append(&self, new: NewMessage) -> Result<Message> {
        let message_id = new.message_id.clone();
        let now = now_utc_millis();
        let created_at = format_timestamp(now);

        let mut tx = self.pool.begin().await?;
        let inserted = sqlx::query(
            r#"
            INSERT INTO messages (message_id, group_id, sender_id, sender_name, sender_avatar, content, kind,
                                  media_url, media_type, reply_to, created_at, created_ms, updated_at)
            SELECT ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?
            WHERE ? IS NULL
               OR EXISTS (SELECT 1 FROM messages WHERE message_id = ? AND group_id = ? AND deleted = 0)
            "#,
        )
        .bind(&message_id)
        .bind(&new.group_id)
        .bind(&new.sender.user_id)
        .bind(&new.sender.username)
        .bind(&new.sender.avatar_url)
        .bind(&new.content)
        .bind(new.kind.as_str())
        .bind(&new.media_url)
        .bind(&new.media_type)
        .bind(&new.reply_to)
        .bind(&created_at)
        .bind(unix_millis(now))
        .bind(&created_at)
        .bind(&new.reply_to)
        .bind(&new.reply_to)
        .bind(&new.group_id)
        .execute(&mut *tx)
        .await?;
        if inserted.rows_affected() == 0 {
            // tx dropped here, rolled back
            return Err(ChatError::not_found("replied message not found"));
        }

        sqlx::query("INSERT INTO message_reads (message_id, user_id, read_at) VALUES (?, ?, ?)")
            .bind(&message_id)
            .bind(&new.sender.user_id)
            .bind(&created_at)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        self.get(&message_id)
            .await?
            .ok_or_else(|| ChatError::Internal(format!("message {} vanished after insert", message_id)))
    }

    /// Overwrites the content. `Unauthorized` unless `by_user_id` is the sender,
    /// `NotFound` if the message is absent or deleted.
    pub async fn edit(&self, message_id: &str, by_user_id: &str, new_content: &str) -> Result<Message> {
        let now = format_timestamp(now_utc_millis());
        let updated = sqlx::query(
            r#"
            UPDATE messages SET content = ?, edited = 1, edited_at = ?, updated_at = ?
            WHERE message_id = ? AND deleted = 0 AND sender_id = ?
            "#,
        )
        .bind(new_content)
        .bind(&now)
        .bind(&now)
        .bind(message_id)
        .bind(by_user_id)
        .execute(&self.pool)
        .await?;

        if updated.rows_affected() == 0 {
            // nothing changed: work out why
            return Err(match self.get(message_id).await? {
                Some(m) if !m.deleted => ChatError::unauthorized("only the sender can edit a message"),
                _ => ChatError::not_found("message not found"),
            });
        }
        self.get(message_id)
            .await?
            .ok_or_else(|| ChatError::not_found("message not found"))
    }

    /// Marks the message deleted. Deleting an absent or already-deleted message is `NotFound`.
    /// Authorship is the caller's responsibility.
    pub async fn soft_delete(&self, message_id: &str, by_user_id: &str) -> Result<()> {
        let now = format_timestamp(now_utc_millis());
        let updated = sqlx::query(
            "UPDATE messages SET deleted = 1, deleted_by = ?, updated_at = ? WHERE message_id = ? AND deleted = 0",
        )
        .bind(by_user_id)
        .bind(&now)
        .bind(message_id)
        .execute(&self.pool)
        .await?;
        if updated.rows_affected() == 0 {
            return Err(ChatError::not_found("message not found"));
        }
        Ok(())
    }

    /// Adds `by_user_id` to `readBy`; a repeated call is a no-op.
    pub async fn mark_read(&self, message_id: &str, by_user_id: &str) -> Result<()> {
        let now = format_timestamp(now_utc_millis());
        let inserted = sqlx::query(
            r#"
            INSERT OR IGNORE INTO message_reads (message_id, user_id, read_at)
            SELECT ?, ?, ?
            WHERE EXISTS (SELECT 1 FROM messages WHERE message_id = ? AND deleted = 0)
            "#,
        )
        .bind(message_id)
        .bind(by_user_id)
        .bind(&now)
        .bind(message_id)
        .execute(&self.pool)
        .await?;

        if inserted.rows_affected() == 0 {
            // già letto oppure messaggio inesistente
            let live: bool = sqlx::query_scalar(
                "SELECT EXISTS (SELECT 1 FROM messages WHERE message_id = ? AND deleted = 0)",
            )
            .bind(message_id)
            .fetch_one(&self.pool)
            .await?;
            if !live {
                return Err(ChatError::not_found("message not found"));
            }
        }
        Ok(())
    }

    /// Readers of a message, in read order.
    pub async fn read_by(&self, message_id: &str) -> Result<Vec<String>> {
        let users: Vec<String> =
            sqlx::query_scalar("SELECT user_id FROM message_reads WHERE message_id = ? ORDER BY rowid")
                .bind(message_id)
                .fetch_all(&self.pool)
                .await?;
        Ok(users)
    }

    /// Any message by id, deleted or not.
    pub async fn get(&self, message_id: &str) -> Result<Option<Message>> {
        let sql = format!("{} WHERE m.message_id = ?", SELECT_MESSAGE);
        let row = sqlx::query(&sql)
            .bind(message_id)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => {
                let read_by = self.read_by(message_id).await?;
                Ok(Some(message_from_row(&row, read_by)?))
            }
            None => Ok(None),
        }
    }

    /// One page of non-deleted messages, oldest first, plus the live count of
    /// non-deleted messages in the group. `page` is 1-based.
    pub async fn list(&self, group_id: &str, page: u64, limit: u64) -> Result<(Vec<Message>, u64)> {
        let limit = limit.max(1);
        let offset = page.saturating_sub(1).saturating_mul(limit);
        let sql = format!(
            "{} WHERE m.group_id = ? AND m.deleted = 0 ORDER BY m.created_ms ASC, m.seq ASC LIMIT ? OFFSET ?",
            SELECT_MESSAGE
        );
        let rows = sqlx::query(&sql)
            .bind(group_id)
            .bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .bind(i64::try_from(offset).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await?;

        let ids: Vec<String> = rows
            .iter()
            .map(|r| r.try_get::<String, _>("message_id"))
            .collect::<std::result::Result<_, _>>()?;
        let mut readers = self.read_by_many(&ids).await?;
        let messages = rows
            .iter()
            .zip(ids.iter())
            .map(|(row, id)| message_from_row(row, readers.remove(id).unwrap_or_default()))
            .collect::<Result<Vec<_>>>()?;

        let total: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM messages WHERE group_id = ? AND deleted = 0")
                .bind(group_id)
                .fetch_one(&self.pool)
                .await?;
        Ok((messages, total.max(0) as u64))
    }

    async fn read_by_many(&self, ids: &[String]) -> Result<HashMap<String, Vec<String>>> {
        let mut readers: HashMap<String, Vec<String>> = HashMap::new();
        if ids.is_empty() {
            return Ok(readers);
        }
        let mut qb = QueryBuilder::<Sqlite>::new("SELECT message_id, user_id FROM message_reads WHERE message_id IN (");
        let mut separated = qb.separated(", ");
        for id in ids {
            separated.push_bind(id.as_str());
        }
        separated.push_unseparated(") ORDER BY rowid");
        let rows = qb.build().fetch_all(&self.pool).await?;
        for row in rows {
            let message_id: String = row.try_get("message_id")?;
            let user_id: String = row.try_get("user_id")?;
            readers.entry(message_id).or_default().push(user_id);
        }
        Ok(readers)
    }
}

fn message_from_row(row: &SqliteRow, read_by: Vec<String>) -> Result<Message> {
    let kind: String = row.try_get("kind")?;
    let kind = MessageKind::parse(&kind)
        .ok_or_else(|| ChatError::Internal(format!("unknown message kind {:?}", kind)))?;

    let reply = match row.try_get::<Option<String>, _>("parent_id")? {
        Some(parent_id) => {
            let deleted: bool = row.try_get("parent_deleted")?;
            let content: String = row.try_get("parent_content")?;
            Some(ReplyPreview {
                message_id: parent_id,
                sender_name: row.try_get("parent_sender")?,
                // tombstone: il contenuto di un messaggio cancellato non viene esposto
                content: if deleted { None } else { Some(content) },
                deleted,
            })
        }
        None => None,
    };

    Ok(Message {
        message_id: row.try_get("message_id")?,
        group_id: row.try_get("group_id")?,
        sender_id: row.try_get("sender_id")?,
        sender_name: row.try_get("sender_name")?,
        sender_avatar: row.try_get("sender_avatar")?,
        content: row.try_get("content")?,
        kind,
        media_url: row.try_get("media_url")?,
        media_type: row.try_get("media_type")?,
        reply_to: row.try_get("reply_to")?,
        reply,
        read_by,
        deleted: row.try_get("deleted")?,
        deleted_by: row.try_get("deleted_by")?,
        edited: row.try_get("edited")?,
        edited_at: row.try_get("edited_at")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}
