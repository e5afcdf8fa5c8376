//! Message store - CRUD over cached conversation messages

use crate::error::CacheError;
use crate::model::CachedMessage;
use crate::rows::{message_from_row, MessageRow};
use crate::store::StoreHandle;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info};

/// Persistent store for cached messages.
///
/// Holds only the message rows; the per-conversation aggregates live in
/// [`crate::ConversationMetaStore`] and [`crate::SyncTracker`] and are
/// refreshed by the facade after every successful write here.
#[derive(Clone)]
pub struct MessageStore {
    store: StoreHandle,
}

impl MessageStore {
    pub fn new(store: StoreHandle) -> Self {
        Self { store }
    }

    /// All cached messages for a conversation, ascending by sequence number.
    ///
    /// Messages without a sequence number (pending/unsent) sort after all
    /// sequenced messages, in insertion order among themselves. Returns an
    /// empty vec, never an error result with rows, when nothing is cached.
    pub async fn get_messages(
        &self,
        conversation_id: &str,
    ) -> Result<Vec<CachedMessage>, CacheError> {
        let conn = self.store.conn();

        let mut stmt = conn.prepare(
            r#"
            SELECT * FROM messages
            WHERE conversation_id = ?1
            ORDER BY sequence_number IS NULL, sequence_number ASC, rowid ASC
            "#,
        )?;

        let messages = stmt
            .query_map(params![conversation_id], message_from_row)?
            .collect::<Result<Vec<_>, rusqlite::Error>>()?;

        debug!(
            "loaded {} cached messages for conversation {}",
            messages.len(),
            conversation_id
        );
        Ok(messages)
    }

    /// Single message lookup by id.
    pub async fn get_message(&self, id: &str) -> Result<Option<CachedMessage>, CacheError> {
        let conn = self.store.conn();

        let mut stmt = conn.prepare("SELECT * FROM messages WHERE id = ?1")?;
        let message = stmt
            .query_row(params![id], message_from_row)
            .optional()?;

        Ok(message)
    }

    /// Replace the whole cached set for a conversation.
    ///
    /// An empty `messages` slice is a deliberate no-op: an empty fetch result
    /// must not wipe a previously warm cache.
    pub async fn replace_all(
        &self,
        conversation_id: &str,
        messages: &[CachedMessage],
    ) -> Result<usize, CacheError> {
        if messages.is_empty() {
            debug!(
                "skipping cache replace for conversation {}: empty input",
                conversation_id
            );
            return Ok(0);
        }

        let now = Utc::now();
        let rows = messages
            .iter()
            .map(|m| MessageRow::from_message(m, now))
            .collect::<Result<Vec<_>, CacheError>>()?;

        let conn = self.store.conn();
        conn.execute(
            "DELETE FROM messages WHERE conversation_id = ?1",
            params![conversation_id],
        )?;
        for row in &rows {
            insert_row(&conn, row)?;
        }

        info!(
            "cached {} messages for conversation {}",
            rows.len(),
            conversation_id
        );
        Ok(rows.len())
    }

    /// Insert or replace a single message by id.
    pub async fn append(&self, message: &CachedMessage) -> Result<(), CacheError> {
        let row = MessageRow::from_message(message, Utc::now())?;

        let conn = self.store.conn();
        insert_row(&conn, &row)?;

        debug!(
            "appended message {} to conversation {}",
            message.id, message.conversation_id
        );
        Ok(())
    }

    /// Swap an optimistic message for its server-confirmed counterpart.
    ///
    /// The two ids may differ; exactly one of the two rows survives. Deleting
    /// a temp id that was never cached is not an error.
    pub async fn reconcile_optimistic(
        &self,
        temp_id: &str,
        confirmed: &CachedMessage,
    ) -> Result<(), CacheError> {
        let row = MessageRow::from_message(confirmed, Utc::now())?;

        let conn = self.store.conn();
        let removed = conn.execute("DELETE FROM messages WHERE id = ?1", params![temp_id])?;
        insert_row(&conn, &row)?;

        debug!(
            "reconciled optimistic message {} -> {} (removed {})",
            temp_id, confirmed.id, removed
        );
        Ok(())
    }

    /// Delete every cached message of a conversation, returning the count.
    pub async fn clear_conversation(&self, conversation_id: &str) -> Result<usize, CacheError> {
        let conn = self.store.conn();
        let count = conn.execute(
            "DELETE FROM messages WHERE conversation_id = ?1",
            params![conversation_id],
        )?;

        info!(
            "cleared {} cached messages for conversation {}",
            count, conversation_id
        );
        Ok(count)
    }

    /// Delete messages whose `created_at` falls inside the closed window,
    /// across all conversations. Returns the removed count and the ids of
    /// the conversations touched, so aggregates can be refreshed.
    pub async fn delete_by_created_range(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<(usize, Vec<String>), CacheError> {
        let from_ms = from.timestamp_millis();
        let to_ms = to.timestamp_millis();

        let conn = self.store.conn();

        let mut stmt = conn.prepare(
            "SELECT DISTINCT conversation_id FROM messages WHERE created_at >= ?1 AND created_at <= ?2",
        )?;
        let affected = stmt
            .query_map(params![from_ms, to_ms], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, rusqlite::Error>>()?;
        drop(stmt);

        let count = conn.execute(
            "DELETE FROM messages WHERE created_at >= ?1 AND created_at <= ?2",
            params![from_ms, to_ms],
        )?;

        info!(
            "deleted {} cached messages in date range across {} conversations",
            count,
            affected.len()
        );
        Ok((count, affected))
    }

    /// Mark every message of a conversation as read by the current user.
    pub async fn mark_conversation_read(&self, conversation_id: &str) -> Result<usize, CacheError> {
        let conn = self.store.conn();
        let count = conn.execute(
            "UPDATE messages SET is_read_by_current_user = 1 WHERE conversation_id = ?1",
            params![conversation_id],
        )?;

        debug!(
            "marked {} messages read in conversation {}",
            count, conversation_id
        );
        Ok(count)
    }

    /// Count of unread peer messages in a conversation. Locally originated
    /// rows (those carrying a status) are excluded.
    pub async fn unread_count(&self, conversation_id: &str) -> Result<i64, CacheError> {
        let conn = self.store.conn();
        let count: i64 = conn.query_row(
            r#"
            SELECT COUNT(*) FROM messages
            WHERE conversation_id = ?1 AND is_read_by_current_user = 0 AND status IS NULL
            "#,
            params![conversation_id],
            |row| row.get(0),
        )?;

        Ok(count)
    }

    /// Distinct ids of conversations with at least one cached message.
    pub async fn conversation_ids(&self) -> Result<Vec<String>, CacheError> {
        let conn = self.store.conn();

        let mut stmt = conn
            .prepare("SELECT DISTINCT conversation_id FROM messages ORDER BY conversation_id")?;
        let ids = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, rusqlite::Error>>()?;

        Ok(ids)
    }

    /// Totals for diagnostics: (conversation count, message count, size
    /// estimate in bytes of cached content).
    pub async fn totals(&self) -> Result<(i64, i64, i64), CacheError> {
        let conn = self.store.conn();
        let totals = conn.query_row(
            r#"
            SELECT
                COUNT(DISTINCT conversation_id),
                COUNT(*),
                COALESCE(SUM(LENGTH(content) + COALESCE(LENGTH(sender_json), 0)), 0)
            FROM messages
            "#,
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )?;

        Ok(totals)
    }

    /// Delete every cached message.
    pub async fn clear_all(&self) -> Result<usize, CacheError> {
        let conn = self.store.conn();
        let count = conn.execute("DELETE FROM messages", [])?;
        Ok(count)
    }
}

fn insert_row(conn: &Connection, row: &MessageRow) -> rusqlite::Result<()> {
    conn.execute(
        r#"
        INSERT OR REPLACE INTO messages (
            id, conversation_id, sender_id, sender_json, content,
            sequence_number, is_screenshot, screenshot_file_name,
            is_read_by_current_user, created_at, updated_at, status,
            temp_id, client_temp_id, is_system_message,
            file_name, file_size, file_mime_type, cached_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13,
                ?14, ?15, ?16, ?17, ?18, ?19)
        "#,
        params![
            row.id,
            row.conversation_id,
            row.sender_id,
            row.sender_json,
            row.content,
            row.sequence_number,
            row.is_screenshot,
            row.screenshot_file_name,
            row.is_read_by_current_user,
            row.created_at,
            row.updated_at,
            row.status,
            row.temp_id,
            row.client_temp_id,
            row.is_system_message,
            row.file_name,
            row.file_size,
            row.file_mime_type,
            row.cached_at,
        ],
    )?;
    Ok(())
}
