//! Conversation metadata store - per-conversation cache aggregates

use crate::error::CacheError;
use crate::model::ConversationMeta;
use crate::store::StoreHandle;
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};
use tracing::debug;

/// Keeps one aggregate row per conversation: the latest sequence number
/// seen, the cached message count, and the last update time.
#[derive(Clone)]
pub struct ConversationMetaStore {
    store: StoreHandle,
}

impl ConversationMetaStore {
    pub fn new(store: StoreHandle) -> Self {
        Self { store }
    }

    /// Recompute the aggregate from the current message rows and upsert it.
    ///
    /// `latest_sequence` only ever moves forward here; a replace with a lower
    /// maximum leaves the previously seen high-water mark in place. The row
    /// is removed only by [`Self::delete`].
    pub async fn refresh(&self, conversation_id: &str) -> Result<(), CacheError> {
        let now = Utc::now().timestamp_millis();
        let conn = self.store.conn();

        let (max_seq, count): (Option<i64>, i64) = conn.query_row(
            "SELECT MAX(sequence_number), COUNT(*) FROM messages WHERE conversation_id = ?1",
            params![conversation_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        conn.execute(
            r#"
            INSERT INTO chat_meta (conversation_id, latest_sequence, last_updated, message_count)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(conversation_id) DO UPDATE SET
                latest_sequence = CASE
                    WHEN excluded.latest_sequence IS NULL THEN chat_meta.latest_sequence
                    WHEN chat_meta.latest_sequence IS NULL THEN excluded.latest_sequence
                    ELSE MAX(chat_meta.latest_sequence, excluded.latest_sequence)
                END,
                last_updated = excluded.last_updated,
                message_count = excluded.message_count
            "#,
            params![conversation_id, max_seq, now, count],
        )?;

        debug!(
            "refreshed meta for conversation {}: count {}, max seq {:?}",
            conversation_id, count, max_seq
        );
        Ok(())
    }

    pub async fn get(&self, conversation_id: &str) -> Result<Option<ConversationMeta>, CacheError> {
        let conn = self.store.conn();

        let mut stmt = conn.prepare(
            "SELECT conversation_id, latest_sequence, last_updated, message_count FROM chat_meta WHERE conversation_id = ?1",
        )?;
        let meta = stmt
            .query_row(params![conversation_id], meta_from_row)
            .optional()?;

        Ok(meta)
    }

    pub async fn all(&self) -> Result<Vec<ConversationMeta>, CacheError> {
        let conn = self.store.conn();

        let mut stmt = conn.prepare(
            "SELECT conversation_id, latest_sequence, last_updated, message_count FROM chat_meta ORDER BY conversation_id",
        )?;
        let metas = stmt
            .query_map([], meta_from_row)?
            .collect::<Result<Vec<_>, rusqlite::Error>>()?;

        Ok(metas)
    }

    pub async fn delete(&self, conversation_id: &str) -> Result<(), CacheError> {
        let conn = self.store.conn();
        conn.execute(
            "DELETE FROM chat_meta WHERE conversation_id = ?1",
            params![conversation_id],
        )?;
        Ok(())
    }

    pub async fn clear_all(&self) -> Result<(), CacheError> {
        let conn = self.store.conn();
        conn.execute("DELETE FROM chat_meta", [])?;
        Ok(())
    }
}

fn meta_from_row(row: &Row) -> rusqlite::Result<ConversationMeta> {
    Ok(ConversationMeta {
        conversation_id: row.get(0)?,
        latest_sequence: row.get(1)?,
        last_updated: DateTime::from_timestamp_millis(row.get(2)?)
            .ok_or(rusqlite::Error::InvalidQuery)?,
        message_count: row.get(3)?,
    })
}
