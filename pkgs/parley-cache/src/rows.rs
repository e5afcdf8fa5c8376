//! Row codec - lossless mapping between [`CachedMessage`] and its flat row form
//!
//! Booleans map to SQLite integers, the structured sender payload maps to
//! JSON text or NULL, timestamps map to epoch milliseconds. Absent optional
//! fields stay NULL on the way in and `None` on the way out; in particular a
//! missing `sequence_number` never decodes to 0.

use crate::error::CacheError;
use crate::model::{CachedMessage, MessageStatus, SenderInfo};
use chrono::{DateTime, Utc};
use rusqlite::Row;

/// Flat row form of a message, column-for-column with the `messages` table.
#[derive(Debug, Clone)]
pub(crate) struct MessageRow {
    pub id: String,
    pub conversation_id: String,
    pub sender_id: Option<String>,
    pub sender_json: Option<String>,
    pub content: String,
    pub sequence_number: Option<i64>,
    pub is_screenshot: bool,
    pub screenshot_file_name: Option<String>,
    pub is_read_by_current_user: bool,
    pub created_at: i64,
    pub updated_at: i64,
    pub status: Option<String>,
    pub temp_id: Option<String>,
    pub client_temp_id: Option<String>,
    pub is_system_message: bool,
    pub file_name: Option<String>,
    pub file_size: Option<i64>,
    pub file_mime_type: Option<String>,
    pub cached_at: i64,
}

impl MessageRow {
    /// Flatten a message for insertion. `cached_at` is the local insertion
    /// time supplied by the store, not by the caller.
    pub fn from_message(msg: &CachedMessage, cached_at: DateTime<Utc>) -> Result<Self, CacheError> {
        let sender_json = msg
            .sender
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        Ok(Self {
            id: msg.id.clone(),
            conversation_id: msg.conversation_id.clone(),
            sender_id: msg.sender_id.clone(),
            sender_json,
            content: msg.content.clone(),
            sequence_number: msg.sequence_number,
            is_screenshot: msg.is_screenshot,
            screenshot_file_name: msg.screenshot_file_name.clone(),
            is_read_by_current_user: msg.is_read_by_current_user,
            created_at: msg.created_at.timestamp_millis(),
            updated_at: msg.updated_at.timestamp_millis(),
            status: msg.status.map(|s| s.as_str().to_string()),
            temp_id: msg.temp_id.clone(),
            client_temp_id: msg.client_temp_id.clone(),
            is_system_message: msg.is_system_message,
            file_name: msg.file_name.clone(),
            file_size: msg.file_size,
            file_mime_type: msg.file_mime_type.clone(),
            cached_at: cached_at.timestamp_millis(),
        })
    }

    /// Read a row produced by `SELECT * FROM messages`.
    pub fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            conversation_id: row.get(1)?,
            sender_id: row.get(2)?,
            sender_json: row.get(3)?,
            content: row.get(4)?,
            sequence_number: row.get(5)?,
            is_screenshot: row.get(6)?,
            screenshot_file_name: row.get(7)?,
            is_read_by_current_user: row.get(8)?,
            created_at: row.get(9)?,
            updated_at: row.get(10)?,
            status: row.get(11)?,
            temp_id: row.get(12)?,
            client_temp_id: row.get(13)?,
            is_system_message: row.get(14)?,
            file_name: row.get(15)?,
            file_size: row.get(16)?,
            file_mime_type: row.get(17)?,
            cached_at: row.get(18)?,
        })
    }

    /// Rebuild the in-memory message. No field is silently dropped or
    /// defaulted.
    pub fn into_message(self) -> rusqlite::Result<CachedMessage> {
        let sender: Option<SenderInfo> = self
            .sender_json
            .as_deref()
            .map(serde_json::from_str)
            .transpose()
            .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;

        let status = self
            .status
            .as_deref()
            .map(|s| MessageStatus::parse(s).ok_or(rusqlite::Error::InvalidQuery))
            .transpose()?;

        Ok(CachedMessage {
            id: self.id,
            conversation_id: self.conversation_id,
            sender_id: self.sender_id,
            sender,
            content: self.content,
            sequence_number: self.sequence_number,
            is_screenshot: self.is_screenshot,
            screenshot_file_name: self.screenshot_file_name,
            is_read_by_current_user: self.is_read_by_current_user,
            is_system_message: self.is_system_message,
            file_name: self.file_name,
            file_size: self.file_size,
            file_mime_type: self.file_mime_type,
            status,
            temp_id: self.temp_id,
            client_temp_id: self.client_temp_id,
            created_at: decode_millis(self.created_at)?,
            updated_at: decode_millis(self.updated_at)?,
            cached_at: decode_millis(self.cached_at)?,
        })
    }
}

/// Convert a full row straight to a message.
pub(crate) fn message_from_row(row: &Row) -> rusqlite::Result<CachedMessage> {
    MessageRow::from_row(row)?.into_message()
}

fn decode_millis(millis: i64) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis).ok_or(rusqlite::Error::InvalidQuery)
}
