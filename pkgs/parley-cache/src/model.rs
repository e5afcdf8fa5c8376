//! Domain types for cached conversation messages and sync state

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Delivery status of a locally originated message.
///
/// Only present on messages created by this client; messages fetched from
/// the backend never carry a status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    Pending,
    Sent,
    Failed,
}

impl MessageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageStatus::Pending => "pending",
            MessageStatus::Sent => "sent",
            MessageStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(MessageStatus::Pending),
            "sent" => Some(MessageStatus::Sent),
            "failed" => Some(MessageStatus::Failed),
            _ => None,
        }
    }
}

/// Structured sender payload attached to a message.
///
/// Stored as JSON text in the `sender_json` column; absence round-trips to
/// `None`, never to an empty value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SenderInfo {
    pub id: Option<String>,
    pub name: String,
    pub email: Option<String>,
    pub avatar_url: Option<String>,
    pub role: Option<String>,
}

/// One cached chat message belonging to exactly one conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedMessage {
    /// Server-assigned id, or a client-generated temporary id while an
    /// optimistic send awaits confirmation.
    pub id: String,
    pub conversation_id: String,
    pub sender_id: Option<String>,
    pub sender: Option<SenderInfo>,
    pub content: String,
    /// Server-assigned per-conversation order. `None` only before the server
    /// has assigned one (pending/unsent messages).
    pub sequence_number: Option<i64>,
    pub is_screenshot: bool,
    pub screenshot_file_name: Option<String>,
    pub is_read_by_current_user: bool,
    pub is_system_message: bool,
    pub file_name: Option<String>,
    pub file_size: Option<i64>,
    pub file_mime_type: Option<String>,
    /// Present only for locally originated messages.
    pub status: Option<MessageStatus>,
    pub temp_id: Option<String>,
    pub client_temp_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Local insertion time, set by the store. Used only by retention.
    pub cached_at: DateTime<Utc>,
}

/// Per-conversation cache aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationMeta {
    pub conversation_id: String,
    /// Maximum sequence number of any cached message; monotonically
    /// non-decreasing except when the conversation cache is cleared.
    pub latest_sequence: Option<i64>,
    pub last_updated: DateTime<Utc>,
    pub message_count: i64,
}

/// Tri-state verdict on whether the local cache matches the remote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Unknown,
    Synced,
    OutOfSync,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Unknown => "unknown",
            SyncStatus::Synced => "synced",
            SyncStatus::OutOfSync => "out_of_sync",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "unknown" => Some(SyncStatus::Unknown),
            "synced" => Some(SyncStatus::Synced),
            "out_of_sync" => Some(SyncStatus::OutOfSync),
            _ => None,
        }
    }
}

/// Per-conversation synchronization record.
///
/// Exists independently of whether any messages are cached. The verdict is
/// derived exclusively by validation; callers can only force it back to
/// `Unknown` via the remote-sequence and reconnect hooks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncState {
    pub conversation_id: String,
    pub local_min_seq: Option<i64>,
    pub local_max_seq: Option<i64>,
    pub last_known_backend_seq: Option<i64>,
    pub sync_state: SyncStatus,
    pub last_validated_at: Option<DateTime<Utc>>,
    pub message_count: i64,
}

/// Why a validation run produced its verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationReason {
    /// The remote sequence is not known yet; validation is deferred, not
    /// failed.
    BackendSeqUnknown,
    NoMessages,
    GapDetected,
    SequenceMismatch,
    Validated,
}

/// Result of running the validation algorithm for one conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationOutcome {
    pub valid: bool,
    pub reason: ValidationReason,
    pub details: Option<String>,
}

impl ValidationOutcome {
    pub(crate) fn ok(reason: ValidationReason) -> Self {
        Self {
            valid: true,
            reason,
            details: None,
        }
    }

    pub(crate) fn invalid(reason: ValidationReason, details: String) -> Self {
        Self {
            valid: false,
            reason,
            details: Some(details),
        }
    }
}

/// Closed range of missing sequence numbers, inclusive on both ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeqRange {
    pub from_seq: i64,
    pub to_seq: i64,
}

impl SeqRange {
    pub fn new(from_seq: i64, to_seq: i64) -> Self {
        Self { from_seq, to_seq }
    }
}
